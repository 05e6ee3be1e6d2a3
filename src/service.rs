//! Account operations consumed by the registration, login and profile screens.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{IdentityError, IdentityResult};
use crate::notifier::Notifier;
use crate::player::{NewPlayer, Player, PlayerId, PlayerPatch};
use crate::repository::PlayerRepository;
use crate::security::{generate_token, verify_password};
use crate::validator::{validate_alias, validate_email, validate_password_strength};

/// Edits submitted from the profile screen. `None` keeps the current value; for the image
/// fields `Some(None)` clears them.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub alias: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub profile_picture: Option<Option<String>>,
    pub spaceship_image: Option<Option<String>>,
    pub favorite_music: Option<Vec<String>>,
}

pub struct PlayerService {
    repo: Arc<PlayerRepository>,
    notifier: Arc<dyn Notifier>,
}

impl PlayerService {
    pub fn new(repo: Arc<PlayerRepository>, notifier: Arc<dyn Notifier>) -> Self { Self { repo, notifier } }

    pub fn repository(&self) -> &Arc<PlayerRepository> { &self.repo }

    pub fn notifier(&self) -> &Arc<dyn Notifier> { &self.notifier }

    fn fresh_token(&self) -> IdentityResult<String> {
        loop {
            let token = generate_token()?;
            if self.repo.get_by_confirmation_token(&token).is_none() { return Ok(token); }
        }
    }

    fn deliver_confirmation(&self, email: &str, token: &str) -> IdentityResult<()> {
        self.notifier.send_confirmation_link(email, token).map_err(|e| {
            warn!(target: "starport::service", "confirmation mail to {} failed: {}", email, e);
            IdentityError::DeliveryFailure(e)
        })
    }

    /// Create an unconfirmed account and mail its confirmation link.
    ///
    /// A `DeliveryFailure` means the account *was* created; only the mail is missing and
    /// `resend_confirmation` can retry it.
    pub fn register(&self, form: NewPlayer) -> IdentityResult<Player> {
        let alias = form.alias.trim();
        let email = form.email.trim();
        validate_alias(alias)?;
        validate_email(email)?;
        validate_password_strength(&form.password)?;

        let hash = self.repo.hashing().hash(&form.password)?;
        let token = self.fresh_token()?;
        let mut player = Player::new(alias.to_string(), form.full_name.trim().to_string(), email.to_string(), hash, Some(token.clone()));
        player.profile_picture = form.profile_picture;
        player.spaceship_image = form.spaceship_image;
        player.favorite_music = form.favorite_music;

        let stored = self.repo.add(player)?;
        info!(target: "starport::service", "registered player id={} alias={}", stored.id, stored.alias);
        self.deliver_confirmation(&stored.email, &token)?;
        Ok(stored)
    }

    /// Consume a confirmation token. Reloads first: the token usually arrives through a front
    /// door running in another process.
    pub fn confirm(&self, token: &str) -> IdentityResult<Player> {
        self.repo.reload()?;
        self.repo.consume_confirmation_token(token)
    }

    /// Mail the pending confirmation link again. Already-confirmed accounts are left alone.
    pub fn resend_confirmation(&self, email: &str) -> IdentityResult<()> {
        self.repo.reload()?;
        let player = self.repo.get_by_email(email.trim()).ok_or(IdentityError::NotFound)?;
        if player.email_confirmed {
            debug!(target: "starport::service", "player id={} already confirmed, nothing to resend", player.id);
            return Ok(());
        }
        let token = match player.confirmation_token {
            Some(t) => t,
            None => {
                let t = self.fresh_token()?;
                self.repo.update(player.id, PlayerPatch { confirmation_token: Some(Some(t.clone())), ..Default::default() })?;
                t
            }
        };
        self.deliver_confirmation(&player.email, &token)
    }

    /// Apply profile edits. A changed email is unconfirmed again and gets a fresh link.
    pub fn update_profile(&self, id: PlayerId, changes: ProfileChanges) -> IdentityResult<Player> {
        self.repo.reload()?;
        let current = self.repo.get_by_id(id).ok_or(IdentityError::NotFound)?;

        let alias = changes.alias.map(|a| a.trim().to_string());
        let email = changes.email.map(|e| e.trim().to_string());
        if let Some(a) = alias.as_deref().filter(|a| *a != current.alias) {
            validate_alias(a)?;
        }
        let new_email = email.as_deref().filter(|e| *e != current.email).map(str::to_string);
        if let Some(e) = new_email.as_deref() {
            validate_email(e)?;
        }

        let mut patch = PlayerPatch {
            alias,
            full_name: changes.full_name.map(|n| n.trim().to_string()),
            email,
            profile_picture: changes.profile_picture,
            spaceship_image: changes.spaceship_image,
            favorite_music: changes.favorite_music,
            ..Default::default()
        };
        let token = match new_email {
            Some(_) => Some(self.fresh_token()?),
            None => None,
        };
        if let Some(t) = &token {
            patch.email_confirmed = Some(false);
            patch.confirmation_token = Some(Some(t.clone()));
        }

        let updated = self.repo.update(id, patch)?;
        info!(target: "starport::service", "profile updated for player id={}", id);
        if let Some(t) = token {
            self.deliver_confirmation(&updated.email, &t)?;
        }
        Ok(updated)
    }

    /// Log in by alias or email. `UnknownUser` and `BadCredentials` stay distinct here; use
    /// `IdentityError::public_message` when showing them.
    pub fn authenticate(&self, identifier: &str, password: &str) -> IdentityResult<Player> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(IdentityError::invalid("identifier", "enter your alias or email"));
        }
        if password.is_empty() {
            return Err(IdentityError::invalid("password", "enter your password"));
        }
        self.repo.reload()?;
        let player = self.repo.get_by_alias(identifier)
            .or_else(|| self.repo.get_by_email(identifier))
            .ok_or_else(|| {
                debug!(target: "starport::service", "login for unknown identifier");
                IdentityError::UnknownUser
            })?;
        if !verify_password(&player.password_hash, password) {
            warn!(target: "starport::service", "bad password for player id={}", player.id);
            return Err(IdentityError::BadCredentials);
        }
        info!(target: "starport::service", "player id={} logged in", player.id);
        Ok(player)
    }

    /// Strength-check and store a new password. `Ok(false)` when the email is unknown.
    pub fn update_password(&self, email: &str, new_password: &str) -> IdentityResult<bool> {
        validate_password_strength(new_password)?;
        Ok(self.repo.update_password(email, new_password)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HashingConfig;
    use crate::notifier::Outbox;
    use crate::security::PasswordHashing;
    use tempfile::{tempdir, TempDir};

    fn fixture() -> (TempDir, PlayerService, Arc<Outbox>) {
        let tmp = tempdir().unwrap();
        let repo = PlayerRepository::open(tmp.path().join("players.json"), PasswordHashing::new(HashingConfig::fast_for_tests())).unwrap();
        let outbox = Arc::new(Outbox::new());
        let svc = PlayerService::new(Arc::new(repo), outbox.clone());
        (tmp, svc, outbox)
    }

    fn mel() -> NewPlayer {
        NewPlayer { alias: "Mel".into(), full_name: "Mel Montoya".into(), email: "mel@x.com".into(), password: "Abcd1234".into(), ..Default::default() }
    }

    #[test]
    fn validation_fails_fast_before_persisting() {
        let (_tmp, svc, outbox) = fixture();
        let err = svc.register(NewPlayer { alias: String::new(), password: "weak".into(), ..mel() }).unwrap_err();
        assert!(matches!(err, IdentityError::InvalidFormat { field: "alias", .. }));
        let err = svc.register(NewPlayer { password: "weak".into(), ..mel() }).unwrap_err();
        assert!(matches!(err, IdentityError::WeakPassword(_)));
        assert!(svc.repository().is_empty());
        assert!(outbox.sent().is_empty());
    }

    #[test]
    fn register_trims_form_fields() {
        let (_tmp, svc, _outbox) = fixture();
        let p = svc.register(NewPlayer { alias: "  Mel ".into(), email: " mel@x.com ".into(), ..mel() }).unwrap();
        assert_eq!(p.alias, "Mel");
        assert_eq!(p.email, "mel@x.com");
    }

    #[test]
    fn resend_after_failed_delivery() {
        let (_tmp, svc, outbox) = fixture();
        outbox.fail_next_sends(true);
        assert!(matches!(svc.register(mel()), Err(IdentityError::DeliveryFailure(_))));
        outbox.fail_next_sends(false);
        svc.resend_confirmation("mel@x.com").unwrap();
        let token = outbox.last_token_for("mel@x.com").unwrap();
        assert!(svc.confirm(&token).unwrap().email_confirmed);
        // confirmed accounts get nothing more
        svc.resend_confirmation("mel@x.com").unwrap();
        assert_eq!(outbox.sent().len(), 1);
        assert!(matches!(svc.resend_confirmation("nobody@x.com"), Err(IdentityError::NotFound)));
    }

    #[test]
    fn update_profile_revalidates_only_changed_fields() {
        let (_tmp, svc, _outbox) = fixture();
        let p = svc.register(mel()).unwrap();
        let err = svc.update_profile(p.id, ProfileChanges { email: Some("not-an-email".into()), ..Default::default() }).unwrap_err();
        assert!(matches!(err, IdentityError::InvalidFormat { field: "email", .. }));
        let updated = svc.update_profile(p.id, ProfileChanges {
            alias: Some("Mel".into()),
            full_name: Some("Melany".into()),
            favorite_music: Some(vec!["synthwave".into()]),
            spaceship_image: Some(Some("ships/falcon.png".into())),
            ..Default::default()
        }).unwrap();
        assert_eq!(updated.full_name, "Melany");
        assert_eq!(updated.favorite_music, vec!["synthwave"]);
        assert_eq!(updated.spaceship_image.as_deref(), Some("ships/falcon.png"));
        assert_eq!(updated.confirmation_token, p.confirmation_token, "email untouched keeps the pending token");
    }

    #[test]
    fn blank_login_fields_are_rejected_before_lookup() {
        let (_tmp, svc, _outbox) = fixture();
        svc.register(mel()).unwrap();
        assert!(matches!(svc.authenticate("   ", "Abcd1234"), Err(IdentityError::InvalidFormat { field: "identifier", .. })));
        assert!(matches!(svc.authenticate("Mel", ""), Err(IdentityError::InvalidFormat { field: "password", .. })));
        // the store being unreadable does not matter for blank input
        std::fs::write(svc.repository().path(), b"{ not json").unwrap();
        assert!(matches!(svc.authenticate("", ""), Err(IdentityError::InvalidFormat { .. })));
    }

    #[test]
    fn update_password_enforces_strength() {
        let (_tmp, svc, _outbox) = fixture();
        svc.register(mel()).unwrap();
        assert!(matches!(svc.update_password("mel@x.com", "short"), Err(IdentityError::WeakPassword(_))));
        assert!(!svc.update_password("nobody@x.com", "NewPass1").unwrap());
        assert!(svc.update_password("mel@x.com", "NewPass1").unwrap());
        assert!(svc.authenticate("Mel", "NewPass1").is_ok());
    }
}
