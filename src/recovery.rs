//! Password recovery: email → one-time code → new password.
//!
//! The session is a plain value. Each step takes it by value and hands back either the next
//! session or a `Rejected` carrying the session to continue from (which may have been reset to
//! `Email`) plus the reason. A successful password step consumes the session.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::IdentityError;
use crate::security::generate_recovery_code;
use crate::service::PlayerService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Email,
    Code,
    Password,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Email => "EMAIL",
            Stage::Code => "CODE",
            Stage::Password => "PASSWORD",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Clone, PartialEq, Eq)]
pub enum RecoverySession {
    Email,
    Code { target_email: String, issued_code: String, expires_at: DateTime<Utc> },
    Password { target_email: String },
}

impl RecoverySession {
    pub fn start() -> Self { RecoverySession::Email }

    pub fn stage(&self) -> Stage {
        match self {
            RecoverySession::Email => Stage::Email,
            RecoverySession::Code { .. } => Stage::Code,
            RecoverySession::Password { .. } => Stage::Password,
        }
    }

    pub fn target_email(&self) -> Option<&str> {
        match self {
            RecoverySession::Email => None,
            RecoverySession::Code { target_email, .. } | RecoverySession::Password { target_email } => Some(target_email),
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            RecoverySession::Code { expires_at, .. } => Some(*expires_at),
            _ => None,
        }
    }

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self, RecoverySession::Code { expires_at, .. } if now > *expires_at)
    }
}

impl Default for RecoverySession {
    fn default() -> Self { Self::start() }
}

// The issued code is a secret; keep it out of logs and panic messages.
impl fmt::Debug for RecoverySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoverySession::Email => f.write_str("Email"),
            RecoverySession::Code { target_email, expires_at, .. } => f
                .debug_struct("Code")
                .field("target_email", target_email)
                .field("issued_code", &"******")
                .field("expires_at", expires_at)
                .finish(),
            RecoverySession::Password { target_email } => f.debug_struct("Password").field("target_email", target_email).finish(),
        }
    }
}

/// A refused step: the session to continue with and why.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct Rejected {
    pub session: RecoverySession,
    pub error: IdentityError,
}

impl Rejected {
    fn new(session: RecoverySession, error: IdentityError) -> Self { Self { session, error } }

    fn wrong_stage(session: RecoverySession, attempted: &'static str) -> Self {
        let stage = session.stage().as_str();
        Self { session, error: IdentityError::WrongStage { stage, attempted } }
    }

    pub fn into_parts(self) -> (RecoverySession, IdentityError) { (self.session, self.error) }
}

pub type Step = Result<RecoverySession, Rejected>;

pub struct RecoveryFlow {
    service: Arc<PlayerService>,
    clock: Arc<dyn Clock>,
    ttl: TimeDelta,
}

impl RecoveryFlow {
    pub fn new(service: Arc<PlayerService>, clock: Arc<dyn Clock>, ttl: TimeDelta) -> Self {
        Self { service, clock, ttl }
    }

    pub fn code_ttl(&self) -> TimeDelta { self.ttl }

    /// EMAIL → CODE. Also valid from CODE, where it replaces the outstanding code.
    pub fn submit_email(&self, session: RecoverySession, email: &str) -> Step {
        if session.stage() == Stage::Password {
            return Err(Rejected::wrong_stage(session, "submit_email"));
        }
        let email = email.trim();
        if email.is_empty() {
            return Err(Rejected::new(session, IdentityError::invalid("email", "enter the registered email")));
        }
        let repo = self.service.repository();
        if let Err(e) = repo.reload() {
            return Err(Rejected::new(session, e.into()));
        }
        if repo.get_by_email(email).is_none() {
            debug!(target: "starport::recovery", "recovery requested for unknown email");
            return Err(Rejected::new(session, IdentityError::UnknownUser));
        }

        let Some(expires_at) = self.clock.now().checked_add_signed(self.ttl) else {
            warn!(target: "starport::recovery", "recovery code deadline out of range (ttl={})", self.ttl);
            return Err(Rejected::new(session, IdentityError::ExpiredCode));
        };
        let code = match generate_recovery_code() {
            Ok(c) => c,
            Err(e) => return Err(Rejected::new(session, e.into())),
        };
        if let Err(e) = self.service.notifier().send_recovery_code(email, &code) {
            warn!(target: "starport::recovery", "recovery code mail to {} failed: {}", email, e);
            return Err(Rejected::new(RecoverySession::Email, IdentityError::DeliveryFailure(e)));
        }
        info!(target: "starport::recovery", "recovery code issued for {} expires_at={}", email, expires_at.to_rfc3339());
        Ok(RecoverySession::Code { target_email: email.to_string(), issued_code: code, expires_at })
    }

    /// CODE → PASSWORD when the code matches and has not expired. Expiry resets to EMAIL.
    pub fn submit_code(&self, session: RecoverySession, code: &str) -> Step {
        let expired = session.is_expired_at(self.clock.now());
        match session {
            RecoverySession::Code { .. } if expired => {
                info!(target: "starport::recovery", "recovery code expired");
                Err(Rejected::new(RecoverySession::Email, IdentityError::ExpiredCode))
            }
            RecoverySession::Code { target_email, issued_code, expires_at } => {
                if code.trim().as_bytes() == issued_code.as_bytes() {
                    debug!(target: "starport::recovery", "recovery code accepted for {}", target_email);
                    Ok(RecoverySession::Password { target_email })
                } else {
                    Err(Rejected::new(RecoverySession::Code { target_email, issued_code, expires_at }, IdentityError::CodeMismatch))
                }
            }
            other => Err(Rejected::wrong_stage(other, "submit_code")),
        }
    }

    /// PASSWORD → closed. On success the session is consumed.
    pub fn submit_password(&self, session: RecoverySession, new_password: &str, confirm_password: &str) -> Result<(), Rejected> {
        if session.stage() != Stage::Password {
            return Err(Rejected::wrong_stage(session, "submit_password"));
        }
        let target_email = session.target_email().unwrap_or_default().to_string();
        if new_password != confirm_password {
            return Err(Rejected::new(session, IdentityError::PasswordMismatch));
        }
        match self.service.update_password(&target_email, new_password) {
            Ok(true) => {
                info!(target: "starport::recovery", "password reset completed for {}", target_email);
                Ok(())
            }
            Ok(false) => Err(Rejected::new(session, IdentityError::NotFound)),
            Err(e) => Err(Rejected::new(session, e)),
        }
    }

    /// Periodic expiry check for an idle form. Expired CODE sessions fall back to EMAIL.
    pub fn tick(&self, session: RecoverySession) -> Step {
        if session.is_expired_at(self.clock.now()) {
            info!(target: "starport::recovery", "recovery code expired while waiting");
            return Err(Rejected::new(RecoverySession::Email, IdentityError::ExpiredCode));
        }
        Ok(session)
    }

    pub fn cancel(&self, session: RecoverySession) {
        debug!(target: "starport::recovery", "recovery cancelled at stage {}", session.stage());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_the_code() {
        let s = RecoverySession::Code { target_email: "mel@x.com".into(), issued_code: "123456".into(), expires_at: Utc::now() };
        let dbg = format!("{:?}", s);
        assert!(!dbg.contains("123456"));
        assert!(dbg.contains("mel@x.com"));
    }

    #[test]
    fn expiry_is_strictly_after_deadline() {
        let at = Utc::now();
        let s = RecoverySession::Code { target_email: "m@x.com".into(), issued_code: "000000".into(), expires_at: at };
        assert!(!s.is_expired_at(at));
        assert!(s.is_expired_at(at + TimeDelta::milliseconds(1)));
        assert!(!RecoverySession::Email.is_expired_at(at + TimeDelta::days(1)));
    }

    #[test]
    fn stage_names() {
        assert_eq!(RecoverySession::start().stage(), Stage::Email);
        assert_eq!(Stage::Password.to_string(), "PASSWORD");
        assert_eq!(RecoverySession::Password { target_email: "m@x.com".into() }.target_email(), Some("m@x.com"));
    }
}
