use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(Uuid);

impl PlayerId {
    pub(crate) fn fresh() -> Self { PlayerId(Uuid::new_v4()) }
    pub fn as_uuid(&self) -> &Uuid { &self.0 }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { fmt::Display::fmt(&self.0, f) }
}

impl std::str::FromStr for PlayerId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> { Uuid::parse_str(s).map(PlayerId) }
}

/// A registered account as persisted in the player store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub alias: String,
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub spaceship_image: Option<String>,
    #[serde(default)]
    pub favorite_music: Vec<String>,
    #[serde(default)]
    pub email_confirmed: bool,
    #[serde(default)]
    pub confirmation_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Player {
    /// Build an unsaved, unconfirmed record. The id is minted here and never changes.
    pub fn new(
        alias: String,
        full_name: String,
        email: String,
        password_hash: String,
        confirmation_token: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PlayerId::fresh(),
            alias,
            full_name,
            email,
            password_hash,
            profile_picture: None,
            spaceship_image: None,
            favorite_music: Vec::new(),
            email_confirmed: false,
            confirmation_token,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Form data collected by the registration screen.
#[derive(Debug, Clone, Default)]
pub struct NewPlayer {
    pub alias: String,
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub profile_picture: Option<String>,
    pub spaceship_image: Option<String>,
    pub favorite_music: Vec<String>,
}

/// Partial update of a player's non-id fields. `None` leaves a field untouched.
/// For the two optional image fields, `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerPatch {
    pub alias: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub profile_picture: Option<Option<String>>,
    pub spaceship_image: Option<Option<String>>,
    pub favorite_music: Option<Vec<String>>,
    pub email_confirmed: Option<bool>,
    pub confirmation_token: Option<Option<String>>,
}

impl PlayerPatch {
    pub fn is_empty(&self) -> bool { *self == PlayerPatch::default() }

    pub(crate) fn apply(self, p: &mut Player) {
        if let Some(v) = self.alias { p.alias = v; }
        if let Some(v) = self.full_name { p.full_name = v; }
        if let Some(v) = self.email { p.email = v; }
        if let Some(v) = self.profile_picture { p.profile_picture = v; }
        if let Some(v) = self.spaceship_image { p.spaceship_image = v; }
        if let Some(v) = self.favorite_music { p.favorite_music = v; }
        if let Some(v) = self.email_confirmed { p.email_confirmed = v; }
        if let Some(v) = self.confirmation_token { p.confirmation_token = v; }
    }
}

/// Normalise a free-text path field: blank input means "no value".
pub fn optional_field(raw: &str) -> Option<String> {
    let t = raw.trim();
    if t.is_empty() { None } else { Some(t.to_string()) }
}

/// Split the comma-separated music field of the profile forms into tags.
pub fn parse_music_tags(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn music_tags_trim_and_skip_blanks() {
        assert_eq!(parse_music_tags(" synthwave, ,chiptune ,"), vec!["synthwave", "chiptune"]);
        assert!(parse_music_tags("  ").is_empty());
    }

    #[test]
    fn patch_merges_only_present_fields() {
        let mut p = Player::new("Mel".into(), "Mel M".into(), "mel@x.com".into(), "$argon2id$x".into(), Some("tok".into()));
        p.profile_picture = Some("me.png".into());
        PlayerPatch { full_name: Some("Melany".into()), profile_picture: Some(None), ..Default::default() }.apply(&mut p);
        assert_eq!(p.full_name, "Melany");
        assert_eq!(p.alias, "Mel");
        assert_eq!(p.profile_picture, None);
        assert_eq!(p.confirmation_token.as_deref(), Some("tok"));
    }

    #[test]
    fn record_serialises_with_stable_field_names() {
        let p = Player::new("Mel".into(), "Mel M".into(), "mel@x.com".into(), "$argon2id$x".into(), None);
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["alias"], "Mel");
        assert_eq!(v["email_confirmed"], false);
        assert!(v["id"].is_string());
        let back: Player = serde_json::from_value(v).unwrap();
        assert_eq!(back, p);
    }
}
