//! Stateless field checks for registration, profile updates and password changes.
//! Error messages are shown to the player as-is.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{IdentityError, IdentityResult};

pub const ALIAS_MAX_CHARS: usize = 32;
pub const PASSWORD_MIN_CHARS: usize = 8;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles")
});

pub fn validate_alias(alias: &str) -> IdentityResult<()> {
    if alias.trim().is_empty() {
        return Err(IdentityError::invalid("alias", "alias must not be empty"));
    }
    if alias.chars().count() > ALIAS_MAX_CHARS {
        return Err(IdentityError::invalid("alias", format!("alias must be at most {} characters", ALIAS_MAX_CHARS)));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> IdentityResult<()> {
    if !EMAIL_RE.is_match(email) {
        return Err(IdentityError::invalid("email", "email must look like name@domain.tld"));
    }
    Ok(())
}

/// Policy: at least 8 characters, at least one letter and at least one digit.
pub fn validate_password_strength(password: &str) -> IdentityResult<()> {
    if password.chars().count() < PASSWORD_MIN_CHARS {
        return Err(IdentityError::WeakPassword(format!("password must be at least {} characters long", PASSWORD_MIN_CHARS)));
    }
    if !password.chars().any(|c| c.is_alphabetic()) {
        return Err(IdentityError::WeakPassword("password must contain at least one letter".to_string()));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(IdentityError::WeakPassword("password must contain at least one digit".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_rules() {
        assert!(validate_alias("Mel").is_ok());
        assert!(matches!(validate_alias(""), Err(IdentityError::InvalidFormat { field: "alias", .. })));
        assert!(validate_alias("   ").is_err());
        assert!(validate_alias(&"x".repeat(ALIAS_MAX_CHARS)).is_ok());
        assert!(validate_alias(&"x".repeat(ALIAS_MAX_CHARS + 1)).is_err());
    }

    #[test]
    fn email_rules() {
        for ok in ["mel@x.com", "a.b+c@sub.domain.org"] {
            assert!(validate_email(ok).is_ok(), "{ok}");
        }
        for bad in ["", "mel", "mel@", "@x.com", "mel@x", "mel @x.com", "a@b@c.com"] {
            assert!(matches!(validate_email(bad), Err(IdentityError::InvalidFormat { field: "email", .. })), "{bad}");
        }
    }

    #[test]
    fn password_rules() {
        assert!(validate_password_strength("Abcd1234").is_ok());
        assert!(validate_password_strength("NewPass1").is_ok());
        match validate_password_strength("Ab1") {
            Err(IdentityError::WeakPassword(m)) => assert!(m.contains("at least 8")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(validate_password_strength("12345678"), Err(IdentityError::WeakPassword(_))));
        assert!(matches!(validate_password_strength("abcdefgh"), Err(IdentityError::WeakPassword(_))));
    }
}
