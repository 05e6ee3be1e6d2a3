//! Unified error model for the identity subsystem.
//! Every failure a caller can observe is a distinct `IdentityError` variant; the helpers below
//! map those variants to stable machine codes, front-door HTTP statuses and user-facing text.

use thiserror::Error;

/// Failures of the durable player store. Treated as fatal for the operation that hit them.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("store io error at {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },
    #[error("store document is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

impl StorageError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        StorageError::Io { path: path.display().to_string(), source }
    }
}

/// Failures reported by a `Notifier` backend.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("mail transport failed: {0}")]
    Transport(String),
    #[error("mail provider rejected the message with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("mail notifier is not configured: {0}")]
    NotConfigured(String),
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid {field}: {reason}")]
    InvalidFormat { field: &'static str, reason: String },
    #[error("{0}")]
    WeakPassword(String),
    #[error("alias '{0}' is already taken")]
    DuplicateAlias(String),
    #[error("email '{0}' is already registered")]
    DuplicateEmail(String),
    #[error("player not found")]
    NotFound,
    #[error("unknown user")]
    UnknownUser,
    #[error("incorrect password")]
    BadCredentials,
    #[error("confirmation token is invalid or already used")]
    InvalidToken,
    #[error("recovery code has expired, request a new one")]
    ExpiredCode,
    #[error("recovery code is incorrect")]
    CodeMismatch,
    #[error("passwords do not match")]
    PasswordMismatch,
    #[error("recovery step '{attempted}' is not valid while at stage {stage}")]
    WrongStage { stage: &'static str, attempted: &'static str },
    #[error("could not deliver mail: {0}")]
    DeliveryFailure(#[source] DeliveryError),
    #[error("storage failure: {0}")]
    StorageFailure(#[from] StorageError),
}

pub type IdentityResult<T> = Result<T, IdentityError>;

impl IdentityError {
    pub fn invalid<S: Into<String>>(field: &'static str, reason: S) -> Self {
        IdentityError::InvalidFormat { field, reason: reason.into() }
    }

    pub fn code_str(&self) -> &'static str {
        match self {
            IdentityError::InvalidFormat { .. } => "invalid_format",
            IdentityError::WeakPassword(_) => "weak_password",
            IdentityError::DuplicateAlias(_) => "duplicate_alias",
            IdentityError::DuplicateEmail(_) => "duplicate_email",
            IdentityError::NotFound => "not_found",
            IdentityError::UnknownUser => "unknown_user",
            IdentityError::BadCredentials => "bad_credentials",
            IdentityError::InvalidToken => "invalid_token",
            IdentityError::ExpiredCode => "expired_code",
            IdentityError::CodeMismatch => "code_mismatch",
            IdentityError::PasswordMismatch => "password_mismatch",
            IdentityError::WrongStage { .. } => "wrong_stage",
            IdentityError::DeliveryFailure(_) => "delivery_failure",
            IdentityError::StorageFailure(_) => "storage_failure",
        }
    }

    /// Input and authentication failures are recoverable by the user retrying;
    /// storage failures abort the current operation.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, IdentityError::StorageFailure(_))
    }

    /// Map to an HTTP status for the confirmation front door.
    pub fn http_status(&self) -> u16 {
        match self {
            IdentityError::InvalidFormat { .. }
            | IdentityError::WeakPassword(_)
            | IdentityError::PasswordMismatch
            | IdentityError::InvalidToken
            | IdentityError::ExpiredCode
            | IdentityError::CodeMismatch
            | IdentityError::WrongStage { .. } => 400,
            IdentityError::UnknownUser | IdentityError::BadCredentials => 401,
            IdentityError::NotFound => 404,
            IdentityError::DuplicateAlias(_) | IdentityError::DuplicateEmail(_) => 409,
            IdentityError::DeliveryFailure(_) => 502,
            IdentityError::StorageFailure(_) => 500,
        }
    }

    /// Text safe to show to an end user. Unknown user and wrong password collapse into one
    /// message so the login form cannot be used to probe for registered accounts.
    pub fn public_message(&self) -> String {
        match self {
            IdentityError::UnknownUser | IdentityError::BadCredentials => "invalid alias/email or password".to_string(),
            IdentityError::StorageFailure(_) => "the player store is unavailable, try again later".to_string(),
            other => other.to_string(),
        }
    }
}
