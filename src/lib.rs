//! Player identity subsystem: durable player records, Argon2 credentials, registration and
//! profile validation, email confirmation and three-stage password recovery.

pub mod error;
pub mod config;
pub mod clock;
pub mod security;
pub mod validator;
pub mod player;
pub mod repository;
pub mod notifier;
pub mod service;
pub mod recovery;
pub mod context;

pub use error::{DeliveryError, IdentityError, IdentityResult, StorageError};
pub use config::IdentityConfig;
pub use player::{NewPlayer, Player, PlayerId};
pub use repository::{shared_repository, PlayerRepository};
pub use notifier::Notifier;
pub use service::{PlayerService, ProfileChanges};
pub use recovery::{RecoveryFlow, RecoverySession, Rejected, Stage};
pub use context::Identity;
