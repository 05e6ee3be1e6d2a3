//! Mail delivery for confirmation links and recovery codes.
//! The identity core only needs the two operations of `Notifier`; transports live in sub-modules.

mod http;
mod outbox;

pub use http::HttpNotifier;
pub use outbox::{Outbox, SentMail};

use std::sync::Arc;

use tracing::info;

use crate::config::MailConfig;
use crate::error::DeliveryError;

pub trait Notifier: Send + Sync {
    fn send_recovery_code(&self, email: &str, code: &str) -> Result<(), DeliveryError>;
    fn send_confirmation_link(&self, email: &str, token: &str) -> Result<(), DeliveryError>;
}

/// Writes deliveries to the log instead of sending mail. Development default.
#[derive(Debug, Clone)]
pub struct LogNotifier {
    confirm_base_url: String,
}

impl LogNotifier {
    pub fn new(confirm_base_url: impl Into<String>) -> Self { Self { confirm_base_url: confirm_base_url.into() } }
}

impl Notifier for LogNotifier {
    fn send_recovery_code(&self, email: &str, code: &str) -> Result<(), DeliveryError> {
        info!(target: "starport::notifier", "recovery code for {}: {}", email, code);
        Ok(())
    }

    fn send_confirmation_link(&self, email: &str, token: &str) -> Result<(), DeliveryError> {
        info!(target: "starport::notifier", "confirmation link for {}: {}", email, confirmation_link(&self.confirm_base_url, token));
        Ok(())
    }
}

pub fn confirmation_link(base: &str, token: &str) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{}{}token={}", base, sep, token)
}

/// Pick the transport from configuration: the HTTP mail API when an endpoint is set,
/// otherwise the log notifier.
pub fn from_config(cfg: &MailConfig) -> Result<Arc<dyn Notifier>, DeliveryError> {
    match cfg.api_url {
        Some(_) => Ok(Arc::new(HttpNotifier::new(cfg.clone())?)),
        None => Ok(Arc::new(LogNotifier::new(cfg.confirm_base_url.clone()))),
    }
}
