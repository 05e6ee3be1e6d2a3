use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::Notifier;
use crate::error::DeliveryError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMail {
    RecoveryCode { email: String, code: String },
    ConfirmationLink { email: String, token: String },
}

/// In-memory notifier that records every delivery. `fail_next_sends(true)` makes sends fail
/// until switched off again.
#[derive(Debug, Default)]
pub struct Outbox {
    sent: Mutex<Vec<SentMail>>,
    failing: AtomicBool,
}

impl Outbox {
    pub fn new() -> Self { Self::default() }

    pub fn fail_next_sends(&self, on: bool) { self.failing.store(on, Ordering::SeqCst); }

    pub fn sent(&self) -> Vec<SentMail> { self.sent.lock().clone() }

    pub fn last_code_for(&self, email: &str) -> Option<String> {
        self.sent.lock().iter().rev().find_map(|m| match m {
            SentMail::RecoveryCode { email: e, code } if e == email => Some(code.clone()),
            _ => None,
        })
    }

    pub fn last_token_for(&self, email: &str) -> Option<String> {
        self.sent.lock().iter().rev().find_map(|m| match m {
            SentMail::ConfirmationLink { email: e, token } if e == email => Some(token.clone()),
            _ => None,
        })
    }

    fn record(&self, mail: SentMail) -> Result<(), DeliveryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeliveryError::Transport("outbox is failing deliveries".into()));
        }
        self.sent.lock().push(mail);
        Ok(())
    }
}

impl Notifier for Outbox {
    fn send_recovery_code(&self, email: &str, code: &str) -> Result<(), DeliveryError> {
        self.record(SentMail::RecoveryCode { email: email.to_string(), code: code.to_string() })
    }

    fn send_confirmation_link(&self, email: &str, token: &str) -> Result<(), DeliveryError> {
        self.record(SentMail::ConfirmationLink { email: email.to_string(), token: token.to_string() })
    }
}
