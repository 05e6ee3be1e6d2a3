use reqwest::blocking::Client;
use serde::Serialize;
use tracing::{debug, warn};

use super::{confirmation_link, Notifier};
use crate::config::MailConfig;
use crate::error::DeliveryError;

#[derive(Serialize)]
struct Contact<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransactionalMail<'a> {
    sender: Contact<'a>,
    to: Vec<Contact<'a>>,
    subject: &'a str,
    html_content: String,
}

/// Sends mail through a transactional-email HTTP API (JSON body, `api-key` header).
pub struct HttpNotifier {
    cfg: MailConfig,
    api_url: String,
    api_key: String,
    client: Client,
}

impl HttpNotifier {
    pub fn new(cfg: MailConfig) -> Result<Self, DeliveryError> {
        let api_url = cfg.api_url.clone().ok_or_else(|| DeliveryError::NotConfigured("missing mail api url".into()))?;
        let api_key = cfg.api_key.clone().ok_or_else(|| DeliveryError::NotConfigured("missing mail api key".into()))?;
        let client = Client::builder()
            .timeout(cfg.timeout())
            .build()
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        Ok(Self { cfg, api_url, api_key, client })
    }

    fn send(&self, to: &str, subject: &str, html_content: String) -> Result<(), DeliveryError> {
        let body = TransactionalMail {
            sender: Contact { email: &self.cfg.sender_email, name: Some(&self.cfg.sender_name) },
            to: vec![Contact { email: to, name: None }],
            subject,
            html_content,
        };
        let resp = self.client
            .post(&self.api_url)
            .header("api-key", &self.api_key)
            .header("accept", "application/json")
            .json(&body)
            .send()
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            warn!(target: "starport::notifier", "mail api rejected message to {} status={}", to, status.as_u16());
            return Err(DeliveryError::Rejected { status: status.as_u16(), body });
        }
        debug!(target: "starport::notifier", "mail '{}' accepted for {}", subject, to);
        Ok(())
    }
}

impl Notifier for HttpNotifier {
    fn send_recovery_code(&self, email: &str, code: &str) -> Result<(), DeliveryError> {
        let html = format!(
            "<p>Your password recovery code is <strong>{}</strong>.</p><p>It is valid for a few minutes and can be used once.</p>",
            code
        );
        self.send(email, "Password recovery code", html)
    }

    fn send_confirmation_link(&self, email: &str, token: &str) -> Result<(), DeliveryError> {
        let link = confirmation_link(&self.cfg.confirm_base_url, token);
        let html = format!("<p>Confirm your email address by opening <a href=\"{0}\">{0}</a>.</p>", link);
        self.send(email, "Confirm your email", html)
    }
}
