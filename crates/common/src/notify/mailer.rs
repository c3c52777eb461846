//! Email transport
//!
//! Mail goes out through an HTTP relay that accepts a JSON message.

use super::NotificationDeliveryError;
use crate::config::MailConfig;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotificationDeliveryError>;
}

pub struct HttpMailer {
    client: reqwest::Client,
    relay_url: String,
    api_key: Option<String>,
    from: String,
}

#[derive(Serialize)]
struct OutgoingMail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl HttpMailer {
    pub fn new(config: &MailConfig, relay_url: &str) -> Result<Self, NotificationDeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NotificationDeliveryError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            relay_url: relay_url.to_string(),
            api_key: config.api_key.clone(),
            from: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotificationDeliveryError> {
        if !to.contains('@') {
            return Err(NotificationDeliveryError::InvalidAddress(to.to_string()));
        }

        let mut request = self.client.post(&self.relay_url).json(&OutgoingMail {
            from: &self.from,
            to,
            subject,
            text: body,
        });
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotificationDeliveryError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationDeliveryError::Rejected {
                status,
                body: body.chars().take(300).collect(),
            });
        }

        Ok(())
    }
}

/// Used when no relay is configured
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), NotificationDeliveryError> {
        Err(NotificationDeliveryError::NotConfigured)
    }
}

/// Records sent mail; addresses in `fail_for` are rejected
#[derive(Default)]
pub struct MockMailer {
    sent: Mutex<Vec<(String, String)>>,
    fail_for: HashSet<String>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_for: addresses.into_iter().map(Into::into).collect(),
        }
    }

    /// `(to, subject)` pairs delivered so far
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<(), NotificationDeliveryError> {
        if self.fail_for.contains(to) {
            return Err(NotificationDeliveryError::Rejected {
                status: 550,
                body: "mailbox unavailable".into(),
            });
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((to.to_string(), subject.to_string()));
        }
        Ok(())
    }
}

/// Create a mailer based on configuration
pub fn create_mailer(config: &MailConfig) -> Arc<dyn Mailer> {
    match config.relay_url.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(url) => match HttpMailer::new(config, url) {
            Ok(mailer) => Arc::new(mailer),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to build mail client, email disabled");
                Arc::new(DisabledMailer)
            }
        },
        None => {
            tracing::info!("No mail relay configured, email delivery disabled");
            Arc::new(DisabledMailer)
        }
    }
}
