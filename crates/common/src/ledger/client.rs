//! Ledger backends
//!
//! - `HttpLedger`: ledger gateway reached over HTTP
//! - `NoopLedger`: used when no gateway is configured
//! - `MockLedger`: in-memory ledger for tests

use super::{LedgerAction, LedgerEntry, LedgerError};
use crate::config::LedgerConfig;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Capability interface of an append-only audit backend
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Append an action and return its transaction hash
    async fn log_action(&self, entry: &LedgerEntry) -> Result<String, LedgerError>;

    async fn action_count(&self, document_id: Uuid) -> Result<u64, LedgerError>;

    async fn action(&self, document_id: Uuid, index: u64) -> Result<LedgerAction, LedgerError>;
}

pub struct NoopLedger;

#[async_trait]
impl Ledger for NoopLedger {
    async fn log_action(&self, _entry: &LedgerEntry) -> Result<String, LedgerError> {
        Err(LedgerError::NotConfigured)
    }

    async fn action_count(&self, _document_id: Uuid) -> Result<u64, LedgerError> {
        Err(LedgerError::NotConfigured)
    }

    async fn action(&self, _document_id: Uuid, _index: u64) -> Result<LedgerAction, LedgerError> {
        Err(LedgerError::NotConfigured)
    }
}

/// Client for the ledger gateway
pub struct HttpLedger {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct TxResponse {
    tx_hash: String,
}

#[derive(Deserialize)]
struct CountResponse {
    count: u64,
}

impl HttpLedger {
    pub fn new(base_url: &str, api_key: Option<String>, timeout_secs: u64) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key {
            Some(ref key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, LedgerError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Upstream {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }
        response
            .json()
            .await
            .map_err(|e| LedgerError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl Ledger for HttpLedger {
    async fn log_action(&self, entry: &LedgerEntry) -> Result<String, LedgerError> {
        let response = self
            .authorize(self.client.post(format!("{}/actions", self.base_url)))
            .json(entry)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        let tx: TxResponse = Self::read_json(response).await?;
        Ok(tx.tx_hash)
    }

    async fn action_count(&self, document_id: Uuid) -> Result<u64, LedgerError> {
        let url = format!("{}/documents/{}/actions/count", self.base_url, document_id);
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        let count: CountResponse = Self::read_json(response).await?;
        Ok(count.count)
    }

    async fn action(&self, document_id: Uuid, index: u64) -> Result<LedgerAction, LedgerError> {
        let url = format!("{}/documents/{}/actions/{}", self.base_url, document_id, index);
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        Self::read_json(response).await
    }
}

/// In-memory ledger for tests. Can be switched to fail every call.
#[derive(Default)]
pub struct MockLedger {
    actions: Mutex<HashMap<Uuid, Vec<(LedgerEntry, LedgerAction)>>>,
    failing: AtomicBool,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        let ledger = Self::default();
        ledger.set_failing(true);
        ledger
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Entries logged for a document, in order
    pub fn entries(&self, document_id: Uuid) -> Vec<LedgerEntry> {
        self.actions
            .lock()
            .map(|a| {
                a.get(&document_id)
                    .map(|v| v.iter().map(|(e, _)| e.clone()).collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    fn check(&self) -> Result<(), LedgerError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(LedgerError::Transport("ledger node unreachable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn log_action(&self, entry: &LedgerEntry) -> Result<String, LedgerError> {
        self.check()?;
        let mut actions = self
            .actions
            .lock()
            .map_err(|_| LedgerError::Transport("mock poisoned".into()))?;
        let history = actions.entry(entry.document_id).or_default();

        let mut hasher = Sha256::new();
        hasher.update(entry.document_id.as_bytes());
        hasher.update(history.len().to_le_bytes());
        hasher.update(entry.content_hash.as_bytes());
        let tx_hash = format!("0x{}", hex::encode(hasher.finalize()));

        let action = LedgerAction {
            action_type: entry.action_type.clone(),
            performer: entry.performer_name.clone(),
            role: entry.role.clone(),
            department: entry.department.clone(),
            timestamp: Utc::now(),
            hash: entry.content_hash.clone(),
        };
        history.push((entry.clone(), action));
        Ok(tx_hash)
    }

    async fn action_count(&self, document_id: Uuid) -> Result<u64, LedgerError> {
        self.check()?;
        Ok(self.entries(document_id).len() as u64)
    }

    async fn action(&self, document_id: Uuid, index: u64) -> Result<LedgerAction, LedgerError> {
        self.check()?;
        let actions = self
            .actions
            .lock()
            .map_err(|_| LedgerError::Transport("mock poisoned".into()))?;
        actions
            .get(&document_id)
            .and_then(|v| v.get(index as usize))
            .map(|(_, a)| a.clone())
            .ok_or(LedgerError::Upstream {
                status: 404,
                body: "no such action".into(),
            })
    }
}

/// Create a ledger backend based on configuration
pub fn create_ledger(config: &LedgerConfig) -> Arc<dyn Ledger> {
    match config.endpoint.as_deref().filter(|e| !e.trim().is_empty()) {
        Some(endpoint) => match HttpLedger::new(endpoint, config.api_key.clone(), config.timeout_secs) {
            Ok(ledger) => {
                tracing::info!(endpoint = endpoint, "Audit ledger enabled");
                Arc::new(ledger)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to build ledger client, ledger disabled");
                Arc::new(NoopLedger)
            }
        },
        None => {
            tracing::info!("No ledger endpoint configured, audit ledger disabled");
            Arc::new(NoopLedger)
        }
    }
}
