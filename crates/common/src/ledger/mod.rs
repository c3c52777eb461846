//! Best-effort audit ledger
//!
//! Actions on a document are appended to an external ledger keyed by the
//! document id. The ledger is optional: when it is missing or unreachable
//! `log_action` reports `Skipped` and `verify` reports `verified: false`.
//! Nothing here returns an error to the caller.

mod client;

pub use client::{create_ledger, HttpLedger, Ledger, MockLedger, NoopLedger};

use crate::db::models::{ActionKind, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("ledger is not configured")]
    NotConfigured,

    #[error("ledger request failed: {0}")]
    Transport(String),

    #[error("ledger returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("unexpected ledger response: {0}")]
    Malformed(String),
}

/// Body sent to the ledger gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub document_id: Uuid,
    pub action_type: String,
    pub performer_name: String,
    pub role: String,
    pub department: String,
    pub content_hash: String,
    /// Empty for the first action or when the chain head was unavailable
    pub previous_hash: String,
}

/// An action as read back from the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAction {
    pub action_type: String,
    pub performer: String,
    pub role: String,
    pub department: String,
    pub timestamp: DateTime<Utc>,
    pub hash: String,
}

/// An action to record
#[derive(Debug, Clone)]
pub struct ActionRecord {
    pub document_id: Uuid,
    pub action: ActionKind,
    pub performer_name: String,
    pub performer_role: Role,
    /// Department name the action concerns
    pub department: String,
    /// Document state after the action
    pub snapshot: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LedgerOutcome {
    Logged { tx_hash: String },
    Skipped { reason: String },
}

impl LedgerOutcome {
    pub fn tx_hash(&self) -> Option<&str> {
        match self {
            LedgerOutcome::Logged { tx_hash } => Some(tx_hash),
            LedgerOutcome::Skipped { .. } => None,
        }
    }

    pub fn is_logged(&self) -> bool {
        matches!(self, LedgerOutcome::Logged { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyResult {
    pub verified: bool,
    pub action_count: u64,
    pub latest_action: Option<LedgerAction>,
}

impl VerifyResult {
    fn unverified(action_count: u64) -> Self {
        Self {
            verified: false,
            action_count,
            latest_action: None,
        }
    }
}

/// Rebuild objects with keys in sorted order at every level
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// SHA-256 hex digest of the canonical JSON form of `snapshot`
pub fn hash(snapshot: &Value) -> String {
    let canonical = canonicalize(snapshot).to_string();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

pub struct AuditLedger {
    backend: Arc<dyn Ledger>,
}

impl AuditLedger {
    pub fn new(backend: Arc<dyn Ledger>) -> Self {
        Self { backend }
    }

    pub fn hash(&self, snapshot: &Value) -> String {
        hash(snapshot)
    }

    /// Append an action. Failures come back as `Skipped`.
    #[instrument(skip(self, record), fields(document_id = %record.document_id, action = record.action.as_str()))]
    pub async fn log_action(&self, record: ActionRecord) -> LedgerOutcome {
        let previous_hash = self.chain_head(record.document_id).await.unwrap_or_default();

        let entry = LedgerEntry {
            document_id: record.document_id,
            action_type: record.action.as_str().to_string(),
            performer_name: record.performer_name,
            role: record.performer_role.as_str().to_string(),
            department: record.department,
            content_hash: hash(&record.snapshot),
            previous_hash,
        };

        let outcome = match self.backend.log_action(&entry).await {
            Ok(tx_hash) if !tx_hash.trim().is_empty() => {
                info!(tx_hash = %tx_hash, "Action logged to ledger");
                LedgerOutcome::Logged { tx_hash }
            }
            Ok(_) => {
                warn!("Ledger accepted action without a transaction hash");
                LedgerOutcome::Skipped {
                    reason: "empty transaction hash".to_string(),
                }
            }
            Err(LedgerError::NotConfigured) => {
                debug!("Ledger not configured, skipping");
                LedgerOutcome::Skipped {
                    reason: LedgerError::NotConfigured.to_string(),
                }
            }
            Err(e) => {
                warn!(error = %e, "Ledger write failed");
                LedgerOutcome::Skipped { reason: e.to_string() }
            }
        };

        crate::metrics::record_ledger_write(outcome.is_logged());
        outcome
    }

    /// Summarize what the ledger holds for a document
    #[instrument(skip(self))]
    pub async fn verify(&self, document_id: Uuid) -> VerifyResult {
        let count = match self.backend.action_count(document_id).await {
            Ok(count) => count,
            Err(e) => {
                debug!(error = %e, "Ledger verification unavailable");
                return VerifyResult::unverified(0);
            }
        };

        if count == 0 {
            return VerifyResult::unverified(0);
        }

        match self.backend.action(document_id, count - 1).await {
            Ok(latest) => VerifyResult {
                verified: true,
                action_count: count,
                latest_action: Some(latest),
            },
            Err(e) => {
                warn!(error = %e, "Failed to read latest ledger action");
                VerifyResult::unverified(count)
            }
        }
    }

    async fn chain_head(&self, document_id: Uuid) -> Option<String> {
        let count = self.backend.action_count(document_id).await.ok()?;
        if count == 0 {
            return None;
        }
        self.backend
            .action(document_id, count - 1)
            .await
            .ok()
            .map(|a| a.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(document_id: Uuid, title: &str) -> ActionRecord {
        ActionRecord {
            document_id,
            action: ActionKind::ConfirmRouting,
            performer_name: "Asha Clerk".into(),
            performer_role: Role::Officer,
            department: "Finance".into(),
            snapshot: json!({"title": title, "status": "in_progress"}),
        }
    }

    #[test]
    fn test_hash_is_deterministic_and_key_order_free() {
        let a = json!({"b": 1, "a": {"y": [1, 2], "x": null}});
        let b = json!({"a": {"x": null, "y": [1, 2]}, "b": 1});
        assert_eq!(hash(&a), hash(&a));
        assert_eq!(hash(&a), hash(&b));
        assert_eq!(hash(&a).len(), 64);
    }

    #[test]
    fn test_hash_changes_with_any_field() {
        let base = json!({"title": "Memo", "status": "pending"});
        let changed = json!({"title": "Memo", "status": "approved"});
        assert_ne!(hash(&base), hash(&changed));
    }

    #[tokio::test]
    async fn test_unconfigured_ledger_skips() {
        let ledger = AuditLedger::new(Arc::new(NoopLedger));
        let outcome = ledger.log_action(record(Uuid::new_v4(), "t")).await;
        assert!(!outcome.is_logged());

        let verify = ledger.verify(Uuid::new_v4()).await;
        assert!(!verify.verified);
        assert_eq!(verify.action_count, 0);
    }

    #[tokio::test]
    async fn test_unreachable_ledger_skips() {
        let ledger = AuditLedger::new(Arc::new(MockLedger::unavailable()));
        let outcome = ledger.log_action(record(Uuid::new_v4(), "t")).await;
        assert!(matches!(outcome, LedgerOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_actions_chain_to_previous_hash() {
        let backend = Arc::new(MockLedger::new());
        let ledger = AuditLedger::new(backend.clone());
        let id = Uuid::new_v4();

        let first = ledger.log_action(record(id, "one")).await;
        let second = ledger.log_action(record(id, "two")).await;
        assert!(first.is_logged() && second.is_logged());
        assert_ne!(first.tx_hash(), second.tx_hash());

        let entries = backend.entries(id);
        assert_eq!(entries[0].previous_hash, "");
        assert_eq!(entries[1].previous_hash, entries[0].content_hash);

        let verify = ledger.verify(id).await;
        assert!(verify.verified);
        assert_eq!(verify.action_count, 2);
        assert_eq!(
            verify.latest_action.map(|a| a.hash),
            Some(entries[1].content_hash.clone())
        );
    }
}
