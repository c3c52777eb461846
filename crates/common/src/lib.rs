//! RecordFlow Common Library
//!
//! Shared code for the RecordFlow services including:
//! - Document, notification and directory models with store abstractions
//! - AI analysis and routing suggestions with deterministic fallbacks
//! - Routing confirmation state machine and workflow actions
//! - Best-effort audit ledger and notification fan-out
//! - Error types, configuration, authentication and metrics

pub mod analysis;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod ledger;
pub mod metrics;
pub mod notify;
pub mod reference;
pub mod routing;
pub mod storage;
pub mod workflow;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use errors::{AppError, Result};
pub use config::AppConfig;
pub use db::{Directory, DocumentStore, MemoryStore, NotificationStore, Repository};
pub use analysis::AnalysisProvider;
pub use ledger::AuditLedger;
pub use notify::NotificationFanout;
pub use routing::RoutingStateMachine;
pub use storage::FileStore;
pub use workflow::WorkflowService;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Department used when automated routing cannot produce a suggestion
pub const DEFAULT_FALLBACK_DEPARTMENT: &str = "General Administration";

/// Minimum embedded-text length before falling back to OCR
pub const DEFAULT_MIN_TEXT_CHARS: usize = 100;
