//! Human-readable reference numbers, `REC-YYYYMMDD-XXXXXXXX`

use crate::db::models::Document;
use crate::db::DocumentStore;
use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::warn;

const PREFIX: &str = "REC";
const SUFFIX_LEN: usize = 8;
const MAX_ATTEMPTS: usize = 5;

/// Generate a reference number for the given instant
pub fn generate(at: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(|c| (c as char).to_ascii_uppercase())
        .collect();

    format!("{}-{}-{}", PREFIX, at.format("%Y%m%d"), suffix)
}

/// Check the `REC-YYYYMMDD-XXXXXXXX` shape
pub fn is_well_formed(reference: &str) -> bool {
    let mut parts = reference.split('-');
    matches!(
        (parts.next(), parts.next(), parts.next(), parts.next()),
        (Some(PREFIX), Some(date), Some(suffix), None)
            if date.len() == 8
                && date.chars().all(|c| c.is_ascii_digit())
                && suffix.len() == SUFFIX_LEN
                && suffix.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    )
}

/// Insert a document under a fresh reference number, regenerating on
/// collision.
pub async fn insert_with_reference(store: &dyn DocumentStore, mut document: Document) -> Result<Document> {
    for attempt in 1..=MAX_ATTEMPTS {
        document.reference_number = generate(Utc::now());
        match store.insert_document(document.clone()).await {
            Err(AppError::Duplicate { .. }) => {
                warn!(attempt, reference = %document.reference_number, "Reference number collision");
            }
            other => return other,
        }
    }

    Err(AppError::Internal {
        message: "Could not allocate a unique reference number".to_string(),
    })
}
