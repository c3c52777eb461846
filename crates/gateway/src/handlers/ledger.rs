//! Ledger verification handler

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use super::documents::ensure_can_view;
use crate::AppState;
use recordflow_common::{
    auth::AuthContext, db::load_live_document, errors::Result, ledger::VerifyResult,
};

#[derive(Serialize)]
pub struct LedgerStatusResponse {
    pub document_id: Uuid,
    pub reference_number: String,
    /// Digest of the document as it stands now
    pub content_hash: String,
    /// Last transaction recorded on the document
    pub ledger_tx_hash: Option<String>,
    /// Whether the most recent action reached the ledger
    pub ledger_verified: bool,
    pub chain: VerifyResult,
}

pub async fn verify(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<Uuid>,
) -> Result<Json<LedgerStatusResponse>> {
    let document = load_live_document(state.documents.as_ref(), document_id).await?;
    ensure_can_view(&auth.actor, &document)?;

    let chain = state.ledger.verify(document_id).await;

    Ok(Json(LedgerStatusResponse {
        document_id,
        content_hash: state.ledger.hash(&document.snapshot()),
        reference_number: document.reference_number,
        ledger_tx_hash: document.ledger_tx_hash,
        ledger_verified: document.ledger_verified,
        chain,
    }))
}
