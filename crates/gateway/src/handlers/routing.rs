//! Routing confirmation handler

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::AppState;
use recordflow_common::{
    auth::AuthContext,
    errors::Result,
    routing::{ConfirmRouting, RoutingOutcome},
};

/// Accept the suggested department or override it
pub async fn confirm_routing(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<Uuid>,
    Json(request): Json<ConfirmRouting>,
) -> Result<Json<RoutingOutcome>> {
    let outcome = state
        .routing
        .confirm(document_id, &auth.actor, request)
        .await?;

    tracing::info!(
        document_id = %document_id,
        department = %outcome.department.name,
        ledger_logged = outcome.ledger.is_logged(),
        notified = outcome.notifications.notified,
        request_id = %auth.request_id,
        "Routing confirmation handled"
    );

    Ok(Json(outcome))
}
