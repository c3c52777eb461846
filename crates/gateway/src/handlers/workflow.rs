//! Workflow action handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use recordflow_common::{auth::AuthContext, errors::Result, workflow::WorkflowOutcome};

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ActionRequest {
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForwardRequest {
    pub to_department_id: Uuid,

    #[serde(default)]
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

pub async fn approve(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<Uuid>,
    Json(request): Json<ActionRequest>,
) -> Result<Json<WorkflowOutcome>> {
    request.validate()?;
    Ok(Json(state.workflow.approve(document_id, &auth.actor, request.notes).await?))
}

pub async fn reject(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<Uuid>,
    Json(request): Json<ActionRequest>,
) -> Result<Json<WorkflowOutcome>> {
    request.validate()?;
    Ok(Json(state.workflow.reject(document_id, &auth.actor, request.notes).await?))
}

pub async fn complete(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<Uuid>,
    Json(request): Json<ActionRequest>,
) -> Result<Json<WorkflowOutcome>> {
    request.validate()?;
    Ok(Json(state.workflow.complete(document_id, &auth.actor, request.notes).await?))
}

pub async fn forward(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<Uuid>,
    Json(request): Json<ForwardRequest>,
) -> Result<Json<WorkflowOutcome>> {
    request.validate()?;
    let outcome = state
        .workflow
        .forward(document_id, &auth.actor, request.to_department_id, request.notes)
        .await?;
    Ok(Json(outcome))
}
