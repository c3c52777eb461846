//! Notification inbox handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use recordflow_common::{auth::AuthContext, db::models::Notification, errors::Result};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub unread_only: bool,
}

/// Unexpired notifications for the caller, newest first
pub async fn list(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Notification>>> {
    let items = state
        .notifications
        .list_notifications(auth.actor.id, params.unread_only, Utc::now().into())
        .await?;
    Ok(Json(items))
}

pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<Notification>> {
    let updated = state
        .notifications
        .set_notification_read(notification_id, auth.actor.id, true)
        .await?;
    Ok(Json(updated))
}

pub async fn mark_unread(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<Notification>> {
    let updated = state
        .notifications
        .set_notification_read(notification_id, auth.actor.id, false)
        .await?;
    Ok(Json(updated))
}
