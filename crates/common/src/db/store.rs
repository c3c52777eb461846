//! Store abstractions shared by the pipeline, the state machine and the API
//!
//! `Repository` implements these against Postgres; `MemoryStore` implements
//! them in process for tests and local runs.

use crate::db::models::{Department, Document, Notification, Role, User};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use tracing::debug;
use uuid::Uuid;

/// Attempts made by [`mutate_document`] before giving up on a hot record
pub const MAX_WRITE_ATTEMPTS: usize = 5;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_document(&self, id: Uuid) -> Result<Option<Document>>;

    async fn find_document_by_reference(&self, reference: &str) -> Result<Option<Document>>;

    /// Insert a new document. Fails with `Duplicate` when the reference
    /// number is already taken.
    async fn insert_document(&self, document: Document) -> Result<Document>;

    /// Compare-and-swap write: succeeds only if the stored version still
    /// equals `document.version`. Returns the stored row with the bumped
    /// version, or `VersionConflict`.
    async fn save_document(&self, document: Document) -> Result<Document>;

    /// Hard delete
    async fn purge_document(&self, id: Uuid) -> Result<bool>;
}

/// Read-only view of the department and user collaborators
#[async_trait]
pub trait Directory: Send + Sync {
    /// Active department by id; inactive departments are not returned
    async fn find_active_department(&self, id: Uuid) -> Result<Option<Department>>;

    /// Active department by case-insensitive, trimmed name
    async fn find_active_department_by_name(&self, name: &str) -> Result<Option<Department>>;

    async fn list_active_departments(&self) -> Result<Vec<Department>>;

    /// Active users of a department holding one of `roles`
    async fn list_active_staff(&self, department_id: Uuid, roles: &[Role]) -> Result<Vec<User>>;

    async fn find_user(&self, id: Uuid) -> Result<Option<User>>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create_notification(&self, notification: Notification) -> Result<Notification>;

    /// Unexpired notifications for a recipient, newest first
    async fn list_notifications(
        &self,
        recipient_id: Uuid,
        unread_only: bool,
        now: DateTime<FixedOffset>,
    ) -> Result<Vec<Notification>>;

    /// Mark read/unread. Only the recipient may change it.
    async fn set_notification_read(
        &self,
        id: Uuid,
        recipient_id: Uuid,
        read: bool,
    ) -> Result<Notification>;

    async fn purge_expired_notifications(&self, now: DateTime<FixedOffset>) -> Result<u64>;
}

/// Load a live (not soft-deleted) document or fail with `DocumentNotFound`
pub async fn load_live_document(store: &dyn DocumentStore, id: Uuid) -> Result<Document> {
    match store.find_document(id).await? {
        Some(doc) if !doc.is_deleted => Ok(doc),
        _ => Err(AppError::document_not_found(id)),
    }
}

/// Reload, mutate and save a document, retrying on version conflicts.
///
/// `apply` runs against the freshest copy on every attempt, so guards
/// inside it (status checks, "already confirmed") see concurrent writes.
pub async fn mutate_document<F>(store: &dyn DocumentStore, id: Uuid, mut apply: F) -> Result<Document>
where
    F: FnMut(&mut Document) -> Result<()> + Send,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut doc = store
            .find_document(id)
            .await?
            .ok_or_else(|| AppError::document_not_found(id))?;

        apply(&mut doc)?;

        match store.save_document(doc).await {
            Err(AppError::VersionConflict { .. }) if attempt < MAX_WRITE_ATTEMPTS => {
                debug!(document_id = %id, attempt, "Version conflict, retrying write");
                crate::metrics::record_version_conflict();
            }
            other => return other,
        }
    }
}
