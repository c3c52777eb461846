//! In-process store used by tests and local development

use crate::db::models::*;
use crate::db::store::{Directory, DocumentStore, NotificationStore};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<Uuid, Document>>,
    departments: RwLock<HashMap<Uuid, Department>>,
    users: RwLock<HashMap<Uuid, User>>,
    notifications: RwLock<HashMap<Uuid, Notification>>,
    forced_conflicts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_department(&self, name: &str, is_active: bool) -> Department {
        let department = Department {
            id: Uuid::new_v4(),
            name: name.to_string(),
            code: None,
            is_active,
            created_at: Utc::now().into(),
        };
        self.departments
            .write()
            .await
            .insert(department.id, department.clone());
        department
    }

    pub async fn add_user(
        &self,
        name: &str,
        email: &str,
        role: Role,
        department_id: Option<Uuid>,
        is_active: bool,
    ) -> User {
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            role,
            department_id,
            is_active,
            created_at: Utc::now().into(),
        };
        self.users.write().await.insert(user.id, user.clone());
        user
    }

    /// Make the next `n` document saves fail with `VersionConflict`
    pub fn force_version_conflicts(&self, n: usize) {
        self.forced_conflicts.store(n, Ordering::SeqCst);
    }

    pub async fn notifications_for(&self, recipient_id: Uuid) -> Vec<Notification> {
        self.notifications
            .read()
            .await
            .values()
            .filter(|n| n.recipient_id == recipient_id)
            .cloned()
            .collect()
    }

    pub async fn notification_count(&self) -> usize {
        self.notifications.read().await.len()
    }

    pub async fn document_count(&self) -> usize {
        self.documents.read().await.len()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_document(&self, id: Uuid) -> Result<Option<Document>> {
        Ok(self.documents.read().await.get(&id).cloned())
    }

    async fn find_document_by_reference(&self, reference: &str) -> Result<Option<Document>> {
        Ok(self
            .documents
            .read()
            .await
            .values()
            .find(|d| d.reference_number == reference)
            .cloned())
    }

    async fn insert_document(&self, document: Document) -> Result<Document> {
        let mut documents = self.documents.write().await;
        if documents
            .values()
            .any(|d| d.reference_number == document.reference_number)
        {
            return Err(AppError::Duplicate {
                message: format!("Reference number {} already exists", document.reference_number),
            });
        }
        documents.insert(document.id, document.clone());
        Ok(document)
    }

    async fn save_document(&self, mut document: Document) -> Result<Document> {
        let mut documents = self.documents.write().await;
        let current = documents
            .get(&document.id)
            .ok_or_else(|| AppError::document_not_found(document.id))?;

        let forced = self
            .forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if forced || current.version != document.version {
            return Err(AppError::VersionConflict {
                id: document.id.to_string(),
            });
        }

        document.reference_number = current.reference_number.clone();
        document.version += 1;
        document.updated_at = Utc::now().into();
        documents.insert(document.id, document.clone());
        Ok(document)
    }

    async fn purge_document(&self, id: Uuid) -> Result<bool> {
        Ok(self.documents.write().await.remove(&id).is_some())
    }
}

#[async_trait]
impl Directory for MemoryStore {
    async fn find_active_department(&self, id: Uuid) -> Result<Option<Department>> {
        Ok(self
            .departments
            .read()
            .await
            .get(&id)
            .filter(|d| d.is_active)
            .cloned())
    }

    async fn find_active_department_by_name(&self, name: &str) -> Result<Option<Department>> {
        let wanted = name.trim().to_lowercase();
        if wanted.is_empty() {
            return Ok(None);
        }
        Ok(self
            .departments
            .read()
            .await
            .values()
            .find(|d| d.is_active && d.name.trim().to_lowercase() == wanted)
            .cloned())
    }

    async fn list_active_departments(&self) -> Result<Vec<Department>> {
        let mut departments: Vec<Department> = self
            .departments
            .read()
            .await
            .values()
            .filter(|d| d.is_active)
            .cloned()
            .collect();
        departments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(departments)
    }

    async fn list_active_staff(&self, department_id: Uuid, roles: &[Role]) -> Result<Vec<User>> {
        let mut staff: Vec<User> = self
            .users
            .read()
            .await
            .values()
            .filter(|u| {
                u.is_active && u.department_id == Some(department_id) && roles.contains(&u.role)
            })
            .cloned()
            .collect();
        staff.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(staff)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn create_notification(&self, notification: Notification) -> Result<Notification> {
        self.notifications
            .write()
            .await
            .insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn list_notifications(
        &self,
        recipient_id: Uuid,
        unread_only: bool,
        now: DateTime<FixedOffset>,
    ) -> Result<Vec<Notification>> {
        let mut items: Vec<Notification> = self
            .notifications
            .read()
            .await
            .values()
            .filter(|n| n.recipient_id == recipient_id && !n.is_expired_at(now))
            .filter(|n| !unread_only || !n.is_read)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    async fn set_notification_read(
        &self,
        id: Uuid,
        recipient_id: Uuid,
        read: bool,
    ) -> Result<Notification> {
        let mut notifications = self.notifications.write().await;
        let notification = notifications
            .get_mut(&id)
            .filter(|n| n.recipient_id == recipient_id)
            .ok_or_else(|| AppError::NotificationNotFound { id: id.to_string() })?;

        notification.is_read = read;
        notification.read_at = read.then(|| Utc::now().into());
        Ok(notification.clone())
    }

    async fn purge_expired_notifications(&self, now: DateTime<FixedOffset>) -> Result<u64> {
        let mut notifications = self.notifications.write().await;
        let before = notifications.len();
        notifications.retain(|_, n| !n.is_expired_at(now));
        Ok((before - notifications.len()) as u64)
    }
}
