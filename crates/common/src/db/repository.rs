//! Repository pattern for database operations
//!
//! Postgres implementation of the store traits. Document writes are
//! compare-and-swap on the `version` column.

use crate::db::models::*;
use crate::db::store::{Directory, DocumentStore, NotificationStore};
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, IntoActiveModel,
    QueryFilter, QueryOrder, Set, SqlErr,
};
use uuid::Uuid;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[async_trait]
impl DocumentStore for Repository {
    async fn find_document(&self, id: Uuid) -> Result<Option<Document>> {
        // Writes read from the primary so CAS sees the latest version
        DocumentEntity::find_by_id(id)
            .one(self.write_conn())
            .await
            .map_err(Into::into)
    }

    async fn find_document_by_reference(&self, reference: &str) -> Result<Option<Document>> {
        DocumentEntity::find()
            .filter(DocumentColumn::ReferenceNumber.eq(reference))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn insert_document(&self, document: Document) -> Result<Document> {
        let reference = document.reference_number.clone();
        let active: DocumentActiveModel = document.into_active_model().reset_all();

        active.insert(self.write_conn()).await.map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Duplicate {
                    message: format!("Reference number {} already exists", reference),
                }
            } else {
                e.into()
            }
        })
    }

    async fn save_document(&self, mut document: Document) -> Result<Document> {
        let id = document.id;
        let expected = document.version;

        document.version = expected + 1;
        document.updated_at = Utc::now().into();
        let stored = document.clone();

        let mut active: DocumentActiveModel = document.into_active_model().reset_all();
        // Immutable after insert
        active.reference_number = sea_orm::ActiveValue::NotSet;
        active.id = sea_orm::ActiveValue::NotSet;

        let result = DocumentEntity::update_many()
            .set(active)
            .filter(DocumentColumn::Id.eq(id))
            .filter(DocumentColumn::Version.eq(expected))
            .exec(self.write_conn())
            .await?;

        if result.rows_affected == 0 {
            return match DocumentEntity::find_by_id(id).one(self.write_conn()).await? {
                Some(_) => Err(AppError::VersionConflict { id: id.to_string() }),
                None => Err(AppError::document_not_found(id)),
            };
        }

        Ok(stored)
    }

    async fn purge_document(&self, id: Uuid) -> Result<bool> {
        let result = DocumentEntity::delete_by_id(id)
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }
}

#[async_trait]
impl Directory for Repository {
    async fn find_active_department(&self, id: Uuid) -> Result<Option<Department>> {
        DepartmentEntity::find_by_id(id)
            .filter(DepartmentColumn::IsActive.eq(true))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn find_active_department_by_name(&self, name: &str) -> Result<Option<Department>> {
        let wanted = name.trim().to_lowercase();
        if wanted.is_empty() {
            return Ok(None);
        }

        DepartmentEntity::find()
            .filter(DepartmentColumn::IsActive.eq(true))
            .filter(
                Expr::expr(Func::lower(Expr::col((
                    DepartmentEntity,
                    DepartmentColumn::Name,
                ))))
                .eq(wanted),
            )
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn list_active_departments(&self) -> Result<Vec<Department>> {
        DepartmentEntity::find()
            .filter(DepartmentColumn::IsActive.eq(true))
            .order_by_asc(DepartmentColumn::Name)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn list_active_staff(&self, department_id: Uuid, roles: &[Role]) -> Result<Vec<User>> {
        UserEntity::find()
            .filter(UserColumn::DepartmentId.eq(department_id))
            .filter(UserColumn::IsActive.eq(true))
            .filter(UserColumn::Role.is_in(roles.iter().copied()))
            .order_by_asc(UserColumn::Name)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        UserEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }
}

#[async_trait]
impl NotificationStore for Repository {
    async fn create_notification(&self, notification: Notification) -> Result<Notification> {
        notification
            .into_active_model()
            .reset_all()
            .insert(self.write_conn())
            .await
            .map_err(Into::into)
    }

    async fn list_notifications(
        &self,
        recipient_id: Uuid,
        unread_only: bool,
        now: DateTime<FixedOffset>,
    ) -> Result<Vec<Notification>> {
        let mut query = NotificationEntity::find()
            .filter(NotificationColumn::RecipientId.eq(recipient_id))
            .filter(NotificationColumn::ExpiresAt.gt(now));

        if unread_only {
            query = query.filter(NotificationColumn::IsRead.eq(false));
        }

        query
            .order_by_desc(NotificationColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn set_notification_read(
        &self,
        id: Uuid,
        recipient_id: Uuid,
        read: bool,
    ) -> Result<Notification> {
        let existing = NotificationEntity::find_by_id(id)
            .filter(NotificationColumn::RecipientId.eq(recipient_id))
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::NotificationNotFound { id: id.to_string() })?;

        let mut active: NotificationActiveModel = existing.into();
        active.is_read = Set(read);
        active.read_at = Set(read.then(|| Utc::now().into()));

        active.update(self.write_conn()).await.map_err(Into::into)
    }

    async fn purge_expired_notifications(&self, now: DateTime<FixedOffset>) -> Result<u64> {
        let result = NotificationEntity::delete_many()
            .filter(NotificationColumn::ExpiresAt.lte(now))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected)
    }
}
