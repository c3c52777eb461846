//! Document entity

use super::enums::{ActionKind, Category, ProcessingState, Status, Urgency};
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};

/// Ordered list of strings stored as JSONB
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
#[serde(transparent)]
pub struct StringList(pub Vec<String>);

impl From<Vec<String>> for StringList {
    fn from(items: Vec<String>) -> Self {
        Self(items)
    }
}

/// One entry of the off-ledger action history
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEntry {
    pub action: ActionKind,
    pub actor_id: Uuid,
    pub actor_name: String,
    pub notes: Option<String>,
    pub at: DateTime<Utc>,
}

/// Append-only action history stored as JSONB
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
#[serde(transparent)]
pub struct ActionHistory(pub Vec<ActionEntry>);

impl ActionHistory {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&ActionEntry> {
        self.0.last()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Human-readable reference, unique and immutable
    #[sea_orm(column_type = "Text", unique)]
    pub reference_number: String,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    pub uploaded_by: Uuid,

    pub initial_department_id: Uuid,

    /// Set only once routing is confirmed
    pub department_id: Option<Uuid>,

    #[sea_orm(column_type = "Text")]
    pub file_path: String,

    #[sea_orm(column_type = "Text")]
    pub original_filename: String,

    #[sea_orm(column_type = "Text")]
    pub media_type: String,

    pub size_bytes: i64,

    pub category: Category,

    pub urgency: Urgency,

    #[sea_orm(column_type = "JsonBinary")]
    pub tags: StringList,

    // AI analysis
    #[sea_orm(column_type = "Text", nullable)]
    pub summary: Option<String>,

    #[sea_orm(column_type = "JsonBinary")]
    pub key_points: StringList,

    pub ai_priority: Option<Urgency>,

    #[sea_orm(column_type = "JsonBinary")]
    pub deadlines: StringList,

    #[sea_orm(column_type = "JsonBinary")]
    pub action_items: StringList,

    #[sea_orm(column_type = "Text", nullable)]
    pub extracted_excerpt: Option<String>,

    // Routing
    #[sea_orm(column_type = "Text", nullable)]
    pub suggested_department: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub routing_reasoning: Option<String>,

    /// 0-100
    pub routing_confidence: Option<i32>,

    pub routing_confirmed: bool,

    pub confirmed_by: Option<Uuid>,

    pub confirmed_at: Option<DateTimeWithTimeZone>,

    // Ledger
    #[sea_orm(column_type = "Text", nullable)]
    pub ledger_tx_hash: Option<String>,

    pub ledger_verified: bool,

    // Workflow
    pub status: Status,

    pub processing_state: ProcessingState,

    #[sea_orm(column_type = "JsonBinary")]
    pub action_history: ActionHistory,

    pub is_deleted: bool,

    pub deleted_by: Option<Uuid>,

    pub deleted_at: Option<DateTimeWithTimeZone>,

    /// Optimistic concurrency token
    pub version: i32,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::department::Entity",
        from = "Column::DepartmentId",
        to = "super::department::Column::Id"
    )]
    Department,

    #[sea_orm(has_many = "super::notification::Entity")]
    Notifications,
}

impl Related<super::department::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Department.def()
    }
}

impl Related<super::notification::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Notifications.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Where a document stands in routing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingState {
    /// No suggestion has been recorded yet
    Unrouted,
    Suggested,
    Confirmed,
}

/// Fields captured by upload intake
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub description: Option<String>,
    pub uploaded_by: Uuid,
    pub uploader_name: String,
    pub initial_department_id: Uuid,
    pub file_path: String,
    pub original_filename: String,
    pub media_type: String,
    pub size_bytes: i64,
    pub category: Category,
    pub urgency: Urgency,
    pub tags: Vec<String>,
}

impl Model {
    /// Build a fresh document with an `Upload` history entry
    pub fn from_upload(new: NewDocument, reference_number: String) -> Self {
        let now = Utc::now();
        let upload = ActionEntry {
            action: ActionKind::Upload,
            actor_id: new.uploaded_by,
            actor_name: new.uploader_name,
            notes: None,
            at: now,
        };

        Self {
            id: Uuid::new_v4(),
            reference_number,
            title: new.title,
            description: new.description,
            uploaded_by: new.uploaded_by,
            initial_department_id: new.initial_department_id,
            department_id: None,
            file_path: new.file_path,
            original_filename: new.original_filename,
            media_type: new.media_type,
            size_bytes: new.size_bytes,
            category: new.category,
            urgency: new.urgency,
            tags: StringList(new.tags),
            summary: None,
            key_points: StringList::default(),
            ai_priority: None,
            deadlines: StringList::default(),
            action_items: StringList::default(),
            extracted_excerpt: None,
            suggested_department: None,
            routing_reasoning: None,
            routing_confidence: None,
            routing_confirmed: false,
            confirmed_by: None,
            confirmed_at: None,
            ledger_tx_hash: None,
            ledger_verified: false,
            status: Status::Pending,
            processing_state: ProcessingState::Queued,
            action_history: ActionHistory(vec![upload]),
            is_deleted: false,
            deleted_by: None,
            deleted_at: None,
            version: 0,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    pub fn routing_state(&self) -> RoutingState {
        if self.routing_confirmed {
            RoutingState::Confirmed
        } else if self.suggested_department.is_some() {
            RoutingState::Suggested
        } else {
            RoutingState::Unrouted
        }
    }

    /// Append one history entry
    pub fn record_action(
        &mut self,
        action: ActionKind,
        actor_id: Uuid,
        actor_name: &str,
        notes: Option<String>,
    ) {
        self.action_history.0.push(ActionEntry {
            action,
            actor_id,
            actor_name: actor_name.to_string(),
            notes,
            at: Utc::now(),
        });
    }

    /// Record the outcome of a ledger write. A skipped write clears the
    /// verified flag but keeps the last known hash.
    pub fn apply_ledger_result(&mut self, tx_hash: Option<String>) {
        match tx_hash {
            Some(hash) if !hash.is_empty() => {
                self.ledger_tx_hash = Some(hash);
                self.ledger_verified = true;
            }
            _ => self.ledger_verified = false,
        }
    }

    /// Stable view of the document used for ledger hashing. Covers content,
    /// analysis, routing, workflow and deletion state; write bookkeeping
    /// (`version`, `updated_at`, ledger fields) is left out.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "reference_number": self.reference_number,
            "title": self.title,
            "description": self.description,
            "uploaded_by": self.uploaded_by,
            "initial_department_id": self.initial_department_id,
            "department_id": self.department_id,
            "file_path": self.file_path,
            "original_filename": self.original_filename,
            "media_type": self.media_type,
            "size_bytes": self.size_bytes,
            "category": self.category,
            "urgency": self.urgency,
            "tags": self.tags,
            "summary": self.summary,
            "key_points": self.key_points,
            "ai_priority": self.ai_priority,
            "deadlines": self.deadlines,
            "action_items": self.action_items,
            "extracted_excerpt": self.extracted_excerpt,
            "suggested_department": self.suggested_department,
            "routing_reasoning": self.routing_reasoning,
            "routing_confidence": self.routing_confidence,
            "routing_confirmed": self.routing_confirmed,
            "confirmed_by": self.confirmed_by,
            "confirmed_at": self.confirmed_at,
            "status": self.status,
            "processing_state": self.processing_state,
            "action_history": self.action_history,
            "is_deleted": self.is_deleted,
            "deleted_by": self.deleted_by,
            "deleted_at": self.deleted_at,
            "created_at": self.created_at,
        })
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn new_document(uploader: Uuid, department: Uuid) -> NewDocument {
        NewDocument {
            title: "Water supply tender".to_string(),
            description: Some("Tender for rural water supply".to_string()),
            uploaded_by: uploader,
            uploader_name: "Asha Clerk".to_string(),
            initial_department_id: department,
            file_path: "2026/10/test.pdf".to_string(),
            original_filename: "tender.pdf".to_string(),
            media_type: "application/pdf".to_string(),
            size_bytes: 2048,
            category: Category::Procurement,
            urgency: Urgency::High,
            tags: vec!["tender".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_upload_starts_unrouted_with_one_entry() {
        let doc = Model::from_upload(fixtures::new_document(Uuid::new_v4(), Uuid::new_v4()), "REC-1".into());
        assert_eq!(doc.routing_state(), RoutingState::Unrouted);
        assert_eq!(doc.status, Status::Pending);
        assert!(doc.department_id.is_none());
        assert_eq!(doc.action_history.len(), 1);
        assert_eq!(doc.action_history.0[0].action, ActionKind::Upload);
    }

    #[test]
    fn test_ledger_result_keeps_hash_on_skip() {
        let mut doc = Model::from_upload(fixtures::new_document(Uuid::new_v4(), Uuid::new_v4()), "REC-1".into());
        doc.apply_ledger_result(Some("0xabc".into()));
        assert!(doc.ledger_verified);

        doc.apply_ledger_result(None);
        assert!(!doc.ledger_verified);
        assert_eq!(doc.ledger_tx_hash.as_deref(), Some("0xabc"));
    }

    #[test]
    fn test_snapshot_tracks_routing_analysis_and_deletion() {
        let doc = Model::from_upload(fixtures::new_document(Uuid::new_v4(), Uuid::new_v4()), "REC-1".into());
        let base = doc.snapshot();

        let mut routed = doc.clone();
        routed.routing_confirmed = true;
        assert_ne!(routed.snapshot(), base);

        let mut suggested = doc.clone();
        suggested.suggested_department = Some("Finance".into());
        assert_ne!(suggested.snapshot(), base);

        let mut analyzed = doc.clone();
        analyzed.key_points = StringList(vec!["Budget overrun".into()]);
        assert_ne!(analyzed.snapshot(), base);

        let mut deleted = doc.clone();
        deleted.is_deleted = true;
        assert_ne!(deleted.snapshot(), base);
    }

    #[test]
    fn test_snapshot_ignores_write_bookkeeping() {
        let doc = Model::from_upload(fixtures::new_document(Uuid::new_v4(), Uuid::new_v4()), "REC-1".into());
        let mut touched = doc.clone();
        touched.version += 1;
        touched.updated_at = Utc::now().into();
        touched.apply_ledger_result(Some("0xdef".into()));
        assert_eq!(touched.snapshot(), doc.snapshot());
    }
}
