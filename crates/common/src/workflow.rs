//! Workflow actions on routed documents
//!
//! Status moves `InProgress -> Approved | Rejected` and
//! `Approved -> Completed`; forwarding hands a document to another
//! department. Each action appends one history entry and is logged to the
//! audit ledger best-effort.

use crate::auth::Actor;
use crate::db::models::{ActionKind, Document, Role, Status};
use crate::db::{load_live_document, mutate_document, Directory, DocumentStore};
use crate::errors::{AppError, Result};
use crate::ledger::{ActionRecord, AuditLedger, LedgerOutcome};
use crate::notify::{FanoutEvent, FanoutReport, NotificationFanout};
use crate::routing::persist_ledger_outcome;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowOutcome {
    pub document: Document,
    pub ledger: LedgerOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifications: Option<FanoutReport>,
}

pub struct WorkflowService {
    documents: Arc<dyn DocumentStore>,
    directory: Arc<dyn Directory>,
    ledger: Arc<AuditLedger>,
    fanout: Arc<NotificationFanout>,
}

fn require_status(doc: &Document, action: ActionKind, allowed: &[Status]) -> Result<()> {
    if allowed.contains(&doc.status) {
        Ok(())
    } else {
        Err(AppError::InvalidTransition {
            action: action.as_str().to_string(),
            status: doc.status.as_str().to_string(),
        })
    }
}

fn require_notes(notes: Option<String>, action: &str) -> Result<String> {
    notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::Validation {
            message: format!("Notes are required to {}", action),
            field: Some("notes".to_string()),
        })
}

fn clean(notes: Option<String>) -> Option<String> {
    notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

/// Uploader, super administrator, or an admin of the holding department
fn can_delete(actor: &Actor, doc: &Document) -> bool {
    doc.uploaded_by == actor.id
        || actor.is_super_admin()
        || (actor.role == Role::DepartmentAdmin && actor.can_act_on(doc))
}

impl WorkflowService {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        directory: Arc<dyn Directory>,
        ledger: Arc<AuditLedger>,
        fanout: Arc<NotificationFanout>,
    ) -> Self {
        Self {
            documents,
            directory,
            ledger,
            fanout,
        }
    }

    #[instrument(skip(self, actor, notes), fields(actor_id = %actor.id))]
    pub async fn approve(&self, document_id: Uuid, actor: &Actor, notes: Option<String>) -> Result<WorkflowOutcome> {
        let notes = clean(notes);
        let document = self
            .apply(document_id, actor, ActionKind::Approve, notes, |doc| {
                actor.require(actor.can_act_on(doc), "approve this document")?;
                require_status(doc, ActionKind::Approve, &[Status::InProgress])?;
                doc.status = Status::Approved;
                Ok(())
            })
            .await?;
        self.finish(document, actor, ActionKind::Approve).await
    }

    #[instrument(skip(self, actor, notes), fields(actor_id = %actor.id))]
    pub async fn reject(&self, document_id: Uuid, actor: &Actor, notes: Option<String>) -> Result<WorkflowOutcome> {
        let notes = require_notes(notes, "reject a document")?;
        let document = self
            .apply(document_id, actor, ActionKind::Reject, Some(notes), |doc| {
                actor.require(actor.can_act_on(doc), "reject this document")?;
                require_status(doc, ActionKind::Reject, &[Status::InProgress])?;
                doc.status = Status::Rejected;
                Ok(())
            })
            .await?;
        self.finish(document, actor, ActionKind::Reject).await
    }

    #[instrument(skip(self, actor, notes), fields(actor_id = %actor.id))]
    pub async fn complete(&self, document_id: Uuid, actor: &Actor, notes: Option<String>) -> Result<WorkflowOutcome> {
        let document = self
            .apply(document_id, actor, ActionKind::Complete, clean(notes), |doc| {
                actor.require(actor.can_act_on(doc), "complete this document")?;
                require_status(doc, ActionKind::Complete, &[Status::Approved])?;
                doc.status = Status::Completed;
                Ok(())
            })
            .await?;
        self.finish(document, actor, ActionKind::Complete).await
    }

    /// Hand a routed document to another active department
    #[instrument(skip(self, actor, notes), fields(actor_id = %actor.id, to = %to_department_id))]
    pub async fn forward(
        &self,
        document_id: Uuid,
        actor: &Actor,
        to_department_id: Uuid,
        notes: Option<String>,
    ) -> Result<WorkflowOutcome> {
        let target = self
            .directory
            .find_active_department(to_department_id)
            .await?
            .ok_or_else(|| AppError::DepartmentNotFound {
                reference: to_department_id.to_string(),
            })?;

        let mut previous_department = None;
        let note = clean(notes).unwrap_or_else(|| format!("Forwarded to {}", target.name));
        let document = self
            .apply(document_id, actor, ActionKind::Forward, Some(note), |doc| {
                actor.require(actor.can_act_on(doc), "forward this document")?;
                if !doc.routing_confirmed {
                    return Err(AppError::InvalidTransition {
                        action: ActionKind::Forward.as_str().to_string(),
                        status: "unrouted".to_string(),
                    });
                }
                require_status(
                    doc,
                    ActionKind::Forward,
                    &[Status::InProgress, Status::Approved, Status::Rejected],
                )?;
                if doc.department_id == Some(target.id) {
                    return Err(AppError::Validation {
                        message: format!("Document is already held by {}", target.name),
                        field: Some("to_department_id".to_string()),
                    });
                }
                previous_department = doc.department_id;
                doc.department_id = Some(target.id);
                doc.status = Status::InProgress;
                Ok(())
            })
            .await?;

        let from_department = match previous_department {
            Some(id) => self.directory.find_active_department(id).await.ok().flatten().map(|d| d.name),
            None => None,
        };

        let record = self.record(&document, actor, ActionKind::Forward, target.name.clone());
        let (ledger, notifications) = tokio::join!(
            self.ledger.log_action(record),
            self.fanout.dispatch(
                &document,
                &target,
                &actor.name,
                FanoutEvent::Forwarded { from_department }
            ),
        );

        let document = persist_ledger_outcome(self.documents.as_ref(), document, &ledger).await;
        info!(document_id = %document.id, to = %target.name, "Document forwarded");

        Ok(WorkflowOutcome {
            document,
            ledger,
            notifications: Some(notifications),
        })
    }

    /// Mark a document deleted; it stays in the store until purged
    #[instrument(skip(self, actor, reason), fields(actor_id = %actor.id))]
    pub async fn soft_delete(
        &self,
        document_id: Uuid,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<WorkflowOutcome> {
        let now = Utc::now();
        let document = self
            .apply(document_id, actor, ActionKind::Delete, clean(reason), |doc| {
                actor.require(can_delete(actor, doc), "delete this document")?;
                doc.is_deleted = true;
                doc.deleted_by = Some(actor.id);
                doc.deleted_at = Some(now.into());
                Ok(())
            })
            .await?;
        self.finish(document, actor, ActionKind::Delete).await
    }

    /// Hard delete a soft-deleted document. Returns the removed row so the
    /// caller can drop the stored file.
    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn purge(&self, document_id: Uuid, actor: &Actor) -> Result<Document> {
        actor.require(actor.is_super_admin(), "purge documents")?;

        let document = self
            .documents
            .find_document(document_id)
            .await?
            .ok_or_else(|| AppError::document_not_found(document_id))?;

        if !document.is_deleted {
            return Err(AppError::InvalidTransition {
                action: "purge".to_string(),
                status: "live".to_string(),
            });
        }

        let department = self.department_label(&document).await;
        let record = self.record(&document, actor, ActionKind::Delete, department);
        self.ledger.log_action(record).await;

        self.documents.purge_document(document_id).await?;
        info!(document_id = %document_id, reference = %document.reference_number, "Document purged");
        Ok(document)
    }

    /// Reload-check-mutate with one history entry
    async fn apply<F>(
        &self,
        document_id: Uuid,
        actor: &Actor,
        action: ActionKind,
        notes: Option<String>,
        mut change: F,
    ) -> Result<Document>
    where
        F: FnMut(&mut Document) -> Result<()> + Send,
    {
        load_live_document(self.documents.as_ref(), document_id).await?;

        mutate_document(self.documents.as_ref(), document_id, |doc| {
            if doc.is_deleted {
                return Err(AppError::document_not_found(document_id));
            }
            change(doc)?;
            doc.record_action(action, actor.id, &actor.name, notes.clone());
            Ok(())
        })
        .await
    }

    async fn finish(&self, document: Document, actor: &Actor, action: ActionKind) -> Result<WorkflowOutcome> {
        let department = self.department_label(&document).await;
        let ledger = self
            .ledger
            .log_action(self.record(&document, actor, action, department))
            .await;
        let document = persist_ledger_outcome(self.documents.as_ref(), document, &ledger).await;

        info!(
            document_id = %document.id,
            action = action.as_str(),
            status = %document.status,
            "Workflow action applied"
        );

        Ok(WorkflowOutcome {
            document,
            ledger,
            notifications: None,
        })
    }

    fn record(&self, document: &Document, actor: &Actor, action: ActionKind, department: String) -> ActionRecord {
        ActionRecord {
            document_id: document.id,
            action,
            performer_name: actor.name.clone(),
            performer_role: actor.role,
            department,
            snapshot: document.snapshot(),
        }
    }

    async fn department_label(&self, document: &Document) -> String {
        let id = document.department_id.unwrap_or(document.initial_department_id);
        match self.directory.find_active_department(id).await {
            Ok(Some(department)) => department.name,
            _ => id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_approve_then_complete() {
        let h = Harness::new().await;
        let doc = h.routed_document().await;
        let before = doc.action_history.len();

        let approved = assert_ok!(h.workflow.approve(doc.id, &h.officer, Some("ok".into())).await);
        assert_eq!(approved.document.status, Status::Approved);
        assert_eq!(approved.document.action_history.len(), before + 1);
        assert!(approved.ledger.is_logged());

        let completed = assert_ok!(h.workflow.complete(doc.id, &h.officer, None).await);
        assert_eq!(completed.document.status, Status::Completed);
        assert_eq!(completed.document.action_history.len(), before + 2);
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let h = Harness::new().await;
        let doc = h.routed_document().await;

        let err = h.workflow.complete(doc.id, &h.officer, None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));

        let unrouted = h.uploaded_document().await;
        let err = h.workflow.approve(unrouted.id, &h.admin, None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_reject_requires_notes() {
        let h = Harness::new().await;
        let doc = h.routed_document().await;

        let err = h.workflow.reject(doc.id, &h.officer, Some("  ".into())).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        let rejected = h
            .workflow
            .reject(doc.id, &h.officer, Some("Missing annex".into()))
            .await
            .unwrap();
        assert_eq!(rejected.document.status, Status::Rejected);
        assert_eq!(
            rejected.document.action_history.last().and_then(|e| e.notes.clone()),
            Some("Missing annex".to_string())
        );
    }

    #[tokio::test]
    async fn test_officer_of_other_department_is_forbidden() {
        let h = Harness::new().await;
        let legal = h.store.add_department("Legal", true).await;
        let doc = h.routed_document().await;
        let outsider = h.actor(Role::Officer, Some(legal.id));

        let err = h.workflow.approve(doc.id, &outsider, None).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn test_forward_moves_department_and_notifies() {
        let h = Harness::new().await;
        let legal = h.store.add_department("Legal", true).await;
        h.store
            .add_user("Lena", "lena@gov.test", Role::Officer, Some(legal.id), true)
            .await;
        let doc = h.routed_document().await;

        let outcome = h
            .workflow
            .forward(doc.id, &h.officer, legal.id, None)
            .await
            .unwrap();

        assert_eq!(outcome.document.department_id, Some(legal.id));
        assert_eq!(outcome.document.status, Status::InProgress);
        assert_eq!(outcome.notifications.map(|n| n.notified), Some(1));
        assert!(h.mailer.sent().iter().any(|(to, _)| to == "lena@gov.test"));
        assert_eq!(
            outcome.document.action_history.last().map(|e| e.action),
            Some(ActionKind::Forward)
        );

        // The Finance officer no longer holds it
        let err = h.workflow.approve(doc.id, &h.officer, None).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn test_forward_to_same_department_is_invalid() {
        let h = Harness::new().await;
        let doc = h.routed_document().await;
        let err = h
            .workflow
            .forward(doc.id, &h.officer, h.finance.id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_soft_delete_then_purge() {
        let h = Harness::new().await;
        let doc = h.uploaded_document().await;

        let err = h.workflow.purge(doc.id, &h.admin).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));

        let deleted = assert_ok!(h.workflow.soft_delete(doc.id, &h.uploader, None).await);
        assert!(deleted.document.is_deleted);
        assert_eq!(deleted.document.deleted_by, Some(h.uploader.id));

        let err = h.workflow.approve(doc.id, &h.admin, None).await.unwrap_err();
        assert!(matches!(err, AppError::DocumentNotFound { .. }));

        let err = h.workflow.purge(doc.id, &h.officer).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));

        h.workflow.purge(doc.id, &h.admin).await.unwrap();
        assert!(h.store.find_document(doc.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_each_ledger_entry_hashes_the_changed_document() {
        let h = Harness::new().await;
        let doc = h.routed_document().await;

        assert_ok!(h.workflow.approve(doc.id, &h.officer, None).await);
        assert_ok!(h.workflow.soft_delete(doc.id, &h.uploader, None).await);

        let entries = h.ledger_backend.entries(doc.id);
        let actions: Vec<&str> = entries.iter().map(|e| e.action_type.as_str()).collect();
        assert_eq!(actions, ["confirm_routing", "approve", "delete"]);
        assert_ne!(entries[0].content_hash, entries[1].content_hash);
        assert_ne!(entries[1].content_hash, entries[2].content_hash);
    }

    #[tokio::test]
    async fn test_ledger_outage_keeps_status_change() {
        let h = Harness::new().await;
        let doc = h.routed_document().await;
        assert!(doc.ledger_verified);

        h.ledger_backend.set_failing(true);
        let outcome = h.workflow.approve(doc.id, &h.officer, None).await.unwrap();

        assert_eq!(outcome.document.status, Status::Approved);
        assert!(!outcome.document.ledger_verified);
        assert_eq!(outcome.document.ledger_tx_hash, doc.ledger_tx_hash);
    }
}
