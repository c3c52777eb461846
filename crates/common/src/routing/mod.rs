//! Routing confirmation state machine
//!
//! A document starts `Unrouted`, becomes `Suggested` once the analysis
//! stage records a department name, and becomes `Confirmed` when the
//! uploader or a super administrator accepts or overrides the suggestion.
//! Confirmation is the only way a document's department gets set.

use crate::auth::Actor;
use crate::db::models::{ActionKind, Department, Document, Status};
use crate::db::{load_live_document, mutate_document, Directory, DocumentStore};
use crate::errors::{AppError, Result};
use crate::ledger::{ActionRecord, AuditLedger, LedgerOutcome};
use crate::notify::{FanoutEvent, FanoutReport, NotificationFanout};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Body of a confirmation request
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfirmRouting {
    /// Accept the AI-suggested department
    #[serde(default)]
    pub accept: bool,

    /// Route to this department instead; takes precedence over `accept`
    #[serde(default)]
    pub override_department_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutingOutcome {
    pub document: Document,
    pub department: Department,
    pub ledger: LedgerOutcome,
    pub notifications: FanoutReport,
}

pub struct RoutingStateMachine {
    documents: Arc<dyn DocumentStore>,
    directory: Arc<dyn Directory>,
    ledger: Arc<AuditLedger>,
    fanout: Arc<NotificationFanout>,
}

impl RoutingStateMachine {
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

    /// Confirm or override the routing of a document.
    ///
    /// The transition is committed before the ledger write and the
    /// notification fan-out run; neither can undo it.
    #[instrument(skip(self, actor, request), fields(actor_id = %actor.id, accept = request.accept))]
    pub async fn confirm(
        &self,
        document_id: Uuid,
        actor: &Actor,
        request: ConfirmRouting,
    ) -> Result<RoutingOutcome> {
        let document = load_live_document(self.documents.as_ref(), document_id).await?;
        actor.require(actor.can_confirm_routing(&document), "confirm routing")?;

        if document.routing_confirmed {
            return Err(AppError::RoutingAlreadyConfirmed {
                id: document_id.to_string(),
            });
        }

        let (department, action) = self.resolve_target(&document, &request).await?;
        let note = match action {
            ActionKind::Route => format!(
                "Routed to {} (override of suggestion {:?})",
                department.name,
                document.suggested_department.as_deref().unwrap_or("none")
            ),
            _ => format!("Accepted suggested routing to {}", department.name),
        };
        let now = Utc::now();

        let committed = mutate_document(self.documents.as_ref(), document_id, |doc| {
            if doc.is_deleted {
                return Err(AppError::document_not_found(document_id));
            }
            if doc.routing_confirmed {
                return Err(AppError::RoutingAlreadyConfirmed {
                    id: document_id.to_string(),
                });
            }
            doc.department_id = Some(department.id);
            doc.routing_confirmed = true;
            doc.confirmed_by = Some(actor.id);
            doc.confirmed_at = Some(now.into());
            doc.status = Status::InProgress;
            doc.record_action(action, actor.id, &actor.name, Some(note.clone()));
            Ok(())
        })
        .await?;

        crate::metrics::record_routing_confirmation(match action {
            ActionKind::Route => "override",
            _ => "accept",
        });
        info!(
            document_id = %document_id,
            department = %department.name,
            action = action.as_str(),
            "Routing confirmed"
        );

        let record = ActionRecord {
            document_id,
            action,
            performer_name: actor.name.clone(),
            performer_role: actor.role,
            department: department.name.clone(),
            snapshot: committed.snapshot(),
        };

        let (ledger, notifications) = tokio::join!(
            self.ledger.log_action(record),
            self.fanout
                .dispatch(&committed, &department, &actor.name, FanoutEvent::Routed),
        );

        let document = persist_ledger_outcome(self.documents.as_ref(), committed, &ledger).await;

        Ok(RoutingOutcome {
            document,
            department,
            ledger,
            notifications,
        })
    }

    async fn resolve_target(
        &self,
        document: &Document,
        request: &ConfirmRouting,
    ) -> Result<(Department, ActionKind)> {
        if let Some(override_id) = request.override_department_id {
            let department = self
                .directory
                .find_active_department(override_id)
                .await?
                .ok_or_else(|| AppError::DepartmentNotFound {
                    reference: override_id.to_string(),
                })?;
            return Ok((department, ActionKind::Route));
        }

        if !request.accept {
            return Err(AppError::Validation {
                message: "Either accept the suggestion or provide override_department_id".to_string(),
                field: Some("override_department_id".to_string()),
            });
        }

        let suggested = document
            .suggested_department
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::DepartmentNotFound {
                reference: "no routing suggestion recorded".to_string(),
            })?;

        let department = self
            .directory
            .find_active_department_by_name(suggested)
            .await?
            .ok_or_else(|| AppError::DepartmentNotFound {
                reference: suggested.to_string(),
            })?;

        Ok((department, ActionKind::ConfirmRouting))
    }
}

/// Write a ledger outcome into the document's ledger fields. Failures are
/// logged and the unchanged document is returned.
pub(crate) async fn persist_ledger_outcome(
    store: &dyn DocumentStore,
    document: Document,
    outcome: &LedgerOutcome,
) -> Document {
    let tx_hash = outcome.tx_hash().map(str::to_string);

    if tx_hash.is_none() && !document.ledger_verified {
        return document;
    }

    match mutate_document(store, document.id, |doc| {
        doc.apply_ledger_result(tx_hash.clone());
        Ok(())
    })
    .await
    {
        Ok(updated) => updated,
        Err(e) => {
            warn!(document_id = %document.id, error = %e, "Failed to record ledger outcome");
            document
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Role, RoutingState};
    use crate::test_support::Harness;

    #[tokio::test]
    async fn test_accepting_unmatched_suggestion_fails_and_leaves_document() {
        let h = Harness::new().await;
        let doc = h.suggested_document("Ministry of Nonexistence").await;

        let err = h
            .routing
            .confirm(doc.id, &h.uploader, ConfirmRouting { accept: true, ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DepartmentNotFound { .. }));

        let stored = h.reload(doc.id).await;
        assert!(!stored.routing_confirmed);
        assert!(stored.department_id.is_none());
        assert_eq!(stored.routing_state(), RoutingState::Suggested);
        assert_eq!(stored.action_history.len(), doc.action_history.len());
    }

    #[tokio::test]
    async fn test_accept_confirms_once() {
        let h = Harness::new().await;
        let doc = h.suggested_document("  finance ").await;

        let outcome = h
            .routing
            .confirm(doc.id, &h.uploader, ConfirmRouting { accept: true, ..Default::default() })
            .await
            .unwrap();

        let stored = h.reload(doc.id).await;
        assert_eq!(stored.department_id, Some(h.finance.id));
        assert!(stored.routing_confirmed);
        assert_eq!(stored.confirmed_by, Some(h.uploader.id));
        assert_eq!(stored.status, Status::InProgress);
        assert_eq!(stored.action_history.len(), doc.action_history.len() + 1);
        assert_eq!(stored.action_history.last().map(|e| e.action), Some(ActionKind::ConfirmRouting));
        assert!(stored.ledger_verified);
        assert_eq!(stored.ledger_tx_hash.as_deref(), outcome.ledger.tx_hash());
        assert_eq!(outcome.notifications.notified, 2);

        let again = h
            .routing
            .confirm(doc.id, &h.uploader, ConfirmRouting { accept: true, ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(again, AppError::RoutingAlreadyConfirmed { .. }));
        assert_eq!(h.reload(doc.id).await.action_history.len(), stored.action_history.len());
    }

    #[tokio::test]
    async fn test_override_records_route_entry() {
        let h = Harness::new().await;
        let doc = h.suggested_document("Ministry of Nonexistence").await;

        let outcome = h
            .routing
            .confirm(
                doc.id,
                &h.admin,
                ConfirmRouting { accept: false, override_department_id: Some(h.finance.id) },
            )
            .await
            .unwrap();

        assert_eq!(outcome.department.id, h.finance.id);
        assert_eq!(
            outcome.document.action_history.last().map(|e| e.action),
            Some(ActionKind::Route)
        );
    }

    #[tokio::test]
    async fn test_inactive_override_is_not_found() {
        let h = Harness::new().await;
        let archived = h.store.add_department("Archives", false).await;
        let doc = h.suggested_document("Finance").await;

        let err = h
            .routing
            .confirm(
                doc.id,
                &h.uploader,
                ConfirmRouting { accept: true, override_department_id: Some(archived.id) },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DepartmentNotFound { .. }));
    }

    #[tokio::test]
    async fn test_ledger_failure_does_not_block_confirmation() {
        let h = Harness::new().await;
        h.ledger_backend.set_failing(true);
        let doc = h.suggested_document("Finance").await;

        let outcome = h
            .routing
            .confirm(doc.id, &h.uploader, ConfirmRouting { accept: true, ..Default::default() })
            .await
            .unwrap();

        assert!(!outcome.ledger.is_logged());
        let stored = h.reload(doc.id).await;
        assert!(stored.routing_confirmed);
        assert_eq!(stored.department_id, Some(h.finance.id));
        assert!(!stored.ledger_verified);
        assert!(stored.ledger_tx_hash.is_none());
        assert_eq!(outcome.notifications.notified, 2);
    }

    #[tokio::test]
    async fn test_only_uploader_or_super_admin() {
        let h = Harness::new().await;
        let doc = h.suggested_document("Finance").await;
        let outsider = h.actor(Role::DepartmentAdmin, Some(h.finance.id));

        let err = h
            .routing
            .confirm(doc.id, &outsider, ConfirmRouting { accept: true, ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn test_reject_without_override_is_invalid() {
        let h = Harness::new().await;
        let doc = h.suggested_document("Finance").await;

        let err = h
            .routing
            .confirm(doc.id, &h.uploader, ConfirmRouting::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_unrouted_document_cannot_be_accepted() {
        let h = Harness::new().await;
        let doc = h.uploaded_document().await;

        let err = h
            .routing
            .confirm(doc.id, &h.uploader, ConfirmRouting { accept: true, ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DepartmentNotFound { .. }));
    }
}
