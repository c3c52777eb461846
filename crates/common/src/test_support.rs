//! Shared wiring for service tests

use crate::auth::Actor;
use crate::db::models::{fixtures, Department, Document, ProcessingState, Role};
use crate::db::{DocumentStore, MemoryStore};
use crate::ledger::{AuditLedger, MockLedger};
use crate::notify::{MockMailer, NotificationFanout};
use crate::routing::{ConfirmRouting, RoutingStateMachine};
use crate::workflow::WorkflowService;
use std::sync::Arc;
use uuid::Uuid;

pub(crate) struct Harness {
    pub store: Arc<MemoryStore>,
    pub ledger_backend: Arc<MockLedger>,
    pub mailer: Arc<MockMailer>,
    pub routing: RoutingStateMachine,
    pub workflow: WorkflowService,
    pub finance: Department,
    pub registry: Department,
    /// Staff member in the registry who uploads documents
    pub uploader: Actor,
    pub admin: Actor,
    /// Finance officer
    pub officer: Actor,
}

impl Harness {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let finance = store.add_department("Finance", true).await;
        let registry = store.add_department("Registry", true).await;

        let clerk = store
            .add_user("Asha Clerk", "asha@gov.test", Role::Staff, Some(registry.id), true)
            .await;
        store
            .add_user("Farid Admin", "farid@gov.test", Role::DepartmentAdmin, Some(finance.id), true)
            .await;
        let officer = store
            .add_user("Oona Officer", "oona@gov.test", Role::Officer, Some(finance.id), true)
            .await;

        let ledger_backend = Arc::new(MockLedger::new());
        let mailer = Arc::new(MockMailer::new());
        let ledger = Arc::new(AuditLedger::new(ledger_backend.clone()));
        let fanout = Arc::new(NotificationFanout::new(store.clone(), store.clone(), mailer.clone(), 30));

        let routing = RoutingStateMachine::new(store.clone(), store.clone(), ledger.clone(), fanout.clone());
        let workflow = WorkflowService::new(store.clone(), store.clone(), ledger, fanout);

        Self {
            uploader: Actor {
                id: clerk.id,
                name: clerk.name,
                role: Role::Staff,
                department_id: Some(registry.id),
            },
            admin: Actor {
                id: Uuid::new_v4(),
                name: "Root Admin".to_string(),
                role: Role::SuperAdmin,
                department_id: None,
            },
            officer: Actor {
                id: officer.id,
                name: officer.name,
                role: Role::Officer,
                department_id: Some(finance.id),
            },
            store,
            ledger_backend,
            mailer,
            routing,
            workflow,
            finance,
            registry,
        }
    }

    pub fn actor(&self, role: Role, department_id: Option<Uuid>) -> Actor {
        Actor {
            id: Uuid::new_v4(),
            name: format!("{} user", role),
            role,
            department_id,
        }
    }

    /// A freshly uploaded, unanalyzed document
    pub async fn uploaded_document(&self) -> Document {
        let doc = Document::from_upload(
            fixtures::new_document(self.uploader.id, self.registry.id),
            crate::reference::generate(chrono::Utc::now()),
        );
        self.store.insert_document(doc).await.expect("insert document")
    }

    /// An analyzed document carrying a routing suggestion
    pub async fn suggested_document(&self, department_name: &str) -> Document {
        let mut doc = Document::from_upload(
            fixtures::new_document(self.uploader.id, self.registry.id),
            crate::reference::generate(chrono::Utc::now()),
        );
        doc.summary = Some("Tender for rural water supply".to_string());
        doc.suggested_department = Some(department_name.to_string());
        doc.routing_reasoning = Some("Budget matter".to_string());
        doc.routing_confidence = Some(85);
        doc.processing_state = ProcessingState::Analyzed;
        self.store.insert_document(doc).await.expect("insert document")
    }

    /// A document confirmed to Finance
    pub async fn routed_document(&self) -> Document {
        let doc = self.suggested_document("Finance").await;
        self.routing
            .confirm(doc.id, &self.uploader, ConfirmRouting { accept: true, ..Default::default() })
            .await
            .expect("confirm routing")
            .document
    }

    pub async fn reload(&self, id: Uuid) -> Document {
        self.store
            .find_document(id)
            .await
            .expect("find document")
            .expect("document exists")
    }
}
