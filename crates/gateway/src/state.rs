//! Shared application state

use axum::extract::FromRef;
use recordflow_common::{
    analysis::{create_llm_client, AnalysisProvider},
    auth::JwtManager,
    config::AppConfig,
    db::{DbPool, Directory, DocumentStore, NotificationStore},
    errors::{AppError, Result},
    ledger::{create_ledger, AuditLedger},
    notify::{create_mailer, NotificationFanout},
    storage::FileStore,
    RoutingStateMachine, WorkflowService,
};
use recordflow_ingestion::{IngestionOrchestrator, TextExtractor};
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Absent when running on the in-memory store
    pub db: Option<DbPool>,
    pub jwt: Arc<JwtManager>,
    pub files: FileStore,
    pub documents: Arc<dyn DocumentStore>,
    pub directory: Arc<dyn Directory>,
    pub notifications: Arc<dyn NotificationStore>,
    pub ledger: Arc<AuditLedger>,
    pub fanout: Arc<NotificationFanout>,
    pub routing: Arc<RoutingStateMachine>,
    pub workflow: Arc<WorkflowService>,
    pub orchestrator: Arc<IngestionOrchestrator>,
}

impl AppState {
    /// Wire every service on top of one store implementation
    pub fn build<S>(config: AppConfig, store: Arc<S>, db: Option<DbPool>) -> Result<Self>
    where
        S: DocumentStore + Directory + NotificationStore + 'static,
    {
        let secret = config
            .auth
            .jwt_secret
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: "auth.jwt_secret must be set".to_string(),
            })?;
        let jwt = Arc::new(JwtManager::new(&secret, config.auth.jwt_expiration_secs));

        let files = FileStore::new(&config.storage.root);
        let ledger = Arc::new(AuditLedger::new(create_ledger(&config.ledger)));
        let fanout = Arc::new(NotificationFanout::new(
            store.clone(),
            store.clone(),
            create_mailer(&config.mail),
            config.notifications.retention_days,
        ));

        let routing = Arc::new(RoutingStateMachine::new(
            store.clone(),
            store.clone(),
            ledger.clone(),
            fanout.clone(),
        ));
        let workflow = Arc::new(WorkflowService::new(
            store.clone(),
            store.clone(),
            ledger.clone(),
            fanout.clone(),
        ));

        let extractor = Arc::new(TextExtractor::from_config(&config.ingestion, files.clone()));
        let analysis = Arc::new(AnalysisProvider::new(
            create_llm_client(&config.analysis),
            &config.analysis,
        ));
        let orchestrator = Arc::new(IngestionOrchestrator::new(
            store.clone(),
            store.clone(),
            extractor,
            analysis,
            &config.ingestion,
        ));

        Ok(Self {
            config: Arc::new(config),
            db,
            jwt,
            files,
            documents: store.clone(),
            directory: store.clone(),
            notifications: store,
            ledger,
            fanout,
            routing,
            workflow,
            orchestrator,
        })
    }
}

impl FromRef<AppState> for Arc<JwtManager> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}
