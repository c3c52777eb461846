//! RecordFlow API Gateway
//!
//! The entry point for all external API requests.
//! Handles:
//! - Authentication (bearer JWT) and per-document authorization
//! - Upload intake and the background analysis pipeline
//! - Routing confirmation, workflow actions and ledger verification
//! - Observability (logging, metrics)

mod handlers;
mod middleware;
mod state;

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware::from_fn,
    routing::{delete, get, post},
    Router,
};
use recordflow_common::{
    config::AppConfig,
    db::{DbPool, Repository},
    metrics,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub use state::AppState;

/// Multipart framing allowance on top of the file size limit
const BODY_OVERHEAD_BYTES: usize = 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    init_tracing(&config);
    info!("Starting RecordFlow API Gateway v{}", recordflow_common::VERSION);

    // Initialize metrics
    if config.observability.metrics_port > 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        info!(%addr, "Prometheus exporter listening");
    }
    metrics::register_metrics();

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    if config.database.run_migrations {
        db.run_migrations().await?;
    }

    let repository = Arc::new(Repository::new(db.clone()));
    let state = AppState::build(config, repository, Some(db))?;
    let config = state.config.clone();

    spawn_notification_sweeper(&state);

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.observability.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Periodically drop notifications past their retention window
fn spawn_notification_sweeper(state: &AppState) {
    let fanout = state.fanout.clone();
    let every = Duration::from_secs(state.config.notifications.purge_interval_secs.max(60));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let removed = fanout.purge_expired().await;
            if removed > 0 {
                info!(removed, "Expired notifications purged");
            }
        }
    });
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let body_limit = state.config.server.max_upload_bytes + BODY_OVERHEAD_BYTES;
    let timeout = TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, state.config.request_timeout());
    // Confirm, workflow and delete commit first, then write to the ledger and
    // notify inline. A timeout drops those side effects mid-flight, so these
    // routes get the longer action budget.
    let action_timeout =
        TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, state.config.action_timeout());

    let action_routes = Router::new()
        .route("/documents/{id}", delete(handlers::documents::delete_document))
        .route("/documents/{id}/purge", delete(handlers::documents::purge_document))
        .route("/documents/{id}/routing/confirm", post(handlers::routing::confirm_routing))
        .route("/documents/{id}/approve", post(handlers::workflow::approve))
        .route("/documents/{id}/reject", post(handlers::workflow::reject))
        .route("/documents/{id}/complete", post(handlers::workflow::complete))
        .route("/documents/{id}/forward", post(handlers::workflow::forward))
        .layer(action_timeout);

    let query_routes = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Documents
        .route("/documents", post(handlers::documents::upload))
        .route("/documents/{id}", get(handlers::documents::get_document))
        .route("/documents/by-reference/{reference}", get(handlers::documents::get_by_reference))

        // Ledger
        .route("/documents/{id}/ledger", get(handlers::ledger::verify))

        // Notifications
        .route("/notifications", get(handlers::notifications::list))
        .route("/notifications/{id}/read", post(handlers::notifications::mark_read))
        .route("/notifications/{id}/unread", post(handlers::notifications::mark_unread))
        .layer(timeout);

    let api_routes = query_routes
        .merge(action_routes)
        .route_layer(from_fn(middleware::metrics::track_metrics));

    // Compose the app
    Router::new()
        .nest("/v1", api_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use recordflow_common::{
        auth::{Actor, JwtManager},
        db::{models::{Department, Document, Role}, DocumentStore, MemoryStore},
        reference,
    };
    use serde_json::Value;
    use tower::ServiceExt;
    use uuid::Uuid;

    const BOUNDARY: &str = "recordflow-test-boundary";

    struct TestApp {
        _dir: tempfile::TempDir,
        store: Arc<MemoryStore>,
        state: AppState,
        registry: Department,
        clerk: Actor,
    }

    impl TestApp {
        async fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let mut config = AppConfig::default();
            config.auth.jwt_secret = Some("test-secret".to_string());
            config.storage.root = dir.path().to_path_buf();

            let store = Arc::new(MemoryStore::new());
            let registry = store.add_department("Registry", true).await;
            store.add_department("Finance", true).await;
            let user = store
                .add_user("Asha Clerk", "asha@gov.test", Role::Staff, Some(registry.id), true)
                .await;

            let state = AppState::build(config, store.clone(), None).unwrap();
            let clerk = Actor {
                id: user.id,
                name: user.name,
                role: Role::Staff,
                department_id: Some(registry.id),
            };

            Self {
                _dir: dir,
                store,
                state,
                registry,
                clerk,
            }
        }

        fn token(&self, actor: &Actor) -> String {
            let jwt: Arc<JwtManager> = self.state.jwt.clone();
            format!("Bearer {}", jwt.generate_token(actor).unwrap())
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = create_router(self.state.clone()).oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, body)
        }
    }

    fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((filename, content_type, bytes)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(token: Option<String>, body: Vec<u8>) -> Request<Body> {
        let mut builder = Request::post("/v1/documents").header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, token);
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = TestApp::new().await;
        let (status, body) = app
            .send(Request::get("/v1/health").body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_upload_requires_token() {
        let app = TestApp::new().await;
        let body = multipart_body(&[("title", "Memo")], Some(("memo.txt", "text/plain", b"hello")));
        let (status, _) = app.send(upload_request(None, body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_upload_creates_pending_document() {
        let app = TestApp::new().await;
        let registry = app.registry.id.to_string();
        let body = multipart_body(
            &[
                ("title", "Water budget memo"),
                ("category", "financial"),
                ("urgency", "high"),
                ("tags", "budget, water ,"),
                ("department_id", &registry),
            ],
            Some(("memo.txt", "text/plain", b"Please approve the revised water budget.")),
        );

        let (status, body) = app.send(upload_request(Some(app.token(&app.clerk)), body)).await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "pending");
        assert_eq!(body["routing_confirmed"], false);
        assert_eq!(body["tags"], serde_json::json!(["budget", "water"]));
        assert_eq!(body["initial_department_id"], app.registry.id.to_string());
        let reference_number = body["reference_number"].as_str().unwrap();
        assert!(reference::is_well_formed(reference_number));

        let id: Uuid = body["id"].as_str().unwrap().parse().unwrap();
        let stored = tokio_test::assert_ok!(app.store.find_document(id).await).unwrap();
        assert_eq!(stored.action_history.len(), 1);
        assert!(app.state.files.resolve(&stored.file_path).unwrap().exists());
    }

    #[tokio::test]
    async fn test_upload_requires_initial_department() {
        let app = TestApp::new().await;
        let body = multipart_body(
            &[("title", "Memo"), ("category", "policy")],
            Some(("memo.txt", "text/plain", b"text")),
        );

        let (status, body) = app.send(upload_request(Some(app.token(&app.clerk)), body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["details"]["field"], "department_id");
        assert_eq!(app.store.document_count().await, 0);
    }

    #[tokio::test]
    async fn test_upload_rejects_unknown_department() {
        let app = TestApp::new().await;
        let unknown = Uuid::new_v4().to_string();
        let body = multipart_body(
            &[("title", "Memo"), ("category", "policy"), ("department_id", &unknown)],
            Some(("memo.txt", "text/plain", b"text")),
        );

        let (status, _) = app.send(upload_request(Some(app.token(&app.clerk)), body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_confirm_unmatched_suggestion_is_unprocessable() {
        let app = TestApp::new().await;
        let mut doc = Document::from_upload(
            recordflow_common::db::models::NewDocument {
                title: "Memo".to_string(),
                description: None,
                uploaded_by: app.clerk.id,
                uploader_name: app.clerk.name.clone(),
                initial_department_id: app.registry.id,
                file_path: "2026/10/memo.txt".to_string(),
                original_filename: "memo.txt".to_string(),
                media_type: "text/plain".to_string(),
                size_bytes: 4,
                category: recordflow_common::db::models::Category::Policy,
                urgency: recordflow_common::db::models::Urgency::Low,
                tags: vec![],
            },
            "REC-20261019-ABCDEFGH".to_string(),
        );
        doc.suggested_department = Some("Ministry of Nonexistence".to_string());
        let doc = app.store.insert_document(doc).await.unwrap();

        let request = Request::post(format!("/v1/documents/{}/routing/confirm", doc.id))
            .header(header::AUTHORIZATION, app.token(&app.clerk))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"accept": true}"#))
            .unwrap();
        let (status, body) = app.send(request).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["details"]["department"], "Ministry of Nonexistence");
        let stored = app.store.find_document(doc.id).await.unwrap().unwrap();
        assert!(!stored.routing_confirmed);
    }

    #[tokio::test]
    async fn test_outsider_cannot_read_document() {
        let app = TestApp::new().await;
        let audit = app.store.add_department("Audit", true).await;
        let outsider = Actor {
            id: Uuid::new_v4(),
            name: "Other".to_string(),
            role: Role::Officer,
            department_id: Some(audit.id),
        };
        let body = multipart_body(
            &[("title", "Memo"), ("category", "legal")],
            Some(("memo.txt", "text/plain", b"confidential")),
        );
        let (_, created) = app.send(upload_request(Some(app.token(&app.clerk)), body)).await;
        let id = created["id"].as_str().unwrap();

        let request = Request::get(format!("/v1/documents/{}", id))
            .header(header::AUTHORIZATION, app.token(&outsider))
            .body(Body::empty())
            .unwrap();
        let (status, _) = app.send(request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
