//! GPTLens API Gateway
//!
//! The entry point for all external API requests.
//! Handles:
//! - Event collection from client apps and GPT Actions
//! - Dashboard reports for signed-in users
//! - Operator-triggered retention cleanup
//! - Observability (logging, metrics, request ids)

mod handlers;
mod middleware;

use axum::{
    extract::{DefaultBodyLimit, FromRef},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use gptlens_common::{
    auth::JwtManager,
    config::AppConfig,
    db::{AnalyticsStore, DbPool, Repository},
    ratelimit::WriteKeyLimiter,
    services::{CleanupJob, IngestService, InsightsService, RetentionPolicy},
    telemetry,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::middleware::rate_limit::{global_rate_limit, GlobalRateLimit};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn AnalyticsStore>,
    pub ingest: Arc<IngestService>,
    pub insights: Arc<InsightsService>,
    pub cleanup: Arc<CleanupJob>,
    pub jwt: Arc<JwtManager>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn AnalyticsStore>) -> gptlens_common::Result<Self> {
        let jwt = Arc::new(JwtManager::from_config(&config.auth)?);
        let limiter = Arc::new(WriteKeyLimiter::new());

        Ok(Self {
            ingest: Arc::new(IngestService::new(store.clone(), limiter, &config.ingest)),
            insights: Arc::new(InsightsService::new(
                store.clone(),
                &config.analytics,
                &config.retention,
            )),
            cleanup: Arc::new(CleanupJob::new(
                store.clone(),
                RetentionPolicy::from(&config.retention),
            )),
            config: Arc::new(config),
            store,
            jwt,
        })
    }
}

impl FromRef<AppState> for Arc<JwtManager> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize tracing and metrics
    telemetry::init_tracing(&config.observability);
    telemetry::install_metrics_exporter(&config.observability)?;

    info!("Starting GPTLens API Gateway v{}", gptlens_common::VERSION);

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    if config.database.run_migrations {
        db.migrate().await?;
    }
    let store: Arc<dyn AnalyticsStore> = Arc::new(Repository::new(db));

    // Create app state
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let state = AppState::new(config, store)?;

    // Build the router
    let app = create_router(state);

    // Start the server
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
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

    // Collector routes (write key auth, body cap, global bucket)
    let mut collector = Router::new()
        .route("/events", post(handlers::events::track_event))
        .route("/gpt/track", post(handlers::events::track_gpt_action))
        .layer(DefaultBodyLimit::max(state.config.ingest.max_body_bytes));

    if let Some(limit) = GlobalRateLimit::from_config(&state.config.rate_limit) {
        collector = collector.route_layer(from_fn_with_state(limit, global_rate_limit));
    }

    // Dashboard routes (session JWT)
    let dashboard = Router::new()
        .route("/apps/{id}/summary", get(handlers::insights::summary))
        .route("/apps/{id}/conversations", get(handlers::insights::conversations))
        .route("/apps/{id}/usage", get(handlers::insights::usage))
        .route("/apps/{id}/retention", get(handlers::insights::retention))
        .route("/apps/{id}/prompts", get(handlers::insights::prompts))
        .route("/apps/{id}/funnel", get(handlers::insights::funnel))
        .route("/apps/{id}/revenue", get(handlers::insights::revenue))
        .route("/apps/{id}/sources", get(handlers::insights::sources))
        .route("/apps/{id}/benchmarks", get(handlers::insights::benchmarks))
        .route("/apps/{id}/features", get(handlers::insights::features));

    // Admin routes
    let admin = Router::new().route("/admin/cleanup", post(handlers::admin::run_cleanup));

    let timeout = TimeoutLayer::new(state.config.request_timeout());

    // Compose the app
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/v1", collector.merge(dashboard).merge(admin))
        .route_layer(from_fn(middleware::metrics::track_metrics))
        .layer(timeout)
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
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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
        http::{Request, StatusCode},
        response::Response,
    };
    use gptlens_common::{
        auth::{generate_write_key, ADMIN_SCOPE},
        db::{models::AppCategory, MemoryStore},
        hashing::hash_identifier,
        Plan,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    struct TestApp {
        router: Router,
        store: Arc<MemoryStore>,
        jwt: Arc<JwtManager>,
        key: String,
        app_id: Uuid,
        org_id: Uuid,
        owner: Uuid,
    }

    async fn test_app(plan: Plan) -> TestApp {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = Some("test-secret".to_string());
        config.auth.admin_secret = Some("ops-secret".to_string());

        let store = Arc::new(MemoryStore::new());
        let org = store.insert_org("Acme", plan).await;
        let key = generate_write_key();
        let app = store
            .insert_app(org.id, "Planner", AppCategory::Productivity, &key, 100)
            .await;
        let owner = Uuid::new_v4();
        store.add_member(org.id, owner, "owner").await;

        let state = AppState::new(config, store.clone()).unwrap();
        let jwt = state.jwt.clone();

        TestApp {
            router: create_router(state),
            store,
            jwt,
            key,
            app_id: app.id,
            org_id: org.id,
            owner,
        }
    }

    impl TestApp {
        fn session(&self, scopes: Vec<String>) -> String {
            self.jwt
                .generate_token(self.owner, Some(self.org_id), scopes)
                .unwrap()
        }

        async fn send(&self, request: Request<Body>) -> Response {
            self.router.clone().oneshot(request).await.unwrap()
        }

        async fn track(&self, body: Value) -> Response {
            let request = Request::post("/v1/events")
                .header("content-type", "application/json")
                .header("x-app-key", &self.key)
                .body(Body::from(body.to_string()))
                .unwrap();
            self.send(request).await
        }

        async fn report(&self, path: &str) -> Response {
            let request = Request::get(format!("/v1/apps/{}/{}", self.app_id, path))
                .header("authorization", format!("Bearer {}", self.session(vec![])))
                .body(Body::empty())
                .unwrap();
            self.send(request).await
        }
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app(Plan::Free).await;

        let response = app.send(Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.send(Request::get("/ready").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ready");
    }

    #[tokio::test]
    async fn test_track_then_read_conversations() {
        let app = test_app(Plan::Free).await;

        for event in ["invoked", "completed", "invoked", "error"] {
            let response = app.track(json!({"event": event, "user_id": "u1"})).await;
            assert_eq!(response.status(), StatusCode::CREATED);
            let body = json_body(response).await;
            assert_eq!(body["success"], true);
            assert!(body["event_id"].is_string());
        }

        let response = app.report("conversations").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["totalConversations"], 1);
        assert_eq!(body["totalMessages"], 2);
        assert_eq!(body["errorRate"], 50.0);

        let expected = hash_identifier("u1");
        for event in app.store.all_events().await {
            assert_eq!(event.user_hash.as_deref(), Some(expected.as_str()));
        }
    }

    #[tokio::test]
    async fn test_collector_errors() {
        let app = test_app(Plan::Free).await;

        let missing = Request::post("/v1/events")
            .body(Body::from(r#"{"event":"invoked"}"#))
            .unwrap();
        let response = app.send(missing).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"]["code"], "UNAUTHENTICATED");

        let response = app.track(json!({"event": "teleported"})).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["details"]["field"], "event");
    }

    #[tokio::test]
    async fn test_gpt_action_accepts_bearer_key() {
        let app = test_app(Plan::Free).await;

        let request = Request::post("/v1/gpt/track")
            .header("authorization", format!("Bearer {}", app.key))
            .body(Body::from(
                json!({"event": "invoked", "prompt": "Plan my week"}).to_string(),
            ))
            .unwrap();
        let response = app.send(request).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let stored = app.store.all_events().await;
        assert_eq!(
            stored[0].prompt_hash.as_deref(),
            Some(hash_identifier("Plan my week").as_str())
        );
    }

    #[tokio::test]
    async fn test_dashboard_requires_session() {
        let app = test_app(Plan::Free).await;

        let request = Request::get(format!("/v1/apps/{}/summary", app.app_id))
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.send(request).await.status(), StatusCode::UNAUTHORIZED);

        let request = Request::get("/v1/apps/not-a-uuid/summary")
            .header("authorization", format!("Bearer {}", app.session(vec![])))
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.send(request).await.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_every_report_answers_on_an_empty_app() {
        let app = test_app(Plan::Team).await;

        for path in [
            "summary",
            "conversations",
            "usage",
            "retention",
            "prompts",
            "funnel",
            "revenue",
            "sources",
            "benchmarks",
            "features",
        ] {
            let response = app.report(path).await;
            assert_eq!(response.status(), StatusCode::OK, "report {}", path);
        }
    }

    #[tokio::test]
    async fn test_benchmarks_forbidden_on_free_plan() {
        let app = test_app(Plan::Free).await;

        let response = app.report("benchmarks").await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["error"]["code"], "PLAN_REQUIRED");
    }

    #[tokio::test]
    async fn test_admin_cleanup() {
        let app = test_app(Plan::Free).await;

        let request = Request::post("/v1/admin/cleanup")
            .header("authorization", format!("Bearer {}", app.session(vec![])))
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.send(request).await.status(), StatusCode::FORBIDDEN);

        let request = Request::post("/v1/admin/cleanup")
            .header("authorization", "Bearer ops-secre")
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.send(request).await.status(), StatusCode::UNAUTHORIZED);

        let request = Request::post("/v1/admin/cleanup")
            .header("authorization", "Bearer ops-secret")
            .body(Body::from(r#"{"dry_run": true}"#))
            .unwrap();
        let response = app.send(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["dry_run"], true);
        assert_eq!(body["tiers"].as_array().unwrap().len(), 3);

        let admin = app.session(vec![ADMIN_SCOPE.to_string()]);
        let request = Request::post("/v1/admin/cleanup")
            .header("authorization", format!("Bearer {}", admin))
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.send(request).await.status(), StatusCode::OK);
    }
}
