//! ThesisForge Gateway
//!
//! HTTP entry point for the generation pipeline.
//! Handles:
//! - Paper search
//! - Chapter generation and document assembly triggers
//! - The stale document sweep
//! - Observability (logging, metrics, request ids)

mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thesisforge_common::{
    config::{AppConfig, ObservabilityConfig},
    db::{DbPool, Repository, ResearchStore},
    generation::{
        assembly::{DocumentAssembler, HttpRenderer},
        chapters::{ChapterRegistry, ChapterService},
    },
    llm::create_language_model,
    metrics,
    sources::{PaperSource, SemanticScholarClient},
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn ResearchStore>,
    pub sources: Arc<dyn PaperSource>,
    pub chapters: Arc<ChapterService>,
    pub assembler: Arc<DocumentAssembler>,
    /// Cancelled on shutdown; requests derive child tokens from it
    pub shutdown: CancellationToken,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load().context("Failed to load configuration")?);

    init_tracing(&config.observability);
    info!("Starting ThesisForge gateway v{}", thesisforge_common::VERSION);

    // Initialize metrics
    install_metrics_exporter(&config.observability)?;
    metrics::register_metrics();

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    if config.database.auto_migrate {
        db.migrate().await?;
    }
    let store: Arc<dyn ResearchStore> = Arc::new(Repository::new(db));

    // Upstream clients
    let model = create_language_model(&config.llm)?;
    info!(model = model.model_name(), "Language model ready");
    let sources: Arc<dyn PaperSource> = Arc::new(SemanticScholarClient::new(&config.search)?);
    let renderer = Arc::new(HttpRenderer::new(&config.renderer)?);

    // Pipeline services
    let registry = ChapterRegistry::standard(model, sources.clone(), store.clone(), &config.generation);
    let chapters = Arc::new(ChapterService::new(store.clone(), registry));
    let assembler = Arc::new(DocumentAssembler::new(
        store.clone(),
        renderer,
        &config.renderer,
        &config.generation,
    ));

    let shutdown = CancellationToken::new();

    if let Some(interval) = config.generation.sweep_interval() {
        let sweeper = assembler.clone();
        let max_age = config.generation.stale_document_age();
        let token = shutdown.clone();
        tokio::spawn(async move { sweeper.run_sweeper(interval, max_age, token).await });
    }

    // Create app state
    let state = AppState {
        config: config.clone(),
        store,
        sources,
        chapters,
        assembler,
        shutdown: shutdown.clone(),
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .into_future();

    tokio::select! {
        result = server => result?,
        _ = drain_deadline(shutdown, config.shutdown_timeout()) => {
            warn!("Graceful shutdown timed out, dropping in-flight requests");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn install_metrics_exporter(config: &ObservabilityConfig) -> anyhow::Result<()> {
    if config.metrics_port == 0 {
        warn!("Metrics exporter disabled");
        return Ok(());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets(metrics::UPSTREAM_BUCKETS)?
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!(%addr, "Prometheus exporter listening");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API routes
    let api_routes = Router::new()
        .route("/papers/search", post(handlers::papers::search))
        .route(
            "/projects/{project_id}/documents",
            post(handlers::documents::create_document),
        );

    let standard_routes = Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/v1", api_routes)
        .layer(TimeoutLayer::new(state.config.request_timeout()));

    // Chapter generation runs several LLM calls back to back
    let generation_routes = Router::new()
        .route(
            "/v1/projects/{project_id}/chapters/{chapter_id}/generate",
            post(handlers::chapters::generate_chapter),
        )
        .layer(TimeoutLayer::new(state.config.generation_timeout()));

    // Compose the app
    standard_routes
        .merge(generation_routes)
        .route_layer(axum::middleware::from_fn(middleware::track_requests))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(cors),
        )
        .with_state(state)
}

/// Graceful shutdown signal handler. Cancels in-flight generation.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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

    shutdown.cancel();
}

/// Resolves `timeout` after shutdown begins
async fn drain_deadline(shutdown: CancellationToken, timeout: Duration) {
    shutdown.cancelled().await;
    tokio::time::sleep(timeout).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::{DateTime, Utc};
    use thesisforge_common::config::{GenerationConfig, RendererConfig};
    use thesisforge_common::db::models::*;
    use thesisforge_common::db::DocumentUpdate;
    use thesisforge_common::generation::assembly::{DocumentRenderer, RenderPayload};
    use thesisforge_common::llm::MockLanguageModel;
    use thesisforge_common::sources::SearchQuery;
    use thesisforge_common::{AppError, Result};
    use tower::ServiceExt;
    use uuid::Uuid;

    /// Store with no projects
    struct EmptyStore;

    #[async_trait]
    impl ResearchStore for EmptyStore {
        async fn ping(&self) -> Result<()> {
            Ok(())
        }
        async fn find_project(&self, _id: Uuid) -> Result<Option<Project>> {
            Ok(None)
        }
        async fn find_chapter(&self, _id: Uuid) -> Result<Option<Chapter>> {
            Ok(None)
        }
        async fn find_chapter_by_type(&self, _p: Uuid, _t: ChapterType) -> Result<Option<Chapter>> {
            Ok(None)
        }
        async fn list_chapters(&self, _p: Uuid) -> Result<Vec<Chapter>> {
            Ok(Vec::new())
        }
        async fn update_chapter_content(
            &self,
            id: Uuid,
            _content: String,
            _word_count: i32,
            _status: ChapterStatus,
        ) -> Result<Chapter> {
            Err(AppError::ChapterNotFound { id: id.to_string() })
        }
        async fn find_citation_by_doi(&self, _p: Uuid, _doi: &str) -> Result<Option<Citation>> {
            Ok(None)
        }
        async fn find_citation_by_external_id(&self, _p: Uuid, _id: &str) -> Result<Option<Citation>> {
            Ok(None)
        }
        async fn insert_citation(&self, _c: NewCitation) -> Result<Citation> {
            Err(AppError::Internal { message: "read only".into() })
        }
        async fn list_citations(&self, _p: Uuid) -> Result<Vec<Citation>> {
            Ok(Vec::new())
        }
        async fn create_document(&self, project_id: Uuid) -> Result<GeneratedDocument> {
            Err(AppError::ProjectNotFound { id: project_id.to_string() })
        }
        async fn update_document_status(&self, id: Uuid, _u: DocumentUpdate) -> Result<GeneratedDocument> {
            Err(AppError::DocumentNotFound { id: id.to_string() })
        }
        async fn list_stale_documents(&self, _cutoff: DateTime<Utc>) -> Result<Vec<GeneratedDocument>> {
            Ok(Vec::new())
        }
    }

    struct NoSource;

    #[async_trait]
    impl PaperSource for NoSource {
        async fn search(&self, _query: &SearchQuery) -> Result<Vec<thesisforge_common::sources::SourcePaper>> {
            Ok(Vec::new())
        }
        async fn fetch_paper(&self, id: &str) -> Result<thesisforge_common::sources::SourcePaper> {
            Err(AppError::Retrieval { message: format!("{} not found", id) })
        }
    }

    struct NoRenderer;

    #[async_trait]
    impl DocumentRenderer for NoRenderer {
        async fn render(&self, _payload: &RenderPayload) -> Result<String> {
            Err(AppError::Render { message: "offline".into() })
        }
    }

    fn app() -> Router {
        let config = Arc::new(AppConfig::default());
        let store: Arc<dyn ResearchStore> = Arc::new(EmptyStore);
        let sources: Arc<dyn PaperSource> = Arc::new(NoSource);
        let generation = GenerationConfig::default();
        let registry = ChapterRegistry::standard(
            Arc::new(MockLanguageModel::new()),
            sources.clone(),
            store.clone(),
            &generation,
        );

        create_router(AppState {
            config,
            chapters: Arc::new(ChapterService::new(store.clone(), registry)),
            assembler: Arc::new(DocumentAssembler::new(
                store.clone(),
                Arc::new(NoRenderer),
                &RendererConfig::default(),
                &generation,
            )),
            store,
            sources,
            shutdown: CancellationToken::new(),
        })
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = tokio_test::assert_ok!(to_bytes(response.into_body(), usize::MAX).await);
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_and_request_id() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(json_body(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_ready_reports_database() {
        let response = app()
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["checks"]["database"]["status"], "up");
    }

    #[tokio::test]
    async fn test_empty_search_query_is_rejected() {
        let request = Request::post("/v1/papers/search")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"query": ""}"#))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_generate_for_unknown_project_is_not_found() {
        let uri = format!("/v1/projects/{}/chapters/{}/generate", Uuid::new_v4(), Uuid::new_v4());
        let response = app()
            .oneshot(Request::post(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_drain_deadline_starts_at_shutdown() {
        let shutdown = CancellationToken::new();
        let idle = tokio::time::timeout(
            Duration::from_millis(50),
            drain_deadline(shutdown.clone(), Duration::from_millis(1)),
        )
        .await;
        assert!(idle.is_err());

        shutdown.cancel();
        let draining = tokio::time::timeout(
            Duration::from_secs(5),
            drain_deadline(shutdown, Duration::from_millis(10)),
        )
        .await;
        tokio_test::assert_ok!(draining);
    }

    #[tokio::test]
    async fn test_document_for_unknown_project_is_not_found() {
        let uri = format!("/v1/projects/{}/documents", Uuid::new_v4());
        let response = app()
            .oneshot(Request::post(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
