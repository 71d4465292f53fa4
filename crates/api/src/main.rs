use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vidmood_api::config::ServerConfig;
use vidmood_api::routes;
use vidmood_api::state::AppState;
use vidmood_core::orchestrator::JobOrchestrator;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "vidmood_api=debug,vidmood_core=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let mut config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    if config.request_timeout_secs <= config.analysis.timeout_secs {
        tracing::warn!(
            request_timeout_secs = config.request_timeout_secs,
            analysis_timeout_secs = config.analysis.timeout_secs,
            "Request timeout does not exceed the analysis timeout; slow jobs will be cut off by the HTTP layer"
        );
    }

    // --- Directories ---
    // The worker may run from another working directory, so hand it absolute paths.
    config.analysis.upload_dir = prepare_dir(&config.analysis.upload_dir);
    config.analysis.results_dir = prepare_dir(&config.analysis.results_dir);
    tracing::info!(
        uploads = %config.analysis.upload_dir.display(),
        results = %config.analysis.results_dir.display(),
        "Storage directories ready"
    );

    // --- Orchestrator and queries ---
    let orchestrator_config = config
        .analysis
        .orchestrator_config()
        .unwrap_or_else(|e| panic!("Invalid analysis configuration: {e}"));
    let queries = config
        .analysis
        .query_service()
        .unwrap_or_else(|e| panic!("Invalid artifact configuration: {e}"));
    let runner = config.analysis.command_runner();
    tracing::info!(
        program = runner.program(),
        timeout_secs = config.analysis.timeout_secs,
        accepted = ?orchestrator_config.media_policy.accepted(),
        "Analysis worker configured"
    );
    let orchestrator = Arc::new(JobOrchestrator::new(orchestrator_config, Arc::new(runner)));

    // --- CORS ---
    let cors = build_cors_layer(&config);

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        orchestrator: Arc::clone(&orchestrator),
        queries: Arc::new(queries),
    };

    // --- Request ID header name ---
    let request_id_header = HeaderName::from_static("x-request-id");

    // --- Router ---
    let app = Router::new()
        // Health check at root level (not under /api/v1).
        .merge(routes::health::router())
        // API v1 routes.
        .nest("/api/v1", routes::api_routes())
        // -- Middleware stack (applied bottom-up) --
        // Upload size cap.
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        // Panic recovery: catch panics and return 500 JSON.
        .layer(CatchPanicLayer::new())
        // Request timeout. Dropping the handler kills the worker and cleans its scope.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        // Propagate request ID to response.
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        // Structured request/response tracing.
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Set request ID on incoming requests.
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        // CORS.
        .layer(cors)
        // Shared state.
        .with_state(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    let stats = orchestrator.stats();
    tracing::info!(
        started = stats.started,
        cleaned = stats.cleaned,
        "Graceful shutdown complete"
    );
}

/// Create a storage directory and return its absolute path.
///
/// Panics at startup if the directory cannot be created.
fn prepare_dir(dir: &Path) -> PathBuf {
    std::fs::create_dir_all(dir)
        .unwrap_or_else(|e| panic!("Failed to create {}: {e}", dir.display()));
    std::fs::canonicalize(dir)
        .unwrap_or_else(|e| panic!("Failed to resolve {}: {e}", dir.display()))
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix). In-flight analysis
/// requests are allowed to finish before the server exits.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Build the CORS middleware layer from server configuration.
///
/// Panics at startup if any configured origin is invalid.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(3600))
}
