#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use vidmood_api::config::{AnalysisConfig, ServerConfig};
use vidmood_api::routes;
use vidmood_api::state::AppState;
use vidmood_core::orchestrator::JobOrchestrator;
use vidmood_core::runner::{JobRunner, ProcessResult, RunRequest, RunnerError};

// ---------------------------------------------------------------------------
// Fake worker
// ---------------------------------------------------------------------------

/// What the in-process worker does for each job.
#[derive(Debug, Clone)]
pub enum FakeWorker {
    /// Write this JSON text as the scope's result and succeed.
    Writes(String),
    /// Write `{"payload": <uploaded bytes as text>}` and succeed.
    EchoesInput,
    /// Exit non-zero with this stderr.
    Fails(String),
    /// Report a timeout.
    TimesOut,
    /// Succeed without writing anything.
    Silent,
}

pub struct FakeRunner {
    worker: FakeWorker,
    calls: AtomicUsize,
}

impl FakeRunner {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobRunner for FakeRunner {
    async fn run(&self, request: RunRequest) -> Result<ProcessResult, RunnerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.worker {
            FakeWorker::Writes(body) => {
                let path = request
                    .output_dir
                    .join(format!("emotion_analysis_results_{}.json", request.scope));
                tokio::fs::write(path, body).await.map_err(RunnerError::Io)?;
            }
            FakeWorker::EchoesInput => {
                let payload = tokio::fs::read_to_string(&request.input_path)
                    .await
                    .map_err(RunnerError::Io)?;
                let path = request
                    .output_dir
                    .join(format!("emotion_analysis_results_{}.json", request.scope));
                let body = serde_json::json!({ "payload": payload }).to_string();
                tokio::fs::write(path, body).await.map_err(RunnerError::Io)?;
            }
            FakeWorker::Fails(stderr) => {
                return Err(RunnerError::ExecutionFailed {
                    exit_code: 1,
                    stderr: stderr.clone(),
                })
            }
            FakeWorker::TimesOut => return Err(RunnerError::Timeout { elapsed_ms: 10 }),
            FakeWorker::Silent => {}
        }
        Ok(ProcessResult {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 1,
        })
    }
}

// ---------------------------------------------------------------------------
// Test application
// ---------------------------------------------------------------------------

/// Router plus handles for inspecting what a request left behind.
pub struct TestApp {
    pub router: Router,
    pub runner: Arc<FakeRunner>,
    pub orchestrator: Arc<JobOrchestrator>,
    pub upload_dir: PathBuf,
    pub results_dir: PathBuf,
    _dir: TempDir,
}

impl TestApp {
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Names of all entries under `dir` (empty if it does not exist).
    pub fn entries(dir: &Path) -> Vec<String> {
        match std::fs::read_dir(dir) {
            Ok(listing) => listing
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// No staged upload and no scope directory or result remains.
    pub fn assert_no_job_residue(&self) {
        assert!(Self::entries(&self.upload_dir).is_empty());
        let leftovers: Vec<String> = Self::entries(&self.results_dir)
            .into_iter()
            .filter(|n| !n.starts_with("emotion_summary_") && !n.starts_with("emotion_dataset_"))
            .collect();
        assert!(leftovers.is_empty(), "results left behind: {leftovers:?}");
        assert_eq!(self.orchestrator.stats().active(), 0);
    }
}

/// Build a test `ServerConfig` with safe defaults rooted in `root`.
pub fn test_config(root: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        max_upload_bytes: 1024 * 1024,
        analysis: AnalysisConfig {
            upload_dir: root.join("uploads"),
            results_dir: root.join("results"),
            program: "true".to_string(),
            args: Vec::new(),
            working_dir: None,
            timeout_secs: 5,
            accepted_media_types: vec!["video/mp4".to_string()],
            result_pattern: "*.json".to_string(),
            dataset_pattern: "emotion_dataset_*.csv".to_string(),
            summary_pattern: "emotion_summary_*.json".to_string(),
            publish_derived: true,
        },
    }
}

pub fn build_test_app(worker: FakeWorker) -> TestApp {
    build_test_app_with(worker, |_| {})
}

/// Build the full application router with all middleware layers.
///
/// This mirrors the router construction in `main.rs` so integration tests
/// exercise the same middleware stack (CORS, request ID, timeout, tracing,
/// panic recovery, body limit) that production uses. The worker is replaced
/// by an in-process fake.
pub fn build_test_app_with(worker: FakeWorker, tweak: impl FnOnce(&mut ServerConfig)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    tweak(&mut config);

    let runner = Arc::new(FakeRunner {
        worker,
        calls: AtomicUsize::new(0),
    });
    let orchestrator = Arc::new(JobOrchestrator::new(
        config.analysis.orchestrator_config().unwrap(),
        Arc::clone(&runner) as Arc<dyn JobRunner>,
    ));
    let queries = Arc::new(config.analysis.query_service().unwrap());

    let state = AppState {
        config: Arc::new(config.clone()),
        orchestrator: Arc::clone(&orchestrator),
        queries,
    };

    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:5173".parse().unwrap()])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    let request_id_header = HeaderName::from_static("x-request-id");

    let router = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state);

    TestApp {
        router,
        runner,
        orchestrator,
        upload_dir: config.analysis.upload_dir,
        results_dir: config.analysis.results_dir,
        _dir: dir,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

const BOUNDARY: &str = "vidmood-test-boundary";

/// A single-part multipart body. `content_type` of `None` omits the part header.
pub fn multipart_body(field: &str, content_type: Option<&str>, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"clip.mp4\"\r\n")
            .as_bytes(),
    );
    if let Some(content_type) = content_type {
        body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
    }
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn post_upload(
    app: Router,
    field: &str,
    content_type: Option<&str>,
    payload: &[u8],
) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/analyze-video")
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(field, content_type, payload)))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_video(app: Router, content_type: &str, payload: &[u8]) -> Response<Body> {
    post_upload(app, "video", Some(content_type), payload).await
}
