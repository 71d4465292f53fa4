use std::sync::Arc;

use vidmood_core::orchestrator::JobOrchestrator;
use vidmood_core::query::QueryService;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; every field is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Runs one analysis job per upload.
    pub orchestrator: Arc<JobOrchestrator>,
    /// Read-only lookups of the latest derived artifacts.
    pub queries: Arc<QueryService>,
}
