pub mod analysis;
pub mod artifacts;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /analyze-video                                   upload and analyse (POST)
///
/// /artifacts/dataset/latest                        newest dataset snapshot
/// /artifacts/summary/latest                        newest summary document
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(analysis::router())
        .nest("/artifacts", artifacts::router())
}
