//! Read-only routes for derived artifacts, mounted at `/artifacts`.

use axum::routing::get;
use axum::Router;

use crate::handlers::artifacts;
use crate::state::AppState;

/// ```text
/// GET    /dataset/latest            -> latest_dataset
/// GET    /summary/latest            -> latest_summary
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dataset/latest", get(artifacts::latest_dataset))
        .route("/summary/latest", get(artifacts::latest_summary))
}
