use axum::routing::post;
use axum::Router;

use crate::handlers::analysis;
use crate::state::AppState;

/// ```text
/// POST   /analyze-video             -> analyze_video
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/analyze-video", post(analysis::analyze_video))
}
