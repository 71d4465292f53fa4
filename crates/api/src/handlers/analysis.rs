//! Handler for video analysis uploads.

use axum::extract::{Multipart, State};
use axum::Json;
use vidmood_core::outcome::JobResult;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Multipart field carrying the video.
pub const VIDEO_FIELD: &str = "video";

/// POST /api/v1/analyze-video
///
/// Accepts a multipart form with a required `video` field. The part's
/// declared content type decides whether the upload is analysed; a part
/// without one is treated as unsupported. Other fields are ignored.
pub async fn analyze_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<DataResponse<JobResult>>> {
    let mut upload = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(VIDEO_FIELD) {
            continue;
        }
        let media_type = field.content_type().unwrap_or_default().to_string();
        let data = field.bytes().await?;
        upload = Some((media_type, data));
        break;
    }

    let (media_type, data) =
        upload.ok_or_else(|| AppError::BadRequest("Missing required 'video' field".into()))?;

    tracing::debug!(media_type = %media_type, bytes = data.len(), "Received analysis upload");

    let outcome = state.orchestrator.submit(&media_type, &data).await?;
    let result = outcome.into_result()?;

    Ok(Json(DataResponse { data: result }))
}
