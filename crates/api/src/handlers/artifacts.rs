//! Handlers for the latest shared dataset and summary artifacts.

use axum::extract::State;
use axum::Json;
use vidmood_core::error::CoreError;
use vidmood_core::query::{DatasetSnapshot, SummaryDocument};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/artifacts/dataset/latest
pub async fn latest_dataset(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<DatasetSnapshot>>> {
    let snapshot = state
        .queries
        .latest_dataset()
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "dataset",
            key: state.queries.dataset_pattern().as_str().to_string(),
        })?;

    Ok(Json(DataResponse { data: snapshot }))
}

/// GET /api/v1/artifacts/summary/latest
pub async fn latest_summary(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<SummaryDocument>>> {
    let summary = state
        .queries
        .latest_summary()
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "summary",
            key: state.queries.summary_pattern().as_str().to_string(),
        })?;

    Ok(Json(DataResponse { data: summary }))
}
