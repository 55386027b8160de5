use axum::{extract::State, Json};
use std::sync::Arc;

use super::AppState;
use crate::dto::LabelsResponse;

/// Supported classes with display names and corpus sample counts.
#[utoipa::path(
    get,
    path = "/labels",
    tag = "classify",
    responses(
        (status = 200, description = "Class catalog", body = LabelsResponse)
    )
)]
pub async fn labels(State(state): State<Arc<AppState>>) -> Json<LabelsResponse> {
    let counts = state.classifier.corpus().corpus().class_counts();
    Json(LabelsResponse::from_counts(&counts))
}
