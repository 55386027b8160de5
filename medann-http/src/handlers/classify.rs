use axum::extract::{Multipart, Query, State};
use axum::Json;
use medann::MedannError;
use std::sync::Arc;

use super::AppState;
use crate::dto::{ClassifyQuery, ClassifyResponse};

/// Classify an uploaded X-ray by majority vote over its nearest neighbors.
#[utoipa::path(
    post,
    path = "/classify",
    tag = "classify",
    params(ClassifyQuery),
    request_body(content = crate::dto::UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Predicted class and neighbor vote counts", body = ClassifyResponse),
        (status = 400, description = "Missing or unreadable image, or k out of range", body = serde_json::Value),
        (status = 503, description = "No corpus loaded", body = serde_json::Value)
    )
)]
pub async fn classify(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ClassifyQuery>,
    mut multipart: Multipart,
) -> Result<Json<ClassifyResponse>, MedannError> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut form_k: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| MedannError::InvalidUpload(e.body_text()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| MedannError::InvalidUpload(e.body_text()))?;
                upload = Some((file_name, bytes.to_vec()));
            }
            Some("k") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| MedannError::InvalidUpload(e.body_text()))?;
                form_k = Some(text);
            }
            _ => {}
        }
    }

    let (file_name, bytes) = upload
        .ok_or_else(|| MedannError::InvalidUpload("missing multipart field `image`".into()))?;
    if bytes.is_empty() {
        return Err(MedannError::InvalidUpload("uploaded image is empty".into()));
    }

    let k = match form_k {
        Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
            MedannError::InvalidUpload(format!("k must be a positive integer, got {raw:?}"))
        })?,
        None => query.k.unwrap_or_else(|| state.classifier.default_k()),
    };

    let classifier = Arc::clone(&state.classifier);
    let prediction = tokio::task::spawn_blocking(move || {
        classifier.classify_image_bytes(&bytes, &file_name, k)
    })
    .await
    .map_err(|e| MedannError::Model(format!("classification task failed: {e}")))??;

    tracing::info!(
        label = %prediction.label,
        k = prediction.k,
        votes = prediction.votes(),
        "Classified upload"
    );
    Ok(Json(ClassifyResponse::from(prediction)))
}
