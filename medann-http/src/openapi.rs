use axum::Json;
use utoipa::OpenApi;

use crate::dto::{ClassifyResponse, LabelInfo, LabelsResponse, NeighborCount, NeighborHit, UploadForm};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "medann",
        description = "k-NN classification of chest X-ray images over a precomputed embedding corpus"
    ),
    paths(
        crate::handlers::classify::classify,
        crate::handlers::labels::labels,
        crate::handlers::health::health,
    ),
    components(schemas(
        ClassifyResponse,
        NeighborCount,
        NeighborHit,
        LabelsResponse,
        LabelInfo,
        UploadForm,
    )),
    tags(
        (name = "classify", description = "Image classification"),
        (name = "health", description = "Liveness and corpus summary"),
    )
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in ["/classify", "/labels", "/health"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json["components"]["schemas"]["ClassifyResponse"].is_object());
    }
}
