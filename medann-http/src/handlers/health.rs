use axum::{extract::State, Json};
use std::sync::Arc;

use super::AppState;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Server is healthy", body = serde_json::Value)
    )
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let classifier = &state.classifier;
    let corpus = classifier.corpus();

    Json(serde_json::json!({
        "status": "ok",
        "corpus_size": corpus.len(),
        "dimensions": corpus.dimensions(),
        "classes": corpus.corpus().class_counts(),
        "backbone": classifier.extractor().backbone_name(),
        "default_k": classifier.default_k(),
        "max_k": classifier.max_k(),
        "build_profile": if cfg!(debug_assertions) { "debug" } else { "release" },
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::state;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    async fn get_health() -> serde_json::Value {
        let app = Router::new()
            .route("/health", get(health))
            .with_state(state());

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_reports_corpus() {
        let json = get_health().await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["corpus_size"], 10);
        assert_eq!(json["dimensions"], 3);
        assert_eq!(json["classes"]["COVID"], 5);
        assert_eq!(json["classes"]["Normal"], 5);
        assert_eq!(json["backbone"], "grid_pool");
    }

    #[tokio::test]
    async fn health_includes_uptime_and_version() {
        let json = get_health().await;
        assert!(
            json["uptime_secs"].as_u64().is_some(),
            "uptime_secs should be a number"
        );
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }
}
