use http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum MedannError {
    #[error("Unreadable image {input}: {reason}")]
    UnreadableImage { input: String, reason: String },

    #[error("Cannot build a neighbor index from an empty corpus")]
    EmptyCorpus,

    #[error("Invalid neighbor count k={k}: must be between 1 and {max}")]
    InvalidK { k: usize, max: usize },

    #[error("Label table has {labels_len} entries but the index holds {index_len} vectors")]
    LabelTableMismatch { index_len: usize, labels_len: usize },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Corpus file {path} could not be parsed: {reason}")]
    CorpusFormat { path: String, reason: String },

    #[error("Model error: {0}")]
    Model(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Invalid upload: {0}")]
    InvalidUpload(String),
}

pub type Result<T> = std::result::Result<T, MedannError>;

impl From<std::io::Error> for MedannError {
    fn from(e: std::io::Error) -> Self {
        MedannError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for MedannError {
    fn from(e: serde_json::Error) -> Self {
        MedannError::Json(e.to_string())
    }
}

impl MedannError {
    /// Wrap any decode or conversion failure for a named input.
    pub fn unreadable(input: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        MedannError::UnreadableImage {
            input: input.into(),
            reason: reason.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            MedannError::UnreadableImage { .. } => StatusCode::BAD_REQUEST,
            MedannError::EmptyCorpus => StatusCode::SERVICE_UNAVAILABLE,
            MedannError::InvalidK { .. } => StatusCode::BAD_REQUEST,
            MedannError::LabelTableMismatch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            MedannError::DimensionMismatch { .. } => StatusCode::BAD_REQUEST,
            MedannError::CorpusFormat { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            MedannError::Model(_) => StatusCode::INTERNAL_SERVER_ERROR,
            MedannError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            MedannError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            MedannError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            MedannError::InvalidUpload(_) => StatusCode::BAD_REQUEST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── status_code mapping ─────────────────────────────────────────────

    #[test]
    fn unreadable_image_is_400() {
        let e = MedannError::unreadable("scan.png", "bad magic bytes");
        assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn empty_corpus_is_503() {
        assert_eq!(
            MedannError::EmptyCorpus.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn invalid_k_is_400() {
        let e = MedannError::InvalidK { k: 0, max: 50 };
        assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn label_table_mismatch_is_500() {
        let e = MedannError::LabelTableMismatch {
            index_len: 10,
            labels_len: 9,
        };
        assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn corpus_format_is_500() {
        let e = MedannError::CorpusFormat {
            path: "COVID_embeddings.json".into(),
            reason: "expected array".into(),
        };
        assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    // ── Display ─────────────────────────────────────────────────────────

    #[test]
    fn unreadable_display_names_the_source() {
        let e = MedannError::unreadable("Normal/img_001.png", "truncated");
        let msg = e.to_string();
        assert!(msg.contains("Normal/img_001.png"));
        assert!(msg.contains("truncated"));
    }

    #[test]
    fn label_mismatch_display_includes_both_lengths() {
        let e = MedannError::LabelTableMismatch {
            index_len: 7,
            labels_len: 6,
        };
        let msg = e.to_string();
        assert!(msg.contains('7'));
        assert!(msg.contains('6'));
    }

    // ── From conversions ────────────────────────────────────────────────

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: MedannError = io_err.into();
        assert!(matches!(err, MedannError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: MedannError = json_err.into();
        assert!(matches!(err, MedannError::Json(_)));
    }

    #[test]
    fn json_error_is_500() {
        // Config and corpus files are read server-side; a bad one is not the
        // caller's fault.
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: MedannError = json_err.into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[cfg(feature = "axum-support")]
    mod into_response_tests {
        use super::*;
        use axum::response::IntoResponse;

        #[test]
        fn into_response_status_matches_status_code_for_all_variants() {
            let errors: Vec<MedannError> = vec![
                MedannError::unreadable("x", "y"),
                MedannError::EmptyCorpus,
                MedannError::InvalidK { k: 51, max: 50 },
                MedannError::LabelTableMismatch {
                    index_len: 1,
                    labels_len: 2,
                },
                MedannError::DimensionMismatch {
                    expected: 2048,
                    got: 1000,
                },
                MedannError::CorpusFormat {
                    path: "p".into(),
                    reason: "r".into(),
                },
                MedannError::Model("m".into()),
                MedannError::Config("c".into()),
                MedannError::Io("io".into()),
                MedannError::Json("j".into()),
                MedannError::InvalidUpload("u".into()),
            ];
            for e in errors {
                let expected = e.status_code();
                let actual = e.clone().into_response().status();
                assert_eq!(
                    actual, expected,
                    "into_response() status ({}) != status_code() ({}) for {:?}",
                    actual, expected, e
                );
            }
        }

        #[test]
        fn empty_corpus_response_has_retry_after() {
            let response = MedannError::EmptyCorpus.into_response();
            assert_eq!(
                response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok()),
                Some("30")
            );
        }
    }
}

// Axum IntoResponse implementation (feature-gated)
#[cfg(feature = "axum-support")]
use axum::response::{IntoResponse, Json, Response};
#[cfg(feature = "axum-support")]
use serde::Serialize;

#[cfg(feature = "axum-support")]
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

#[cfg(feature = "axum-support")]
impl IntoResponse for MedannError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (error_code, suggestion) = match &self {
            MedannError::UnreadableImage { .. } => (
                "unreadable_image",
                Some("Upload a PNG or JPEG chest X-ray".to_string()),
            ),
            MedannError::EmptyCorpus => (
                "empty_corpus",
                Some("Run `medann embed` to populate the embeddings directory".to_string()),
            ),
            MedannError::InvalidK { max, .. } => (
                "invalid_k",
                Some(format!("Choose k between 1 and {}", max)),
            ),
            MedannError::LabelTableMismatch { .. } => ("label_table_mismatch", None),
            MedannError::DimensionMismatch { .. } => (
                "dimension_mismatch",
                Some("Re-embed the corpus with the configured backbone layer".to_string()),
            ),
            MedannError::CorpusFormat { .. } => ("corpus_format", None),
            MedannError::Model(_) => ("model_error", None),
            MedannError::Config(_) => ("config_error", None),
            MedannError::Io(_) => ("io_error", None),
            MedannError::Json(_) => ("json_error", None),
            MedannError::InvalidUpload(_) => (
                "invalid_upload",
                Some("Send multipart/form-data with an `image` file field".to_string()),
            ),
        };

        let error_response = ErrorResponse {
            error: error_code.to_string(),
            message: self.to_string(),
            request_id: format!("req_ma_{}", uuid::Uuid::new_v4()),
            suggestion,
        };

        let mut response = (status, Json(error_response)).into_response();
        if matches!(&self, MedannError::EmptyCorpus) {
            response
                .headers_mut()
                .insert("Retry-After", http::HeaderValue::from_static("30"));
        }
        response
    }
}
