use medann::Classifier;
use std::sync::Arc;

pub mod classify;
pub mod health;
pub mod labels;
pub mod page;

pub use classify::classify;
pub use health::health;
pub use labels::labels;
pub use page::page_handler;

/// Shared, read-only state for every handler. The classifier owns the
/// extractor and the prebuilt index; nothing mutates it after startup.
pub struct AppState {
    pub classifier: Arc<Classifier>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(classifier: Classifier) -> Self {
        Self {
            classifier: Arc::new(classifier),
            start_time: std::time::Instant::now(),
        }
    }
}
