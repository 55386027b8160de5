pub mod backbone;
pub mod extractor;
pub mod preprocess;

pub use backbone::{create_backbone, Backbone, GridPoolBackbone};
pub use extractor::FeatureExtractor;
pub use preprocess::Preprocessor;

#[cfg(feature = "resnet")]
pub use backbone::ResNet50Backbone;
