use std::path::Path;
use std::sync::Arc;

use image::DynamicImage;

use super::backbone::{create_backbone, Backbone};
use super::preprocess::Preprocessor;
use crate::config::MedannConfig;
use crate::error::{MedannError, Result};
use crate::types::Embedding;

/// Maps an image to a fixed-length [`Embedding`].
///
/// The backbone is injected at construction and shared behind an `Arc`, so
/// callers (and tests) choose the model explicitly rather than relying on a
/// process-wide instance.
#[derive(Clone)]
pub struct FeatureExtractor {
    preprocessor: Preprocessor,
    backbone: Arc<dyn Backbone>,
}

impl std::fmt::Debug for FeatureExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureExtractor")
            .field("preprocessor", &self.preprocessor)
            .field("backbone", &self.backbone.name())
            .field("dimensions", &self.backbone.output_dim())
            .finish()
    }
}

impl FeatureExtractor {
    pub fn new(preprocessor: Preprocessor, backbone: Arc<dyn Backbone>) -> Self {
        Self {
            preprocessor,
            backbone,
        }
    }

    /// Build the preprocessor and backbone described by `config`.
    pub fn from_config(config: &MedannConfig) -> Result<Self> {
        let preprocessor = Preprocessor::new(&config.preprocess)?;
        let backbone = create_backbone(&config.backbone)?;
        Ok(Self::new(preprocessor, backbone))
    }

    pub fn dimensions(&self) -> usize {
        self.backbone.output_dim()
    }

    pub fn backbone_name(&self) -> &str {
        self.backbone.name()
    }

    pub fn embed(&self, image: &DynamicImage) -> Result<Embedding> {
        let tensor = self.preprocessor.tensor(image);
        let values = self.backbone.forward(&tensor)?;
        if values.len() != self.backbone.output_dim() {
            return Err(MedannError::Model(format!(
                "{} produced {} values, expected {}",
                self.backbone.name(),
                values.len(),
                self.backbone.output_dim()
            )));
        }
        Ok(Embedding::new(values))
    }

    /// Decode and embed an in-memory upload. `name` only labels errors.
    pub fn embed_bytes(&self, bytes: &[u8], name: &str) -> Result<Embedding> {
        let image = self.preprocessor.decode(bytes, name)?;
        self.embed(&image)
    }

    pub fn embed_path(&self, path: &Path) -> Result<Embedding> {
        let name = path.display().to_string();
        let bytes = std::fs::read(path).map_err(|e| MedannError::unreadable(&name, e))?;
        self.embed_bytes(&bytes, &name)
    }
}
