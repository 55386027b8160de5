use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MedannError, Result};

pub const CONFIG_FILE_NAME: &str = "medann.json";

/// Top-level configuration, threaded into each component's constructor.
///
/// Every field has a default, so a partial `medann.json` only needs to name
/// the values it overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MedannConfig {
    pub preprocess: PreprocessConfig,
    pub backbone: BackboneConfig,
    pub index: IndexConfig,
    pub classifier: ClassifierConfig,
    pub ingest: IngestConfig,
}

/// Image preprocessing constants. The mean/std triples are the ImageNet
/// statistics the pretrained ResNet-50 weights were trained with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub image_size: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            image_size: 224,
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackboneKind {
    #[default]
    Resnet50,
    GridPool,
}

/// Which ResNet-50 activation becomes the embedding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureLayer {
    /// Global-average-pooled output of the last residual stage (2048 values).
    #[default]
    Pooled,
    /// ImageNet classification head output (1000 values).
    Logits,
}

impl FeatureLayer {
    pub fn resnet50_dimensions(self) -> usize {
        match self {
            FeatureLayer::Pooled => 2048,
            FeatureLayer::Logits => 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackboneConfig {
    pub kind: BackboneKind,
    /// Safetensors file holding the pretrained ResNet-50 weights.
    pub weights: Option<PathBuf>,
    pub layer: FeatureLayer,
    /// Cells per side for the grid-pool backbone.
    pub grid: usize,
}

impl Default for BackboneConfig {
    fn default() -> Self {
        Self {
            kind: BackboneKind::Resnet50,
            weights: None,
            layer: FeatureLayer::Pooled,
            grid: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexBackend {
    #[default]
    Forest,
    Hnsw,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    Euclidean,
    /// Euclidean distance between unit-normalized vectors.
    Angular,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub backend: IndexBackend,
    /// Number of random-projection trees. More trees raise recall at a
    /// roughly linear build cost.
    pub num_trees: usize,
    pub leaf_size: usize,
    /// Candidates gathered per query before exact re-ranking. Defaults to
    /// `k * num_trees` when unset.
    pub search_k: Option<usize>,
    pub metric: Metric,
    pub seed: u64,
    /// HNSW graph degree; 0 lets usearch choose.
    pub connectivity: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::Forest,
            num_trees: 10,
            leaf_size: 32,
            search_k: None,
            metric: Metric::Euclidean,
            seed: 42,
            connectivity: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub default_k: usize,
    pub max_k: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            default_k: 20,
            max_k: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageFormat {
    #[default]
    Json,
    Csv,
}

impl StorageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            StorageFormat::Json => "json",
            StorageFormat::Csv => "csv",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "json" => Some(StorageFormat::Json),
            "csv" => Some(StorageFormat::Csv),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub extensions: Vec<String>,
    pub skip_dirs: Vec<String>,
    pub format: StorageFormat,
    pub error_log: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["png".into(), "jpg".into(), "jpeg".into()],
            skip_dirs: vec!["test".into()],
            format: StorageFormat::Json,
            error_log: "error_log.txt".into(),
        }
    }
}

impl MedannConfig {
    /// Load configuration from `{dir}/medann.json`, falling back to defaults
    /// when the file is missing or cannot be parsed.
    pub fn load_or_default(dir: &Path) -> Self {
        let path = dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            tracing::info!("No {} in {}, using defaults", CONFIG_FILE_NAME, dir.display());
            return Self::default().with_env_overrides();
        }
        match Self::load(&path) {
            Ok(config) => {
                tracing::info!(
                    path = %path.display(),
                    backbone = ?config.backbone.kind,
                    num_trees = config.index.num_trees,
                    "Loaded config"
                );
                config
            }
            Err(e) => {
                tracing::error!("Failed to load {}: {}, using defaults", path.display(), e);
                Self::default().with_env_overrides()
            }
        }
    }

    /// Load and validate a config file. Errors are returned, not swallowed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: MedannConfig = serde_json::from_str(&content)
            .map_err(|e| MedannError::Config(format!("{}: {}", path.display(), e)))?;
        let config = config.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// `MEDANN_WEIGHTS` overrides the configured weights path.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(weights) = std::env::var_os("MEDANN_WEIGHTS").filter(|v| !v.is_empty()) {
            self.backbone.weights = Some(PathBuf::from(weights));
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        if self.preprocess.image_size == 0 {
            problems.push("preprocess.image_size must be positive".to_string());
        }
        if self.preprocess.std.iter().any(|s| *s <= 0.0 || !s.is_finite()) {
            problems.push("preprocess.std entries must be positive".to_string());
        }
        if self.backbone.grid == 0 {
            problems.push("backbone.grid must be positive".to_string());
        }
        if self.index.num_trees == 0 {
            problems.push("index.num_trees must be positive".to_string());
        }
        if self.index.leaf_size == 0 {
            problems.push("index.leaf_size must be positive".to_string());
        }
        if self.classifier.max_k == 0 {
            problems.push("classifier.max_k must be positive".to_string());
        }
        if self.classifier.default_k == 0 || self.classifier.default_k > self.classifier.max_k {
            problems.push(format!(
                "classifier.default_k must be between 1 and {}",
                self.classifier.max_k
            ));
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(MedannError::Config(problems.join("; ")))
        }
    }
}
