use std::sync::Arc;

use ndarray::{Array4, Axis};

use crate::config::{BackboneConfig, BackboneKind};
use crate::error::{MedannError, Result};

/// A frozen network mapping a preprocessed `[1, 3, H, W]` tensor to a flat
/// feature vector. Implementations hold no mutable state, so one instance
/// can serve every embedding call.
pub trait Backbone: Send + Sync {
    fn name(&self) -> &str;

    /// Length of every vector returned by [`Backbone::forward`].
    fn output_dim(&self) -> usize;

    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>>;
}

// ── GridPoolBackbone ──

/// Average-pools each channel over a `grid × grid` layout.
///
/// Produces `3 * grid * grid` values. No weights and no randomness; used in
/// tests and for smoke runs on machines without the ResNet weights.
#[derive(Debug, Clone)]
pub struct GridPoolBackbone {
    grid: usize,
}

impl GridPoolBackbone {
    pub fn new(grid: usize) -> Result<Self> {
        if grid == 0 {
            return Err(MedannError::Config("backbone.grid must be positive".into()));
        }
        Ok(Self { grid })
    }
}

impl Backbone for GridPoolBackbone {
    fn name(&self) -> &str {
        "grid_pool"
    }

    fn output_dim(&self) -> usize {
        3 * self.grid * self.grid
    }

    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>> {
        let (batch, channels, height, width) = input.dim();
        if batch != 1 || channels != 3 {
            return Err(MedannError::Model(format!(
                "grid_pool expects a [1, 3, H, W] tensor, got {:?}",
                input.shape()
            )));
        }
        if height < self.grid || width < self.grid {
            return Err(MedannError::Model(format!(
                "grid {} is larger than the {}x{} input",
                self.grid, height, width
            )));
        }

        let image = input.index_axis(Axis(0), 0);
        let mut out = Vec::with_capacity(self.output_dim());
        for channel in image.axis_iter(Axis(0)) {
            for gy in 0..self.grid {
                let (y0, y1) = (gy * height / self.grid, (gy + 1) * height / self.grid);
                for gx in 0..self.grid {
                    let (x0, x1) = (gx * width / self.grid, (gx + 1) * width / self.grid);
                    let cell = channel.slice(ndarray::s![y0..y1, x0..x1]);
                    out.push(cell.mean().unwrap_or(0.0));
                }
            }
        }
        Ok(out)
    }
}

// ── ResNet50Backbone ──

/// Pretrained ResNet-50 evaluated with candle on the CPU.
///
/// Weights are read once from a safetensors file (the layout published for
/// candle's ResNet implementation, `resnet50.safetensors`).
#[cfg(feature = "resnet")]
pub struct ResNet50Backbone {
    model: candle_nn::Func<'static>,
    device: candle_core::Device,
    layer: crate::config::FeatureLayer,
}

#[cfg(feature = "resnet")]
impl std::fmt::Debug for ResNet50Backbone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResNet50Backbone")
            .field("layer", &self.layer)
            .finish()
    }
}

#[cfg(feature = "resnet")]
impl ResNet50Backbone {
    pub fn load(weights: &std::path::Path, layer: crate::config::FeatureLayer) -> Result<Self> {
        use crate::config::FeatureLayer;
        use candle_transformers::models::resnet;

        if !weights.exists() {
            return Err(MedannError::Config(format!(
                "ResNet-50 weights not found at {}",
                weights.display()
            )));
        }
        let device = candle_core::Device::Cpu;
        // SAFETY: the weights file is memory-mapped read-only and is not
        // modified for the lifetime of the process.
        let vb = unsafe {
            candle_nn::VarBuilder::from_mmaped_safetensors(
                &[weights],
                candle_core::DType::F32,
                &device,
            )
        }
        .map_err(|e| MedannError::Model(format!("failed to map weights: {e}")))?;

        let model = match layer {
            FeatureLayer::Pooled => resnet::resnet50_no_final_layer(vb),
            FeatureLayer::Logits => resnet::resnet50(1000, vb),
        }
        .map_err(|e| MedannError::Model(format!("failed to build ResNet-50: {e}")))?;

        tracing::info!(weights = %weights.display(), ?layer, "Loaded ResNet-50 weights");
        Ok(Self {
            model,
            device,
            layer,
        })
    }
}

#[cfg(feature = "resnet")]
impl Backbone for ResNet50Backbone {
    fn name(&self) -> &str {
        "resnet50"
    }

    fn output_dim(&self) -> usize {
        self.layer.resnet50_dimensions()
    }

    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>> {
        use candle_core::Module;

        let (n, c, h, w) = input.dim();
        let data: Vec<f32> = input.iter().copied().collect();
        let tensor = candle_core::Tensor::from_vec(data, (n, c, h, w), &self.device)
            .map_err(|e| MedannError::Model(e.to_string()))?;
        self.model
            .forward(&tensor)
            .and_then(|out| out.flatten_all())
            .and_then(|out| out.to_vec1::<f32>())
            .map_err(|e| MedannError::Model(format!("ResNet-50 forward failed: {e}")))
    }
}

// ── Factory ──

/// Instantiate the backbone named by the config.
pub fn create_backbone(config: &BackboneConfig) -> Result<Arc<dyn Backbone>> {
    match config.kind {
        BackboneKind::GridPool => Ok(Arc::new(GridPoolBackbone::new(config.grid)?)),
        #[cfg(feature = "resnet")]
        BackboneKind::Resnet50 => {
            let weights = config.weights.as_deref().ok_or_else(|| {
                MedannError::Config(
                    "backbone.weights (or MEDANN_WEIGHTS) must point at resnet50.safetensors"
                        .into(),
                )
            })?;
            Ok(Arc::new(ResNet50Backbone::load(weights, config.layer)?))
        }
        #[cfg(not(feature = "resnet"))]
        BackboneKind::Resnet50 => Err(MedannError::Config(format!(
            "resnet50 backbone requires the `resnet` feature; rebuild with --features resnet, \
             or set {{\"backbone\": {{\"kind\": \"grid_pool\"}}}} in {}",
            crate::config::CONFIG_FILE_NAME
        ))),
    }
}
