use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;

use crate::config::PreprocessConfig;
use crate::error::{MedannError, Result};

/// Deterministic image → tensor pipeline.
///
/// Order matters and matches what the pretrained weights expect:
/// 1. convert to 3-channel RGB (drops alpha, expands grayscale),
/// 2. resize to `image_size × image_size` (bilinear),
/// 3. scale intensities to `[0, 1]`,
/// 4. normalize each channel with `(x - mean) / std`.
///
/// Output is NCHW with a batch dimension of one.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    image_size: u32,
    mean: [f32; 3],
    std: [f32; 3],
}

impl Preprocessor {
    pub fn new(config: &PreprocessConfig) -> Result<Self> {
        if config.image_size == 0 {
            return Err(MedannError::Config(
                "preprocess.image_size must be positive".into(),
            ));
        }
        if config.std.iter().any(|s| *s <= 0.0) {
            return Err(MedannError::Config(
                "preprocess.std entries must be positive".into(),
            ));
        }
        Ok(Self {
            image_size: config.image_size,
            mean: config.mean,
            std: config.std,
        })
    }

    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    /// Decode raw bytes (PNG/JPEG) into an image.
    pub fn decode(&self, bytes: &[u8], name: &str) -> Result<DynamicImage> {
        image::load_from_memory(bytes).map_err(|e| MedannError::unreadable(name, e))
    }

    pub fn tensor(&self, image: &DynamicImage) -> Array4<f32> {
        let size = self.image_size;
        let rgb = image.to_rgb8();
        let resized = image::imageops::resize(&rgb, size, size, FilterType::Triangle);

        let side = size as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                let value = f32::from(pixel[c]) / 255.0;
                tensor[[0, c, y as usize, x as usize]] = (value - self.mean[c]) / self.std[c];
            }
        }
        tensor
    }
}
