use std::path::Path;
use std::sync::Arc;

use image::{Rgb, RgbImage};
use medann::config::{IngestConfig, PreprocessConfig, StorageFormat};
use medann::vision::{GridPoolBackbone, Preprocessor};
use medann::{FeatureExtractor, Ingestor};

/// Base color per class. Images of a class are small perturbations of it,
/// so the grid-pool backbone separates classes cleanly.
pub const CLASSES: [(&str, [u8; 3]); 3] = [
    ("COVID", [200, 40, 40]),
    ("Normal", [30, 30, 30]),
    ("Viral", [40, 60, 220]),
];

pub fn extractor() -> FeatureExtractor {
    FeatureExtractor::new(
        Preprocessor::new(&PreprocessConfig {
            image_size: 32,
            ..PreprocessConfig::default()
        })
        .unwrap(),
        Arc::new(GridPoolBackbone::new(2).unwrap()),
    )
}

#[allow(dead_code)]
pub fn ingestor(format: StorageFormat) -> Ingestor {
    Ingestor::new(
        extractor(),
        IngestConfig {
            format,
            ..IngestConfig::default()
        },
    )
}

pub fn class_image(base: [u8; 3], variant: u8) -> RgbImage {
    RgbImage::from_fn(24, 24, |x, y| {
        let jitter = ((x + y) as u8 % 4).wrapping_add(variant);
        Rgb([
            base[0].saturating_add(jitter),
            base[1].saturating_add(jitter),
            base[2].saturating_sub(jitter),
        ])
    })
}

/// Lay out `<root>/<class>/<n>.png` with `per_class` images per class.
pub fn write_dataset(root: &Path, per_class: u8) {
    for (label, base) in CLASSES {
        let dir = root.join(label);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..per_class {
            class_image(base, i)
                .save(dir.join(format!("{label}-{i:02}.png")))
                .unwrap();
        }
    }
}
