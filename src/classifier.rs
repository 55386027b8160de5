use std::path::Path;

use image::DynamicImage;
use indexmap::IndexMap;

use crate::config::ClassifierConfig;
use crate::corpus::IndexedCorpus;
use crate::error::{MedannError, Result};
use crate::index::NeighborIndex;
use crate::types::{LabelCode, LabeledNeighbor, Prediction};
use crate::vision::FeatureExtractor;

/// Majority vote over the `k` nearest corpus samples.
///
/// `labels[i]` must be the label of index id `i`. `k` must be at least one
/// and is clamped to the corpus size. Among labels tied for the highest
/// count, the one whose first vote came from the nearest neighbor wins.
pub fn classify(
    index: &dyn NeighborIndex,
    labels: &[LabelCode],
    vector: &[f32],
    k: usize,
) -> Result<Prediction> {
    if labels.len() != index.len() {
        return Err(MedannError::LabelTableMismatch {
            index_len: index.len(),
            labels_len: labels.len(),
        });
    }
    if index.is_empty() {
        return Err(MedannError::EmptyCorpus);
    }
    if k == 0 {
        return Err(MedannError::InvalidK {
            k,
            max: index.len(),
        });
    }
    let k = k.min(index.len());

    let mut neighbors = Vec::with_capacity(k);
    let mut counts: IndexMap<LabelCode, usize> = IndexMap::new();
    for hit in index.query(vector, k)? {
        let label = labels
            .get(hit.id)
            .ok_or(MedannError::LabelTableMismatch {
                index_len: index.len(),
                labels_len: labels.len(),
            })?
            .clone();
        *counts.entry(label.clone()).or_insert(0) += 1;
        neighbors.push(LabeledNeighbor {
            id: hit.id,
            label,
            distance: hit.distance,
        });
    }

    // IndexMap iterates in first-seen order; strict `>` keeps the earliest
    // label on ties.
    let mut winner: Option<(&LabelCode, usize)> = None;
    for (label, &count) in &counts {
        if winner.map_or(true, |(_, best)| count > best) {
            winner = Some((label, count));
        }
    }
    let label = winner
        .map(|(label, _)| label.clone())
        .ok_or(MedannError::EmptyCorpus)?;

    Ok(Prediction {
        label,
        counts,
        neighbors,
        k,
    })
}

/// Embeds query images and votes over a prebuilt corpus.
///
/// Owns the extractor and the indexed corpus; both are read-only, so one
/// instance can be shared across request handlers.
#[derive(Debug)]
pub struct Classifier {
    extractor: FeatureExtractor,
    corpus: IndexedCorpus,
    config: ClassifierConfig,
}

impl Classifier {
    pub fn new(
        extractor: FeatureExtractor,
        corpus: IndexedCorpus,
        config: ClassifierConfig,
    ) -> Result<Self> {
        if extractor.dimensions() != corpus.dimensions() {
            return Err(MedannError::DimensionMismatch {
                expected: corpus.dimensions(),
                got: extractor.dimensions(),
            });
        }
        Ok(Self {
            extractor,
            corpus,
            config,
        })
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn corpus(&self) -> &IndexedCorpus {
        &self.corpus
    }

    pub fn default_k(&self) -> usize {
        self.config.default_k
    }

    pub fn max_k(&self) -> usize {
        self.config.max_k
    }

    /// Interactive callers must stay within `1..=max_k`.
    pub fn check_k(&self, k: usize) -> Result<()> {
        if k == 0 || k > self.config.max_k {
            return Err(MedannError::InvalidK {
                k,
                max: self.config.max_k,
            });
        }
        Ok(())
    }

    pub fn classify_vector(&self, vector: &[f32], k: usize) -> Result<Prediction> {
        self.check_k(k)?;
        classify(self.corpus.index(), self.corpus.labels(), vector, k)
    }

    pub fn classify_image(&self, image: &DynamicImage, k: usize) -> Result<Prediction> {
        self.check_k(k)?;
        let embedding = self.extractor.embed(image)?;
        self.classify_vector(embedding.as_slice(), k)
    }

    pub fn classify_image_bytes(&self, bytes: &[u8], name: &str, k: usize) -> Result<Prediction> {
        self.check_k(k)?;
        let embedding = self.extractor.embed_bytes(bytes, name)?;
        let prediction = self.classify_vector(embedding.as_slice(), k)?;
        tracing::debug!(
            input = name,
            k,
            label = %prediction.label,
            votes = prediction.votes(),
            "Classified upload"
        );
        Ok(prediction)
    }

    pub fn classify_path(&self, path: &Path, k: usize) -> Result<Prediction> {
        self.check_k(k)?;
        let embedding = self.extractor.embed_path(path)?;
        self.classify_vector(embedding.as_slice(), k)
    }
}
