use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Dense position of a sample inside a [`crate::corpus::Corpus`]. The same
/// integer addresses the sample's vector inside every neighbor index built
/// from that corpus.
pub type SampleId = usize;

/// Class code as stored on disk (`"COVID"`, `"Lung"`, ...).
pub type LabelCode = String;

/// A fixed-length feature vector produced by the feature extractor.
///
/// Immutable once created: there is no mutable access to the inner values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

impl AsRef<[f32]> for Embedding {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

/// One corpus entry: an embedding paired with its class code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledSample {
    pub embedding: Embedding,
    pub label: LabelCode,
}

impl LabeledSample {
    pub fn new(embedding: impl Into<Embedding>, label: impl Into<LabelCode>) -> Self {
        Self {
            embedding: embedding.into(),
            label: label.into(),
        }
    }
}

/// A single hit from a neighbor query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: SampleId,
    pub distance: f32,
}

/// A neighbor hit joined with the label of the sample it points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledNeighbor {
    pub id: SampleId,
    pub label: LabelCode,
    pub distance: f32,
}

/// Outcome of a majority vote over the k nearest corpus samples.
///
/// `counts` preserves the order in which labels were first seen while
/// walking neighbors from nearest to farthest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: LabelCode,
    pub counts: IndexMap<LabelCode, usize>,
    pub neighbors: Vec<LabeledNeighbor>,
    pub k: usize,
}

impl Prediction {
    /// Number of neighbors that voted for the winning label.
    pub fn votes(&self) -> usize {
        self.counts.get(&self.label).copied().unwrap_or(0)
    }
}
