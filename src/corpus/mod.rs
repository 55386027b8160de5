pub mod ingest;
pub mod store;

pub use ingest::{IngestFailure, IngestReport, Ingestor};
pub use store::{CorpusStore, LoadFailure, LoadReport};

use indexmap::IndexMap;

use crate::config::IndexConfig;
use crate::error::Result;
use crate::index::{build_index, NeighborIndex};
use crate::types::{Embedding, LabelCode, LabeledSample, SampleId};

/// Arena of labeled samples. A sample's position is its [`SampleId`] in
/// every index built from this corpus.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Corpus {
    samples: Vec<LabeledSample>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_samples(samples: Vec<LabeledSample>) -> Self {
        Self { samples }
    }

    /// Append one sample and return its id.
    pub fn push(&mut self, sample: LabeledSample) -> SampleId {
        self.samples.push(sample);
        self.samples.len() - 1
    }

    pub fn extend_class(&mut self, label: &str, embeddings: impl IntoIterator<Item = Embedding>) {
        self.samples.extend(
            embeddings
                .into_iter()
                .map(|embedding| LabeledSample::new(embedding, label)),
        );
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[LabeledSample] {
        &self.samples
    }

    pub fn get(&self, id: SampleId) -> Option<&LabeledSample> {
        self.samples.get(id)
    }

    /// Dimension of the first sample, if any.
    pub fn dimensions(&self) -> Option<usize> {
        self.samples.first().map(|s| s.embedding.dimensions())
    }

    /// Id → label table in arena order.
    pub fn labels(&self) -> Vec<LabelCode> {
        self.samples.iter().map(|s| s.label.clone()).collect()
    }

    /// Sample count per label, in first-seen order.
    pub fn class_counts(&self) -> IndexMap<LabelCode, usize> {
        let mut counts = IndexMap::new();
        for sample in &self.samples {
            *counts.entry(sample.label.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Build a neighbor index over the corpus. Index and label table are
    /// derived together from the same arena and travel together afterwards.
    pub fn build(self, config: &IndexConfig) -> Result<IndexedCorpus> {
        let index = build_index(&self.samples, config)?;
        let labels = self.labels();
        Ok(IndexedCorpus {
            corpus: self,
            labels,
            index,
        })
    }
}

impl FromIterator<LabeledSample> for Corpus {
    fn from_iter<I: IntoIterator<Item = LabeledSample>>(iter: I) -> Self {
        Self::from_samples(iter.into_iter().collect())
    }
}

/// A corpus together with the index built over it. Read-only; rebuild from
/// the corpus to change it.
pub struct IndexedCorpus {
    corpus: Corpus,
    labels: Vec<LabelCode>,
    index: Box<dyn NeighborIndex>,
}

impl std::fmt::Debug for IndexedCorpus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedCorpus")
            .field("samples", &self.corpus.len())
            .field("dimensions", &self.index.dimensions())
            .finish()
    }
}

impl IndexedCorpus {
    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn labels(&self) -> &[LabelCode] {
        &self.labels
    }

    pub fn index(&self) -> &dyn NeighborIndex {
        self.index.as_ref()
    }

    pub fn len(&self) -> usize {
        self.corpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.index.dimensions()
    }

    pub fn into_corpus(self) -> Corpus {
        self.corpus
    }
}
