pub mod forest;
#[cfg(feature = "hnsw")]
pub mod hnsw;

pub use forest::ForestIndex;
#[cfg(feature = "hnsw")]
pub use hnsw::HnswIndex;

use crate::config::{IndexBackend, IndexConfig, Metric};
use crate::error::{MedannError, Result};
use crate::types::{LabeledSample, Neighbor};

/// Read-only approximate nearest-neighbor structure over a fixed set of
/// vectors. Identifiers are dense positions `0..len()` in build order.
pub trait NeighborIndex: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dimensions(&self) -> usize;

    /// Up to `k` neighbors ordered by increasing distance. When `k >= len()`
    /// every identifier is returned.
    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>>;
}

/// Build the index backend named by `config` over `samples`.
///
/// The i-th sample receives identifier `i`.
pub fn build_index(
    samples: &[LabeledSample],
    config: &IndexConfig,
) -> Result<Box<dyn NeighborIndex>> {
    let vectors: Vec<&[f32]> = samples.iter().map(|s| s.embedding.as_slice()).collect();
    check_vectors(&vectors)?;

    let index: Box<dyn NeighborIndex> = match config.backend {
        IndexBackend::Forest => Box::new(ForestIndex::build(&vectors, config)?),
        #[cfg(feature = "hnsw")]
        IndexBackend::Hnsw => Box::new(HnswIndex::build(&vectors, config)?),
        #[cfg(not(feature = "hnsw"))]
        IndexBackend::Hnsw => {
            return Err(MedannError::Config(
                "hnsw index backend requires the `hnsw` feature".into(),
            ))
        }
    };
    tracing::info!(
        backend = ?config.backend,
        metric = ?config.metric,
        samples = index.len(),
        dimensions = index.dimensions(),
        "Built neighbor index"
    );
    Ok(index)
}

/// Reject empty input and vectors of mixed length.
pub(crate) fn check_vectors(vectors: &[&[f32]]) -> Result<usize> {
    let first = vectors.first().ok_or(MedannError::EmptyCorpus)?;
    let dims = first.len();
    if dims == 0 {
        return Err(MedannError::DimensionMismatch {
            expected: 1,
            got: 0,
        });
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
        return Err(MedannError::DimensionMismatch {
            expected: dims,
            got: bad.len(),
        });
    }
    Ok(dims)
}

pub(crate) fn check_query(vector: &[f32], dimensions: usize) -> Result<()> {
    if vector.len() != dimensions {
        return Err(MedannError::DimensionMismatch {
            expected: dimensions,
            got: vector.len(),
        });
    }
    Ok(())
}

pub(crate) fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Unit-length copy of `v`; the zero vector is returned unchanged.
pub(crate) fn normalized(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

/// Vector as stored by an index for the given metric.
pub(crate) fn prepare(v: &[f32], metric: Metric) -> Vec<f32> {
    match metric {
        Metric::Euclidean => v.to_vec(),
        Metric::Angular => normalized(v),
    }
}

/// Exact ranking of `ids` against `query`, ties broken by ascending id.
pub(crate) fn rank_exact(
    vectors: &[Vec<f32>],
    ids: impl IntoIterator<Item = usize>,
    query: &[f32],
    k: usize,
) -> Vec<Neighbor> {
    let mut hits: Vec<Neighbor> = ids
        .into_iter()
        .map(|id| Neighbor {
            id,
            distance: euclidean(&vectors[id], query),
        })
        .collect();
    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
    hits.truncate(k);
    hits
}
