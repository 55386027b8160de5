use usearch::ffi::{IndexOptions, MetricKind, ScalarKind};
use usearch::Index;

use super::{check_query, check_vectors, prepare, rank_exact, NeighborIndex};
use crate::config::{IndexConfig, Metric};
use crate::error::{MedannError, Result};
use crate::types::Neighbor;

/// HNSW graph index backed by usearch.
///
/// usearch keys are the sample ids themselves, so no id map is needed. The
/// prepared vectors are kept alongside the graph for the exhaustive path
/// taken when `k` covers the whole corpus.
pub struct HnswIndex {
    inner: Index,
    vectors: Vec<Vec<f32>>,
    dimensions: usize,
    metric: Metric,
}

impl HnswIndex {
    pub fn build(vectors: &[&[f32]], config: &IndexConfig) -> Result<Self> {
        let dimensions = check_vectors(vectors)?;
        // Angular vectors are normalized up front, so L2 ranks them the same
        // way cosine would.
        let options = IndexOptions {
            dimensions,
            metric: MetricKind::L2sq,
            quantization: ScalarKind::F32,
            connectivity: config.connectivity,
            expansion_add: 0,
            expansion_search: 0,
            multi: false,
        };
        let inner = Index::new(&options).map_err(|e| MedannError::Model(e.to_string()))?;
        inner
            .reserve(vectors.len())
            .map_err(|e| MedannError::Model(e.to_string()))?;

        let stored: Vec<Vec<f32>> = vectors.iter().map(|v| prepare(v, config.metric)).collect();
        for (id, v) in stored.iter().enumerate() {
            inner
                .add(id as u64, v)
                .map_err(|e| MedannError::Model(e.to_string()))?;
        }

        Ok(Self {
            inner,
            vectors: stored,
            dimensions,
            metric: config.metric,
        })
    }

    pub fn memory_usage(&self) -> usize {
        self.inner.memory_usage()
    }
}

impl NeighborIndex for HnswIndex {
    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        check_query(vector, self.dimensions)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let query = prepare(vector, self.metric);
        if k >= self.vectors.len() {
            return Ok(rank_exact(&self.vectors, 0..self.vectors.len(), &query, k));
        }

        let matches = self
            .inner
            .search(&query, k)
            .map_err(|e| MedannError::Model(e.to_string()))?;
        let mut hits: Vec<Neighbor> = matches
            .keys
            .iter()
            .zip(matches.distances.iter())
            .map(|(key, d)| Neighbor {
                id: *key as usize,
                distance: d.max(0.0).sqrt(),
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(points: &[Vec<f32>]) -> HnswIndex {
        let refs: Vec<&[f32]> = points.iter().map(|p| p.as_slice()).collect();
        HnswIndex::build(&refs, &IndexConfig::default()).unwrap()
    }

    fn grid() -> Vec<Vec<f32>> {
        (0..10)
            .flat_map(|x| (0..10).map(move |y| vec![x as f32, y as f32]))
            .collect()
    }

    #[test]
    fn self_retrieval() {
        let pts = grid();
        let index = build(&pts);
        for (id, p) in pts.iter().enumerate() {
            assert_eq!(index.query(p, 1).unwrap()[0].id, id);
        }
    }

    #[test]
    fn distances_are_euclidean() {
        let index = build(&[vec![0.0, 0.0], vec![3.0, 4.0], vec![10.0, 10.0]]);
        let hits = index.query(&[0.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].id, 0);
        assert_eq!(hits[1].id, 1);
        assert!((hits[1].distance - 5.0).abs() < 1e-4);
    }

    #[test]
    fn k_covering_corpus_returns_all() {
        let pts = grid();
        let index = build(&pts);
        assert_eq!(index.query(&[4.5, 4.5], 500).unwrap().len(), 100);
    }

    #[test]
    fn rejects_wrong_dimensions() {
        let index = build(&grid());
        assert!(matches!(
            index.query(&[1.0], 3),
            Err(MedannError::DimensionMismatch { .. })
        ));
    }
}
