use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{check_query, check_vectors, prepare, rank_exact, NeighborIndex};
use crate::config::{IndexConfig, Metric};
use crate::error::{MedannError, Result};
use crate::types::Neighbor;

/// Attempts at finding a split that puts points on both sides before the
/// node falls back to an alternating split.
const SPLIT_ATTEMPTS: usize = 8;

#[derive(Debug, Clone)]
enum Node {
    Leaf(Vec<usize>),
    Split {
        normal: Vec<f32>,
        offset: f32,
        left: usize,
        right: usize,
    },
}

/// Forest of random-hyperplane trees.
///
/// Each tree recursively splits the point set by the perpendicular bisector
/// of two randomly chosen points until a node holds at most `leaf_size`
/// ids. Queries walk all trees best-first by hyperplane margin, collect a
/// candidate pool, then rank the pool by exact distance.
///
/// More trees raise recall at linear build cost; the candidate pool size
/// (`search_k`, default `k * num_trees`) controls query cost.
#[derive(Debug, Clone)]
pub struct ForestIndex {
    vectors: Vec<Vec<f32>>,
    nodes: Vec<Node>,
    roots: Vec<usize>,
    dimensions: usize,
    metric: Metric,
    search_k: Option<usize>,
}

impl ForestIndex {
    pub fn build(vectors: &[&[f32]], config: &IndexConfig) -> Result<Self> {
        let dimensions = check_vectors(vectors)?;
        if config.num_trees == 0 {
            return Err(MedannError::Config("index.num_trees must be positive".into()));
        }
        let leaf_size = config.leaf_size.max(1);
        let stored: Vec<Vec<f32>> = vectors.iter().map(|v| prepare(v, config.metric)).collect();

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut nodes = Vec::new();
        let mut roots = Vec::with_capacity(config.num_trees);
        for _ in 0..config.num_trees {
            let all: Vec<usize> = (0..stored.len()).collect();
            roots.push(grow_tree(&stored, all, leaf_size, &mut rng, &mut nodes));
        }

        tracing::debug!(
            trees = roots.len(),
            nodes = nodes.len(),
            leaf_size,
            "Grew random-projection forest"
        );
        Ok(Self {
            vectors: stored,
            nodes,
            roots,
            dimensions,
            metric: config.metric,
            search_k: config.search_k,
        })
    }

    pub fn num_trees(&self) -> usize {
        self.roots.len()
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Distinct ids gathered from the most promising leaves, at least
    /// `want` of them unless the forest holds fewer.
    fn candidates(&self, query: &[f32], want: usize) -> Vec<usize> {
        let mut seen = vec![false; self.vectors.len()];
        let mut found = Vec::with_capacity(want.min(self.vectors.len()));
        let mut heap: BinaryHeap<Frontier> = self
            .roots
            .iter()
            .map(|&node| Frontier {
                priority: f32::INFINITY,
                node,
            })
            .collect();

        while found.len() < want {
            let Some(Frontier { priority, node }) = heap.pop() else {
                break;
            };
            match &self.nodes[node] {
                Node::Leaf(ids) => {
                    for &id in ids {
                        if !seen[id] {
                            seen[id] = true;
                            found.push(id);
                        }
                    }
                }
                Node::Split {
                    normal,
                    offset,
                    left,
                    right,
                } => {
                    let m = margin(normal, *offset, query);
                    heap.push(Frontier {
                        priority: priority.min(m),
                        node: *right,
                    });
                    heap.push(Frontier {
                        priority: priority.min(-m),
                        node: *left,
                    });
                }
            }
        }
        found
    }
}

impl NeighborIndex for ForestIndex {
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
        let want = self
            .search_k
            .unwrap_or_else(|| k.saturating_mul(self.roots.len()))
            .max(k);
        let ids = self.candidates(&query, want);
        Ok(rank_exact(&self.vectors, ids, &query, k))
    }
}

fn margin(normal: &[f32], offset: f32, v: &[f32]) -> f32 {
    normal.iter().zip(v).map(|(n, x)| n * x).sum::<f32>() + offset
}

/// Grow one tree over `ids`, appending its nodes to `nodes`. Returns the
/// root's position.
fn grow_tree(
    vectors: &[Vec<f32>],
    ids: Vec<usize>,
    leaf_size: usize,
    rng: &mut StdRng,
    nodes: &mut Vec<Node>,
) -> usize {
    let root = nodes.len();
    nodes.push(Node::Leaf(Vec::new()));
    let mut pending = vec![(root, ids)];

    while let Some((slot, ids)) = pending.pop() {
        if ids.len() <= leaf_size {
            nodes[slot] = Node::Leaf(ids);
            continue;
        }
        let (normal, offset, left_ids, right_ids) = split(vectors, ids, rng);
        let left = nodes.len();
        nodes.push(Node::Leaf(Vec::new()));
        let right = nodes.len();
        nodes.push(Node::Leaf(Vec::new()));
        nodes[slot] = Node::Split {
            normal,
            offset,
            left,
            right,
        };
        pending.push((left, left_ids));
        pending.push((right, right_ids));
    }
    root
}

type SplitResult = (Vec<f32>, f32, Vec<usize>, Vec<usize>);

fn split(vectors: &[Vec<f32>], ids: Vec<usize>, rng: &mut StdRng) -> SplitResult {
    for _ in 0..SPLIT_ATTEMPTS {
        let a = ids[rng.gen_range(0..ids.len())];
        let b = ids[rng.gen_range(0..ids.len())];
        let (p, q) = (&vectors[a], &vectors[b]);
        let normal: Vec<f32> = p.iter().zip(q).map(|(x, y)| x - y).collect();
        if normal.iter().all(|n| *n == 0.0) {
            continue;
        }
        let offset = -normal
            .iter()
            .zip(p.iter().zip(q))
            .map(|(n, (x, y))| n * (x + y) / 2.0)
            .sum::<f32>();

        let (right, left): (Vec<usize>, Vec<usize>) = ids
            .iter()
            .copied()
            .partition(|&id| margin(&normal, offset, &vectors[id]) > 0.0);
        if !left.is_empty() && !right.is_empty() {
            return (normal, offset, left, right);
        }
    }

    // Duplicate or near-duplicate points: split by position so the tree
    // still terminates. A zero normal sends queries down both sides.
    let dims = vectors[ids[0]].len();
    let (left, right): (Vec<(usize, usize)>, Vec<(usize, usize)>) =
        ids.into_iter().enumerate().partition(|(i, _)| i % 2 == 0);
    (
        vec![0.0; dims],
        0.0,
        left.into_iter().map(|(_, id)| id).collect(),
        right.into_iter().map(|(_, id)| id).collect(),
    )
}

#[derive(Debug, Clone, Copy)]
struct Frontier {
    priority: f32,
    node: usize,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.node.cmp(&self.node))
    }
}
