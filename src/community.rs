//! Seeded community detection on a similarity graph.
//!
//! [`Louvain`] greedily maximises modularity with a resolution parameter γ:
//!
//! ```text
//! Q = Σ_c [ L_c / m  −  γ · (d_c / 2m)² ]
//! ```
//!
//! where `L_c` is the edge weight inside community `c`, `d_c` the summed
//! weighted degree of its nodes and `m` the total edge weight. Higher γ favours
//! more, smaller communities; γ = 0 merges every connected component.
//!
//! # Algorithm
//!
//! 1. Visit nodes in an order shuffled by a ChaCha8 stream seeded from `seed`.
//!    Move each node to the neighbouring community with the largest positive
//!    gain (first neighbour community wins ties). Repeat passes until a pass
//!    makes no move.
//! 2. Collapse communities into super-nodes (internal weight becomes a self
//!    loop) and repeat, until a level improves modularity by no more than
//!    `min_gain`.
//!
//! # Guarantees
//! - same graph, resolution and seed give the same partition
//! - every node appears in exactly one community; isolated nodes are singletons
//! - communities are reported ordered by their smallest fibre id

use hashbrown::HashMap;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{AnalysisError, Result};
use crate::graph::SimilarityGraph;
use crate::partition::Partition;

/// Anything that can split a similarity graph into disjoint communities.
pub trait CommunityDetector {
    /// Partition every node of `graph`. Must be deterministic in `seed`.
    fn detect(&self, graph: &SimilarityGraph, resolution: f64, seed: u64) -> Result<Partition>;
}

/// Multi-level greedy modularity optimisation.
#[derive(Clone, Debug, PartialEq)]
pub struct Louvain {
    /// Minimum modularity improvement for another aggregation level. Default 1e-7.
    pub min_gain: f64,
    /// Hard cap on aggregation levels. Default 64.
    pub max_levels: usize,
}

impl Default for Louvain {
    fn default() -> Self {
        Self { min_gain: 1e-7, max_levels: 64 }
    }
}

impl Louvain {
    /// Create a detector with the given level threshold.
    pub fn new(min_gain: f64) -> Self {
        Self { min_gain, ..Self::default() }
    }
}

impl CommunityDetector for Louvain {
    fn detect(&self, graph: &SimilarityGraph, resolution: f64, seed: u64) -> Result<Partition> {
        if !resolution.is_finite() || resolution < 0.0 {
            return Err(AnalysisError::config(format!(
                "resolution must be finite and non-negative, got {resolution}"
            )));
        }
        let n = graph.node_count();
        if n == 0 {
            return Ok(Partition::empty());
        }
        // membership[i] = community of original node i
        let mut membership: Vec<usize> = (0..n).collect();
        if graph.is_edgeless() {
            return Partition::from_labels(&membership, graph.fibre_ids());
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut level = LevelGraph::from_similarity(graph);
        let mut modularity = level.modularity(&(0..n).collect::<Vec<_>>(), resolution);

        for _ in 0..self.max_levels {
            let (labels, moved) = level.one_level(resolution, &mut rng);
            for m in &mut membership {
                *m = labels[*m];
            }
            if !moved {
                break;
            }
            let new_modularity = level.modularity(&labels, resolution);
            if new_modularity - modularity <= self.min_gain {
                break;
            }
            modularity = new_modularity;
            level = level.aggregate(&labels);
        }

        Partition::from_labels(&membership, graph.fibre_ids())
    }
}

// ─── LevelGraph ──────────────────────────────────────────────────────────────

/// Working graph of one Louvain level. Nodes are communities of the previous level.
struct LevelGraph {
    /// Neighbours excluding self.
    adjacency: Vec<Vec<(usize, f64)>>,
    self_loops: Vec<f64>,
    /// Weighted degree, self loops counted twice.
    degrees: Vec<f64>,
    /// Total edge weight `m`.
    total: f64,
}

impl LevelGraph {
    fn from_similarity(graph: &SimilarityGraph) -> Self {
        let n = graph.node_count();
        let adjacency: Vec<Vec<(usize, f64)>> =
            (0..n).map(|i| graph.neighbours(i).to_vec()).collect();
        let degrees = (0..n).map(|i| graph.degree(i)).collect();
        Self { adjacency, self_loops: vec![0.0; n], degrees, total: graph.total_weight() }
    }

    fn len(&self) -> usize {
        self.adjacency.len()
    }

    /// Local moving phase. Returns compacted labels and whether any node moved.
    fn one_level(&self, resolution: f64, rng: &mut ChaCha8Rng) -> (Vec<usize>, bool) {
        let n = self.len();
        let m = self.total;
        let two_m_sq = 2.0 * m * m;
        let mut community: Vec<usize> = (0..n).collect();
        let mut totals = self.degrees.clone();

        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);

        let mut improved = false;
        loop {
            let mut moves = 0usize;
            for &u in &order {
                let degree = self.degrees[u];
                let own = community[u];
                let neighbour_weights = self.neighbour_weights(u, &community);

                totals[own] -= degree;
                let own_weight = neighbour_weights
                    .iter()
                    .find(|(c, _)| *c == own)
                    .map_or(0.0, |&(_, w)| w);
                let remove_cost = -own_weight / m + resolution * totals[own] * degree / two_m_sq;

                let mut best = own;
                let mut best_gain = 0.0;
                for &(c, w) in &neighbour_weights {
                    let gain = remove_cost + w / m - resolution * totals[c] * degree / two_m_sq;
                    if gain > best_gain {
                        best_gain = gain;
                        best = c;
                    }
                }
                totals[best] += degree;
                if best != own {
                    community[u] = best;
                    moves += 1;
                }
            }
            if moves == 0 {
                break;
            }
            improved = true;
        }

        (compact(&community), improved)
    }

    /// Edge weight from `u` into each neighbouring community, in first-seen order.
    fn neighbour_weights(&self, u: usize, community: &[usize]) -> Vec<(usize, f64)> {
        let mut slots: HashMap<usize, usize> = HashMap::new();
        let mut out: Vec<(usize, f64)> = Vec::new();
        for &(v, w) in &self.adjacency[u] {
            let c = community[v];
            match slots.get(&c) {
                Some(&k) => out[k].1 += w,
                None => {
                    slots.insert(c, out.len());
                    out.push((c, w));
                }
            }
        }
        out
    }

    fn modularity(&self, labels: &[usize], resolution: f64) -> f64 {
        let m = self.total;
        if m <= 0.0 {
            return 0.0;
        }
        let k = labels.iter().copied().max().map_or(0, |x| x + 1);
        let mut internal = vec![0.0; k];
        let mut degree = vec![0.0; k];
        for u in 0..self.len() {
            let c = labels[u];
            internal[c] += self.self_loops[u];
            degree[c] += self.degrees[u];
            for &(v, w) in &self.adjacency[u] {
                if u < v && labels[v] == c {
                    internal[c] += w;
                }
            }
        }
        internal
            .iter()
            .zip(&degree)
            .map(|(l, d)| l / m - resolution * (d / (2.0 * m)).powi(2))
            .sum()
    }

    /// Collapse each community into one node.
    fn aggregate(&self, labels: &[usize]) -> Self {
        let k = labels.iter().copied().max().map_or(0, |x| x + 1);
        let mut self_loops = vec![0.0; k];
        let mut degrees = vec![0.0; k];
        let mut weights: Vec<HashMap<usize, f64>> = vec![HashMap::new(); k];
        for u in 0..self.len() {
            let cu = labels[u];
            self_loops[cu] += self.self_loops[u];
            degrees[cu] += self.degrees[u];
            for &(v, w) in &self.adjacency[u] {
                if u >= v {
                    continue;
                }
                let cv = labels[v];
                if cu == cv {
                    self_loops[cu] += w;
                } else {
                    *weights[cu].entry(cv).or_insert(0.0) += w;
                    *weights[cv].entry(cu).or_insert(0.0) += w;
                }
            }
        }
        let adjacency = weights
            .into_iter()
            .map(|map| {
                let mut list: Vec<(usize, f64)> = map.into_iter().collect();
                list.sort_by_key(|&(j, _)| j);
                list
            })
            .collect();
        Self { adjacency, self_loops, degrees, total: self.total }
    }
}

/// Relabel communities to `0..k` in order of first appearance.
fn compact(community: &[usize]) -> Vec<usize> {
    let mut map: HashMap<usize, usize> = HashMap::new();
    community
        .iter()
        .map(|c| {
            let next = map.len();
            *map.entry(*c).or_insert(next)
        })
        .collect()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
