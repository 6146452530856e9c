//! Thresholded similarity graph over fibres.
//!
//! Edge weight is the correlation of the two endpoint traces when it reaches
//! the threshold, otherwise the pair is not connected. A graph is derived from
//! an immutable [`CorrelationMatrix`] and is itself never modified; each sweep
//! step builds its own.
//!
//! # Invariants
//! - no self loops
//! - every stored weight is strictly positive; weight 0 means "no edge"
//! - raising the threshold never adds an edge
//! - negative correlations are never edges, whatever the threshold

use crate::correlation::CorrelationMatrix;
use crate::error::{AnalysisError, Result};

/// Undirected weighted graph stored as sorted adjacency lists.
#[derive(Clone, Debug, PartialEq)]
pub struct SimilarityGraph {
    /// `adjacency[i]` holds `(neighbour, weight)` sorted by neighbour.
    adjacency: Vec<Vec<(usize, f64)>>,
    fibre_ids: Vec<usize>,
    edge_count: usize,
    total_weight: f64,
}

impl SimilarityGraph {
    /// Keep every pair whose correlation is `>= threshold` and positive.
    pub fn from_correlation(matrix: &CorrelationMatrix, threshold: f64) -> Self {
        let n = matrix.len();
        let mut adjacency = vec![Vec::new(); n];
        let mut edge_count = 0;
        let mut total_weight = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                let r = matrix.get(i, j);
                if r >= threshold && r > 0.0 {
                    adjacency[i].push((j, r));
                    adjacency[j].push((i, r));
                    edge_count += 1;
                    total_weight += r;
                }
            }
        }
        for list in &mut adjacency {
            list.sort_by_key(|&(j, _)| j);
        }
        Self { adjacency, fibre_ids: matrix.fibre_ids().to_vec(), edge_count, total_weight }
    }

    /// Build a graph from an explicit edge list over nodes `0..node_count`.
    ///
    /// Zero-weight edges are skipped. Self loops, negative or non-finite
    /// weights, out-of-range endpoints and duplicate pairs are rejected.
    pub fn from_edges(node_count: usize, edges: &[(usize, usize, f64)]) -> Result<Self> {
        let mut adjacency: Vec<Vec<(usize, f64)>> = vec![Vec::new(); node_count];
        let mut edge_count = 0;
        let mut total_weight = 0.0;
        for &(a, b, w) in edges {
            if a >= node_count || b >= node_count {
                return Err(AnalysisError::config(format!(
                    "edge ({a}, {b}) out of range for {node_count} nodes"
                )));
            }
            if a == b {
                return Err(AnalysisError::config(format!("self loop on node {a}")));
            }
            if !w.is_finite() || w < 0.0 {
                return Err(AnalysisError::config(format!(
                    "edge ({a}, {b}) has invalid weight {w}"
                )));
            }
            if w == 0.0 {
                continue;
            }
            if adjacency[a].iter().any(|&(j, _)| j == b) {
                return Err(AnalysisError::config(format!("duplicate edge ({a}, {b})")));
            }
            adjacency[a].push((b, w));
            adjacency[b].push((a, w));
            edge_count += 1;
            total_weight += w;
        }
        for list in &mut adjacency {
            list.sort_by_key(|&(j, _)| j);
        }
        Ok(Self { adjacency, fibre_ids: (0..node_count).collect(), edge_count, total_weight })
    }

    /// Number of nodes, including isolated ones.
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// True when thresholding removed every edge.
    pub fn is_edgeless(&self) -> bool {
        self.edge_count == 0
    }

    /// Sum of edge weights (each undirected edge counted once).
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Neighbours of `node` with their weights, sorted by neighbour.
    pub fn neighbours(&self, node: usize) -> &[(usize, f64)] {
        &self.adjacency[node]
    }

    /// Weighted degree of `node`.
    pub fn degree(&self, node: usize) -> f64 {
        self.adjacency[node].iter().map(|&(_, w)| w).sum()
    }

    /// Weight of edge `(a, b)`, or 0 when absent.
    pub fn weight(&self, a: usize, b: usize) -> f64 {
        self.adjacency[a]
            .binary_search_by_key(&b, |&(j, _)| j)
            .map(|k| self.adjacency[a][k].1)
            .unwrap_or(0.0)
    }

    /// Nodes with no incident edge.
    pub fn isolated_nodes(&self) -> Vec<usize> {
        (0..self.node_count()).filter(|&i| self.adjacency[i].is_empty()).collect()
    }

    /// Fibre id of node `i`.
    pub fn fibre_id(&self, node: usize) -> usize {
        self.fibre_ids[node]
    }

    /// Fibre ids in node order.
    pub fn fibre_ids(&self) -> &[usize] {
        &self.fibre_ids
    }
}
