//! Scoring a candidate partition against a reference.
//!
//! Lower scores are better. Two metrics are supported:
//!
//! | Metric | Score |
//! |--------|-------|
//! | [`ComparatorMetric::EarthMover`] | 1-D Wasserstein distance between the unit-size distributions |
//! | [`ComparatorMetric::CommunityCount`] | `|observed_count - (expected_count + offset)|` |
//!
//! A candidate with zero communities scores [`MAXIMAL_DISTANCE`] under either
//! metric, so it can never beat a real partition.
//!
//! # Invariants
//! - every score is non-negative
//! - identical size multisets score exactly 0 under the earth mover metric
//! - the metric is symmetric in its two arguments

use core::fmt;
use core::str::FromStr;

use crate::error::{AnalysisError, Result};
use crate::partition::Partition;

/// Score assigned to degenerate candidates. Compares greater than every real score.
pub const MAXIMAL_DISTANCE: f64 = f64::MAX;

/// Which comparison the optimiser minimises.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ComparatorMetric {
    /// Earth mover's distance between unit-size distributions.
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "earth-mover-distance"))]
    EarthMover,
    /// Absolute difference between community counts.
    #[cfg_attr(feature = "serde", serde(rename = "community-count-difference"))]
    CommunityCount {
        /// Added to the expected count before differencing.
        offset: i64,
    },
}

impl ComparatorMetric {
    /// Parse a metric name, attaching `offset` to the count metric.
    pub fn parse_with_offset(name: &str, offset: i64) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "earth-mover-distance" | "emd" | "wasserstein" => Ok(Self::EarthMover),
            "community-count-difference" | "count" | "ncomm" => {
                Ok(Self::CommunityCount { offset })
            }
            other => Err(AnalysisError::config(format!("unknown comparator metric '{other}'"))),
        }
    }

    /// Score `candidate` against `reference`.
    pub fn score(&self, candidate: &Partition, reference: &ReferenceDistribution) -> f64 {
        if candidate.is_empty() {
            return MAXIMAL_DISTANCE;
        }
        match *self {
            Self::EarthMover => {
                let sizes: Vec<f64> = candidate.sizes().iter().map(|&s| s as f64).collect();
                wasserstein_1d(&sizes, &reference.sizes_f64())
            }
            Self::CommunityCount { offset } => {
                let expected = reference.count() as i64 + offset;
                (candidate.len() as i64 - expected).unsigned_abs() as f64
            }
        }
    }
}

impl FromStr for ComparatorMetric {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_with_offset(s, 0)
    }
}

impl fmt::Display for ComparatorMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EarthMover => write!(f, "earth-mover-distance"),
            Self::CommunityCount { offset: 0 } => write!(f, "community-count-difference"),
            Self::CommunityCount { offset } => {
                write!(f, "community-count-difference{offset:+}")
            }
        }
    }
}

// ─── ReferenceDistribution ───────────────────────────────────────────────────

/// Expected unit sizes for one trial. Never empty, every size at least 1.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReferenceDistribution {
    sizes: Vec<usize>,
}

impl ReferenceDistribution {
    /// Build from a multiset of unit sizes.
    pub fn new(sizes: Vec<usize>) -> Result<Self> {
        if sizes.is_empty() {
            return Err(AnalysisError::config("reference distribution is empty"));
        }
        if sizes.contains(&0) {
            return Err(AnalysisError::config("reference unit sizes must be at least 1"));
        }
        Ok(Self { sizes })
    }

    /// Sizes of the units of a known partition.
    pub fn from_partition(partition: &Partition) -> Result<Self> {
        Self::new(partition.sizes())
    }

    /// Expected unit sizes.
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Expected number of units.
    pub fn count(&self) -> usize {
        self.sizes.len()
    }

    /// Fibres covered by the expected units.
    pub fn fibre_count(&self) -> usize {
        self.sizes.iter().sum()
    }

    fn sizes_f64(&self) -> Vec<f64> {
        self.sizes.iter().map(|&s| s as f64).collect()
    }
}

// ─── Wasserstein ─────────────────────────────────────────────────────────────

/// First Wasserstein distance between two equally weighted samples.
///
/// Integrates `|F_u(x) - F_v(x)|` over the merged support, where `F` is the
/// empirical CDF. Returns [`MAXIMAL_DISTANCE`] if either sample is empty.
pub fn wasserstein_1d(u: &[f64], v: &[f64]) -> f64 {
    if u.is_empty() || v.is_empty() {
        return MAXIMAL_DISTANCE;
    }
    let mut u_sorted = u.to_vec();
    let mut v_sorted = v.to_vec();
    u_sorted.sort_by(f64::total_cmp);
    v_sorted.sort_by(f64::total_cmp);
    let mut all: Vec<f64> = u_sorted.iter().chain(&v_sorted).copied().collect();
    all.sort_by(f64::total_cmp);

    let cdf = |sorted: &[f64], x: f64| sorted.partition_point(|&s| s <= x) as f64 / sorted.len() as f64;

    all.windows(2)
        .map(|w| {
            let delta = w[1] - w[0];
            (cdf(&u_sorted, w[0]) - cdf(&v_sorted, w[0])).abs() * delta
        })
        .sum()
}
