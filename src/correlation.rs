//! Pairwise correlation of fibre traces.
//!
//! The [`CorrelationMatrix`] is the immutable base from which every thresholded
//! [`SimilarityGraph`](crate::graph::SimilarityGraph) is derived. It is never
//! modified after construction; a sweep thresholds it afresh at every step.
//!
//! # Invariants
//! - symmetric, `get(i, i) == 0.0` exactly
//! - every entry lies in `[-1.0, 1.0]`
//! - zero-variance rows are handled by an explicit [`ZeroVariancePolicy`]

use core::cmp::Ordering;
use core::fmt;
use core::str::FromStr;

use tracing::warn;

use crate::error::{AnalysisError, Result};
use crate::signal::SignalMatrix;

// ─── CorrelationKind ─────────────────────────────────────────────────────────

/// Correlation coefficient used to compare two traces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum CorrelationKind {
    /// Linear (product-moment) correlation.
    #[default]
    Pearson,
    /// Pearson correlation of average ranks.
    Spearman,
    /// Kendall tau-b, tie corrected. O(T log T) per row pair.
    Kendall,
}

impl FromStr for CorrelationKind {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pearson" => Ok(Self::Pearson),
            "spearman" => Ok(Self::Spearman),
            "kendall" => Ok(Self::Kendall),
            other => Err(AnalysisError::config(format!("unsupported correlation kind '{other}'"))),
        }
    }
}

impl fmt::Display for CorrelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pearson => "pearson",
            Self::Spearman => "spearman",
            Self::Kendall => "kendall",
        })
    }
}

// ─── ZeroVariancePolicy ──────────────────────────────────────────────────────

/// What to do with a trace whose correlation with anything is undefined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ZeroVariancePolicy {
    /// Fail with [`AnalysisError::DegenerateInput`].
    #[default]
    Reject,
    /// Keep the row as a node; all its correlations are 0 (no edges).
    TreatAsZero,
    /// Drop the row before correlating. Remaining rows keep their fibre ids.
    Exclude,
}

impl FromStr for ZeroVariancePolicy {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "treat-as-zero" | "zero" => Ok(Self::TreatAsZero),
            "exclude" => Ok(Self::Exclude),
            other => {
                Err(AnalysisError::config(format!("unsupported zero-variance policy '{other}'")))
            }
        }
    }
}

// ─── CorrelationMatrix ───────────────────────────────────────────────────────

/// Dense symmetric correlation matrix with a zeroed diagonal.
#[derive(Clone, Debug, PartialEq)]
pub struct CorrelationMatrix {
    n: usize,
    /// Row-major `n × n`.
    values: Vec<f64>,
    fibre_ids: Vec<usize>,
}

impl CorrelationMatrix {
    /// Correlate every pair of rows of `signals`.
    pub fn compute(
        signals: &SignalMatrix,
        kind: CorrelationKind,
        policy: ZeroVariancePolicy,
    ) -> Result<Self> {
        let constant: Vec<usize> = (0..signals.len()).filter(|&i| signals.is_constant(i)).collect();

        let owned;
        let (signals, degenerate) = match (policy, constant.first()) {
            (_, None) => (signals, Vec::new()),
            (ZeroVariancePolicy::Reject, Some(&row)) => {
                return Err(AnalysisError::DegenerateInput { row });
            }
            (ZeroVariancePolicy::TreatAsZero, Some(_)) => {
                warn!(rows = ?constant, "zero-variance rows kept with zero correlation");
                let mut flags = vec![false; signals.len()];
                for &i in &constant {
                    flags[i] = true;
                }
                (signals, flags)
            }
            (ZeroVariancePolicy::Exclude, Some(_)) => {
                let keep: Vec<usize> =
                    (0..signals.len()).filter(|i| !constant.contains(i)).collect();
                if keep.is_empty() {
                    return Err(AnalysisError::config(
                        "every row has zero variance, nothing left to correlate",
                    ));
                }
                warn!(rows = ?constant, "zero-variance rows excluded");
                owned = signals.select(&keep)?;
                (&owned, Vec::new())
            }
        };

        let prepared: Vec<Vec<f64>> = match kind {
            CorrelationKind::Pearson => signals.rows().iter().map(|r| centred_unit(r)).collect(),
            CorrelationKind::Spearman => {
                signals.rows().iter().map(|r| centred_unit(&average_ranks(r))).collect()
            }
            CorrelationKind::Kendall => signals.rows().to_vec(),
        };

        let n = signals.len();
        let mut values = vec![0.0; n * n];
        for i in 0..n {
            for j in (i + 1)..n {
                let r = if degenerate.get(i).copied().unwrap_or(false)
                    || degenerate.get(j).copied().unwrap_or(false)
                {
                    0.0
                } else {
                    match kind {
                        CorrelationKind::Pearson | CorrelationKind::Spearman => {
                            dot(&prepared[i], &prepared[j])
                        }
                        CorrelationKind::Kendall => kendall_tau_b(&prepared[i], &prepared[j]),
                    }
                };
                let r = if r.is_finite() { r.clamp(-1.0, 1.0) } else { 0.0 };
                values[i * n + j] = r;
                values[j * n + i] = r;
            }
        }

        Ok(Self { n, values, fibre_ids: signals.fibre_ids().to_vec() })
    }

    /// Number of rows (and columns).
    pub fn len(&self) -> usize {
        self.n
    }

    /// True for a matrix with no rows.
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Correlation between rows `i` and `j` (0 on the diagonal).
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.n + j]
    }

    /// Row `i` as a slice.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.n..(i + 1) * self.n]
    }

    /// Fibre ids of the rows that were correlated.
    ///
    /// Differs from the input signal ids when rows were excluded.
    pub fn fibre_ids(&self) -> &[usize] {
        &self.fibre_ids
    }

    /// Largest off-diagonal entry, or `None` for fewer than two rows.
    pub fn max_off_diagonal(&self) -> Option<f64> {
        if self.n < 2 {
            return None;
        }
        let mut best = f64::NEG_INFINITY;
        for i in 0..self.n {
            for j in (i + 1)..self.n {
                best = best.max(self.get(i, j));
            }
        }
        Some(best)
    }
}

// ─── helpers ─────────────────────────────────────────────────────────────────

/// Subtract the mean and scale to unit Euclidean norm.
///
/// A constant row becomes all zeros; the caller has already applied the
/// zero-variance policy so this only matters for flagged rows.
fn centred_unit(row: &[f64]) -> Vec<f64> {
    let mean = row.iter().sum::<f64>() / row.len() as f64;
    let mut out: Vec<f64> = row.iter().map(|v| v - mean).collect();
    let norm = out.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for v in &mut out {
            *v /= norm;
        }
    }
    out
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// 1-based ranks, ties receive the mean of the ranks they span.
fn average_ranks(row: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..row.len()).collect();
    order.sort_by(|&a, &b| row[a].total_cmp(&row[b]));
    let mut ranks = vec![0.0; row.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && row[order[end]] == row[order[start]] {
            end += 1;
        }
        // positions start..end hold ranks start+1 ..= end
        let rank = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        start = end;
    }
    ranks
}

/// Number of tied pairs among the values of `row`.
fn tied_pairs(row: &[f64]) -> f64 {
    let mut sorted = row.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mut ties = 0.0;
    let mut start = 0;
    while start < sorted.len() {
        let mut end = start + 1;
        while end < sorted.len() && sorted[end] == sorted[start] {
            end += 1;
        }
        let t = (end - start) as f64;
        ties += t * (t - 1.0) / 2.0;
        start = end;
    }
    ties
}

/// Kendall tau-b by Knight's merge-sort method: O(T log T) per row pair.
///
/// Pairs are ordered by `x` (ties broken by `y`); the discordant pairs are
/// then the inversions left in `y`.
fn kendall_tau_b(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| compare(x[a], x[b]).then(compare(y[a], y[b])));

    let mut joint_ties = 0.0;
    let mut start = 0;
    while start < n {
        let (x0, y0) = (x[order[start]], y[order[start]]);
        let mut end = start + 1;
        while end < n && x[order[end]] == x0 && y[order[end]] == y0 {
            end += 1;
        }
        let t = (end - start) as f64;
        joint_ties += t * (t - 1.0) / 2.0;
        start = end;
    }

    let mut ranked: Vec<f64> = order.iter().map(|&i| y[i]).collect();
    let discordant = count_inversions(&mut ranked) as f64;

    let n0 = (n * n.saturating_sub(1)) as f64 / 2.0;
    let (x_ties, y_ties) = (tied_pairs(x), tied_pairs(y));
    let s = n0 - x_ties - y_ties + joint_ties - 2.0 * discordant;
    let denom = ((n0 - x_ties) * (n0 - y_ties)).sqrt();
    if denom > 0.0 {
        s / denom
    } else {
        0.0
    }
}

/// Numeric order with `-0.0 == 0.0`; entries are always finite.
fn compare(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Sort `values` ascending (bottom-up merge sort) and return the number of
/// strictly inverted pairs. Equal values never count.
fn count_inversions(values: &mut [f64]) -> u64 {
    let n = values.len();
    let mut merged = values.to_vec();
    let mut inversions = 0u64;
    let mut width = 1;
    while width < n {
        let mut lo = 0;
        while lo < n {
            let mid = (lo + width).min(n);
            let hi = (lo + 2 * width).min(n);
            let (mut i, mut j, mut k) = (lo, mid, lo);
            while i < mid && j < hi {
                if values[j] < values[i] {
                    merged[k] = values[j];
                    inversions += (mid - i) as u64;
                    j += 1;
                } else {
                    merged[k] = values[i];
                    i += 1;
                }
                k += 1;
            }
            merged[k..k + (mid - i)].copy_from_slice(&values[i..mid]);
            merged[j..hi].copy_from_slice(&values[j..hi]);
            lo = hi;
        }
        values.copy_from_slice(&merged);
        width *= 2;
    }
    inversions
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(rows: Vec<Vec<f64>>) -> SignalMatrix {
        SignalMatrix::new(rows).unwrap()
    }

    fn assert_well_formed(m: &CorrelationMatrix) {
        for i in 0..m.len() {
            assert_eq!(m.get(i, i), 0.0, "diagonal [{i}] not zero");
            for j in 0..m.len() {
                assert_eq!(m.get(i, j), m.get(j, i), "asymmetric at [{i},{j}]");
                assert!((-1.0..=1.0).contains(&m.get(i, j)), "out of range at [{i},{j}]");
            }
        }
    }

    fn sample_rows() -> Vec<Vec<f64>> {
        vec![
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
            vec![2.0, 4.0, 6.0, 8.0, 10.0],
            vec![5.0, 4.0, 3.0, 2.0, 1.0],
            vec![1.0, 3.0, 2.0, 5.0, 4.0],
        ]
    }

    #[test]
    fn test_pearson_perfect_and_anti() {
        let m = CorrelationMatrix::compute(
            &signals(sample_rows()),
            CorrelationKind::Pearson,
            ZeroVariancePolicy::Reject,
        )
        .unwrap();
        assert!((m.get(0, 1) - 1.0).abs() < 1e-12);
        assert!((m.get(0, 2) + 1.0).abs() < 1e-12);
        assert!((m.get(0, 3) - 0.8).abs() < 1e-12, "got {}", m.get(0, 3));
        assert_well_formed(&m);
    }

    #[test]
    fn test_spearman_is_rank_based() {
        // Monotone but non-linear: Spearman 1, Pearson < 1.
        let rows = vec![vec![1.0, 2.0, 3.0, 4.0], vec![1.0, 4.0, 9.0, 100.0]];
        let s = CorrelationMatrix::compute(
            &signals(rows.clone()),
            CorrelationKind::Spearman,
            ZeroVariancePolicy::Reject,
        )
        .unwrap();
        let p = CorrelationMatrix::compute(
            &signals(rows),
            CorrelationKind::Pearson,
            ZeroVariancePolicy::Reject,
        )
        .unwrap();
        assert!((s.get(0, 1) - 1.0).abs() < 1e-12);
        assert!(p.get(0, 1) < 0.99);
    }

    #[test]
    fn test_kendall_tau_b() {
        let m = CorrelationMatrix::compute(
            &signals(sample_rows()),
            CorrelationKind::Kendall,
            ZeroVariancePolicy::Reject,
        )
        .unwrap();
        // 10 pairs, 8 concordant, 2 discordant
        assert!((m.get(0, 3) - 0.6).abs() < 1e-12, "got {}", m.get(0, 3));
        assert!((m.get(0, 2) + 1.0).abs() < 1e-12);
        assert_well_formed(&m);
    }

    #[test]
    fn test_kendall_with_ties() {
        let x = [1.0, 1.0, 2.0, 3.0];
        let y = [1.0, 2.0, 3.0, 4.0];
        // S = 5, n0 = 6, ties x = 1 → 5 / sqrt(5 * 6)
        let expected = 5.0 / (30.0f64).sqrt();
        assert!((kendall_tau_b(&x, &y) - expected).abs() < 1e-12);
    }

    /// Direct pair count, used to cross-check the merge-sort path.
    fn kendall_by_pairs(x: &[f64], y: &[f64]) -> f64 {
        let n = x.len();
        let (mut s, mut tx, mut ty) = (0.0, 0.0, 0.0);
        for i in 0..n {
            for j in (i + 1)..n {
                let dx = (x[i] - x[j]).signum() * f64::from(u8::from(x[i] != x[j]));
                let dy = (y[i] - y[j]).signum() * f64::from(u8::from(y[i] != y[j]));
                s += dx * dy;
                tx += f64::from(u8::from(x[i] == x[j]));
                ty += f64::from(u8::from(y[i] == y[j]));
            }
        }
        let n0 = (n * (n - 1)) as f64 / 2.0;
        s / ((n0 - tx) * (n0 - ty)).sqrt()
    }

    #[test]
    fn test_kendall_matches_pair_count_with_heavy_ties() {
        // values drawn from a tiny alphabet so ties and joint ties are common
        let mut state = 17u64;
        let mut next = || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((state >> 33) % 4) as f64
        };
        for len in [2usize, 3, 7, 16, 33, 100] {
            let x: Vec<f64> = (0..len).map(|_| next()).collect();
            let y: Vec<f64> = (0..len).map(|_| next()).collect();
            if tied_pairs(&x) == (len * (len - 1)) as f64 / 2.0
                || tied_pairs(&y) == (len * (len - 1)) as f64 / 2.0
            {
                continue;
            }
            let fast = kendall_tau_b(&x, &y);
            let slow = kendall_by_pairs(&x, &y);
            assert!((fast - slow).abs() < 1e-12, "len {len}: {fast} vs {slow}");
        }
    }

    #[test]
    fn test_count_inversions_sorts() {
        let mut v = [3.0, 1.0, 2.0, 2.0, 0.0];
        // (3,1) (3,2) (3,2) (3,0) (1,0) (2,0) (2,0)
        assert_eq!(count_inversions(&mut v), 7);
        assert_eq!(v, [0.0, 1.0, 2.0, 2.0, 3.0]);
    }

    #[test]
    fn test_signed_zero_counts_as_tie() {
        let x = [-0.0, 0.0, 1.0];
        let y = [2.0, 1.0, 3.0];
        // the (x0, x1) pair is tied, not discordant
        let expected = 2.0 / (2.0f64 * 3.0).sqrt();
        assert!((kendall_tau_b(&x, &y) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_average_ranks_ties() {
        assert_eq!(average_ranks(&[10.0, 20.0, 10.0, 30.0]), vec![1.5, 3.0, 1.5, 4.0]);
    }

    #[test]
    fn test_zero_variance_reject() {
        let rows = vec![vec![1.0, 2.0, 3.0], vec![4.0, 4.0, 4.0]];
        let err = CorrelationMatrix::compute(
            &signals(rows),
            CorrelationKind::Pearson,
            ZeroVariancePolicy::Reject,
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::DegenerateInput { row: 1 }));
    }

    #[test]
    fn test_zero_variance_treat_as_zero() {
        let rows = vec![vec![1.0, 2.0, 3.0], vec![4.0, 4.0, 4.0], vec![3.0, 2.0, 1.0]];
        let m = CorrelationMatrix::compute(
            &signals(rows),
            CorrelationKind::Pearson,
            ZeroVariancePolicy::TreatAsZero,
        )
        .unwrap();
        assert_eq!(m.len(), 3);
        assert_eq!(m.get(0, 1), 0.0);
        assert_eq!(m.get(1, 2), 0.0);
        assert!((m.get(0, 2) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_variance_exclude_keeps_ids() {
        let rows = vec![vec![1.0, 2.0, 3.0], vec![4.0, 4.0, 4.0], vec![2.0, 3.0, 5.0]];
        let m = CorrelationMatrix::compute(
            &signals(rows),
            CorrelationKind::Pearson,
            ZeroVariancePolicy::Exclude,
        )
        .unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m.fibre_ids(), &[0, 2]);
    }

    #[test]
    fn test_exclude_everything_is_configuration_error() {
        let rows = vec![vec![1.0, 1.0], vec![2.0, 2.0]];
        let err = CorrelationMatrix::compute(
            &signals(rows),
            CorrelationKind::Pearson,
            ZeroVariancePolicy::Exclude,
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("Spearman".parse::<CorrelationKind>().unwrap(), CorrelationKind::Spearman);
        assert!("cosine".parse::<CorrelationKind>().unwrap_err().is_configuration());
        assert_eq!(
            "treat-as-zero".parse::<ZeroVariancePolicy>().unwrap(),
            ZeroVariancePolicy::TreatAsZero
        );
    }
}
