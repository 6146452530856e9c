//! Per-fibre activity traces.
//!
//! A [`SignalMatrix`] is the read-only input to the whole pipeline: one row per
//! fibre, one column per time sample. Rows carry the fibre id they were
//! extracted for so that subsets and exclusions still report the original
//! numbering in the final partition.
//!
//! # Preconditions enforced on construction
//! - at least one row and at least one sample
//! - every row has the same length
//! - every entry is finite

use crate::error::{AnalysisError, Result};

/// Fibres × samples matrix of activity values.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SignalMatrix {
    rows: Vec<Vec<f64>>,
    fibre_ids: Vec<usize>,
}

impl SignalMatrix {
    /// Build a matrix whose fibre ids are the row positions `0..rows.len()`.
    pub fn new(rows: Vec<Vec<f64>>) -> Result<Self> {
        let ids = (0..rows.len()).collect();
        Self::with_fibre_ids(rows, ids)
    }

    /// Build a matrix with explicit fibre ids (one per row, all distinct).
    pub fn with_fibre_ids(rows: Vec<Vec<f64>>, fibre_ids: Vec<usize>) -> Result<Self> {
        if rows.is_empty() {
            return Err(AnalysisError::config("signal matrix has no fibres"));
        }
        if fibre_ids.len() != rows.len() {
            return Err(AnalysisError::config(format!(
                "{} fibre ids supplied for {} rows",
                fibre_ids.len(),
                rows.len()
            )));
        }
        let samples = rows[0].len();
        if samples == 0 {
            return Err(AnalysisError::config("signal matrix has no time samples"));
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != samples {
                return Err(AnalysisError::config(format!(
                    "row {i} has {} samples, expected {samples}",
                    row.len()
                )));
            }
            if let Some(t) = row.iter().position(|v| !v.is_finite()) {
                return Err(AnalysisError::config(format!(
                    "row {i} has a non-finite value at sample {t}"
                )));
            }
        }
        let mut sorted = fibre_ids.clone();
        sorted.sort_unstable();
        if sorted.windows(2).any(|w| w[0] == w[1]) {
            return Err(AnalysisError::config("fibre ids must be distinct"));
        }
        Ok(Self { rows, fibre_ids })
    }

    /// Number of fibres (rows).
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True for a matrix with no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of time samples per row.
    pub fn samples(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    /// Trace of row `i`.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.rows[i]
    }

    /// All rows in order.
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Fibre id of row `i`.
    pub fn fibre_id(&self, i: usize) -> usize {
        self.fibre_ids[i]
    }

    /// Fibre ids in row order.
    pub fn fibre_ids(&self) -> &[usize] {
        &self.fibre_ids
    }

    /// Mean of row `i`.
    pub fn mean(&self, i: usize) -> f64 {
        let row = &self.rows[i];
        row.iter().sum::<f64>() / row.len() as f64
    }

    /// Population variance of row `i`.
    pub fn variance(&self, i: usize) -> f64 {
        let mean = self.mean(i);
        let row = &self.rows[i];
        row.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / row.len() as f64
    }

    /// Population standard deviation of row `i`.
    pub fn std_dev(&self, i: usize) -> f64 {
        self.variance(i).sqrt()
    }

    /// True when every sample of row `i` equals the first.
    pub fn is_constant(&self, i: usize) -> bool {
        let row = &self.rows[i];
        row.iter().all(|v| *v == row[0])
    }

    /// Keep only the given row positions, in the given order.
    ///
    /// Fibre ids follow their rows. An empty selection is a configuration error.
    pub fn select(&self, positions: &[usize]) -> Result<Self> {
        let mut rows = Vec::with_capacity(positions.len());
        let mut ids = Vec::with_capacity(positions.len());
        for &p in positions {
            if p >= self.rows.len() {
                return Err(AnalysisError::config(format!(
                    "row {p} out of range for {} fibres",
                    self.rows.len()
                )));
            }
            rows.push(self.rows[p].clone());
            ids.push(self.fibre_ids[p]);
        }
        Self::with_fibre_ids(rows, ids)
    }

    /// Row position of a fibre id, if present.
    pub fn position_of(&self, fibre_id: usize) -> Option<usize> {
        self.fibre_ids.iter().position(|&id| id == fibre_id)
    }

    /// Min–max normalise each row into [0, 1].
    ///
    /// Constant rows become all-zero rather than dividing by zero.
    pub fn normalised(&self) -> Self {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let lo = row.iter().copied().fold(f64::INFINITY, f64::min);
                let hi = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let span = hi - lo;
                if span > 0.0 {
                    row.iter().map(|v| (v - lo) / span).collect()
                } else {
                    vec![0.0; row.len()]
                }
            })
            .collect();
        Self { rows, fibre_ids: self.fibre_ids.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_matrix_is_configuration_error() {
        let err = SignalMatrix::new(Vec::new()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_zero_samples_rejected() {
        let err = SignalMatrix::new(vec![vec![], vec![]]).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let err = SignalMatrix::new(vec![vec![1.0, 2.0], vec![1.0]]).unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn test_nan_rejected() {
        let err = SignalMatrix::new(vec![vec![1.0, f64::NAN]]).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_duplicate_fibre_ids_rejected() {
        let err =
            SignalMatrix::with_fibre_ids(vec![vec![1.0], vec![2.0]], vec![7, 7]).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_select_keeps_fibre_ids() {
        let m = SignalMatrix::with_fibre_ids(
            vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]],
            vec![10, 20, 30],
        )
        .unwrap();
        let s = m.select(&[2, 0]).unwrap();
        assert_eq!(s.fibre_ids(), &[30, 10]);
        assert_eq!(s.row(0), &[5.0, 6.0]);
        assert_eq!(s.position_of(10), Some(1));
    }

    #[test]
    fn test_variance_and_constant() {
        let m = SignalMatrix::new(vec![vec![1.0, 3.0], vec![2.0, 2.0]]).unwrap();
        assert!((m.variance(0) - 1.0).abs() < 1e-12);
        assert!(m.is_constant(1));
        assert!(!m.is_constant(0));
    }

    #[test]
    fn test_normalised_range() {
        let m = SignalMatrix::new(vec![vec![2.0, 4.0, 6.0], vec![5.0, 5.0, 5.0]]).unwrap();
        let n = m.normalised();
        assert_eq!(n.row(0), &[0.0, 0.5, 1.0]);
        assert_eq!(n.row(1), &[0.0, 0.0, 0.0]);
    }
}
