//! Python FFI bindings via PyO3.
//!
//! Exposes the recovery core to Python as plain functions over nested lists,
//! so notebooks can swap the pieces in one at a time.
//!
//! # Building the Python extension
//!
//! ```bash
//! pip install maturin
//! maturin develop --features python-ffi
//! ```
//!
//! # Usage
//!
//! ```python
//! import motorpool_core as mp
//!
//! traces = [[...], [...], ...]                      # fibres x samples
//! corr = mp.correlation_matrix(traces, kind="pearson")
//! units = mp.louvain_communities(traces, threshold=0.4, resolution=1.0, seed=2)
//! mp.wasserstein_distance([len(u) for u in units], [1, 4, 1, 2])
//!
//! best = mp.optimise_threshold(traces, [1, 4, 1, 2], lower=0.0, upper=1.0, steps=101)
//! print(best.optimal_parameter, best.score, best.units)
//! ```

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::community::{CommunityDetector, Louvain};
use crate::comparator::{wasserstein_1d, ComparatorMetric, ReferenceDistribution};
use crate::correlation::{CorrelationKind, CorrelationMatrix, ZeroVariancePolicy};
use crate::error::AnalysisError;
use crate::graph::SimilarityGraph;
use crate::optimizer::{OptimizerConfig, SweepSpec, ThresholdOptimizer};
use crate::signal::SignalMatrix;

fn to_py(err: AnalysisError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

fn parse<T: core::str::FromStr<Err = AnalysisError>>(s: &str) -> PyResult<T> {
    s.parse().map_err(to_py)
}

// ── Free functions ────────────────────────────────────────────────────────────

/// Pairwise correlation of the rows of `traces` with a zeroed diagonal.
///
/// Args:
///     traces: list of equally long float lists, one per fibre
///     kind: "pearson", "spearman" or "kendall"
///     zero_variance: "reject", "treat-as-zero" or "exclude"
#[pyfunction]
#[pyo3(signature = (traces, kind="pearson", zero_variance="reject"))]
pub fn correlation_matrix(
    traces: Vec<Vec<f64>>,
    kind: &str,
    zero_variance: &str,
) -> PyResult<Vec<Vec<f64>>> {
    let signals = SignalMatrix::new(traces).map_err(to_py)?;
    let matrix =
        CorrelationMatrix::compute(&signals, parse(kind)?, parse(zero_variance)?).map_err(to_py)?;
    Ok((0..matrix.len()).map(|i| matrix.row(i).to_vec()).collect())
}

/// Seeded Louvain communities of a thresholded correlation matrix.
///
/// Returns a list of units, each a sorted list of row indices.
#[pyfunction]
#[pyo3(signature = (traces, threshold=0.0, resolution=1.0, seed=2, kind="pearson"))]
pub fn louvain_communities(
    traces: Vec<Vec<f64>>,
    threshold: f64,
    resolution: f64,
    seed: u64,
    kind: &str,
) -> PyResult<Vec<Vec<usize>>> {
    let signals = SignalMatrix::new(traces).map_err(to_py)?;
    let kind: CorrelationKind = parse(kind)?;
    let matrix =
        CorrelationMatrix::compute(&signals, kind, ZeroVariancePolicy::Reject).map_err(to_py)?;
    let graph = SimilarityGraph::from_correlation(&matrix, threshold);
    let partition = Louvain::default().detect(&graph, resolution, seed).map_err(to_py)?;
    Ok(partition.units().iter().map(|u| u.members.clone()).collect())
}

/// First Wasserstein distance between two samples with uniform weights.
#[pyfunction]
pub fn wasserstein_distance(u: Vec<f64>, v: Vec<f64>) -> PyResult<f64> {
    if u.is_empty() || v.is_empty() {
        return Err(PyValueError::new_err("both samples must be non-empty"));
    }
    Ok(wasserstein_1d(&u, &v))
}

// ── Optimisation ──────────────────────────────────────────────────────────────

/// Result of `optimise_threshold`.
#[pyclass(name = "Optimum")]
#[derive(Clone)]
pub struct PyOptimum {
    /// Threshold with the lowest score.
    #[pyo3(get)]
    pub optimal_parameter: f64,
    /// Score of the final run.
    #[pyo3(get)]
    pub score: f64,
    /// Recovered units as lists of row indices.
    #[pyo3(get)]
    pub units: Vec<Vec<usize>>,
    /// `(threshold, score, community_count)` per sweep step.
    #[pyo3(get)]
    pub trace: Vec<(f64, f64, usize)>,
}

#[pymethods]
impl PyOptimum {
    /// Python repr string.
    pub fn __repr__(&self) -> String {
        format!(
            "Optimum(optimal_parameter={:.4}, score={:.4}, units={})",
            self.optimal_parameter,
            self.score,
            self.units.len()
        )
    }
}

/// Sweep the correlation threshold and keep the clustering closest to `reference_sizes`.
///
/// Args:
///     traces: fibres x samples
///     reference_sizes: expected unit sizes
///     metric: "earth-mover-distance" or "community-count-difference"
#[pyfunction]
#[pyo3(signature = (
    traces,
    reference_sizes,
    lower=0.0,
    upper=1.0,
    steps=101,
    metric="earth-mover-distance",
    count_offset=0,
    resolution=1.0,
    seed=2,
    kind="pearson",
))]
#[allow(clippy::too_many_arguments)]
pub fn optimise_threshold(
    traces: Vec<Vec<f64>>,
    reference_sizes: Vec<usize>,
    lower: f64,
    upper: f64,
    steps: usize,
    metric: &str,
    count_offset: i64,
    resolution: f64,
    seed: u64,
    kind: &str,
) -> PyResult<PyOptimum> {
    let signals = SignalMatrix::new(traces).map_err(to_py)?;
    let reference = ReferenceDistribution::new(reference_sizes).map_err(to_py)?;
    let config = OptimizerConfig {
        sweep: SweepSpec::threshold(lower, upper, steps),
        metric: ComparatorMetric::parse_with_offset(metric, count_offset).map_err(to_py)?,
        correlation_kind: parse(kind)?,
        resolution,
        seed,
        ..OptimizerConfig::default()
    };
    let outcome = ThresholdOptimizer::new(config)
        .and_then(|o| o.optimise(&signals, &reference))
        .map_err(to_py)?;
    Ok(PyOptimum {
        optimal_parameter: outcome.optimal_parameter,
        score: outcome.score,
        units: outcome.partition.units().iter().map(|u| u.members.clone()).collect(),
        trace: outcome
            .trace
            .iter()
            .map(|p| (p.parameter, p.score, p.community_count))
            .collect(),
    })
}

// ── Module entry point ────────────────────────────────────────────────────────

/// Motor-unit recovery from fibre activity traces.
#[pymodule]
pub fn motorpool_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(correlation_matrix, m)?)?;
    m.add_function(wrap_pyfunction!(louvain_communities, m)?)?;
    m.add_function(wrap_pyfunction!(wasserstein_distance, m)?)?;
    m.add_function(wrap_pyfunction!(optimise_threshold, m)?)?;
    m.add_class::<PyOptimum>()?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}
