//! Parameter sweep that picks the clustering best matching a reference.
//!
//! Each step derives a fresh graph (threshold sweep) or re-clusters a fixed
//! graph (resolution sweep), scores the resulting partition against the
//! reference distribution and records a [`TracePoint`]. The minimum score
//! wins; ties go to the earliest step. The chosen parameter is then re-run
//! from the signals to produce the reported partition.
//!
//! # Invariants
//! - the base correlation matrix is computed once per run and never modified
//! - every detector call receives the same seed
//! - the trace is in sweep order, one point per sample
//! - a step whose graph has no edges scores [`MAXIMAL_DISTANCE`] and the sweep continues

use core::fmt;
use core::str::FromStr;

use tracing::{debug, info};

use crate::community::{CommunityDetector, Louvain};
use crate::comparator::{ComparatorMetric, ReferenceDistribution, MAXIMAL_DISTANCE};
use crate::correlation::{CorrelationKind, CorrelationMatrix, ZeroVariancePolicy};
use crate::error::{AnalysisError, Result};
use crate::graph::SimilarityGraph;
use crate::partition::Partition;
use crate::signal::SignalMatrix;

// ─── SweepSpec ───────────────────────────────────────────────────────────────

/// Which knob the sweep turns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum SweepParameter {
    /// Minimum correlation for an edge.
    #[default]
    CorrelationThreshold,
    /// Modularity resolution γ at a fixed threshold.
    ClusteringResolution,
}

impl FromStr for SweepParameter {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "correlation-threshold" | "threshold" => Ok(Self::CorrelationThreshold),
            "clustering-resolution" | "resolution" => Ok(Self::ClusteringResolution),
            other => Err(AnalysisError::config(format!("unknown sweep parameter '{other}'"))),
        }
    }
}

impl fmt::Display for SweepParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CorrelationThreshold => "correlation-threshold",
            Self::ClusteringResolution => "clustering-resolution",
        })
    }
}

/// Inclusive, evenly spaced sweep range.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SweepSpec {
    /// Parameter being swept.
    pub parameter: SweepParameter,
    /// First sample.
    pub lower_bound: f64,
    /// Last sample (reached exactly when `step_count > 1`).
    pub upper_bound: f64,
    /// Number of samples.
    pub step_count: usize,
}

impl Default for SweepSpec {
    fn default() -> Self {
        Self {
            parameter: SweepParameter::CorrelationThreshold,
            lower_bound: 0.0,
            upper_bound: 1.0,
            step_count: 101,
        }
    }
}

impl SweepSpec {
    /// Threshold sweep over `[lower, upper]`.
    pub fn threshold(lower_bound: f64, upper_bound: f64, step_count: usize) -> Self {
        Self { parameter: SweepParameter::CorrelationThreshold, lower_bound, upper_bound, step_count }
    }

    /// Resolution sweep over `[lower, upper]`.
    pub fn resolution(lower_bound: f64, upper_bound: f64, step_count: usize) -> Self {
        Self { parameter: SweepParameter::ClusteringResolution, lower_bound, upper_bound, step_count }
    }

    /// Check bounds and count without materialising the samples.
    pub fn validate(&self) -> Result<()> {
        if self.step_count == 0 {
            return Err(AnalysisError::config("sweep has zero steps"));
        }
        if !self.lower_bound.is_finite() || !self.upper_bound.is_finite() {
            return Err(AnalysisError::config("sweep bounds must be finite"));
        }
        if self.lower_bound > self.upper_bound {
            return Err(AnalysisError::config(format!(
                "sweep lower bound {} exceeds upper bound {}",
                self.lower_bound, self.upper_bound
            )));
        }
        if self.parameter == SweepParameter::ClusteringResolution && self.lower_bound < 0.0 {
            return Err(AnalysisError::config("resolution sweep must not go below 0"));
        }
        Ok(())
    }

    /// Sample values in sweep order.
    pub fn samples(&self) -> Result<Vec<f64>> {
        self.validate()?;
        if self.step_count == 1 {
            return Ok(vec![self.lower_bound]);
        }
        let span = self.upper_bound - self.lower_bound;
        let last = (self.step_count - 1) as f64;
        Ok((0..self.step_count)
            .map(|i| {
                if i + 1 == self.step_count {
                    self.upper_bound
                } else {
                    self.lower_bound + span * i as f64 / last
                }
            })
            .collect())
    }
}

// ─── Outcome types ───────────────────────────────────────────────────────────

/// One evaluated sweep step.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TracePoint {
    /// Parameter value of the step.
    pub parameter: f64,
    /// Comparator score (lower is better).
    pub score: f64,
    /// Number of communities found; 0 for an edgeless graph.
    pub community_count: usize,
}

/// Result of one optimisation run.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OptimizationOutcome {
    /// Parameter value with the lowest score.
    pub optimal_parameter: f64,
    /// Score of the final run at the optimum.
    pub score: f64,
    /// Partition of the final run, in fibre ids.
    pub partition: Partition,
    /// Every step in sweep order.
    pub trace: Vec<TracePoint>,
}

impl OptimizationOutcome {
    /// Number of communities in the reported partition.
    pub fn community_count(&self) -> usize {
        self.partition.len()
    }

    /// True when no step produced a real partition.
    pub fn is_degenerate(&self) -> bool {
        self.score == MAXIMAL_DISTANCE
    }
}

// ─── Optimiser ───────────────────────────────────────────────────────────────

/// Everything a sweep needs besides the signals and the reference.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizerConfig {
    /// Range and parameter to sweep.
    pub sweep: SweepSpec,
    /// Score to minimise.
    pub metric: ComparatorMetric,
    /// Correlation coefficient for the base matrix.
    pub correlation_kind: CorrelationKind,
    /// Handling of constant traces.
    pub zero_variance: ZeroVariancePolicy,
    /// Resolution used while sweeping the threshold.
    pub resolution: f64,
    /// Threshold used while sweeping the resolution.
    pub threshold: f64,
    /// Seed handed to every detector call.
    pub seed: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            sweep: SweepSpec::default(),
            metric: ComparatorMetric::EarthMover,
            correlation_kind: CorrelationKind::Pearson,
            zero_variance: ZeroVariancePolicy::Reject,
            resolution: 1.0,
            threshold: 0.0,
            seed: 2,
        }
    }
}

impl OptimizerConfig {
    /// Reject sweeps and clustering parameters that cannot run.
    pub fn validate(&self) -> Result<()> {
        self.sweep.validate()?;
        if !self.resolution.is_finite() || self.resolution < 0.0 {
            return Err(AnalysisError::config(format!(
                "resolution must be finite and non-negative, got {}",
                self.resolution
            )));
        }
        if !self.threshold.is_finite() {
            return Err(AnalysisError::config("fixed threshold must be finite"));
        }
        Ok(())
    }
}

/// Sweeps one parameter and keeps the best-scoring clustering.
#[derive(Clone, Debug)]
pub struct ThresholdOptimizer<D = Louvain> {
    config: OptimizerConfig,
    detector: D,
}

impl ThresholdOptimizer<Louvain> {
    /// Optimiser using the default Louvain detector.
    pub fn new(config: OptimizerConfig) -> Result<Self> {
        Self::with_detector(config, Louvain::default())
    }
}

impl<D: CommunityDetector + Sync> ThresholdOptimizer<D> {
    /// Optimiser using a caller-supplied detector.
    pub fn with_detector(config: OptimizerConfig, detector: D) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, detector })
    }

    /// Active configuration.
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Run the sweep on `signals` against `reference`.
    pub fn optimise(
        &self,
        signals: &SignalMatrix,
        reference: &ReferenceDistribution,
    ) -> Result<OptimizationOutcome> {
        let samples = self.config.sweep.samples()?;
        let base = self.base_matrix(signals)?;
        if reference.fibre_count() > base.len() {
            return Err(AnalysisError::config(format!(
                "reference describes {} fibres but only {} can be clustered",
                reference.fibre_count(),
                base.len()
            )));
        }
        let fixed = match self.config.sweep.parameter {
            SweepParameter::CorrelationThreshold => None,
            SweepParameter::ClusteringResolution => {
                Some(SimilarityGraph::from_correlation(&base, self.config.threshold))
            }
        };

        let trace = self.sweep(&base, fixed.as_ref(), reference, &samples)?;

        let mut best = 0;
        for (i, point) in trace.iter().enumerate() {
            if point.score < trace[best].score {
                best = i;
            }
        }
        let optimal_parameter = trace[best].parameter;

        // Final run from the signals so the reported partition stands on its own.
        let base = self.base_matrix(signals)?;
        let fixed = fixed.map(|_| SimilarityGraph::from_correlation(&base, self.config.threshold));
        let (partition, point) = self
            .evaluate(&base, fixed.as_ref(), reference, optimal_parameter)
            .map_err(|e| e.at_step(best, optimal_parameter))?;

        info!(
            parameter = %self.config.sweep.parameter,
            optimum = optimal_parameter,
            score = point.score,
            communities = point.community_count,
            reference = reference.count(),
            "sweep finished"
        );

        Ok(OptimizationOutcome { optimal_parameter, score: point.score, partition, trace })
    }

    fn base_matrix(&self, signals: &SignalMatrix) -> Result<CorrelationMatrix> {
        CorrelationMatrix::compute(signals, self.config.correlation_kind, self.config.zero_variance)
    }

    #[cfg(not(feature = "parallel"))]
    fn sweep(
        &self,
        base: &CorrelationMatrix,
        fixed: Option<&SimilarityGraph>,
        reference: &ReferenceDistribution,
        samples: &[f64],
    ) -> Result<Vec<TracePoint>> {
        samples
            .iter()
            .enumerate()
            .map(|(step, &p)| self.step(base, fixed, reference, step, p))
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn sweep(
        &self,
        base: &CorrelationMatrix,
        fixed: Option<&SimilarityGraph>,
        reference: &ReferenceDistribution,
        samples: &[f64],
    ) -> Result<Vec<TracePoint>> {
        use rayon::prelude::*;

        samples
            .par_iter()
            .enumerate()
            .map(|(step, &p)| self.step(base, fixed, reference, step, p))
            .collect()
    }

    fn step(
        &self,
        base: &CorrelationMatrix,
        fixed: Option<&SimilarityGraph>,
        reference: &ReferenceDistribution,
        step: usize,
        parameter: f64,
    ) -> Result<TracePoint> {
        let (_, point) = self
            .evaluate(base, fixed, reference, parameter)
            .map_err(|e| e.at_step(step, parameter))?;
        debug!(step, parameter, communities = point.community_count, score = point.score, "step");
        Ok(point)
    }

    /// Cluster and score at one parameter value.
    fn evaluate(
        &self,
        base: &CorrelationMatrix,
        fixed: Option<&SimilarityGraph>,
        reference: &ReferenceDistribution,
        parameter: f64,
    ) -> Result<(Partition, TracePoint)> {
        let owned;
        let (graph, resolution) = match fixed {
            Some(graph) => (graph, parameter),
            None => {
                owned = SimilarityGraph::from_correlation(base, parameter);
                (&owned, self.config.resolution)
            }
        };

        if graph.is_edgeless() {
            let point = TracePoint { parameter, score: MAXIMAL_DISTANCE, community_count: 0 };
            return Ok((Partition::empty(), point));
        }

        let partition = self.detector.detect(graph, resolution, self.config.seed)?;
        let score = self.config.metric.score(&partition, reference);
        let point = TracePoint { parameter, score, community_count: partition.len() };
        Ok((partition, point))
    }
}
