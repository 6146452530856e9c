//! Runs the optimiser over a sequence of trials and summarises the study.
//!
//! A trial is one signal matrix paired with the reference it should be
//! compared against: a random sample of a synthetic pool, or one filtered
//! specimen recording. Trials share nothing but the optimiser configuration.

use tracing::info;

use crate::community::CommunityDetector;
use crate::comparator::ReferenceDistribution;
use crate::error::Result;
use crate::optimizer::{OptimizationOutcome, ThresholdOptimizer};
use crate::partition::Partition;
use crate::signal::SignalMatrix;

/// Input for one optimisation run.
#[derive(Clone, Debug)]
pub struct Trial {
    /// Human-readable identifier used in logs and errors.
    pub label: String,
    /// Traces to cluster.
    pub signals: SignalMatrix,
    /// Expected unit sizes.
    pub reference: ReferenceDistribution,
    /// Known grouping, when available, for agreement scoring.
    pub truth: Option<Partition>,
}

/// Supplies trials to a [`Driver`].
pub trait TrialSource {
    /// Produce every trial in run order.
    fn trials(&self) -> Result<Vec<Trial>>;
}

impl TrialSource for Vec<Trial> {
    fn trials(&self) -> Result<Vec<Trial>> {
        Ok(self.clone())
    }
}

/// What one trial produced.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrialOutcome {
    /// Label of the trial.
    pub label: String,
    /// Communities expected by the reference.
    pub reference_count: usize,
    /// Adjusted Rand agreement with the known grouping, if one was supplied.
    pub agreement: Option<f64>,
    /// Full optimiser result.
    pub outcome: OptimizationOutcome,
}

impl TrialOutcome {
    /// Optimal parameter of the trial.
    pub fn optimal_parameter(&self) -> f64 {
        self.outcome.optimal_parameter
    }

    /// Communities recovered at the optimum.
    pub fn community_count(&self) -> usize {
        self.outcome.community_count()
    }

    /// Recovered over expected community count.
    pub fn count_ratio(&self) -> f64 {
        self.community_count() as f64 / self.reference_count as f64
    }
}

/// Aggregate statistics over all trials.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StudySummary {
    /// Number of trials.
    pub trials: usize,
    /// Mean optimal parameter.
    pub mean_parameter: f64,
    /// Population standard deviation of the optimal parameter.
    pub std_parameter: f64,
    /// Mean recovered/expected community ratio.
    pub mean_count_ratio: f64,
    /// Population standard deviation of that ratio.
    pub std_count_ratio: f64,
    /// Mean agreement over trials that had a known grouping.
    pub mean_agreement: Option<f64>,
}

impl StudySummary {
    /// Summarise a set of trial outcomes. An empty set summarises to zeros.
    pub fn from_outcomes(outcomes: &[TrialOutcome]) -> Self {
        let params: Vec<f64> = outcomes.iter().map(TrialOutcome::optimal_parameter).collect();
        let ratios: Vec<f64> = outcomes.iter().map(TrialOutcome::count_ratio).collect();
        let agreements: Vec<f64> = outcomes.iter().filter_map(|o| o.agreement).collect();
        let (mean_parameter, std_parameter) = mean_std(&params);
        let (mean_count_ratio, std_count_ratio) = mean_std(&ratios);
        Self {
            trials: outcomes.len(),
            mean_parameter,
            std_parameter,
            mean_count_ratio,
            std_count_ratio,
            mean_agreement: (!agreements.is_empty()).then(|| mean_std(&agreements).0),
        }
    }
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Everything a study run produced.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StudyReport {
    /// Per-trial results in run order.
    pub outcomes: Vec<TrialOutcome>,
    /// Aggregate over `outcomes`.
    pub summary: StudySummary,
}

/// Applies one optimiser to every trial of a source.
pub struct Driver<D> {
    optimizer: ThresholdOptimizer<D>,
}

impl<D: CommunityDetector + Sync> Driver<D> {
    /// Wrap a configured optimiser.
    pub fn new(optimizer: ThresholdOptimizer<D>) -> Self {
        Self { optimizer }
    }

    /// Optimise a single trial.
    pub fn run_trial(&self, trial: &Trial) -> Result<TrialOutcome> {
        let outcome = self
            .optimizer
            .optimise(&trial.signals, &trial.reference)
            .map_err(|e| e.in_trial(trial.label.clone()))?;
        let agreement = trial.truth.as_ref().and_then(|t| outcome.partition.agreement(t));
        info!(
            trial = %trial.label,
            optimum = outcome.optimal_parameter,
            score = outcome.score,
            communities = outcome.community_count(),
            expected = trial.reference.count(),
            "trial done"
        );
        Ok(TrialOutcome {
            label: trial.label.clone(),
            reference_count: trial.reference.count(),
            agreement,
            outcome,
        })
    }

    /// Optimise every trial; the first failure aborts the run.
    pub fn run(&self, source: &impl TrialSource) -> Result<StudyReport> {
        let outcomes = source
            .trials()?
            .iter()
            .map(|t| self.run_trial(t))
            .collect::<Result<Vec<_>>>()?;
        let summary = StudySummary::from_outcomes(&outcomes);
        info!(
            trials = summary.trials,
            mean = summary.mean_parameter,
            std = summary.std_parameter,
            ratio = summary.mean_count_ratio,
            "study done"
        );
        Ok(StudyReport { outcomes, summary })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;
    use crate::optimizer::{OptimizerConfig, SweepSpec};

    fn pair_trial(label: &str) -> Trial {
        let signals = SignalMatrix::new(vec![
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
            vec![2.0, 4.1, 6.0, 8.2, 10.0],
            vec![5.0, 1.0, 4.0, 2.0, 3.0],
        ])
        .unwrap();
        Trial {
            label: label.to_string(),
            signals,
            reference: ReferenceDistribution::new(vec![2, 1]).unwrap(),
            truth: Some(Partition::new(vec![vec![0, 1], vec![2]]).unwrap()),
        }
    }

    fn driver() -> Driver<crate::community::Louvain> {
        let config = OptimizerConfig {
            sweep: SweepSpec::threshold(0.0, 0.9, 10),
            ..OptimizerConfig::default()
        };
        Driver::new(ThresholdOptimizer::new(config).unwrap())
    }

    #[test]
    fn test_summary_statistics() {
        let report = driver().run(&vec![pair_trial("a"), pair_trial("b")]).unwrap();
        assert_eq!(report.summary.trials, 2);
        assert_eq!(report.outcomes[1].label, "b");
        assert_eq!(report.summary.std_parameter, 0.0);
        assert_eq!(report.summary.mean_parameter, report.outcomes[0].optimal_parameter());
    }

    #[test]
    fn test_trial_error_names_trial() {
        let mut bad = pair_trial("flat");
        bad.signals = SignalMatrix::new(vec![vec![1.0, 1.0], vec![1.0, 2.0]]).unwrap();
        let err = driver().run(&vec![pair_trial("ok"), bad]).unwrap_err();
        match err {
            AnalysisError::Trial { trial, .. } => assert_eq!(trial, "flat"),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_mean_std_population() {
        let (m, s) = mean_std(&[1.0, 3.0]);
        assert_eq!(m, 2.0);
        assert_eq!(s, 1.0);
        assert_eq!(mean_std(&[]), (0.0, 0.0));
    }

    #[test]
    fn test_empty_summary() {
        let s = StudySummary::from_outcomes(&[]);
        assert_eq!(s.trials, 0);
        assert_eq!(s.mean_agreement, None);
    }
}
