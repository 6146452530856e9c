//! End-to-end optimiser scenarios on hand-built signal matrices.
//!
//! Each test drives the public pipeline from raw traces to the reported
//! partition: correlation, thresholded graph, Louvain, comparator, sweep.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use motorpool_core::{
    AnalysisError, ComparatorMetric, CorrelationKind, MotorPool, MotorPoolConfig, OptimizerConfig,
    ReferenceDistribution, SignalMatrix, SweepSpec, ThresholdOptimizer, ZeroVariancePolicy,
    MAXIMAL_DISTANCE,
};

// ─── helpers ─────────────────────────────────────────────────────────────────

const SAMPLES: usize = 500;

/// 10 copies of one smooth trace followed by 10 independent noise traces.
fn identical_and_noise() -> SignalMatrix {
    let shared: Vec<f64> = (0..SAMPLES).map(|t| (t as f64 / 7.0).sin()).collect();
    let mut rows = vec![shared; 10];
    for seed in 0..10u64 {
        let mut rng = ChaCha8Rng::seed_from_u64(1_000 + seed);
        rows.push((0..SAMPLES).map(|_| rng.sample::<f64, _>(StandardNormal)).collect());
    }
    SignalMatrix::new(rows).unwrap()
}

/// Rows 0 and 1 correlate at 0.943; row 2 is the reverse of row 0.
fn permuted_ramps() -> SignalMatrix {
    SignalMatrix::new(vec![
        vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        vec![1.0, 2.0, 3.0, 4.0, 6.0, 5.0],
        vec![6.0, 5.0, 4.0, 3.0, 2.0, 1.0],
    ])
    .unwrap()
}

/// `permuted_ramps` with a constant trace inserted as fibre 1.
fn ramps_with_flat_fibre() -> SignalMatrix {
    let ramps = permuted_ramps();
    let rows = ramps.rows();
    SignalMatrix::new(vec![rows[0].clone(), vec![2.5; 6], rows[1].clone(), rows[2].clone()])
        .unwrap()
}

fn threshold_sweep(lower: f64, upper: f64, steps: usize) -> OptimizerConfig {
    OptimizerConfig { sweep: SweepSpec::threshold(lower, upper, steps), ..OptimizerConfig::default() }
}

// ─── scenarios ───────────────────────────────────────────────────────────────

/// The identical rows form one unit and the noise rows stay apart.
#[test]
fn test_identical_rows_recovered_as_one_unit() {
    let signals = identical_and_noise();
    let reference = ReferenceDistribution::new(vec![10, 1, 1, 1, 1, 1, 1, 1, 1, 1]).unwrap();
    let optimizer = ThresholdOptimizer::new(threshold_sweep(0.0, 1.0, 11)).unwrap();

    let outcome = optimizer.optimise(&signals, &reference).unwrap();

    assert_eq!(outcome.trace.len(), 11);
    assert!(outcome.score < MAXIMAL_DISTANCE);
    let clique = outcome.partition.unit_of(0).unwrap();
    for fibre in 1..10 {
        assert_eq!(outcome.partition.unit_of(fibre), Some(clique), "fibre {fibre}");
    }
    for fibre in 10..20 {
        let unit = outcome.partition.unit_of(fibre).unwrap();
        assert_ne!(unit, clique, "noise fibre {fibre} joined the clique");
    }
    assert_eq!(outcome.partition.len(), 11);
}

/// Steps above every correlation score the sentinel and the sweep carries on.
#[test]
fn test_edgeless_steps_do_not_halt_sweep() {
    let signals = permuted_ramps();
    let reference = ReferenceDistribution::new(vec![2, 1]).unwrap();
    let optimizer = ThresholdOptimizer::new(threshold_sweep(0.5, 1.0, 6)).unwrap();

    let outcome = optimizer.optimise(&signals, &reference).unwrap();

    let last = outcome.trace.last().unwrap();
    assert_eq!(last.score, MAXIMAL_DISTANCE);
    assert_eq!(last.community_count, 0);
    for point in &outcome.trace[..5] {
        assert_eq!(point.score, 0.0);
        assert_eq!(point.community_count, 2);
    }
    assert_eq!(outcome.optimal_parameter, 0.5);
    assert_eq!(outcome.partition.sizes(), vec![2, 1]);
}

/// A sweep where no step has an edge reports the sentinel and no units.
#[test]
fn test_fully_edgeless_sweep_is_degenerate() {
    let signals = permuted_ramps();
    let reference = ReferenceDistribution::new(vec![2, 1]).unwrap();
    let optimizer = ThresholdOptimizer::new(threshold_sweep(0.95, 1.0, 3)).unwrap();

    let outcome = optimizer.optimise(&signals, &reference).unwrap();

    assert!(outcome.is_degenerate());
    assert_eq!(outcome.score, MAXIMAL_DISTANCE);
    assert_eq!(outcome.community_count(), 0);
    assert_eq!(outcome.optimal_parameter, 0.95);
}

#[test]
fn test_zero_fibres_is_configuration_error() {
    let err = SignalMatrix::new(Vec::new()).unwrap_err();
    assert!(matches!(err, AnalysisError::Configuration(_)));
}

#[test]
fn test_empty_reference_is_configuration_error() {
    assert!(ReferenceDistribution::new(Vec::new()).unwrap_err().is_configuration());
}

/// A reference covering more fibres than the matrix holds is rejected up front.
#[test]
fn test_reference_larger_than_signals_is_configuration_error() {
    let reference = ReferenceDistribution::new(vec![10, 10]).unwrap();
    let optimizer = ThresholdOptimizer::new(threshold_sweep(0.0, 1.0, 5)).unwrap();

    let err = optimizer.optimise(&permuted_ramps(), &reference).unwrap_err();

    assert!(err.is_configuration(), "{err}");
    assert!(err.to_string().contains("20 fibres"), "{err}");
}

/// A reference that exactly covers the matrix is accepted.
#[test]
fn test_reference_covering_every_fibre_is_accepted() {
    let reference = ReferenceDistribution::new(vec![2, 1]).unwrap();
    let optimizer = ThresholdOptimizer::new(threshold_sweep(0.5, 1.0, 6)).unwrap();
    assert!(optimizer.optimise(&permuted_ramps(), &reference).is_ok());
}

// ─── correlation options ─────────────────────────────────────────────────────

/// Excluded constant traces leave the partition; the rest keep their ids.
#[test]
fn test_excluded_flat_fibre_absent_from_partition() {
    let config = OptimizerConfig {
        zero_variance: ZeroVariancePolicy::Exclude,
        ..threshold_sweep(0.5, 1.0, 6)
    };
    let reference = ReferenceDistribution::new(vec![2, 1]).unwrap();

    let outcome = ThresholdOptimizer::new(config)
        .unwrap()
        .optimise(&ramps_with_flat_fibre(), &reference)
        .unwrap();

    assert_eq!(outcome.partition.unit_of(1), None);
    assert_eq!(outcome.partition.fibre_count(), 3);
    let members: Vec<Vec<usize>> =
        outcome.partition.units().iter().map(|u| u.members.clone()).collect();
    assert_eq!(members, vec![vec![0, 2], vec![3]]);
    assert_eq!(outcome.score, 0.0);
}

/// Excluded fibres no longer count towards the reference size check.
#[test]
fn test_exclusion_shrinks_available_fibres() {
    let config = OptimizerConfig {
        zero_variance: ZeroVariancePolicy::Exclude,
        ..threshold_sweep(0.5, 1.0, 6)
    };
    let reference = ReferenceDistribution::new(vec![2, 2]).unwrap();

    let err = ThresholdOptimizer::new(config)
        .unwrap()
        .optimise(&ramps_with_flat_fibre(), &reference)
        .unwrap_err();

    assert!(err.is_configuration(), "{err}");
}

/// A constant trace kept with zero correlations ends up alone.
#[test]
fn test_flat_fibre_treated_as_zero_is_singleton() {
    let config = OptimizerConfig {
        zero_variance: ZeroVariancePolicy::TreatAsZero,
        ..threshold_sweep(0.5, 1.0, 6)
    };
    let reference = ReferenceDistribution::new(vec![2, 1, 1]).unwrap();

    let outcome = ThresholdOptimizer::new(config)
        .unwrap()
        .optimise(&ramps_with_flat_fibre(), &reference)
        .unwrap();

    let unit = outcome.partition.unit_of(1).unwrap();
    assert_eq!(outcome.partition.units()[unit].members, vec![1]);
    assert_eq!(outcome.partition.unit_of(0), outcome.partition.unit_of(2));
    assert_eq!(outcome.partition.sizes(), vec![2, 1, 1]);
}

/// Kendall scores the swapped ramps at 13/15, below Pearson's 0.943, so the
/// 0.9 step loses its only edge.
#[test]
fn test_kendall_sweep() {
    let config = OptimizerConfig {
        correlation_kind: CorrelationKind::Kendall,
        ..threshold_sweep(0.5, 1.0, 6)
    };
    let reference = ReferenceDistribution::new(vec![2, 1]).unwrap();

    let outcome =
        ThresholdOptimizer::new(config).unwrap().optimise(&permuted_ramps(), &reference).unwrap();

    let scores: Vec<f64> = outcome.trace.iter().map(|p| p.score).collect();
    assert_eq!(scores[..4], [0.0; 4]);
    assert_eq!(scores[4..], [MAXIMAL_DISTANCE; 2]);
    assert_eq!(outcome.optimal_parameter, 0.5);
    assert_eq!(outcome.partition.sizes(), vec![2, 1]);
}

/// The count comparator picks a step with the expected number of units.
#[test]
fn test_count_metric_matches_reference_count() {
    let signals = permuted_ramps();
    let reference = ReferenceDistribution::new(vec![1, 1]).unwrap();
    let config = OptimizerConfig {
        metric: ComparatorMetric::CommunityCount { offset: 0 },
        ..threshold_sweep(0.5, 1.0, 6)
    };

    let outcome = ThresholdOptimizer::new(config).unwrap().optimise(&signals, &reference).unwrap();

    assert_eq!(outcome.score, 0.0);
    assert_eq!(outcome.community_count(), 2);
}

// ─── determinism ─────────────────────────────────────────────────────────────

/// Same signals, reference, sweep and seed give the same optimum twice.
#[test]
fn test_optimise_is_idempotent() {
    let pool = MotorPool::generate(MotorPoolConfig::default()).unwrap();
    let sample = pool.sample(6, 11).unwrap();
    let optimizer = ThresholdOptimizer::new(threshold_sweep(0.0, 0.95, 20)).unwrap();

    let first = optimizer.optimise(&sample.signals, &sample.reference).unwrap();
    let second = optimizer.optimise(&sample.signals, &sample.reference).unwrap();

    assert_eq!(first, second);
}

/// Changing the seed never changes the sweep grid.
#[test]
fn test_trace_follows_sweep_grid() {
    let signals = identical_and_noise();
    let reference = ReferenceDistribution::new(vec![10, 1, 1, 1, 1, 1, 1, 1, 1, 1]).unwrap();
    for seed in [0, 2, 99] {
        let config = OptimizerConfig { seed, ..threshold_sweep(0.0, 1.0, 11) };
        let outcome =
            ThresholdOptimizer::new(config).unwrap().optimise(&signals, &reference).unwrap();
        let grid: Vec<f64> = outcome.trace.iter().map(|p| p.parameter).collect();
        assert_eq!(grid, SweepSpec::threshold(0.0, 1.0, 11).samples().unwrap());
    }
}
