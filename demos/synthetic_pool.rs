//! # Synthetic motor pool study
//!
//! Generates the default 30-unit pool, draws repeated 13-unit samples and
//! recovers each sample's units with both comparators. Prints the optimal
//! threshold per sample and how well the recovered grouping matches the truth.
//!
//! ```bash
//! cargo run --example synthetic_pool
//! ```

use motorpool_core::{
    ComparatorMetric, Driver, MotorPool, MotorPoolConfig, OptimizerConfig, SweepSpec,
    SyntheticTrials, ThresholdOptimizer,
};

fn main() -> motorpool_core::Result<()> {
    let pool = MotorPool::generate(MotorPoolConfig::default())?;
    println!("pool: {} units, {} fibres", pool.units().len(), pool.fibre_count());
    println!("unit sizes: {:?}", pool.unit_sizes());
    println!();

    let trials = SyntheticTrials::new(&pool, 13, 10);

    for metric in [ComparatorMetric::EarthMover, ComparatorMetric::CommunityCount { offset: 0 }] {
        let config = OptimizerConfig {
            sweep: SweepSpec::threshold(0.0, 0.99, 100),
            metric,
            ..OptimizerConfig::default()
        };
        let study = Driver::new(ThresholdOptimizer::new(config)?).run(&trials)?;

        println!("── {metric} ──");
        println!("{:<12} {:>9} {:>6} {:>6} {:>9}", "sample", "threshold", "found", "ref", "agreement");
        for t in &study.outcomes {
            println!(
                "{:<12} {:>9.2} {:>6} {:>6} {:>9.3}",
                t.label,
                t.optimal_parameter(),
                t.community_count(),
                t.reference_count,
                t.agreement.unwrap_or(f64::NAN)
            );
        }
        let s = &study.summary;
        println!(
            "threshold {:.3} ± {:.3}, found/expected {:.2} ± {:.2}",
            s.mean_parameter, s.std_parameter, s.mean_count_ratio, s.std_count_ratio
        );
        println!();
    }
    Ok(())
}
