//! # Specimen analysis on a simulated recording
//!
//! Builds a toy recording with three units (one fibre dead, one unresponsive),
//! runs the liveness and responsiveness filters, then recovers the units with
//! an earth-mover threshold sweep and compares them with the annotation.
//!
//! ```bash
//! cargo run --example empirical_specimen
//! ```

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use motorpool_core::{
    Driver, OptimizerConfig, Recording, SignalMatrix, SpecimenConfig, SpecimenTrial, SweepSpec,
    ThresholdOptimizer, TrialSource,
};

const SAMPLES: usize = 400;

/// A unit fires a sharp transient at each of its onsets.
fn unit_drive(onsets: &[usize]) -> Vec<f64> {
    let mut drive = vec![0.0; SAMPLES];
    for &onset in onsets {
        for (k, v) in drive.iter_mut().skip(onset).take(3).enumerate() {
            *v += [0.3, 1.0, 0.3][k];
        }
    }
    drive
}

fn noisy(drive: &[f64], seed: u64, scale: f64) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    drive.iter().map(|v| v + scale * rng.sample::<f64, _>(StandardNormal)).collect()
}

fn main() -> motorpool_core::Result<()> {
    let units = [
        unit_drive(&[40, 160, 280]),
        unit_drive(&[90, 210, 330]),
        unit_drive(&[120, 250, 370]),
    ];
    // fibre -> unit; fibre 7 is unresponsive noise
    let membership = [0, 1, 0, 2, 1, 0, 2, 3];

    let mut traces = Vec::new();
    let mut field = Vec::new();
    let twitch = unit_drive(&[50, 150, 250, 350]);
    for (fibre, &unit) in membership.iter().enumerate() {
        let drive = units.get(unit).cloned().unwrap_or_else(|| vec![0.0; SAMPLES]);
        traces.push(noisy(&drive, fibre as u64, 0.05));
        // fibre 4 is dead: its field response is inverted
        let sign = if fibre == 4 { -1.0 } else { 1.0 };
        let inverted: Vec<f64> = twitch.iter().map(|v| sign * v).collect();
        field.push(noisy(&inverted, 100 + fibre as u64, 0.05));
    }

    let mut recording = Recording::new(SignalMatrix::new(traces)?);
    recording.field_stimulation = Some(SignalMatrix::new(field)?);

    // Annotated units, numbered among the fibres that survive filtering:
    // kept fibres are 0, 1, 2, 3, 5, 6.
    let specimen = SpecimenConfig {
        id: "toy".to_string(),
        sd_multiplier: 4.0,
        reference_units: vec![vec![0, 2, 4], vec![1], vec![3, 5]],
    };

    let trial = SpecimenTrial::new(specimen, recording);
    let kept = trial.trials()?;
    println!("kept fibres: {:?}", kept[0].signals.fibre_ids());
    println!("unannotated: {:?}", trial.unannotated_fibres()?);

    let config = OptimizerConfig { sweep: SweepSpec::threshold(-0.5, 0.99, 150), ..OptimizerConfig::default() };
    let study = Driver::new(ThresholdOptimizer::new(config)?).run(&trial)?;
    let outcome = &study.outcomes[0];

    println!("optimal threshold: {:.3}", outcome.optimal_parameter());
    println!("score:             {:.4}", outcome.outcome.score);
    for unit in outcome.outcome.partition.units() {
        println!("unit {}: fibres {:?}", unit.id, unit.members);
    }
    if let Some(a) = outcome.agreement {
        println!("agreement with annotation: {a:.3}");
    }
    Ok(())
}
