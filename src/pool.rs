//! Synthetic motor pool with size-ordered recruitment.
//!
//! Unit sizes follow an exponential innervation profile from the smallest to
//! the largest unit, perturbed by Gaussian noise. The pool is driven by a ramp
//! of stimulation pulses; a unit's recruitment threshold grows exponentially
//! with its rank, so small units fire first. Each fibre trace is the binary
//! firing of its unit plus independent Gaussian noise.
//!
//! ```text
//! y_i     = y_1 · exp(ln(y_n / y_1) / n · i)          innervation of unit i
//! a       = ln(100 · full_recruitment) / n
//! cd_r(i) = exp(a · i) / 100                          recruitment threshold
//! active  = stimulus(t) > |cd_r(i) + noise_scale · ε_i|
//! ```
//!
//! Every random draw comes from a ChaCha8 stream with an explicit seed: the
//! size noise from `size_seed`, unit `i`'s threshold noise from seed `i`, and
//! fibre `f`'s trace noise from seed `f`. Regenerating a pool with the same
//! config reproduces it exactly.

use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use tracing::debug;

use crate::comparator::ReferenceDistribution;
use crate::driver::{Trial, TrialSource};
use crate::error::{AnalysisError, Result};
use crate::partition::Partition;
use crate::signal::SignalMatrix;

/// Parameters of the pool model.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MotorPoolConfig {
    /// Number of motor units.
    pub unit_count: usize,
    /// Innervation number of the smallest unit.
    pub smallest_innervation: f64,
    /// Innervation number of the largest unit.
    pub largest_innervation: f64,
    /// Seed of the unit-size noise.
    pub size_seed: u64,
    /// Number of stimulation samples.
    pub stimulus_length: usize,
    /// Samples between stimulation pulses.
    pub pulse_interval: usize,
    /// Stimulation level at which every unit is recruited.
    pub full_recruitment: f64,
    /// Scale of the per-unit threshold noise.
    pub recruitment_noise: f64,
    /// Scale of the per-fibre trace noise.
    pub fibre_noise: f64,
    /// Min–max normalise each fibre trace.
    pub normalise: bool,
}

impl Default for MotorPoolConfig {
    fn default() -> Self {
        Self {
            unit_count: 30,
            smallest_innervation: 1.0,
            largest_innervation: 9.0,
            size_seed: 2,
            stimulus_length: 1000,
            pulse_interval: 12,
            full_recruitment: 250.0,
            recruitment_noise: 2.0,
            fibre_noise: 0.125,
            normalise: true,
        }
    }
}

impl MotorPoolConfig {
    /// Reject parameters the model cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.unit_count == 0 {
            return Err(AnalysisError::config("motor pool needs at least one unit"));
        }
        if !(self.smallest_innervation > 0.0)
            || !(self.largest_innervation >= self.smallest_innervation)
            || !self.largest_innervation.is_finite()
        {
            return Err(AnalysisError::config(format!(
                "innervation range {}..{} is invalid",
                self.smallest_innervation, self.largest_innervation
            )));
        }
        if self.stimulus_length == 0 || self.pulse_interval == 0 {
            return Err(AnalysisError::config("stimulus length and pulse interval must be positive"));
        }
        if !(self.full_recruitment > 0.0) || !self.full_recruitment.is_finite() {
            return Err(AnalysisError::config("full recruitment level must be positive"));
        }
        if !(self.recruitment_noise >= 0.0) || !(self.fibre_noise >= 0.0) {
            return Err(AnalysisError::config("noise scales must be non-negative"));
        }
        Ok(())
    }
}

/// A generated pool: units, their fibres and every fibre's trace.
#[derive(Clone, Debug)]
pub struct MotorPool {
    config: MotorPoolConfig,
    units: Partition,
    /// Unit index of every fibre, in fibre order.
    fibre_units: Vec<usize>,
    stimulus: Vec<f64>,
    thresholds: Vec<f64>,
    activity: SignalMatrix,
}

/// Traces and ground truth for a random subset of units.
#[derive(Clone, Debug)]
pub struct PoolSample {
    /// Indices of the sampled units, ascending.
    pub units: Vec<usize>,
    /// Traces of the sampled units' fibres, with pool fibre ids.
    pub signals: SignalMatrix,
    /// Sizes of the sampled units.
    pub reference: ReferenceDistribution,
    /// True grouping of the sampled fibres.
    pub truth: Partition,
}

impl MotorPool {
    /// Build the pool described by `config`.
    pub fn generate(config: MotorPoolConfig) -> Result<Self> {
        config.validate()?;
        let n = config.unit_count;

        let ratio = config.largest_innervation / config.smallest_innervation;
        let mut size_rng = ChaCha8Rng::seed_from_u64(config.size_seed);
        let mut noisy: Vec<f64> = (0..n)
            .map(|i| {
                let y = config.smallest_innervation * (ratio.ln() / n as f64 * i as f64).exp();
                y + size_rng.sample::<f64, _>(StandardNormal)
            })
            .collect();
        noisy.sort_by(f64::total_cmp);
        let sizes: Vec<usize> = noisy.iter().map(|y| y.round().max(1.0) as usize).collect();

        let mut groups = Vec::with_capacity(n);
        let mut fibre_units = Vec::new();
        for (unit, &size) in sizes.iter().enumerate() {
            let start = fibre_units.len();
            groups.push((start..start + size).collect());
            fibre_units.extend(std::iter::repeat(unit).take(size));
        }
        let units = Partition::new(groups)?.with_innervation(&noisy);

        let stimulus = pulse_ramp(&config);
        let a = (100.0 * config.full_recruitment).ln() / n as f64;
        let thresholds: Vec<f64> = (0..n).map(|i| (a * i as f64).exp() / 100.0).collect();
        let unit_noise: Vec<f64> = (0..n).map(|i| standard_normal(i as u64, i)).collect();

        let mut rows = Vec::with_capacity(fibre_units.len());
        for (fibre, &unit) in fibre_units.iter().enumerate() {
            let cutoff = (thresholds[unit] + config.recruitment_noise * unit_noise[unit]).abs();
            let mut noise = ChaCha8Rng::seed_from_u64(fibre as u64);
            let row: Vec<f64> = stimulus
                .iter()
                .map(|&s| {
                    let firing = if s > cutoff { 1.0 } else { 0.0 };
                    firing + config.fibre_noise * noise.sample::<f64, _>(StandardNormal)
                })
                .collect();
            rows.push(row);
        }
        let mut activity = SignalMatrix::new(rows)?;
        if config.normalise {
            activity = activity.normalised();
        }

        debug!(units = n, fibres = fibre_units.len(), "motor pool generated");
        Ok(Self { config, units, fibre_units, stimulus, thresholds, activity })
    }

    /// Generation parameters.
    pub fn config(&self) -> &MotorPoolConfig {
        &self.config
    }

    /// All units, ordered by size.
    pub fn units(&self) -> &Partition {
        &self.units
    }

    /// Unit sizes in unit order (ascending).
    pub fn unit_sizes(&self) -> Vec<usize> {
        self.units.sizes()
    }

    /// Total number of fibres.
    pub fn fibre_count(&self) -> usize {
        self.fibre_units.len()
    }

    /// Unit index of a fibre.
    pub fn unit_of_fibre(&self, fibre: usize) -> Option<usize> {
        self.fibre_units.get(fibre).copied()
    }

    /// Stimulation intensity per sample.
    pub fn stimulus(&self) -> &[f64] {
        &self.stimulus
    }

    /// Noise-free recruitment threshold of each unit.
    pub fn recruitment_thresholds(&self) -> &[f64] {
        &self.thresholds
    }

    /// Traces of every fibre.
    pub fn activity(&self) -> &SignalMatrix {
        &self.activity
    }

    /// Pick `k` distinct units with a seeded draw and extract their fibres.
    ///
    /// Fibres whose trace is identically zero are left out, and the reference
    /// and truth only count the fibres kept.
    pub fn sample(&self, k: usize, seed: u64) -> Result<PoolSample> {
        let n = self.units.len();
        if k == 0 || k > n {
            return Err(AnalysisError::config(format!(
                "cannot sample {k} units from a pool of {n}"
            )));
        }
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut chosen = index::sample(&mut rng, n, k).into_vec();
        chosen.sort_unstable();

        let positions: Vec<usize> = (0..self.fibre_count())
            .filter(|&f| chosen.binary_search(&self.fibre_units[f]).is_ok())
            .filter(|&f| self.activity.row(f).iter().any(|&v| v != 0.0))
            .collect();
        if positions.is_empty() {
            return Err(AnalysisError::config("sampled units have no active fibres"));
        }
        let signals = self.activity.select(&positions)?;

        let kept: Vec<usize> = signals.fibre_ids().to_vec();
        let truth = Partition::new(
            chosen.iter().map(|&u| self.units.units()[u].members.clone()).collect(),
        )?
        .restricted_to(&kept);
        let reference = ReferenceDistribution::from_partition(&truth)?;

        Ok(PoolSample { units: chosen, signals, reference, truth })
    }
}

/// Stimulation ramp: a pulse every `pulse_interval` steps, zeros between.
///
/// Each step contributes a zero sample, and pulse steps append their pulse
/// right after it, so pulses drift one sample later per pulse.
fn pulse_ramp(config: &MotorPoolConfig) -> Vec<f64> {
    let length = config.stimulus_length;
    let slope = (config.full_recruitment - 15.0) / length as f64;
    let mut stimulus = Vec::with_capacity(length + length / config.pulse_interval + 1);
    for t in 0..length {
        stimulus.push(0.0);
        if t % config.pulse_interval == 0 {
            stimulus.push(t as f64 * slope);
        }
    }
    stimulus.truncate(length);
    stimulus
}

/// The `index`-th standard normal draw of the stream seeded with `seed`.
fn standard_normal(seed: u64, index: usize) -> f64 {
    ChaCha8Rng::seed_from_u64(seed)
        .sample_iter::<f64, _>(StandardNormal)
        .nth(index)
        .unwrap_or(0.0)
}

/// Repeated random samples of one pool, one trial per seed `0..iterations`.
pub struct SyntheticTrials<'a> {
    pool: &'a MotorPool,
    sample_size: usize,
    iterations: usize,
}

impl<'a> SyntheticTrials<'a> {
    /// `iterations` samples of `sample_size` units each.
    pub fn new(pool: &'a MotorPool, sample_size: usize, iterations: usize) -> Self {
        Self { pool, sample_size, iterations }
    }
}

impl TrialSource for SyntheticTrials<'_> {
    fn trials(&self) -> Result<Vec<Trial>> {
        (0..self.iterations)
            .map(|seed| {
                let label = format!("sample-{seed}");
                let sample = self
                    .pool
                    .sample(self.sample_size, seed as u64)
                    .map_err(|e| e.in_trial(label.clone()))?;
                Ok(Trial {
                    label,
                    signals: sample.signals,
                    reference: sample.reference,
                    truth: Some(sample.truth),
                })
            })
            .collect()
    }
}
