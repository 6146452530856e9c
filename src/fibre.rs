//! Empirical fibre filtering and annotated specimens.
//!
//! A recording holds one ΔF/F trace per fibre for the electrode stimulation
//! and, optionally, one per fibre for whole-muscle field stimulation. Before
//! clustering, two filters run:
//!
//! 1. **Liveness**: fibres whose field-stimulation trace anti-correlates with
//!    the rest of the muscle on average are dead and dropped.
//! 2. **Responsiveness**: a trace must contain a peak that rises above both
//!    neighbouring samples by at least `mean + k·std` of the trace, with `k`
//!    chosen per specimen.
//!
//! Annotated reference units are numbered by position among the fibres that
//! survive both filters, which is the numbering the annotation was made in.
//! Filtered fibres outside every annotated unit are still clustered; they are
//! listed by [`SpecimenConfig::unannotated_fibres`].
//!
//! A specimen may be recorded through several electrodes. Each recording
//! becomes its own trial, labelled `specimen/electrode`.

use hashbrown::HashSet;
use tracing::{debug, info};

use crate::comparator::ReferenceDistribution;
use crate::correlation::{CorrelationKind, CorrelationMatrix, ZeroVariancePolicy};
use crate::driver::{Trial, TrialSource};
use crate::error::{AnalysisError, Result};
use crate::partition::Partition;
use crate::signal::SignalMatrix;

/// A fibre (region of interest) with its optional position in the image.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Fibre {
    /// Fibre id, matching the signal row's fibre id.
    pub id: usize,
    /// Horizontal pixel coordinate.
    pub x: Option<f64>,
    /// Vertical pixel coordinate.
    pub y: Option<f64>,
}

// ─── Filters ─────────────────────────────────────────────────────────────────

/// Fibre ids whose field-stimulation trace is not anti-correlated with the muscle.
///
/// A fibre is dead when the mean of its correlation row, counting its own
/// self-correlation of 1, is negative. Constant traces correlate as 0.
pub fn detect_live_fibres(field_stimulation: &SignalMatrix) -> Result<Vec<usize>> {
    let matrix = CorrelationMatrix::compute(
        field_stimulation,
        CorrelationKind::Pearson,
        ZeroVariancePolicy::TreatAsZero,
    )?;
    let n = matrix.len() as f64;
    let alive: Vec<usize> = (0..matrix.len())
        .filter(|&i| (matrix.row(i).iter().sum::<f64>() + 1.0) / n >= 0.0)
        .map(|i| matrix.fibre_ids()[i])
        .collect();
    debug!(alive = alive.len(), dead = matrix.len() - alive.len(), "liveness filter");
    Ok(alive)
}

/// Indices of local maxima that rise at least `threshold` above both neighbours.
///
/// Flat-topped peaks are reported at the middle of the plateau. The first and
/// last samples are never peaks.
pub fn find_peaks(trace: &[f64], threshold: f64) -> Vec<usize> {
    let mut peaks = Vec::new();
    if trace.len() < 3 {
        return peaks;
    }
    let last = trace.len() - 1;
    let mut i = 1;
    while i < last {
        if trace[i - 1] < trace[i] {
            let mut ahead = i + 1;
            while ahead < last && trace[ahead] == trace[i] {
                ahead += 1;
            }
            if trace[ahead] < trace[i] {
                let rise = (trace[i] - trace[i - 1]).min(trace[i] - trace[ahead]);
                if rise >= threshold {
                    peaks.push((i + ahead - 1) / 2);
                }
                i = ahead;
                continue;
            }
        }
        i += 1;
    }
    peaks
}

/// True when the trace has a peak standing `sd_multiplier` deviations out of its noise.
pub fn is_responsive(trace: &[f64], sd_multiplier: f64) -> bool {
    if trace.is_empty() {
        return false;
    }
    let n = trace.len() as f64;
    let mean = trace.iter().sum::<f64>() / n;
    let std = (trace.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n).sqrt();
    !find_peaks(trace, mean + sd_multiplier * std).is_empty()
}

/// Fibre ids of the rows of `signals` that respond to stimulation.
pub fn responsive_fibres(signals: &SignalMatrix, sd_multiplier: f64) -> Vec<usize> {
    (0..signals.len())
        .filter(|&i| is_responsive(signals.row(i), sd_multiplier))
        .map(|i| signals.fibre_id(i))
        .collect()
}

// ─── Specimens ───────────────────────────────────────────────────────────────

/// Per-specimen constants: noise cut-off and manually identified units.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpecimenConfig {
    /// Specimen identifier.
    pub id: String,
    /// `k` in the `mean + k·std` responsiveness cut-off.
    pub sd_multiplier: f64,
    /// Annotated units, as positions among the filtered fibres.
    pub reference_units: Vec<Vec<usize>>,
}

impl SpecimenConfig {
    /// Constants of the annotated syrinx specimens.
    pub fn builtin(id: &str) -> Option<Self> {
        let key = id.to_ascii_lowercase();
        let (sd_multiplier, reference_units): (f64, Vec<Vec<usize>>) = match key.as_str() {
            "gw65" => (
                5.5,
                vec![
                    vec![158],
                    vec![156, 157, 19, 69],
                    vec![33],
                    vec![60],
                    vec![68, 75],
                    vec![39, 63, 28],
                    vec![146],
                    vec![147],
                    vec![15, 74, 93, 94, 99, 120, 121, 127, 129],
                    vec![40],
                    vec![64],
                    vec![8, 11, 84, 101, 113, 81],
                    vec![91, 92],
                ],
            ),
            "gw64" => (
                5.0,
                vec![vec![128, 159, 116, 81, 100, 102], vec![101], vec![95], vec![68, 73, 74, 75, 76]],
            ),
            "gw55" => (
                4.5,
                vec![
                    vec![31],
                    vec![66],
                    vec![24, 25, 72, 14],
                    vec![3, 53, 62],
                    vec![33, 52, 41],
                    vec![58],
                    vec![51, 71],
                ],
            ),
            "7391" => (
                8.0,
                vec![
                    vec![14, 117],
                    vec![19, 79, 109],
                    vec![64, 92, 97, 98, 106, 110, 167, 171],
                    vec![13, 113, 115, 124, 173],
                    vec![17, 16],
                    vec![147, 103, 94],
                    vec![184],
                    vec![126],
                    vec![132],
                    vec![148],
                    vec![129, 149],
                    vec![128],
                    vec![35],
                    vec![47],
                    vec![158, 159, 176],
                    vec![73, 74],
                    vec![53, 77, 63],
                    vec![11, 172],
                ],
            ),
            _ => return None,
        };
        Some(Self { id: key, sd_multiplier, reference_units })
    }

    /// Sizes of the annotated units.
    pub fn reference(&self) -> Result<ReferenceDistribution> {
        ReferenceDistribution::new(self.reference_units.iter().map(Vec::len).collect())
    }

    /// Annotated units mapped onto the fibre ids of the filtered signals.
    pub fn reference_partition(&self, filtered: &SignalMatrix) -> Result<Partition> {
        let groups = self
            .reference_units
            .iter()
            .map(|unit| {
                unit.iter()
                    .map(|&pos| {
                        if pos < filtered.len() {
                            Ok(filtered.fibre_id(pos))
                        } else {
                            Err(AnalysisError::config(format!(
                                "specimen {}: reference fibre {pos} beyond {} filtered fibres",
                                self.id,
                                filtered.len()
                            )))
                        }
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        Partition::new(groups)
    }

    /// Fibre ids of the filtered signals that belong to no annotated unit.
    pub fn unannotated_fibres(&self, filtered: &SignalMatrix) -> Vec<usize> {
        let annotated: HashSet<usize> = self.reference_units.iter().flatten().copied().collect();
        (0..filtered.len())
            .filter(|pos| !annotated.contains(pos))
            .map(|pos| filtered.fibre_id(pos))
            .collect()
    }
}

/// One electrode recording of a specimen.
#[derive(Clone, Debug, PartialEq)]
pub struct Recording {
    /// Stimulating electrode, when the specimen has more than one.
    pub electrode: Option<String>,
    /// Electrode-stimulation traces, one row per fibre.
    pub signals: SignalMatrix,
    /// Field-stimulation traces with the same fibre ids, when recorded.
    pub field_stimulation: Option<SignalMatrix>,
    /// Fibre positions, when known.
    pub fibres: Vec<Fibre>,
}

impl Recording {
    /// Recording without field stimulation or positions.
    pub fn new(signals: SignalMatrix) -> Self {
        let fibres = signals.fibre_ids().iter().map(|&id| Fibre { id, x: None, y: None }).collect();
        Self { electrode: None, signals, field_stimulation: None, fibres }
    }

    /// Name the stimulating electrode.
    pub fn with_electrode(mut self, electrode: impl Into<String>) -> Self {
        self.electrode = Some(electrode.into());
        self
    }

    /// Apply the liveness and responsiveness filters.
    pub fn filtered(&self, sd_multiplier: f64) -> Result<SignalMatrix> {
        let alive = match &self.field_stimulation {
            Some(field) => detect_live_fibres(field)?,
            None => self.signals.fibre_ids().to_vec(),
        };
        let responsive = responsive_fibres(&self.signals, sd_multiplier);
        let keep: Vec<usize> = (0..self.signals.len())
            .filter(|&i| {
                let id = self.signals.fibre_id(i);
                alive.contains(&id) && responsive.contains(&id)
            })
            .collect();
        if keep.is_empty() {
            return Err(AnalysisError::config("no fibre passed the liveness and response filters"));
        }
        info!(
            total = self.signals.len(),
            alive = alive.len(),
            responsive = responsive.len(),
            kept = keep.len(),
            "fibres filtered"
        );
        self.signals.select(&keep)
    }

    /// Position of a fibre, if known.
    pub fn fibre(&self, id: usize) -> Option<&Fibre> {
        self.fibres.iter().find(|f| f.id == id)
    }
}

/// Trial label: the specimen id, qualified by the electrode when named.
fn trial_label(specimen: &SpecimenConfig, recording: &Recording) -> String {
    match &recording.electrode {
        Some(electrode) => format!("{}/{electrode}", specimen.id),
        None => specimen.id.clone(),
    }
}

/// Filtered signals, annotated sizes and annotated grouping for one recording.
fn build_trial(specimen: &SpecimenConfig, recording: &Recording) -> Result<Trial> {
    let label = trial_label(specimen, recording);
    let signals = recording.filtered(specimen.sd_multiplier)?;
    let reference = specimen.reference()?;
    let truth = specimen.reference_partition(&signals)?;
    let unannotated = specimen.unannotated_fibres(&signals);
    if !unannotated.is_empty() {
        debug!(trial = %label, fibres = ?unannotated, "unannotated fibres");
    }
    Ok(Trial { label, signals, reference, truth: Some(truth) })
}

/// [`build_trial`] with the trial label attached to any error.
fn labelled_trial(specimen: &SpecimenConfig, recording: &Recording) -> Result<Trial> {
    build_trial(specimen, recording).map_err(|e| e.in_trial(trial_label(specimen, recording)))
}

/// One specimen recording as a single driver trial.
pub struct SpecimenTrial {
    specimen: SpecimenConfig,
    recording: Recording,
}

impl SpecimenTrial {
    /// Pair a recording with its specimen constants.
    pub fn new(specimen: SpecimenConfig, recording: Recording) -> Self {
        Self { specimen, recording }
    }

    /// `specimen` or `specimen/electrode`.
    pub fn label(&self) -> String {
        trial_label(&self.specimen, &self.recording)
    }

    /// Build the trial: filtered signals, annotated sizes and annotated grouping.
    pub fn trial(&self) -> Result<Trial> {
        build_trial(&self.specimen, &self.recording)
    }

    /// Filtered fibres the annotation does not cover.
    pub fn unannotated_fibres(&self) -> Result<Vec<usize>> {
        let signals = self.recording.filtered(self.specimen.sd_multiplier)?;
        Ok(self.specimen.unannotated_fibres(&signals))
    }
}

impl TrialSource for SpecimenTrial {
    fn trials(&self) -> Result<Vec<Trial>> {
        Ok(vec![labelled_trial(&self.specimen, &self.recording)?])
    }
}

/// Every electrode recording of one specimen, one trial each.
///
/// All recordings share the specimen's cut-off and annotation.
#[derive(Clone, Debug)]
pub struct SpecimenRecordings {
    specimen: SpecimenConfig,
    recordings: Vec<Recording>,
}

impl SpecimenRecordings {
    /// Group recordings under their specimen. Needs at least one recording.
    pub fn new(specimen: SpecimenConfig, recordings: Vec<Recording>) -> Result<Self> {
        if recordings.is_empty() {
            return Err(AnalysisError::config(format!("specimen {} has no recordings", specimen.id)));
        }
        Ok(Self { specimen, recordings })
    }

    /// Number of recordings.
    pub fn len(&self) -> usize {
        self.recordings.len()
    }

    /// True when there are no recordings.
    pub fn is_empty(&self) -> bool {
        self.recordings.is_empty()
    }
}

impl TrialSource for SpecimenRecordings {
    fn trials(&self) -> Result<Vec<Trial>> {
        self.recordings.iter().map(|recording| labelled_trial(&self.specimen, recording)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_peaks_threshold() {
        let trace = [0.0, 1.0, 0.0, 5.0, 4.5, 0.0];
        assert_eq!(find_peaks(&trace, 0.0), vec![1, 3]);
        assert_eq!(find_peaks(&trace, 0.8), vec![1]);
        assert!(find_peaks(&trace, 2.0).is_empty());
    }

    #[test]
    fn test_find_peaks_plateau_and_edges() {
        assert_eq!(find_peaks(&[0.0, 2.0, 2.0, 2.0, 0.0], 1.0), vec![2]);
        assert!(find_peaks(&[3.0, 1.0, 0.0], 0.0).is_empty());
        assert!(find_peaks(&[0.0, 1.0, 1.0], 0.0).is_empty());
    }

    #[test]
    fn test_responsive_spike() {
        let mut trace = vec![0.0; 50];
        trace[20] = 10.0;
        assert!(is_responsive(&trace, 5.0));
        let flat: Vec<f64> = (0..50).map(|i| (i % 2) as f64 * 0.1).collect();
        assert!(!is_responsive(&flat, 5.0));
    }

    #[test]
    fn test_dead_fibre_dropped() {
        let up = vec![0.0, 1.0, 2.0, 3.0, 4.0];
        let down = vec![4.0, 3.0, 2.0, 1.0, 0.0];
        let field = SignalMatrix::new(vec![up.clone(), up.clone(), up.clone(), down]).unwrap();
        assert_eq!(detect_live_fibres(&field).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_builtin_specimens() {
        let gw65 = SpecimenConfig::builtin("GW65").unwrap();
        assert_eq!(gw65.reference_units.len(), 13);
        assert_eq!(gw65.sd_multiplier, 5.5);
        assert_eq!(SpecimenConfig::builtin("7391").unwrap().reference().unwrap().count(), 18);
        assert!(SpecimenConfig::builtin("gw99").is_none());
    }

    #[test]
    fn test_reference_partition_uses_filtered_positions() {
        let specimen = SpecimenConfig {
            id: "toy".into(),
            sd_multiplier: 1.0,
            reference_units: vec![vec![0, 2], vec![1]],
        };
        let filtered =
            SignalMatrix::with_fibre_ids(vec![vec![1.0], vec![2.0], vec![3.0]], vec![4, 9, 12])
                .unwrap();
        let p = specimen.reference_partition(&filtered).unwrap();
        assert_eq!(p.units()[0].members, vec![4, 12]);
        assert_eq!(p.units()[1].members, vec![9]);
        let short = filtered.select(&[0, 1]).unwrap();
        assert!(specimen.reference_partition(&short).is_err());
    }

    #[test]
    fn test_unannotated_fibres_reported_by_id() {
        let specimen = SpecimenConfig {
            id: "toy".into(),
            sd_multiplier: 1.0,
            reference_units: vec![vec![0, 3], vec![1]],
        };
        let filtered = SignalMatrix::with_fibre_ids(
            vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0], vec![5.0]],
            vec![4, 9, 12, 20, 31],
        )
        .unwrap();
        assert_eq!(specimen.unannotated_fibres(&filtered), vec![12, 31]);
        let covered = filtered.select(&[0, 1]).unwrap();
        assert!(specimen.unannotated_fibres(&covered).is_empty());
    }

    #[test]
    fn test_electrode_qualifies_label() {
        let signals = SignalMatrix::new(vec![vec![0.0, 1.0, 0.0]]).unwrap();
        let specimen = SpecimenConfig::builtin("gw64").unwrap();
        let plain = SpecimenTrial::new(specimen.clone(), Recording::new(signals.clone()));
        assert_eq!(plain.label(), "gw64");
        let named = SpecimenTrial::new(specimen, Recording::new(signals).with_electrode("e2"));
        assert_eq!(named.label(), "gw64/e2");
    }

    #[test]
    fn test_recordings_need_at_least_one() {
        let specimen = SpecimenConfig::builtin("gw55").unwrap();
        assert!(SpecimenRecordings::new(specimen, Vec::new()).unwrap_err().is_configuration());
    }

    #[test]
    fn test_recording_filters_unresponsive() {
        let mut spike = vec![0.0; 40];
        spike[10] = 8.0;
        let mut spike2 = vec![0.0; 40];
        spike2[25] = 6.0;
        let quiet: Vec<f64> = (0..40).map(|i| (i % 3) as f64 * 0.01).collect();
        let signals = SignalMatrix::new(vec![spike, quiet, spike2]).unwrap();
        let filtered = Recording::new(signals).filtered(4.0).unwrap();
        assert_eq!(filtered.fibre_ids(), &[0, 2]);
    }
}
