//! JSON reports and recording files.
//!
//! [`RunReport`] is a portable snapshot of a finished study: per-trial optimum,
//! recovered units and the full sweep trace, plus the study summary.
//! [`RecordingFile`] is the JSON layout the CLI reads traces from:
//!
//! ```json
//! {
//!   "electrode": "e1",
//!   "fibre_ids": [0, 1, 2],
//!   "traces": [[0.1, 0.4], [0.2, 0.3], [0.0, 0.9]],
//!   "field_stimulation": [[1.0, 0.5], [0.9, 0.4], [0.1, 0.8]],
//!   "coordinates": [[12.0, 40.0], [13.5, 41.0], [80.0, 7.0]]
//! }
//! ```
//!
//! Only `traces` is required. Requires the `serde` feature.
//!
//! # Example
//!
//! ```rust,ignore
//! let report = RunReport::from_study(&study, optimizer.config());
//! let json = report.to_json()?;
//! let restored = RunReport::from_json(&json)?;
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::comparator::MAXIMAL_DISTANCE;
use crate::driver::{StudyReport, StudySummary, TrialOutcome};
use crate::error::{AnalysisError, Result};
use crate::fibre::{Fibre, Recording};
use crate::optimizer::{OptimizerConfig, TracePoint};
use crate::signal::SignalMatrix;

/// Current report format version.
pub const REPORT_VERSION: u16 = 1;

/// One recovered unit.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UnitRecord {
    /// Position of the unit in the partition.
    pub id: usize,
    /// Member fibre ids.
    pub members: Vec<usize>,
}

/// One sweep step. Edgeless steps have no score.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct StepRecord {
    /// Parameter value of the step.
    pub parameter: f64,
    /// Comparator score.
    pub score: Option<f64>,
    /// Communities found.
    pub community_count: usize,
}

impl From<&TracePoint> for StepRecord {
    fn from(p: &TracePoint) -> Self {
        Self {
            parameter: p.parameter,
            score: (p.score != MAXIMAL_DISTANCE).then_some(p.score),
            community_count: p.community_count,
        }
    }
}

/// One trial's result.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TrialRecord {
    /// Trial label.
    pub label: String,
    /// Parameter value chosen by the sweep.
    pub optimal_parameter: f64,
    /// Score at the optimum; `None` when no step produced a partition.
    pub score: Option<f64>,
    /// Communities recovered.
    pub community_count: usize,
    /// Communities expected.
    pub reference_count: usize,
    /// Agreement with the known grouping.
    pub agreement: Option<f64>,
    /// Recovered units.
    pub units: Vec<UnitRecord>,
    /// Sweep trace in order.
    pub trace: Vec<StepRecord>,
}

impl From<&TrialOutcome> for TrialRecord {
    fn from(t: &TrialOutcome) -> Self {
        Self {
            label: t.label.clone(),
            optimal_parameter: t.outcome.optimal_parameter,
            score: (!t.outcome.is_degenerate()).then_some(t.outcome.score),
            community_count: t.community_count(),
            reference_count: t.reference_count,
            agreement: t.agreement,
            units: t
                .outcome
                .partition
                .units()
                .iter()
                .map(|u| UnitRecord { id: u.id, members: u.members.clone() })
                .collect(),
            trace: t.outcome.trace.iter().map(StepRecord::from).collect(),
        }
    }
}

/// Serialisable snapshot of a finished study.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RunReport {
    /// Always [`REPORT_VERSION`] for new reports.
    pub version: u16,
    /// Swept parameter name.
    pub parameter: String,
    /// Comparator name.
    pub metric: String,
    /// Correlation coefficient name.
    pub correlation_kind: String,
    /// Detector seed.
    pub seed: u64,
    /// Per-trial results.
    pub trials: Vec<TrialRecord>,
    /// Aggregate over trials.
    pub summary: StudySummary,
}

impl RunReport {
    /// Capture a study together with the settings that produced it.
    pub fn from_study(study: &StudyReport, config: &OptimizerConfig) -> Self {
        Self {
            version: REPORT_VERSION,
            parameter: config.sweep.parameter.to_string(),
            metric: config.metric.to_string(),
            correlation_kind: config.correlation_kind.to_string(),
            seed: config.seed,
            trials: study.outcomes.iter().map(TrialRecord::from).collect(),
            summary: study.summary.clone(),
        }
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a report, rejecting unknown versions.
    pub fn from_json(text: &str) -> Result<Self> {
        let report: Self = serde_json::from_str(text)?;
        if report.version != REPORT_VERSION {
            return Err(AnalysisError::config(format!(
                "unsupported report version {}",
                report.version
            )));
        }
        Ok(report)
    }
}

// ─── RecordingFile ───────────────────────────────────────────────────────────

/// On-disk layout of one electrode recording.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RecordingFile {
    /// Stimulating electrode name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub electrode: Option<String>,
    /// Fibre id per row; row positions when absent.
    #[serde(default)]
    pub fibre_ids: Option<Vec<usize>>,
    /// Electrode-stimulation traces.
    pub traces: Vec<Vec<f64>>,
    /// Field-stimulation traces, same row order.
    #[serde(default)]
    pub field_stimulation: Option<Vec<Vec<f64>>>,
    /// `[x, y]` per row.
    #[serde(default)]
    pub coordinates: Option<Vec<[f64; 2]>>,
}

impl RecordingFile {
    /// Parse a recording from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a recording from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Validate shapes and build the in-memory recording.
    pub fn into_recording(self) -> Result<Recording> {
        let ids = self.fibre_ids.unwrap_or_else(|| (0..self.traces.len()).collect());
        let signals = SignalMatrix::with_fibre_ids(self.traces, ids.clone())?;
        let field_stimulation = self
            .field_stimulation
            .map(|rows| SignalMatrix::with_fibre_ids(rows, ids.clone()))
            .transpose()?;
        let fibres = match self.coordinates {
            Some(coords) if coords.len() != ids.len() => {
                return Err(AnalysisError::config(format!(
                    "{} coordinates for {} fibres",
                    coords.len(),
                    ids.len()
                )));
            }
            Some(coords) => ids
                .iter()
                .zip(coords)
                .map(|(&id, [x, y])| Fibre { id, x: Some(x), y: Some(y) })
                .collect(),
            None => ids.iter().map(|&id| Fibre { id, x: None, y: None }).collect(),
        };
        Ok(Recording { electrode: self.electrode, signals, field_stimulation, fibres })
    }
}
