//! Error taxonomy for the recovery pipeline.
//!
//! Structural problems (bad sweep, empty input, unknown names) fail the whole
//! run. Numerical edge cases inside a single sweep step, such as a graph with
//! every edge thresholded away, are scored locally and never surface here.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, AnalysisError>;

/// Every failure the pipeline can report to a caller.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Invalid configuration or input shape: empty sweep, empty reference,
    /// unsupported kind name, ragged or empty signal matrix.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A signal row has zero variance and the zero-variance policy is `Reject`.
    #[error("degenerate input: row {row} has zero variance, correlation is undefined")]
    DegenerateInput {
        /// Row index in the signal matrix handed to the builder.
        row: usize,
    },

    /// A sweep step failed; wraps the underlying cause.
    #[error("sweep step {step} (parameter {parameter}) failed: {source}")]
    Step {
        /// Zero-based index of the step in sweep order.
        step: usize,
        /// Parameter value of the failing step.
        parameter: f64,
        /// Underlying cause.
        #[source]
        source: Box<AnalysisError>,
    },

    /// A driver trial failed; wraps the underlying cause.
    #[error("trial '{trial}' failed: {source}")]
    Trial {
        /// Label of the failing trial.
        trial: String,
        /// Underlying cause.
        #[source]
        source: Box<AnalysisError>,
    },

    /// I/O failure while reading configuration or signal files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML configuration could not be parsed.
    #[cfg(feature = "serde")]
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON report or signal file could not be (de)serialised.
    #[cfg(feature = "serde")]
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AnalysisError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        AnalysisError::Configuration(message.into())
    }

    /// Wraps `self` with the sweep step that produced it.
    pub fn at_step(self, step: usize, parameter: f64) -> Self {
        AnalysisError::Step { step, parameter, source: Box::new(self) }
    }

    /// Wraps `self` with the trial that produced it.
    pub fn in_trial(self, trial: impl Into<String>) -> Self {
        AnalysisError::Trial { trial: trial.into(), source: Box::new(self) }
    }

    /// True for configuration errors, looking through step/trial wrappers.
    pub fn is_configuration(&self) -> bool {
        match self {
            AnalysisError::Configuration(_) => true,
            AnalysisError::Step { source, .. } | AnalysisError::Trial { source, .. } => {
                source.is_configuration()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrappers_keep_configuration_kind() {
        let err = AnalysisError::config("no samples").at_step(3, 0.25).in_trial("gw65/purple");
        assert!(err.is_configuration());
        let msg = err.to_string();
        assert!(msg.contains("gw65/purple"), "{msg}");
    }

    #[test]
    fn test_degenerate_is_not_configuration() {
        let err = AnalysisError::DegenerateInput { row: 4 };
        assert!(!err.is_configuration());
        assert!(err.to_string().contains("row 4"));
    }
}
