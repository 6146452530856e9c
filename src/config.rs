//! TOML configuration for studies and specimen runs.
//!
//! Every key is optional; missing keys take the defaults below.
//!
//! ```toml
//! correlation_kind = "pearson"              # pearson | spearman | kendall
//! comparator_metric = "earth-mover-distance" # or community-count-difference
//! count_offset = 0
//! random_seed = 2
//! zero_variance = "reject"                  # reject | treat-as-zero | exclude
//!
//! [sweep]
//! parameter = "correlation-threshold"       # or clustering-resolution
//! lower_bound = 0.0
//! upper_bound = 1.0
//! step_count = 101
//!
//! [clustering]
//! resolution = 1.0
//! threshold = 0.0
//!
//! [study]
//! sample_size = 13
//! iterations = 100
//!
//! [pool]
//! unit_count = 30
//!
//! [[specimens]]
//! id = "gw65"
//! sd_multiplier = 5.5
//! reference_units = [[158], [156, 157, 19, 69]]
//! ```
//!
//! Requires the `serde` feature.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::comparator::ComparatorMetric;
use crate::correlation::{CorrelationKind, ZeroVariancePolicy};
use crate::error::{AnalysisError, Result};
use crate::fibre::SpecimenConfig;
use crate::optimizer::{OptimizerConfig, SweepSpec};
use crate::pool::MotorPoolConfig;

/// Fixed clustering parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Resolution used during threshold sweeps.
    pub resolution: f64,
    /// Threshold used during resolution sweeps.
    pub threshold: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self { resolution: 1.0, threshold: 0.0 }
    }
}

/// Sampling plan of a synthetic study.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    /// Units drawn per trial.
    pub sample_size: usize,
    /// Number of trials.
    pub iterations: usize,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self { sample_size: 13, iterations: 100 }
    }
}

/// Root configuration document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Correlation coefficient.
    pub correlation_kind: CorrelationKind,
    /// Comparator name.
    pub comparator_metric: String,
    /// Offset added to the expected count by the count metric.
    pub count_offset: i64,
    /// Seed for community detection.
    pub random_seed: u64,
    /// Handling of constant traces.
    pub zero_variance: ZeroVariancePolicy,
    /// Swept parameter and range.
    pub sweep: SweepSpec,
    /// Fixed clustering parameters.
    pub clustering: ClusteringConfig,
    /// Synthetic study sampling.
    pub study: StudyConfig,
    /// Synthetic pool model.
    pub pool: MotorPoolConfig,
    /// Specimens beyond the built-in ones, or overriding them.
    pub specimens: Vec<SpecimenConfig>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            correlation_kind: CorrelationKind::Pearson,
            comparator_metric: "earth-mover-distance".to_string(),
            count_offset: 0,
            random_seed: 2,
            zero_variance: ZeroVariancePolicy::Reject,
            sweep: SweepSpec::default(),
            clustering: ClusteringConfig::default(),
            study: StudyConfig::default(),
            pool: MotorPoolConfig::default(),
            specimens: Vec::new(),
        }
    }
}

impl AnalysisConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check every section.
    pub fn validate(&self) -> Result<()> {
        self.optimizer_config()?.validate()?;
        self.pool.validate()?;
        if self.study.sample_size == 0 || self.study.sample_size > self.pool.unit_count {
            return Err(AnalysisError::config(format!(
                "study sample size {} must be within 1..={}",
                self.study.sample_size, self.pool.unit_count
            )));
        }
        for specimen in &self.specimens {
            if !(specimen.sd_multiplier >= 0.0) {
                return Err(AnalysisError::config(format!(
                    "specimen {}: sd_multiplier must be non-negative",
                    specimen.id
                )));
            }
            specimen.reference()?;
        }
        Ok(())
    }

    /// Comparator with its offset applied.
    pub fn metric(&self) -> Result<ComparatorMetric> {
        ComparatorMetric::parse_with_offset(&self.comparator_metric, self.count_offset)
    }

    /// Optimiser settings described by this document.
    pub fn optimizer_config(&self) -> Result<OptimizerConfig> {
        Ok(OptimizerConfig {
            sweep: self.sweep,
            metric: self.metric()?,
            correlation_kind: self.correlation_kind,
            zero_variance: self.zero_variance,
            resolution: self.clustering.resolution,
            threshold: self.clustering.threshold,
            seed: self.random_seed,
        })
    }

    /// Specimen by id: configured entries first, then the built-in table.
    pub fn specimen(&self, id: &str) -> Option<SpecimenConfig> {
        self.specimens
            .iter()
            .find(|s| s.id.eq_ignore_ascii_case(id))
            .cloned()
            .or_else(|| SpecimenConfig::builtin(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::SweepParameter;

    #[test]
    fn test_empty_document_is_default() {
        let config = AnalysisConfig::from_toml_str("").unwrap();
        assert_eq!(config, AnalysisConfig::default());
        let opt = config.optimizer_config().unwrap();
        assert_eq!(opt.sweep.step_count, 101);
        assert_eq!(opt.seed, 2);
        assert_eq!(opt.metric, ComparatorMetric::EarthMover);
    }

    #[test]
    fn test_full_document() {
        let text = r#"
            correlation_kind = "spearman"
            comparator_metric = "community-count-difference"
            count_offset = 1
            zero_variance = "treat-as-zero"

            [sweep]
            parameter = "clustering-resolution"
            lower_bound = 0.0
            upper_bound = 50.0
            step_count = 51

            [clustering]
            threshold = 0.3

            [[specimens]]
            id = "toy"
            sd_multiplier = 3.0
            reference_units = [[0, 1], [2]]
        "#;
        let config = AnalysisConfig::from_toml_str(text).unwrap();
        let opt = config.optimizer_config().unwrap();
        assert_eq!(opt.correlation_kind, CorrelationKind::Spearman);
        assert_eq!(opt.metric, ComparatorMetric::CommunityCount { offset: 1 });
        assert_eq!(opt.zero_variance, ZeroVariancePolicy::TreatAsZero);
        assert_eq!(opt.sweep.parameter, SweepParameter::ClusteringResolution);
        assert_eq!(opt.threshold, 0.3);
        assert_eq!(config.specimen("TOY").unwrap().reference_units.len(), 2);
        assert!(config.specimen("gw55").is_some());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(AnalysisConfig::from_toml_str("comparator_metric = \"jaccard\"")
            .unwrap_err()
            .is_configuration());
        assert!(AnalysisConfig::from_toml_str("[sweep]\nstep_count = 0").is_err());
        assert!(AnalysisConfig::from_toml_str("[clustering]\nresolution = -1.0").is_err());
        assert!(matches!(
            AnalysisConfig::from_toml_str("correlation_kind = \"cosine\""),
            Err(AnalysisError::Toml(_))
        ));
    }
}
