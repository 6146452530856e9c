//! # motorpool-core
//!
//! Motor-unit recovery from muscle-fibre activity traces.
//!
//! ---
//!
//! ## The question
//!
//! A motor unit is one motor neuron and the muscle fibres it innervates. When
//! the neuron fires, every one of its fibres contracts together. Record the
//! calcium activity of many fibres while the nerve is stimulated with an
//! increasing ramp, and fibres of the same unit should rise and fall in
//! lockstep. Which fibres belong together, and how large is each unit?
//!
//! **Correlation** turns co-activation into a similarity: every pair of fibre
//! traces gets a coefficient in [-1, 1].
//!
//! **Thresholding and community detection** turn similarity into grouping:
//! pairs below a threshold are disconnected, and seeded Louvain modularity
//! clustering splits the remaining graph into candidate units.
//!
//! **Distributional comparison** picks the threshold: each candidate grouping
//! is scored against a reference distribution of unit sizes (earth mover's
//! distance) or a reference unit count, and the sweep keeps the best.
//!
//! The same core serves a synthetic motor pool, where the true grouping is
//! known, and annotated specimen recordings.
//!
//! ---
//!
//! ## The pipeline
//!
//! ```text
//! SignalMatrix ─► CorrelationMatrix ─► SimilarityGraph ─► CommunityDetector
//!                                                             │
//! ReferenceDistribution ──────────────► ComparatorMetric ◄────┘
//!                                           │
//!                                 ThresholdOptimizer (sweep)
//!                                           │
//!                              Driver ◄── TrialSource
//!                                          ├─ SyntheticTrials (pool)
//!                                          └─ SpecimenTrial   (fibre)
//! ```
//!
//! ## Module overview
//!
//! | Module | Key types | What it does |
//! |--------|-----------|--------------|
//! | [`signal`] | [`SignalMatrix`] | Validated fibres × samples traces with fibre ids |
//! | [`correlation`] | [`CorrelationMatrix`], [`CorrelationKind`] | Pearson, Spearman or Kendall matrix; zero-variance policy |
//! | [`graph`] | [`SimilarityGraph`] | Thresholded, positive-weight similarity graph |
//! | [`partition`] | [`Partition`], [`Unit`] | Disjoint units; adjusted Rand agreement |
//! | [`community`] | [`CommunityDetector`], [`Louvain`] | Seeded modularity clustering with resolution |
//! | [`comparator`] | [`ComparatorMetric`], [`ReferenceDistribution`] | Earth mover's distance or community-count difference |
//! | [`optimizer`] | [`ThresholdOptimizer`], [`SweepSpec`] | Threshold or resolution sweep, first-minimum selection |
//! | [`driver`] | [`Driver`], [`TrialSource`], [`StudySummary`] | Runs trials and summarises the optima |
//! | [`pool`] | [`MotorPool`], [`SyntheticTrials`] | Size-ordered recruitment model and random unit samples |
//! | [`fibre`] | [`SpecimenConfig`], [`Recording`] | Liveness and responsiveness filters, annotated specimens |
//! | [`config`] | `AnalysisConfig` | TOML configuration (requires `serde`) |
//! | [`report`] | `RunReport`, `RecordingFile` | JSON reports and recording files (requires `serde`) |
//! | [`error`] | [`AnalysisError`] | Error taxonomy |
//!
//! ## Features
//!
//! | Feature | Enables |
//! |---------|---------|
//! | `serde` | Serialisation derives, [`config`] and [`report`] |
//! | `parallel` | Sweep steps evaluated on the rayon pool; results unchanged |
//! | `cli` | The `motorpool` binary |
//! | `python-ffi` | PyO3 bindings in `ffi` |
//!
//! ## Example
//!
//! ```rust,ignore
//! use motorpool_core::{
//!     Driver, MotorPool, MotorPoolConfig, OptimizerConfig, SyntheticTrials, ThresholdOptimizer,
//! };
//!
//! let pool = MotorPool::generate(MotorPoolConfig::default())?;
//! let optimizer = ThresholdOptimizer::new(OptimizerConfig::default())?;
//! let study = Driver::new(optimizer).run(&SyntheticTrials::new(&pool, 13, 10))?;
//! println!("threshold {:.3} ± {:.3}", study.summary.mean_parameter, study.summary.std_parameter);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod community;
pub mod comparator;
pub mod correlation;
pub mod driver;
pub mod error;
pub mod fibre;
pub mod graph;
pub mod optimizer;
pub mod partition;
pub mod pool;
pub mod signal;

#[cfg(feature = "serde")]
pub mod config;
#[cfg(feature = "serde")]
pub mod report;

#[cfg(feature = "python-ffi")]
pub mod ffi;

pub use community::{CommunityDetector, Louvain};
pub use comparator::{wasserstein_1d, ComparatorMetric, ReferenceDistribution, MAXIMAL_DISTANCE};
pub use correlation::{CorrelationKind, CorrelationMatrix, ZeroVariancePolicy};
pub use driver::{Driver, StudyReport, StudySummary, Trial, TrialOutcome, TrialSource};
pub use error::{AnalysisError, Result};
pub use fibre::{Fibre, Recording, SpecimenConfig, SpecimenRecordings, SpecimenTrial};
pub use graph::SimilarityGraph;
pub use optimizer::{
    OptimizationOutcome, OptimizerConfig, SweepParameter, SweepSpec, ThresholdOptimizer,
    TracePoint,
};
pub use partition::{Partition, Unit};
pub use pool::{MotorPool, MotorPoolConfig, PoolSample, SyntheticTrials};
pub use signal::SignalMatrix;

#[cfg(feature = "serde")]
pub use config::AnalysisConfig;
#[cfg(feature = "serde")]
pub use report::{RecordingFile, RunReport};
