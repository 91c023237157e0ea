//! sweepctl Library
//!
//! Controller for parameter sweeps executed as job graphs on a batch
//! scheduler. Every step is a short-lived invocation; all state lives in
//! files under the workflow directory.

pub mod analysis;
pub mod cli;
pub mod collect;
pub mod config_file;
pub mod continuation;
pub mod error;
pub mod generation;
pub mod io_util;
pub mod job_graph;
pub mod materialize;
pub mod orchestrator;
pub mod problem;
pub mod sample_store;
pub mod sampling;
pub mod types;

// Re-export main types for convenience
pub use analysis::{AnalysisSettings, SensitivityAnalyzer, SensitivityReport};
pub use collect::{AppendOutcome, CumulativeTable, IndicatorTable, IndicatorValue, ResultRecord};
pub use config_file::WorkflowConfig;
pub use continuation::{ContinuationDecider, ContinuationSignal};
pub use error::{Result, SweepError};
pub use generation::{Generation, GenerationStateStore};
pub use job_graph::JobGraphEmitter;
pub use materialize::{JobMaterializer, JobSpec};
pub use orchestrator::Orchestrator;
pub use problem::{Parameter, ProblemDefinition, SpatialIndex};
pub use sample_store::SampleStore;
pub use sampling::{SampleMatrix, SamplingStrategy, StrategyConfig, UniqueSampleSet};
pub use types::{ChangeType, InputFormat, StrategyKind, WorkflowMode};
