//! Type-safe vocabulary shared by configuration, problem definitions and artifacts
//!
//! These enums replace the free-form strings of hand-edited workflow files so
//! that typos are rejected at load time instead of mid-sweep.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// How a sampled value modifies the baseline simulation parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// Percent change of the baseline value
    #[strum(serialize = "pctchg")]
    Pctchg,
    /// Replace the baseline value
    #[strum(serialize = "absval")]
    Absval,
    /// Add to the baseline value
    #[strum(serialize = "abschg")]
    Abschg,
}

/// Sampling strategy tag carried in the workflow configuration and in every
/// sample manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[strum(serialize = "bounded_random")]
    BoundedRandom,
    #[strum(serialize = "fast")]
    Fast,
    #[strum(serialize = "morris")]
    Morris,
}

impl StrategyKind {
    /// Workflow mode driven by this strategy
    pub fn mode(self) -> WorkflowMode {
        match self {
            Self::BoundedRandom => WorkflowMode::Loop,
            Self::Fast | Self::Morris => WorkflowMode::Sweep,
        }
    }

    /// True for designed strategies that come with a matching estimator
    pub fn has_estimator(self) -> bool {
        matches!(self, Self::Fast | Self::Morris)
    }
}

/// The two workflows the orchestrator drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowMode {
    /// Iterative generations, one graph per round, continuation sentinel
    #[strum(serialize = "loop")]
    Loop,
    /// One deduplicated batch followed by sensitivity analysis
    #[strum(serialize = "sweep")]
    Sweep,
}

/// Input artifact format rendered for every job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    /// Simulation calibration table
    #[default]
    #[strum(serialize = "calibration")]
    Calibration,
    /// Free text with `{{label}}` placeholders
    #[strum(serialize = "template")]
    Template,
}
