//! Sample point generation
//!
//! Turns a `ProblemDefinition` into a `SampleMatrix` through one of three
//! interchangeable strategies selected by an explicit tag:
//!
//! | Strategy        | Rows            | Used by             |
//! |-----------------|-----------------|---------------------|
//! | bounded_random  | jobs            | per-generation loop |
//! | fast            | N · D           | global sweep (eFAST)|
//! | morris          | N · (D + 1)     | global sweep (EE)   |
//!
//! Shapes depend only on configuration. Values depend on configuration and
//! the seed, so the same seed regenerates a bit-identical matrix.

pub mod fast;
pub mod morris;
pub mod random;
pub mod unique;

pub use fast::FastSampler;
pub use morris::MorrisSampler;
pub use random::BoundedRandomSampler;
pub use unique::UniqueSampleSet;

use crate::problem::ProblemDefinition;
use crate::types::StrategyKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One value per parameter, in problem definition order
pub type SampleVector = Vec<f64>;

/// Errors raised before any sample is produced
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SamplingError {
    #[error("Problem definition has no parameters; nothing to sample")]
    NoParameters,

    #[error("Invalid {strategy} configuration: {reason}")]
    InvalidConfig {
        strategy: StrategyKind,
        reason: String,
    },

    #[error("Sample row {row} has {found} components, expected {expected}")]
    RaggedRow {
        row: usize,
        found: usize,
        expected: usize,
    },
}

impl From<SamplingError> for crate::error::SweepError {
    fn from(err: SamplingError) -> Self {
        crate::error::SweepError::Config(err.to_string())
    }
}

/// Ordered sequence of sample vectors sharing one width
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleMatrix {
    columns: usize,
    rows: Vec<SampleVector>,
}

impl SampleMatrix {
    pub fn with_capacity(columns: usize, rows: usize) -> Self {
        Self {
            columns,
            rows: Vec::with_capacity(rows),
        }
    }

    /// Build from rows, rejecting ragged input
    pub fn from_rows(columns: usize, rows: Vec<SampleVector>) -> Result<Self, SamplingError> {
        for (row, v) in rows.iter().enumerate() {
            if v.len() != columns {
                return Err(SamplingError::RaggedRow {
                    row,
                    found: v.len(),
                    expected: columns,
                });
            }
        }
        Ok(Self { columns, rows })
    }

    pub(crate) fn push(&mut self, row: SampleVector) {
        debug_assert_eq!(row.len(), self.columns);
        self.rows.push(row);
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[SampleVector] {
        &self.rows
    }

    /// True when every component lies inside its parameter's bounds
    pub fn within_bounds(&self, problem: &ProblemDefinition) -> bool {
        self.columns == problem.len()
            && self
                .rows
                .iter()
                .all(|row| row.iter().zip(problem.iter()).all(|(v, p)| p.contains(*v)))
    }
}

/// Contract shared by every sampling strategy
pub trait SamplingStrategy {
    /// Strategy tag recorded in manifests
    fn kind(&self) -> StrategyKind;

    /// Number of rows produced for `num_params` parameters
    fn sample_count(&self, num_params: usize) -> usize;

    /// Reject configurations that cannot produce a meaningful matrix
    fn validate(&self, num_params: usize) -> Result<(), SamplingError>;

    /// Produce the sample matrix
    fn generate(
        &self,
        problem: &ProblemDefinition,
        seed: u64,
    ) -> Result<SampleMatrix, SamplingError>;
}

fn default_interference() -> usize {
    4
}

fn default_levels() -> usize {
    4
}

/// Tagged strategy configuration as it appears in the workflow file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Independent uniform draws for each job of each generation
    BoundedRandom {
        jobs_per_generation: usize,
        max_generations: u32,
    },
    /// eFAST search curves: `samples` is N, `interference` is M
    Fast {
        samples: usize,
        #[serde(default = "default_interference")]
        interference: usize,
    },
    /// Morris trajectories on a `levels`-point grid
    Morris {
        trajectories: usize,
        #[serde(default = "default_levels")]
        levels: usize,
    },
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self::BoundedRandom {
            jobs_per_generation: 5,
            max_generations: 3,
        }
    }
}

impl StrategyConfig {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::BoundedRandom { .. } => StrategyKind::BoundedRandom,
            Self::Fast { .. } => StrategyKind::Fast,
            Self::Morris { .. } => StrategyKind::Morris,
        }
    }

    /// Concrete strategy for this configuration
    pub fn strategy(&self) -> Box<dyn SamplingStrategy> {
        match *self {
            Self::BoundedRandom {
                jobs_per_generation,
                ..
            } => Box::new(BoundedRandomSampler::new(jobs_per_generation)),
            Self::Fast {
                samples,
                interference,
            } => Box::new(FastSampler::new(samples, interference)),
            Self::Morris {
                trajectories,
                levels,
            } => Box::new(MorrisSampler::new(trajectories, levels)),
        }
    }

    /// Configuration checks that do not depend on the parameter count
    pub fn validate(&self) -> Result<(), SamplingError> {
        if let Self::BoundedRandom {
            max_generations, ..
        } = self
        {
            if *max_generations == 0 {
                return Err(SamplingError::InvalidConfig {
                    strategy: StrategyKind::BoundedRandom,
                    reason: "max_generations must be at least 1".to_string(),
                });
            }
        }
        // Width-independent checks of the strategy itself use a single column
        self.strategy().validate(1)
    }

    /// Maximum number of generations (loop mode only)
    pub fn max_generations(&self) -> Option<u32> {
        match self {
            Self::BoundedRandom {
                max_generations, ..
            } => Some(*max_generations),
            _ => None,
        }
    }
}

/// Generate a sample matrix for `problem` with the configured strategy.
pub fn generate(
    problem: &ProblemDefinition,
    config: &StrategyConfig,
    seed: u64,
) -> Result<SampleMatrix, SamplingError> {
    config.strategy().generate(problem, seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::Parameter;
    use crate::types::ChangeType;

    fn two_params() -> ProblemDefinition {
        ProblemDefinition::new(vec![
            Parameter::new("esco", ChangeType::Absval, 0.0, 1.0),
            Parameter::new("cn2", ChangeType::Pctchg, -20.0, 20.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_strategy_config_json_shape() {
        let cfg: StrategyConfig =
            serde_json::from_str(r#"{"kind": "fast", "samples": 1024}"#).unwrap();
        assert_eq!(
            cfg,
            StrategyConfig::Fast {
                samples: 1024,
                interference: 4
            }
        );

        let cfg: StrategyConfig = serde_json::from_str(
            r#"{"kind": "bounded_random", "jobs_per_generation": 5, "max_generations": 3}"#,
        )
        .unwrap();
        assert_eq!(cfg.kind(), StrategyKind::BoundedRandom);
        assert_eq!(cfg.max_generations(), Some(3));
    }

    #[test]
    fn test_zero_parameters_is_rejected_by_every_strategy() {
        let empty = ProblemDefinition::default();
        let configs = [
            StrategyConfig::default(),
            StrategyConfig::Fast {
                samples: 65,
                interference: 4,
            },
            StrategyConfig::Morris {
                trajectories: 4,
                levels: 4,
            },
        ];
        for cfg in configs {
            assert_eq!(generate(&empty, &cfg, 1), Err(SamplingError::NoParameters));
        }
    }

    #[test]
    fn test_validate_rejects_zero_max_generations() {
        let cfg = StrategyConfig::BoundedRandom {
            jobs_per_generation: 5,
            max_generations: 0,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let err = SampleMatrix::from_rows(2, vec![vec![0.0, 1.0], vec![0.5]]).unwrap_err();
        assert!(matches!(err, SamplingError::RaggedRow { row: 1, .. }));
    }

    #[test]
    fn test_matrix_bounds_check() {
        let problem = two_params();
        let ok = SampleMatrix::from_rows(2, vec![vec![0.5, -20.0], vec![1.0, 20.0]]).unwrap();
        assert!(ok.within_bounds(&problem));
        let bad = SampleMatrix::from_rows(2, vec![vec![1.5, 0.0]]).unwrap();
        assert!(!bad.within_bounds(&problem));
    }
}
