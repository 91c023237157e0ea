//! Bounded-random strategy for the per-generation loop.

use super::{SampleMatrix, SamplingError, SamplingStrategy};
use crate::problem::ProblemDefinition;
use crate::types::StrategyKind;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Independent uniform draws within each parameter's bounds, one row per job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedRandomSampler {
    jobs: usize,
}

impl BoundedRandomSampler {
    pub fn new(jobs: usize) -> Self {
        Self { jobs }
    }
}

impl SamplingStrategy for BoundedRandomSampler {
    fn kind(&self) -> StrategyKind {
        StrategyKind::BoundedRandom
    }

    fn sample_count(&self, _num_params: usize) -> usize {
        self.jobs
    }

    fn validate(&self, num_params: usize) -> Result<(), SamplingError> {
        if num_params == 0 {
            return Err(SamplingError::NoParameters);
        }
        if self.jobs == 0 {
            return Err(SamplingError::InvalidConfig {
                strategy: self.kind(),
                reason: "jobs_per_generation must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    fn generate(
        &self,
        problem: &ProblemDefinition,
        seed: u64,
    ) -> Result<SampleMatrix, SamplingError> {
        self.validate(problem.len())?;

        let mut rng = SmallRng::seed_from_u64(seed);
        let mut matrix = SampleMatrix::with_capacity(problem.len(), self.jobs);
        for _ in 0..self.jobs {
            let row = problem
                .iter()
                .map(|p| rng.random_range(p.lower_bound..=p.upper_bound))
                .collect();
            matrix.push(row);
        }
        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::Parameter;
    use crate::types::ChangeType;

    fn problem() -> ProblemDefinition {
        ProblemDefinition::new(vec![
            Parameter::new("val1", ChangeType::Absval, 1.0, 100.0),
            Parameter::new("val2", ChangeType::Absval, -5.0, 5.0),
            Parameter::new("val3", ChangeType::Pctchg, 0.0, 0.25),
        ])
        .unwrap()
    }

    #[test]
    fn test_shape_and_bounds() {
        let sampler = BoundedRandomSampler::new(5);
        let matrix = sampler.generate(&problem(), 11).unwrap();
        assert_eq!(matrix.len(), 5);
        assert_eq!(matrix.columns(), 3);
        assert!(matrix.within_bounds(&problem()));
    }

    #[test]
    fn test_same_seed_same_matrix() {
        let sampler = BoundedRandomSampler::new(8);
        let a = sampler.generate(&problem(), 99).unwrap();
        let b = sampler.generate(&problem(), 99).unwrap();
        let c = sampler.generate(&problem(), 100).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_zero_jobs_rejected() {
        let err = BoundedRandomSampler::new(0).generate(&problem(), 1).unwrap_err();
        assert!(matches!(err, SamplingError::InvalidConfig { .. }));
    }
}
