//! Morris elementary-effects trajectories.
//!
//! A trajectory is D + 1 rows on a `levels`-point grid of the unit cube. Each
//! step moves exactly one parameter by ±Δ, visiting the parameters in a random
//! order. Grid points are chosen so that the moved coordinate always stays in
//! `[0, 1]`.

use super::{SampleMatrix, SamplingError, SamplingStrategy};
use crate::problem::ProblemDefinition;
use crate::types::StrategyKind;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MorrisSampler {
    trajectories: usize,
    levels: usize,
}

impl MorrisSampler {
    pub fn new(trajectories: usize, levels: usize) -> Self {
        Self {
            trajectories,
            levels,
        }
    }

    pub fn trajectories(&self) -> usize {
        self.trajectories
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    /// Unit-space step `Δ = p / (2(p − 1))`
    pub fn delta(levels: usize) -> f64 {
        levels as f64 / (2.0 * (levels as f64 - 1.0))
    }

    /// Lower half of the grid, from which a trajectory's anchor is drawn
    fn anchor_grid(&self) -> Vec<f64> {
        let denom = (self.levels - 1) as f64;
        (0..self.levels / 2).map(|i| i as f64 / denom).collect()
    }
}

impl SamplingStrategy for MorrisSampler {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Morris
    }

    fn sample_count(&self, num_params: usize) -> usize {
        self.trajectories * (num_params + 1)
    }

    fn validate(&self, num_params: usize) -> Result<(), SamplingError> {
        if num_params == 0 {
            return Err(SamplingError::NoParameters);
        }
        if self.trajectories == 0 {
            return Err(SamplingError::InvalidConfig {
                strategy: self.kind(),
                reason: "at least one trajectory is required".to_string(),
            });
        }
        if self.levels < 2 || self.levels % 2 != 0 {
            return Err(SamplingError::InvalidConfig {
                strategy: self.kind(),
                reason: format!(
                    "grid levels must be an even number >= 2 (got {})",
                    self.levels
                ),
            });
        }
        Ok(())
    }

    fn generate(
        &self,
        problem: &ProblemDefinition,
        seed: u64,
    ) -> Result<SampleMatrix, SamplingError> {
        let d = problem.len();
        self.validate(d)?;

        let delta = Self::delta(self.levels);
        let grid = self.anchor_grid();
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut matrix = SampleMatrix::with_capacity(d, self.sample_count(d));
        let mut order: Vec<usize> = (0..d).collect();

        for _ in 0..self.trajectories {
            order.shuffle(&mut rng);

            // Start on the side of Δ that keeps the step inside the cube
            let mut unit: Vec<f64> = Vec::with_capacity(d);
            let mut direction: Vec<f64> = Vec::with_capacity(d);
            for _ in 0..d {
                let anchor = grid[rng.random_range(0..grid.len())];
                if rng.random_bool(0.5) {
                    direction.push(1.0);
                    unit.push(anchor);
                } else {
                    direction.push(-1.0);
                    unit.push(anchor + delta);
                }
            }

            matrix.push(scale_row(problem, &unit));
            for &j in &order {
                unit[j] += direction[j] * delta;
                matrix.push(scale_row(problem, &unit));
            }
        }

        Ok(matrix)
    }
}

fn scale_row(problem: &ProblemDefinition, unit: &[f64]) -> Vec<f64> {
    problem.iter().zip(unit).map(|(p, u)| p.scale(*u)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::Parameter;
    use crate::types::ChangeType;

    fn problem(d: usize) -> ProblemDefinition {
        ProblemDefinition::new(
            (0..d)
                .map(|i| Parameter::new(format!("x{i}"), ChangeType::Absval, 10.0, 20.0))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_two_parameters_eight_trajectories() {
        let sampler = MorrisSampler::new(8, 4);
        let a = sampler.generate(&problem(2), 2024).unwrap();
        assert_eq!(a.len(), 24);
        assert_eq!(a.columns(), 2);

        let b = sampler.generate(&problem(2), 2024).unwrap();
        let bits = |m: &SampleMatrix| -> Vec<u64> {
            m.rows().iter().flatten().map(|v| v.to_bits()).collect()
        };
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn test_each_step_moves_one_component() {
        let d = 4;
        let sampler = MorrisSampler::new(6, 4);
        let matrix = sampler.generate(&problem(d), 7).unwrap();
        assert!(matrix.within_bounds(&problem(d)));

        for t in 0..6 {
            let rows = &matrix.rows()[t * (d + 1)..(t + 1) * (d + 1)];
            let mut moved = Vec::new();
            for pair in rows.windows(2) {
                let changed: Vec<usize> = (0..d).filter(|&j| pair[0][j] != pair[1][j]).collect();
                assert_eq!(changed.len(), 1);
                moved.push(changed[0]);
            }
            moved.sort_unstable();
            assert_eq!(moved, (0..d).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_step_size_in_unit_space() {
        // p = 4: Δ = 2/3, grid anchors {0, 1/3}
        assert!((MorrisSampler::delta(4) - 2.0 / 3.0).abs() < 1e-12);
        let matrix = MorrisSampler::new(3, 4).generate(&problem(1), 1).unwrap();
        for pair in matrix.rows().chunks(2) {
            let step = (pair[1][0] - pair[0][0]).abs() / 10.0;
            assert!((step - 2.0 / 3.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_invalid_levels() {
        for levels in [0, 1, 3, 5] {
            assert!(MorrisSampler::new(4, levels).validate(2).is_err());
        }
        assert!(MorrisSampler::new(0, 4).validate(2).is_err());
        assert!(MorrisSampler::new(1, 2).validate(2).is_ok());
    }
}
