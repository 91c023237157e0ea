//! Extended FAST sampling (Saltelli, Tarantola & Chan 1999).
//!
//! Each parameter gets one block of N rows in which it oscillates at the high
//! frequency ω₀ while all others oscillate at low complementary frequencies.
//! The analysis side (`analysis::fast`) relies on exactly this block layout.

use super::{SampleMatrix, SamplingError, SamplingStrategy};
use crate::problem::ProblemDefinition;
use crate::types::StrategyKind;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

/// eFAST sampler with `samples` = N points per curve and interference factor M
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FastSampler {
    samples: usize,
    interference: usize,
}

impl FastSampler {
    pub fn new(samples: usize, interference: usize) -> Self {
        Self {
            samples,
            interference,
        }
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn interference(&self) -> usize {
        self.interference
    }

    /// Highest frequency, assigned to the parameter of interest in each block
    pub fn omega_max(samples: usize, interference: usize) -> usize {
        (samples - 1) / (2 * interference)
    }

    /// Frequency vector: `ω₀` followed by the D−1 complementary frequencies
    pub fn frequencies(&self, num_params: usize) -> Vec<f64> {
        let omega0 = Self::omega_max(self.samples, self.interference);
        let mut omega = Vec::with_capacity(num_params);
        omega.push(omega0 as f64);

        let rest = num_params.saturating_sub(1);
        if rest == 0 {
            return omega;
        }
        let m = omega0 / (2 * self.interference);
        if m >= rest {
            // floor(linspace(1, m, rest))
            if rest == 1 {
                omega.push(1.0);
            } else {
                let step = (m as f64 - 1.0) / (rest as f64 - 1.0);
                omega.extend((0..rest).map(|i| (1.0 + i as f64 * step).floor()));
            }
        } else {
            omega.extend((0..rest).map(|i| ((i % m) + 1) as f64));
        }
        omega
    }
}

impl SamplingStrategy for FastSampler {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Fast
    }

    fn sample_count(&self, num_params: usize) -> usize {
        self.samples * num_params
    }

    fn validate(&self, num_params: usize) -> Result<(), SamplingError> {
        if num_params == 0 {
            return Err(SamplingError::NoParameters);
        }
        if self.interference == 0 {
            return Err(SamplingError::InvalidConfig {
                strategy: self.kind(),
                reason: "interference factor M must be at least 1".to_string(),
            });
        }
        let min = 4 * self.interference * self.interference;
        if self.samples <= min {
            return Err(SamplingError::InvalidConfig {
                strategy: self.kind(),
                reason: format!(
                    "sample size N > 4M^2 is required (N={}, M={}, need N > {})",
                    self.samples, self.interference, min
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

        let n = self.samples;
        let omega = self.frequencies(d);
        let s: Vec<f64> = (0..n).map(|k| (2.0 * PI / n as f64) * k as f64).collect();

        let mut rng = SmallRng::seed_from_u64(seed);
        let mut matrix = SampleMatrix::with_capacity(d, n * d);

        for i in 0..d {
            // Parameter i gets ω₀, the others take the complementary set in order
            let mut omega2 = vec![0.0; d];
            omega2[i] = omega[0];
            let mut next = omega[1..].iter();
            for (j, w) in omega2.iter_mut().enumerate() {
                if j != i {
                    if let Some(f) = next.next() {
                        *w = *f;
                    }
                }
            }

            let phi = 2.0 * PI * rng.random::<f64>();
            for &sk in &s {
                let row = problem
                    .iter()
                    .zip(&omega2)
                    .map(|(param, w)| {
                        let g = 0.5 + (w * sk + phi).sin().asin() / PI;
                        param.scale(g)
                    })
                    .collect();
                matrix.push(row);
            }
        }

        Ok(matrix)
    }
}
