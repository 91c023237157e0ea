//! Morris elementary-effects estimator matched to `sampling::morris`.

use super::stats::{mean, resample, std_dev, z_critical};
use super::AnalysisSettings;
use crate::error::{Result, SweepError};
use crate::problem::ProblemDefinition;
use crate::sampling::SampleMatrix;
use rand::Rng;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MorrisEstimate {
    pub mu: f64,
    pub mu_star: f64,
    pub sigma: f64,
    pub mu_star_conf: f64,
}

/// Which parameter each trajectory step moves, validated against the design
///
/// Returns, per step, `(from_row, to_row, parameter, unit_step)`.
pub fn trajectory_steps(
    problem: &ProblemDefinition,
    matrix: &SampleMatrix,
) -> Result<Vec<(usize, usize, usize, f64)>> {
    let d = problem.len();
    let width = d + 1;
    if matrix.len() % width != 0 {
        return Err(SweepError::analysis(format!(
            "{} rows cannot be split into Morris trajectories of {} points",
            matrix.len(),
            width
        )));
    }

    let mut steps = Vec::with_capacity(matrix.len() / width * d);
    for start in (0..matrix.len()).step_by(width) {
        for k in start..start + d {
            let (a, b) = (&matrix.rows()[k], &matrix.rows()[k + 1]);
            let changed: Vec<usize> = (0..d).filter(|&j| a[j] != b[j]).collect();
            if changed.len() != 1 {
                return Err(SweepError::analysis(format!(
                    "rows {} and {} differ in {} components; a Morris step moves exactly one",
                    k,
                    k + 1,
                    changed.len()
                )));
            }
            let j = changed[0];
            let param = &problem.parameters()[j];
            let unit_step = param.normalize(b[j]) - param.normalize(a[j]);
            steps.push((k, k + 1, j, unit_step));
        }
    }
    Ok(steps)
}

/// Effect measures for every parameter from one indicator column
pub fn estimate<R: Rng + ?Sized>(
    problem: &ProblemDefinition,
    steps: &[(usize, usize, usize, f64)],
    outputs: &[Option<f64>],
    settings: &AnalysisSettings,
    rng: &mut R,
) -> Vec<MorrisEstimate> {
    let mut effects: Vec<Vec<f64>> = vec![Vec::new(); problem.len()];
    for &(from, to, j, unit_step) in steps {
        if let (Some(y0), Some(y1)) = (outputs[from], outputs[to]) {
            effects[j].push((y1 - y0) / unit_step);
        }
    }

    let z = z_critical(settings.conf_level);
    effects
        .iter()
        .zip(problem.iter())
        .map(|(ee, param)| {
            if ee.is_empty() {
                warn!("No complete elementary effect for '{}'", param.label());
            }
            let abs: Vec<f64> = ee.iter().map(|e| e.abs()).collect();
            let mu_star_conf = if settings.num_resamples > 1 && !abs.is_empty() {
                let draws: Vec<f64> = (0..settings.num_resamples)
                    .map(|_| mean(&resample(rng, &abs, abs.len())))
                    .collect();
                z * std_dev(&draws, 1)
            } else {
                f64::NAN
            };
            MorrisEstimate {
                mu: mean(ee),
                mu_star: mean(&abs),
                sigma: std_dev(ee, 1),
                mu_star_conf,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::Parameter;
    use crate::sampling::{MorrisSampler, SamplingStrategy};
    use crate::types::ChangeType;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn problem() -> ProblemDefinition {
        ProblemDefinition::new(vec![
            Parameter::new("a", ChangeType::Absval, 0.0, 2.0),
            Parameter::new("b", ChangeType::Absval, -1.0, 1.0),
        ])
        .unwrap()
    }

    fn settings() -> AnalysisSettings {
        AnalysisSettings {
            conf_level: 0.95,
            num_resamples: 50,
            seed: 0,
        }
    }

    #[test]
    fn test_linear_effects_are_exact() {
        let problem = problem();
        let matrix = MorrisSampler::new(10, 4).generate(&problem, 5).unwrap();
        let steps = trajectory_steps(&problem, &matrix).unwrap();
        assert_eq!(steps.len(), 20);

        // y = 3a - b: unit-space slopes are 3·2 = 6 and -1·2 = -2
        let outputs: Vec<Option<f64>> = matrix
            .rows()
            .iter()
            .map(|x| Some(3.0 * x[0] - x[1]))
            .collect();
        let mut rng = SmallRng::seed_from_u64(0);
        let est = estimate(&problem, &steps, &outputs, &settings(), &mut rng);

        assert!((est[0].mu - 6.0).abs() < 1e-9);
        assert!((est[0].mu_star - 6.0).abs() < 1e-9);
        assert!(est[0].sigma.abs() < 1e-9);
        assert!((est[1].mu + 2.0).abs() < 1e-9);
        assert!((est[1].mu_star - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_na_endpoint_drops_step() {
        let problem = problem();
        let matrix = MorrisSampler::new(2, 4).generate(&problem, 5).unwrap();
        let steps = trajectory_steps(&problem, &matrix).unwrap();
        let mut outputs: Vec<Option<f64>> = matrix.rows().iter().map(|x| Some(x[0])).collect();
        outputs[0] = None;

        let mut rng = SmallRng::seed_from_u64(0);
        let est = estimate(&problem, &steps, &outputs, &settings(), &mut rng);
        // Row 0 only takes part in the first step of the first trajectory
        assert!(est.iter().all(|e| e.mu.is_finite()));
    }

    #[test]
    fn test_foreign_matrix_is_a_mismatch() {
        let problem = problem();
        let matrix = SampleMatrix::from_rows(
            2,
            vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![2.0, 1.0]],
        )
        .unwrap();
        assert!(matches!(
            trajectory_steps(&problem, &matrix),
            Err(SweepError::Analysis(_))
        ));

        let ragged = SampleMatrix::from_rows(2, vec![vec![0.0, 0.0]; 4]).unwrap();
        assert!(trajectory_steps(&problem, &ragged).is_err());
    }
}
