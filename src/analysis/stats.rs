//! Small numeric helpers shared by the estimators.

use rand::Rng;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Standard deviation with `ddof` delta degrees of freedom (NaN when
/// there are not enough values)
pub fn std_dev(values: &[f64], ddof: usize) -> f64 {
    if values.len() <= ddof {
        return f64::NAN;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (ss / (values.len() - ddof) as f64).sqrt()
}

/// Inverse of the standard normal CDF (Acklam's rational approximation,
/// relative error below 1.2e-9).
pub fn normal_ppf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    if p.is_nan() || p <= 0.0 || p >= 1.0 {
        return match p {
            x if x == 0.0 => f64::NEG_INFINITY,
            x if x == 1.0 => f64::INFINITY,
            _ => f64::NAN,
        };
    }

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}

/// Two-sided critical value for a confidence level, e.g. 1.96 for 0.95
pub fn z_critical(conf_level: f64) -> f64 {
    normal_ppf(0.5 + conf_level / 2.0)
}

/// Draw `size` values from `values` with replacement
pub fn resample<R: Rng + ?Sized>(rng: &mut R, values: &[f64], size: usize) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    (0..size)
        .map(|_| values[rng.random_range(0..values.len())])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn test_mean_and_std() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&v), 5.0);
        assert!((std_dev(&v, 0) - 2.0).abs() < 1e-12);
        assert!((std_dev(&v, 1) - 2.138089935299395).abs() < 1e-12);
        assert!(std_dev(&[1.0], 1).is_nan());
        assert!(mean(&[]).is_nan());
    }

    #[test]
    fn test_normal_ppf() {
        assert!(normal_ppf(0.5).abs() < 1e-9);
        assert!((z_critical(0.95) - 1.959963984540054).abs() < 1e-8);
        assert!((normal_ppf(0.01) + 2.326347874040841).abs() < 1e-8);
        assert!((normal_ppf(0.99) - 2.326347874040841).abs() < 1e-8);
        assert!(normal_ppf(1.5).is_nan());
    }

    #[test]
    fn test_resample_draws_from_input() {
        let mut rng = SmallRng::seed_from_u64(3);
        let v = [1.0, 2.0, 3.0];
        let drawn = resample(&mut rng, &v, 10);
        assert_eq!(drawn.len(), 10);
        assert!(drawn.iter().all(|x| v.contains(x)));
        assert!(resample(&mut rng, &[], 4).is_empty());
    }
}
