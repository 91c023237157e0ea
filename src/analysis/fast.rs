//! eFAST estimator matched to `sampling::fast`.
//!
//! Each parameter's block of N indicator values is transformed into a power
//! spectrum. The first-order index sums the harmonics of the block's own
//! frequency ω₀; the total-order index is one minus the share of the low
//! frequencies belonging to the complementary parameters.
//!
//! NA runs are dropped from the block. The spectrum is computed over the
//! remaining mean-centred values at their original curve positions.

use super::stats::{resample, std_dev, z_critical};
use super::AnalysisSettings;
use crate::sampling::FastSampler;
use rand::Rng;
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FastEstimate {
    pub s1: f64,
    pub s1_conf: f64,
    pub st: f64,
    pub st_conf: f64,
}

/// Power spectrum `Sp[k-1] = (|F_k| / n)^2` for `k = 1..ceil(N/2)-1`.
///
/// `points` are `(position, value)` pairs on a curve of `n_total` positions.
fn power_spectrum(points: &[(usize, f64)], n_total: usize) -> Vec<f64> {
    let n = points.len() as f64;
    let centre = points.iter().map(|(_, y)| y).sum::<f64>() / n;
    let upper = n_total.div_ceil(2);

    (1..upper)
        .map(|k| {
            let (mut re, mut im) = (0.0, 0.0);
            for &(pos, y) in points {
                let angle = 2.0 * PI * (k * pos % n_total) as f64 / n_total as f64;
                re += (y - centre) * angle.cos();
                im -= (y - centre) * angle.sin();
            }
            (re * re + im * im) / (n * n)
        })
        .collect()
}

/// First- and total-order indices from one block; NaN when undefined
fn orders(points: &[(usize, f64)], n_total: usize, interference: usize) -> (f64, f64) {
    let omega = FastSampler::omega_max(n_total.max(1), interference);
    if points.len() < 2 || omega == 0 {
        return (f64::NAN, f64::NAN);
    }
    let sp = power_spectrum(points, n_total);
    let v = 2.0 * sp.iter().sum::<f64>();
    if v <= 0.0 {
        return (f64::NAN, f64::NAN);
    }

    let d1 = 2.0
        * (1..=interference)
            .filter_map(|p| sp.get(p * omega - 1))
            .sum::<f64>();
    let dt = 2.0 * sp.iter().take(omega / 2).sum::<f64>();
    (d1 / v, 1.0 - dt / v)
}

/// Indices for one parameter block. `block[i]` is `None` for NA runs.
pub fn estimate_block<R: Rng + ?Sized>(
    block: &[Option<f64>],
    interference: usize,
    settings: &AnalysisSettings,
    rng: &mut R,
) -> FastEstimate {
    let n_total = block.len();
    let points: Vec<(usize, f64)> = block
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|y| (i, y)))
        .collect();
    let (s1, st) = orders(&points, n_total, interference);

    let (s1_conf, st_conf) = if settings.num_resamples > 1 {
        let values: Vec<f64> = points.iter().map(|(_, y)| *y).collect();
        let size = values.len() / 2;
        let mut s1_draws = Vec::with_capacity(settings.num_resamples);
        let mut st_draws = Vec::with_capacity(settings.num_resamples);
        for _ in 0..settings.num_resamples {
            let drawn: Vec<(usize, f64)> = resample(rng, &values, size)
                .into_iter()
                .enumerate()
                .collect();
            let (a, b) = orders(&drawn, size, interference);
            if a.is_finite() && b.is_finite() {
                s1_draws.push(a);
                st_draws.push(b);
            }
        }
        let z = z_critical(settings.conf_level);
        (z * std_dev(&s1_draws, 1), z * std_dev(&st_draws, 1))
    } else {
        (f64::NAN, f64::NAN)
    };

    FastEstimate {
        s1,
        s1_conf,
        st,
        st_conf,
    }
}
