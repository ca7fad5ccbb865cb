//! Random starting points inside an Lp-ball, and the truncated-normal
//! epsilon redraw.
//!
//! Random initialization starts the iterative search from a random offset
//! inside the eps-ball instead of the original input, to escape poor local
//! optima. [`random_sphere`] returns flat per-sample offsets whose Lp norm
//! never exceeds the radius; callers reshape to the batch shape.

use delta_core::{EvasionError, Result};
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal, StandardNormal};

/// Sample `nb_points` random offsets of `nb_dims` dimensions with Lp norm
/// at most `radius`.
///
/// - ∞: i.i.d. uniform coordinates on `[-radius, radius]`.
/// - 2: Gaussian direction scaled by `radius * u^(1/d)`, uniform in the
///   ball.
/// - 1: sorted-uniform spacings inside a sub-radius `sqrt(U(0, radius²))`
///   with independent random signs; the spacings sum to the sub-radius, so
///   the L1 norm is bounded by construction.
pub fn random_sphere(
    nb_points: usize,
    nb_dims: usize,
    radius: f32,
    norm: f64,
    rng: &mut StdRng,
) -> Result<Array2<f32>> {
    let mut points = Array2::zeros((nb_points, nb_dims));

    if norm == f64::INFINITY {
        for coord in points.iter_mut() {
            *coord = rng.random_range(-radius..=radius);
        }
    } else if norm == 2.0 {
        for mut row in points.axis_iter_mut(Axis(0)) {
            let gauss: Vec<f32> = (0..nb_dims).map(|_| StandardNormal.sample(rng)).collect();
            let l2 = gauss.iter().map(|g| g * g).sum::<f32>().sqrt();
            let u: f32 = rng.random();
            let scale = if l2 > 0.0 {
                radius * u.powf(1.0 / nb_dims as f32) / l2
            } else {
                0.0
            };
            for (coord, g) in row.iter_mut().zip(&gauss) {
                *coord = g * scale;
            }
        }
    } else if norm == 1.0 {
        for mut row in points.axis_iter_mut(Axis(0)) {
            let sub_radius = rng.random_range(0.0..=radius * radius).sqrt();
            let mut cuts: Vec<f32> = (0..nb_dims.saturating_sub(1))
                .map(|_| rng.random_range(0.0..=sub_radius))
                .collect();
            cuts.sort_by(|a, b| a.total_cmp(b));

            let mut prev = 0.0;
            for (i, coord) in row.iter_mut().enumerate() {
                let next = if i < cuts.len() { cuts[i] } else { sub_radius };
                let spacing_sign = if rng.random::<bool>() { 1.0 } else { -1.0 };
                *coord = (next - prev) * spacing_sign;
                prev = next;
            }
        }
    } else {
        return Err(EvasionError::UnsupportedNorm { norm });
    }

    Ok(points)
}

/// Draw from a normal distribution truncated to `[lower, upper]` by
/// rejection sampling.
///
/// The interval must carry non-negligible probability mass under
/// `N(mu, sigma)`; the eps redraw uses `[0, eps]` with `mu = 0` and
/// `sigma = eps / 2`, which accepts roughly half of all draws.
pub fn truncated_normal(
    lower: f32,
    upper: f32,
    mu: f32,
    sigma: f32,
    rng: &mut StdRng,
) -> Result<f32> {
    let dist = Normal::new(mu, sigma)
        .map_err(|e| EvasionError::InvalidConfig(format!("truncated normal: {e}")))?;
    loop {
        let draw = dist.sample(rng);
        if (lower..=upper).contains(&draw) {
            return Ok(draw);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_linf_sphere_within_radius() {
        let mut rng = StdRng::seed_from_u64(7);
        let points = random_sphere(50, 8, 0.3, f64::INFINITY, &mut rng).unwrap();
        assert_eq!(points.shape(), &[50, 8]);
        for &v in points.iter() {
            assert!(v.abs() <= 0.3 + 1e-6);
        }
    }

    #[test]
    fn test_l2_sphere_within_radius() {
        let mut rng = StdRng::seed_from_u64(7);
        let points = random_sphere(50, 8, 0.5, 2.0, &mut rng).unwrap();
        for row in points.axis_iter(Axis(0)) {
            let l2 = row.iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!(l2 <= 0.5 + 1e-5);
        }
    }

    #[test]
    fn test_l1_sphere_within_radius() {
        let mut rng = StdRng::seed_from_u64(7);
        let points = random_sphere(50, 8, 0.5, 1.0, &mut rng).unwrap();
        for row in points.axis_iter(Axis(0)) {
            let l1 = row.iter().map(|v| v.abs()).sum::<f32>();
            assert!(l1 <= 0.5 + 1e-5);
        }
    }

    #[test]
    fn test_l1_sphere_single_dimension() {
        let mut rng = StdRng::seed_from_u64(7);
        let points = random_sphere(20, 1, 0.25, 1.0, &mut rng).unwrap();
        for &v in points.iter() {
            assert!(v.abs() <= 0.25 + 1e-6);
        }
    }

    #[test]
    fn test_sphere_samples_are_not_degenerate() {
        // A sampler that returns all zeros satisfies the norm bound but is
        // useless as a random start.
        let mut rng = StdRng::seed_from_u64(7);
        for norm in [1.0, 2.0, f64::INFINITY] {
            let points = random_sphere(10, 4, 1.0, norm, &mut rng).unwrap();
            let total: f32 = points.iter().map(|v| v.abs()).sum();
            assert!(total > 0.0, "norm {norm} produced all-zero offsets");
        }
    }

    #[test]
    fn test_unsupported_norm_rejected() {
        let mut rng = StdRng::seed_from_u64(7);
        let err = random_sphere(1, 2, 0.5, 3.0, &mut rng).unwrap_err();
        assert!(matches!(err, EvasionError::UnsupportedNorm { .. }));
    }

    #[test]
    fn test_seeded_sampling_is_reproducible() {
        let mut rng_a = StdRng::seed_from_u64(99);
        let mut rng_b = StdRng::seed_from_u64(99);
        let a = random_sphere(5, 3, 0.4, 2.0, &mut rng_a).unwrap();
        let b = random_sphere(5, 3, 0.4, 2.0, &mut rng_b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_truncated_normal_stays_in_interval() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let draw = truncated_normal(0.0, 0.3, 0.0, 0.15, &mut rng).unwrap();
            assert!((0.0..=0.3).contains(&draw));
        }
    }

    #[test]
    fn test_truncated_normal_rejects_bad_sigma() {
        let mut rng = StdRng::seed_from_u64(7);
        let err = truncated_normal(0.0, 1.0, 0.0, -1.0, &mut rng).unwrap_err();
        assert!(matches!(err, EvasionError::InvalidConfig(_)));
    }
}
