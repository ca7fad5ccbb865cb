//! Lp-ball projection of batched perturbations.
//!
//! After every PGD step the accumulated perturbation `x_adv - x_init` is
//! projected back onto the Lp-ball of radius `eps`. Projection is measured
//! per sample: the first axis is the batch axis and no operation mixes
//! samples.

use delta_core::{EvasionError, Result};
use ndarray::{ArrayD, Axis};

/// Guard against division by near-zero norms. Shared by the L1 and L2
/// scale factors here and the gradient normalization in
/// [`crate::perturbation`].
pub(crate) const TOL: f32 = 1e-7;

/// Project `values` onto the Lp-ball of radius `eps`, per sample.
///
/// Supported norms are `1.0`, `2.0` and [`f64::INFINITY`]:
/// - ∞: each element's magnitude is clipped to `eps`, preserving sign.
/// - 1 and 2: each sample is uniformly rescaled by
///   `min(1, eps / (norm + tol))`.
///
/// The per-sample norm of the result never exceeds `eps` (up to
/// floating-point tolerance) and the shape is preserved. Samples already
/// inside the ball are returned unchanged.
pub fn project_lp_ball(values: &ArrayD<f32>, eps: f32, norm: f64) -> Result<ArrayD<f32>> {
    let mut projected = values.to_owned();

    if norm == f64::INFINITY {
        projected.mapv_inplace(|v| v.signum() * v.abs().min(eps));
        return Ok(projected);
    }

    if norm == 1.0 || norm == 2.0 {
        for mut sample in projected.axis_iter_mut(Axis(0)) {
            let sample_norm = if norm == 1.0 {
                sample.iter().map(|v| v.abs()).sum::<f32>()
            } else {
                sample.iter().map(|v| v * v).sum::<f32>().sqrt()
            };
            let scale = (eps / (sample_norm + TOL)).min(1.0);
            if scale < 1.0 {
                sample.mapv_inplace(|v| v * scale);
            }
        }
        return Ok(projected);
    }

    Err(EvasionError::UnsupportedNorm { norm })
}
