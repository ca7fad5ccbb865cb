//! Gradient direction and step application.
//!
//! One PGD step splits into two halves: turn the raw loss gradient into a
//! bounded-norm ascent direction, then move `eps_step` along it and clamp
//! into the estimator's valid data range.

use crate::projection::TOL;
use delta_core::{Estimator, EvasionError, Result};
use ndarray::{Array2, ArrayD, Axis};

/// Sign with the convention `sign(0) = 0`, so zero-gradient features never
/// move under the ∞-norm direction.
fn sign(v: f32) -> f32 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Compute the normalized perturbation direction at `x`.
///
/// The estimator's loss gradient is negated for targeted attacks (descend
/// toward the target class instead of ascending away from the current
/// one), normalized per the attack norm (∞ → elementwise sign; 1 and 2 →
/// per-sample division by the norm plus [`TOL`]), and multiplied by the
/// mask when one is given. The result has the shape of `x`.
pub fn compute_perturbation<E: Estimator + ?Sized>(
    estimator: &E,
    x: &ArrayD<f32>,
    y: &Array2<f32>,
    mask: Option<&ArrayD<f32>>,
    targeted: bool,
    norm: f64,
) -> Result<ArrayD<f32>> {
    let mut grad = estimator.loss_gradient(x, y)?;
    if grad.shape() != x.shape() {
        return Err(EvasionError::Estimator(format!(
            "loss gradient shape {:?} does not match input shape {:?}",
            grad.shape(),
            x.shape()
        )));
    }

    if targeted {
        grad.mapv_inplace(|g| -g);
    }

    if norm == f64::INFINITY {
        grad.mapv_inplace(sign);
    } else if norm == 1.0 || norm == 2.0 {
        for mut sample in grad.axis_iter_mut(Axis(0)) {
            let sample_norm = if norm == 1.0 {
                sample.iter().map(|g| g.abs()).sum::<f32>()
            } else {
                sample.iter().map(|g| g * g).sum::<f32>().sqrt()
            };
            sample.mapv_inplace(|g| g / (sample_norm + TOL));
        }
    } else {
        return Err(EvasionError::UnsupportedNorm { norm });
    }

    match mask {
        Some(mask) => Ok(grad * mask),
        None => Ok(grad),
    }
}

/// Apply one scaled step: `x + eps_step * perturbation`, clamped into the
/// valid data range when one is provided.
pub fn apply_perturbation(
    x: &ArrayD<f32>,
    perturbation: &ArrayD<f32>,
    eps_step: f32,
    clip_values: Option<(f32, f32)>,
) -> ArrayD<f32> {
    let mut stepped = x + &(perturbation * eps_step);
    if let Some((clip_min, clip_max)) = clip_values {
        stepped.mapv_inplace(|v| v.clamp(clip_min, clip_max));
    }
    stepped
}
