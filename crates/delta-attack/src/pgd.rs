//! Projected Gradient Descent attack (Madry et al.).
//!
//! Iterative evasion attack in which, after each gradient step, the
//! perturbation is projected back onto an lp-ball of specified radius, in
//! addition to clipping the adversarial sample into the permitted data
//! range.
//!
//! ## Algorithm
//!
//! 1. **Targets**: use the supplied labels, or the estimator's own
//!    predictions when none are given (avoids label leaking).
//! 2. **Random Initialization** (optional): start each pass from a random
//!    offset inside the eps-ball.
//! 3. **Gradient Step**: move `eps_step` along the normalized loss
//!    gradient, negated for targeted attacks.
//! 4. **Projection**: re-project `x_adv - x_init` onto the eps-ball. The
//!    ball is always measured against the original input, so per-step
//!    drift cannot accumulate.
//! 5. **Repeat**: `max_iter` steps per batch; best of `num_random_init`
//!    passes by attack success rate.
//!
//! ## References
//!
//! - Madry et al., "Towards Deep Learning Models Resistant to Adversarial
//!   Attacks" (<https://arxiv.org/abs/1706.06083>)
//! - Kurakin et al. on label leaking and randomized eps for adversarial
//!   training (<https://arxiv.org/abs/1611.01236>)

use crate::metrics::{compute_success, predict_batched};
use crate::perturbation::{apply_perturbation, compute_perturbation};
use crate::projection::project_lp_ball;
use crate::sampling::{random_sphere, truncated_normal};
use delta_core::{argmax_rows, Estimator, EvasionError, Labels, Result};
use ndarray::{Array2, ArrayD, Axis, IxDyn, Slice};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

/// Configuration for the PGD attack. Immutable for the lifetime of one
/// [`Pgd::generate`] call; the `random_eps` redraw produces per-call local
/// values and never writes back here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PgdConfig {
    /// Norm of the perturbation ball: `1.0`, `2.0` or [`f64::INFINITY`].
    pub norm: f64,
    /// Maximum perturbation radius.
    pub eps: f32,
    /// Step size per iteration.
    pub eps_step: f32,
    /// Number of iterations per batch.
    pub max_iter: usize,
    /// Steer toward the target label instead of away from the current one.
    pub targeted: bool,
    /// Number of random restarts inside the eps-ball; 0 starts at the
    /// original input.
    pub num_random_init: usize,
    /// Batch size for gradient and prediction calls.
    pub batch_size: usize,
    /// Redraw eps from a truncated normal once per call, rescaling
    /// eps_step to preserve the eps / eps_step ratio.
    pub random_eps: bool,
    /// Seed for random initialization and the eps redraw.
    pub seed: u64,
}

impl Default for PgdConfig {
    fn default() -> Self {
        Self {
            norm: f64::INFINITY,
            eps: 0.3,
            eps_step: 0.1,
            max_iter: 100,
            targeted: false,
            num_random_init: 0,
            batch_size: 32,
            random_eps: false,
            seed: 42,
        }
    }
}

impl PgdConfig {
    fn validate(&self) -> Result<()> {
        if !(self.norm == 1.0 || self.norm == 2.0 || self.norm == f64::INFINITY) {
            return Err(EvasionError::UnsupportedNorm { norm: self.norm });
        }
        if !(self.eps > 0.0) {
            return Err(EvasionError::InvalidConfig(
                "eps must be positive".to_string(),
            ));
        }
        if !(self.eps_step > 0.0) {
            return Err(EvasionError::InvalidConfig(
                "eps_step must be positive".to_string(),
            ));
        }
        if self.max_iter == 0 {
            return Err(EvasionError::InvalidConfig(
                "max_iter must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(EvasionError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Projected Gradient Descent attacker.
pub struct Pgd {
    config: PgdConfig,
}

impl Pgd {
    /// Create a new attacker, validating the configuration.
    pub fn new(config: PgdConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PgdConfig {
        &self.config
    }

    /// Generate adversarial examples for `x` (batch on axis 0).
    ///
    /// `y` carries the labels to attack with, in index or one-hot form.
    /// When omitted, the estimator's predictions on `x` serve as
    /// pseudo-labels to avoid label leaking; omitting them in a targeted
    /// attack is an error. `mask` freezes features where it is zero and is
    /// either one mask per sample (shape of `x`) or a single mask
    /// broadcast across the batch (shape of one sample).
    ///
    /// Returns an array of the shape of `x`; the per-sample perturbation
    /// satisfies the configured norm bound and the estimator's clip range.
    pub fn generate<E: Estimator + ?Sized>(
        &self,
        estimator: &E,
        x: &ArrayD<f32>,
        y: Option<Labels>,
        mask: Option<&ArrayD<f32>>,
    ) -> Result<ArrayD<f32>> {
        let n = x.shape()[0];
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        if estimator.applies_preprocessing() {
            warn!(
                "estimator applies preprocessing; the attack ignores it and \
                 differentiates the raw input"
            );
        }

        // Effective radius and step for this call only.
        let (eps, eps_step) = self.draw_random_eps(&mut rng)?;

        let targets = self.resolve_targets(estimator, x, y)?;
        if targets.nrows() != n {
            return Err(EvasionError::InvalidConfig(format!(
                "{} labels for {} samples",
                targets.nrows(),
                n
            )));
        }
        if let Some(mask) = mask {
            validate_mask(x, mask)?;
        }

        let mut adv_x_best = x.to_owned();
        let mut rate_best: Option<f32> = None;

        for pass in 0..self.config.num_random_init.max(1) {
            let mut adv_x = x.to_owned();

            for (start, end) in batch_ranges(n, self.config.batch_size) {
                trace!("pass {pass}: generating batch [{start}, {end})");
                let batch = x.slice_axis(Axis(0), Slice::from(start..end)).to_owned();
                let batch_labels = targets
                    .slice_axis(Axis(0), Slice::from(start..end))
                    .to_owned();
                let batch_mask = mask.map(|m| mask_for_batch(m, x.ndim(), start, end));

                let adv_batch = self.generate_batch(
                    estimator,
                    &batch,
                    &batch_labels,
                    batch_mask.as_ref(),
                    eps,
                    eps_step,
                    &mut rng,
                )?;
                adv_x
                    .slice_axis_mut(Axis(0), Slice::from(start..end))
                    .assign(&adv_batch);
            }

            if self.config.num_random_init > 1 {
                let rate = compute_success(
                    estimator,
                    x,
                    &targets,
                    &adv_x,
                    self.config.targeted,
                    self.config.batch_size,
                )?;
                debug!("pass {pass} success rate: {:.2}%", rate * 100.0);
                // Strict comparison keeps the earliest pass on ties.
                if rate_best.map_or(true, |best| rate > best) {
                    rate_best = Some(rate);
                    adv_x_best = adv_x;
                }
            } else {
                adv_x_best = adv_x;
            }
        }

        let rate = match rate_best {
            Some(rate) => rate,
            None => compute_success(
                estimator,
                x,
                &targets,
                &adv_x_best,
                self.config.targeted,
                self.config.batch_size,
            )?,
        };
        info!("success rate of attack: {:.2}%", rate * 100.0);

        Ok(adv_x_best)
    }

    /// Run the iteration loop for one batch and return its final
    /// adversarial examples.
    #[allow(clippy::too_many_arguments)]
    fn generate_batch<E: Estimator + ?Sized>(
        &self,
        estimator: &E,
        x_init: &ArrayD<f32>,
        targets: &Array2<f32>,
        mask: Option<&ArrayD<f32>>,
        eps: f32,
        eps_step: f32,
        rng: &mut StdRng,
    ) -> Result<ArrayD<f32>> {
        let mut adv_x = x_init.to_owned();

        for iteration in 0..self.config.max_iter {
            let random_init = self.config.num_random_init > 0 && iteration == 0;
            adv_x = self.compute_step(
                estimator,
                adv_x,
                x_init,
                targets,
                mask,
                eps,
                eps_step,
                random_init,
                rng,
            )?;
        }

        Ok(adv_x)
    }

    /// One iteration: optional random start, gradient step, clip, and
    /// projection back onto the eps-ball around `x_init`.
    #[allow(clippy::too_many_arguments)]
    fn compute_step<E: Estimator + ?Sized>(
        &self,
        estimator: &E,
        x: ArrayD<f32>,
        x_init: &ArrayD<f32>,
        y: &Array2<f32>,
        mask: Option<&ArrayD<f32>>,
        eps: f32,
        eps_step: f32,
        random_init: bool,
        rng: &mut StdRng,
    ) -> Result<ArrayD<f32>> {
        let adv_x = if random_init {
            let n = x.shape()[0];
            let nb_dims: usize = x.shape()[1..].iter().product();

            let offset = random_sphere(n, nb_dims, eps, self.config.norm, rng)?
                .into_shape_with_order(IxDyn(x.shape()))
                .unwrap();
            let offset = match mask {
                Some(mask) => offset * mask,
                None => offset,
            };

            let mut started = &x + &offset;
            if let Some((clip_min, clip_max)) = estimator.clip_values() {
                started.mapv_inplace(|v| v.clamp(clip_min, clip_max));
            }
            started
        } else {
            x
        };

        let perturbation = compute_perturbation(
            estimator,
            &adv_x,
            y,
            mask,
            self.config.targeted,
            self.config.norm,
        )?;

        let stepped = apply_perturbation(&adv_x, &perturbation, eps_step, estimator.clip_values());

        // Re-center on the original input before projecting, so the ball
        // constraint is measured from the true origin.
        let projected = project_lp_ball(&(&stepped - x_init), eps, self.config.norm)?;

        Ok(x_init + &projected)
    }

    /// Labels to attack with: the caller's, or the estimator's predictions
    /// on the clean input as pseudo-labels.
    fn resolve_targets<E: Estimator + ?Sized>(
        &self,
        estimator: &E,
        x: &ArrayD<f32>,
        y: Option<Labels>,
    ) -> Result<Array2<f32>> {
        match y {
            Some(labels) => labels.into_one_hot(estimator.nb_classes()),
            None => {
                if self.config.targeted {
                    return Err(EvasionError::TargetLabelsRequired);
                }
                let scores = predict_batched(estimator, x, self.config.batch_size)?;
                Labels::Indices(argmax_rows(&scores)).into_one_hot(estimator.nb_classes())
            }
        }
    }

    /// Effective `(eps, eps_step)` for one call. Under `random_eps` the
    /// radius is redrawn from a truncated normal on `[0, eps]` and the
    /// step rescaled to keep the eps / eps_step ratio.
    fn draw_random_eps(&self, rng: &mut StdRng) -> Result<(f32, f32)> {
        if !self.config.random_eps {
            return Ok((self.config.eps, self.config.eps_step));
        }

        let ratio = self.config.eps_step / self.config.eps;
        let drawn = truncated_normal(0.0, self.config.eps, 0.0, self.config.eps / 2.0, rng)?;
        let eps = round_decimals(drawn, 10);
        debug!("random_eps drew eps = {eps}, eps_step = {}", ratio * eps);
        Ok((eps, ratio * eps))
    }
}

/// Contiguous `(start, end)` index ranges covering `n` samples in chunks
/// of `batch_size`; the last range may be shorter, no sample is dropped.
fn batch_ranges(n: usize, batch_size: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..n.div_ceil(batch_size)).map(move |b| (b * batch_size, ((b + 1) * batch_size).min(n)))
}

/// A mask is either per-sample (shape of `x`) or broadcast (shape of one
/// sample). Anything else is rejected before iteration starts.
fn validate_mask(x: &ArrayD<f32>, mask: &ArrayD<f32>) -> Result<()> {
    let per_sample = mask.shape() == x.shape();
    let broadcast = mask.ndim() + 1 == x.ndim() && mask.shape() == &x.shape()[1..];
    if per_sample || broadcast {
        Ok(())
    } else {
        Err(EvasionError::InvalidMaskShape {
            input: x.shape().to_vec(),
            mask: mask.shape().to_vec(),
        })
    }
}

/// Per-sample masks follow the batch slicing; broadcast masks are reused
/// unchanged for every batch.
fn mask_for_batch(mask: &ArrayD<f32>, x_ndim: usize, start: usize, end: usize) -> ArrayD<f32> {
    if mask.ndim() == x_ndim {
        mask.slice_axis(Axis(0), Slice::from(start..end)).to_owned()
    } else {
        mask.to_owned()
    }
}

fn round_decimals(value: f32, places: i32) -> f32 {
    let factor = 10f64.powi(places);
    ((value as f64 * factor).round() / factor) as f32
}
