//! Evasion attacks against trained classifiers.
//!
//! Implements the Projected Gradient Descent attack of Madry et al.
//! (<https://arxiv.org/abs/1706.06083>): an iterative method in which,
//! after each gradient step, the perturbation is projected back onto an
//! lp-ball of specified radius, in addition to clipping the adversarial
//! sample into the permitted data range. This is the attack proposed for
//! adversarial training.
//!
//! The model under attack is anything implementing
//! [`delta_core::Estimator`]: loss-gradient access, prediction, and
//! optional clip bounds are the whole contract.

pub mod metrics;
pub mod perturbation;
pub mod pgd;
pub mod projection;
pub mod sampling;

pub use metrics::{compute_success, predict_batched};
pub use perturbation::{apply_perturbation, compute_perturbation};
pub use pgd::{Pgd, PgdConfig};
pub use projection::project_lp_ball;
pub use sampling::{random_sphere, truncated_normal};

// Re-export core types for tests and downstream use
pub use delta_core::{argmax_rows, Estimator, EvasionError, Labels, Result};

#[cfg(test)]
mod tests;
