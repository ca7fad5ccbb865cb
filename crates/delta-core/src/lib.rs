//! Core types and traits for δ-EVADE adversarial example generation.
//!
//! This crate provides the foundational abstractions shared by the attack
//! crates: the estimator capability interface, label containers with
//! one-hot normalization, and the workspace error type.

use ndarray::{Array1, Array2, ArrayD, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for δ-EVADE operations.
#[derive(Error, Debug)]
pub enum EvasionError {
    /// A norm other than 1, 2 or ∞ was requested.
    #[error("unsupported perturbation norm {norm}: only 1, 2 and inf are supported")]
    UnsupportedNorm { norm: f64 },

    /// The mask is neither one mask per sample nor a single-sample mask.
    #[error("mask shape {mask:?} is not broadcastable to input shape {input:?}")]
    InvalidMaskShape {
        input: Vec<usize>,
        mask: Vec<usize>,
    },

    /// A targeted attack was run without target labels.
    #[error("target labels `y` need to be provided for a targeted attack")]
    TargetLabelsRequired,

    #[error("invalid attack configuration: {0}")]
    InvalidConfig(String),

    /// Failure propagated from the estimator under attack.
    #[error("estimator failure: {0}")]
    Estimator(String),
}

pub type Result<T> = std::result::Result<T, EvasionError>;

/// Capability interface for the model under attack.
///
/// Anything that can produce class scores and a loss gradient with respect
/// to its input can be attacked; there is no concrete model type. Clip
/// bounds and preprocessing are optional capabilities with conservative
/// defaults.
pub trait Estimator {
    /// Class scores (logits or probabilities) of shape `(n, nb_classes)`
    /// for a batch of shape `(n, ...)`.
    fn predict(&self, x: &ArrayD<f32>) -> Result<Array2<f32>>;

    /// Gradient of the training loss at `x` with respect to the input,
    /// for one-hot targets `y` of shape `(n, nb_classes)`. Same shape as
    /// `x`.
    fn loss_gradient(&self, x: &ArrayD<f32>, y: &Array2<f32>) -> Result<ArrayD<f32>>;

    /// Number of output classes.
    fn nb_classes(&self) -> usize;

    /// Valid data range as `(min, max)`, if the input domain is bounded.
    fn clip_values(&self) -> Option<(f32, f32)> {
        None
    }

    /// Whether the estimator applies input preprocessing the attack cannot
    /// differentiate through. Attacks warn and ignore it.
    fn applies_preprocessing(&self) -> bool {
        false
    }
}

/// Class labels in either index or one-hot form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Labels {
    /// Per-sample class indices of shape `(n,)`.
    Indices(Array1<usize>),
    /// One-hot (or soft) label vectors of shape `(n, nb_classes)`.
    OneHot(Array2<f32>),
}

impl Labels {
    /// Number of labelled samples.
    pub fn len(&self) -> usize {
        match self {
            Labels::Indices(idx) => idx.len(),
            Labels::OneHot(y) => y.nrows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Normalize into a one-hot matrix of shape `(n, nb_classes)`.
    ///
    /// One-hot input is passed through after a width check; index input is
    /// expanded, rejecting indices outside `0..nb_classes`.
    pub fn into_one_hot(self, nb_classes: usize) -> Result<Array2<f32>> {
        match self {
            Labels::OneHot(y) => {
                if y.ncols() != nb_classes {
                    return Err(EvasionError::InvalidConfig(format!(
                        "one-hot labels have {} columns, estimator has {} classes",
                        y.ncols(),
                        nb_classes
                    )));
                }
                Ok(y)
            }
            Labels::Indices(idx) => {
                let mut y = Array2::zeros((idx.len(), nb_classes));
                for (i, &class) in idx.iter().enumerate() {
                    if class >= nb_classes {
                        return Err(EvasionError::InvalidConfig(format!(
                            "label index {class} out of range for {nb_classes} classes"
                        )));
                    }
                    y[[i, class]] = 1.0;
                }
                Ok(y)
            }
        }
    }
}

impl From<Array1<usize>> for Labels {
    fn from(indices: Array1<usize>) -> Self {
        Labels::Indices(indices)
    }
}

impl From<Array2<f32>> for Labels {
    fn from(one_hot: Array2<f32>) -> Self {
        Labels::OneHot(one_hot)
    }
}

/// Argmax of each row of a score matrix.
///
/// Ties resolve to the lowest index, matching the usual argmax convention.
pub fn argmax_rows(scores: &Array2<f32>) -> Array1<usize> {
    scores
        .axis_iter(Axis(0))
        .map(|row| {
            let mut best_idx = 0;
            let mut best_val = f32::NEG_INFINITY;
            for (i, &v) in row.iter().enumerate() {
                if v > best_val {
                    best_idx = i;
                    best_val = v;
                }
            }
            best_idx
        })
        .collect()
}
