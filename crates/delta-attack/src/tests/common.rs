//! Test estimators shared by the scenario tests.

use delta_core::{Estimator, Result};
use ndarray::{Array2, ArrayD};
use std::cell::{Cell, RefCell};

/// Estimator with a constant loss gradient everywhere. Predictions are
/// always class 0, so it only exercises the perturbation path.
pub struct FixedGradient {
    pub grad: f32,
    pub clip: Option<(f32, f32)>,
    pub preprocessing: bool,
}

impl FixedGradient {
    pub fn new(grad: f32, clip: Option<(f32, f32)>) -> Self {
        Self {
            grad,
            clip,
            preprocessing: false,
        }
    }
}

impl Estimator for FixedGradient {
    fn predict(&self, x: &ArrayD<f32>) -> Result<Array2<f32>> {
        let n = x.shape()[0];
        let mut scores = Array2::zeros((n, 2));
        scores.column_mut(0).fill(1.0);
        Ok(scores)
    }

    fn loss_gradient(&self, x: &ArrayD<f32>, _y: &Array2<f32>) -> Result<ArrayD<f32>> {
        Ok(ArrayD::from_elem(x.raw_dim(), self.grad))
    }

    fn nb_classes(&self) -> usize {
        2
    }

    fn clip_values(&self) -> Option<(f32, f32)> {
        self.clip
    }

    fn applies_preprocessing(&self) -> bool {
        self.preprocessing
    }
}

/// Estimator whose predictions follow a per-call script: on its k-th
/// `predict` call it reports `rates[k]` of the batch (counting from the
/// front) as class 1 and the rest as class 0, recording the input it saw.
/// Gradients are zero, so only random initialization moves the iterate —
/// which makes the best-of-N selection fully observable.
pub struct Scripted {
    pub rates: Vec<f32>,
    pub calls: Cell<usize>,
    pub seen: RefCell<Vec<ArrayD<f32>>>,
}

impl Scripted {
    pub fn new(rates: Vec<f32>) -> Self {
        Self {
            rates,
            calls: Cell::new(0),
            seen: RefCell::new(Vec::new()),
        }
    }
}

impl Estimator for Scripted {
    fn predict(&self, x: &ArrayD<f32>) -> Result<Array2<f32>> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        self.seen.borrow_mut().push(x.to_owned());

        let n = x.shape()[0];
        let rate = self.rates[call.min(self.rates.len() - 1)];
        let hits = (rate * n as f32).round() as usize;

        let mut scores = Array2::zeros((n, 2));
        for i in 0..n {
            if i < hits {
                scores[[i, 1]] = 1.0;
            } else {
                scores[[i, 0]] = 1.0;
            }
        }
        Ok(scores)
    }

    fn loss_gradient(&self, x: &ArrayD<f32>, _y: &Array2<f32>) -> Result<ArrayD<f32>> {
        Ok(ArrayD::zeros(x.raw_dim()))
    }

    fn nb_classes(&self) -> usize {
        2
    }
}
