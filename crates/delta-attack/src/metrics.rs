//! Attack success bookkeeping.

use delta_core::{argmax_rows, Estimator, EvasionError, Result};
use ndarray::{Array2, ArrayD, Axis, Slice};

/// Fraction of samples on which the attack succeeded, in `[0, 1]`.
///
/// A targeted attack succeeds where the adversarial prediction matches the
/// target label. An untargeted attack succeeds where it differs from the
/// prediction on the *clean* input — predictions, not supplied labels, so
/// a sample the model already misclassifies does not count as a win.
pub fn compute_success<E: Estimator + ?Sized>(
    estimator: &E,
    x_clean: &ArrayD<f32>,
    labels: &Array2<f32>,
    x_adv: &ArrayD<f32>,
    targeted: bool,
    batch_size: usize,
) -> Result<f32> {
    let n = x_adv.shape()[0];
    if n == 0 {
        return Ok(0.0);
    }

    let adv_classes = argmax_rows(&predict_batched(estimator, x_adv, batch_size)?);

    let successes = if targeted {
        let target_classes = argmax_rows(labels);
        adv_classes
            .iter()
            .zip(target_classes.iter())
            .filter(|(adv, target)| adv == target)
            .count()
    } else {
        let clean_classes = argmax_rows(&predict_batched(estimator, x_clean, batch_size)?);
        adv_classes
            .iter()
            .zip(clean_classes.iter())
            .filter(|(adv, clean)| adv != clean)
            .count()
    };

    Ok(successes as f32 / n as f32)
}

/// Run `predict` in `batch_size` chunks and gather the score rows into a
/// single `(n, nb_classes)` matrix.
pub fn predict_batched<E: Estimator + ?Sized>(
    estimator: &E,
    x: &ArrayD<f32>,
    batch_size: usize,
) -> Result<Array2<f32>> {
    debug_assert!(batch_size > 0);
    let n = x.shape()[0];
    let nb_classes = estimator.nb_classes();
    let mut scores = Array2::zeros((n, nb_classes));

    let mut start = 0;
    while start < n {
        let end = (start + batch_size).min(n);
        let batch = x.slice_axis(Axis(0), Slice::from(start..end)).to_owned();
        let batch_scores = estimator.predict(&batch)?;
        if batch_scores.shape() != [end - start, nb_classes] {
            return Err(EvasionError::Estimator(format!(
                "predict returned shape {:?} for a batch of {} samples and {} classes",
                batch_scores.shape(),
                end - start,
                nb_classes
            )));
        }
        scores
            .slice_axis_mut(Axis(0), Slice::from(start..end))
            .assign(&batch_scores);
        start = end;
    }

    Ok(scores)
}
