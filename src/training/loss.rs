//! Loss math for association training
//!
//! Pure tensor functions; the session decides where the results are recorded.
//!
//! Cross-entropy reductions follow the conventions of the classic
//! graph-mode losses:
//! - [`softmax_cross_entropy`] averages the per-row loss over the batch and
//!   scales by a scalar weight.
//! - [`sparse_softmax_cross_entropy`] takes per-sample weights and divides
//!   the weighted sum by the number of non-zero weights, so samples with
//!   weight zero are excluded instead of diluting the mean.

use burn::tensor::{activation::log_softmax, backend::Backend, Int, Tensor};

use crate::utils::error::{ensure_dim, AssocError, Result};

/// Guard added to probabilities before taking their logarithm
pub const LOG_EPSILON: f64 = 1e-8;

/// `eq[i, j] = 1` when `labels[i] == labels[j]`, else `0`
pub fn equality_matrix<B: Backend>(labels: Tensor<B, 1, Int>) -> Tensor<B, 2> {
    let [n] = labels.dims();
    let rows = labels.clone().reshape([n, 1]).repeat_dim(1, n);
    let cols = labels.reshape([1, n]).repeat_dim(0, n);
    rows.equal(cols).float()
}

/// Row-normalized equality matrix.
///
/// The division is not guarded: a row without any same-label entry produces
/// NaN, which cannot happen for an equality matrix built from labels.
pub fn walker_target<B: Backend>(equality: Tensor<B, 2>) -> Tensor<B, 2> {
    let row_sums = equality.clone().sum_dim(1);
    equality / row_sums
}

/// Mean over rows of `-Σ target · log_softmax(logits)`, times `weight`
pub fn softmax_cross_entropy<B: Backend>(
    target: Tensor<B, 2>,
    logits: Tensor<B, 2>,
    weight: f64,
) -> Tensor<B, 1> {
    let per_row = (target * log_softmax(logits, 1)).sum_dim(1).neg();
    per_row.mean().mul_scalar(weight)
}

/// Index-based cross-entropy with per-sample weights.
///
/// `labels` may contain negative entries for samples whose weight is zero;
/// they are clamped to a valid index and contribute nothing.
pub fn sparse_softmax_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    labels: Tensor<B, 1, Int>,
    weights: Tensor<B, 1>,
) -> Tensor<B, 1> {
    let [n, _] = logits.dims();

    let log_probs = log_softmax(logits, 1);
    let index = labels.clamp_min(0).reshape([n, 1]);
    let per_sample = log_probs.gather(1, index).reshape([n]).neg();

    let nonzero = weights
        .clone()
        .equal_elem(0.0)
        .bool_not()
        .float()
        .sum()
        .clamp_min(1.0);

    (per_sample * weights).sum() / nonzero
}

/// Round-trip loss: cross-entropy between the row-normalized equality matrix
/// and `log(p_aba + ε)`.
pub fn walker_loss<B: Backend>(
    p_aba: Tensor<B, 2>,
    equality: Tensor<B, 2>,
    weight: f64,
) -> Result<Tensor<B, 1>> {
    let [n, width] = p_aba.dims();
    ensure_dim("p_aba columns", width, n)?;
    ensure_dim("equality matrix rows", equality.dims()[0], n)?;
    ensure_dim("equality matrix columns", equality.dims()[1], n)?;

    let target = walker_target(equality);
    let logits = p_aba.add_scalar(LOG_EPSILON).log();
    Ok(softmax_cross_entropy(target, logits, weight))
}

/// Visit loss: cross-entropy between the uniform distribution over the `M`
/// unlabeled samples and the mean visit probability `mean_i p_ab[i, :]`.
pub fn visit_loss<B: Backend>(p_ab: Tensor<B, 2>, weight: f64) -> Result<Tensor<B, 1>> {
    let [n, m] = p_ab.dims();
    if n == 0 || m == 0 {
        return Err(AssocError::EmptyInput(
            "visit loss needs a non-empty p_ab".to_string(),
        ));
    }

    let visit_probability = p_ab.clone().mean_dim(0);
    let target = Tensor::full([1, m], 1.0 / m as f64, &p_ab.device());
    let logits = visit_probability.add_scalar(LOG_EPSILON).log();
    Ok(softmax_cross_entropy(target, logits, weight))
}

/// Round-trip accuracy proxy of one association step
#[derive(Debug, Clone)]
pub struct WalkStatistics<B: Backend> {
    /// `1 - sqrt(Σ_j eq[i, j] · p_aba[i, j])`, shape `[N]`
    pub per_row_error: Tensor<B, 1>,
    /// `1 - mean(1 - per_row_error)`, shape `[1]`
    pub estimate_error: Tensor<B, 1>,
}

/// Estimated error of the round trip given the same-label structure.
///
/// The aggregate keeps the double subtraction `1 - mean(1 - x)` as is.
pub fn walk_statistics<B: Backend>(
    p_aba: Tensor<B, 2>,
    equality: Tensor<B, 2>,
) -> WalkStatistics<B> {
    let [n, _] = p_aba.dims();

    let correct_mass = (equality * p_aba).sum_dim(1).reshape([n]);
    let per_row_error = correct_mass.sqrt().neg().add_scalar(1.0);
    let estimate_error = per_row_error
        .clone()
        .neg()
        .add_scalar(1.0)
        .mean()
        .neg()
        .add_scalar(1.0);

    WalkStatistics {
        per_row_error: per_row_error.detach(),
        estimate_error: estimate_error.detach(),
    }
}
