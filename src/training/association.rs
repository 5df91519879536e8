//! Pairwise association between labeled and unlabeled embeddings
//!
//! Given labeled embeddings `a` (`[N, E]`) and unlabeled embeddings `b`
//! (`[M, E]`), the engine builds the similarity matrix `match_ab = a · bᵗ` and
//! the transition probabilities of a walker moving from `a` to `b` (`p_ab`),
//! back from `b` to `a` (`p_ba`), and the round trip `p_aba = p_ab · p_ba`.
//!
//! The matrices are rebuilt from the current embeddings at every step and
//! never stored beyond it.

use burn::tensor::{backend::Backend, Tensor};

use crate::utils::error::{ensure_dim, AssocError, Result};

/// Transition matrices of one association step
#[derive(Debug, Clone)]
pub struct Association<B: Backend> {
    /// Similarity matrix `[N, M]`
    pub match_ab: Tensor<B, 2>,
    /// Labeled to unlabeled transitions `[N, M]`
    pub p_ab: Tensor<B, 2>,
    /// Unlabeled to labeled transitions `[M, N]`
    pub p_ba: Tensor<B, 2>,
    /// Round-trip transitions `[N, N]`
    pub p_aba: Tensor<B, 2>,
}

/// Softmax over the last dimension with the row maximum subtracted first
pub fn row_softmax<B: Backend>(x: Tensor<B, 2>) -> Tensor<B, 2> {
    let max = x.clone().max_dim(1).detach();
    let exp = (x - max).exp();
    let sum = exp.clone().sum_dim(1);
    exp / sum
}

/// Associate labeled embeddings `a` with unlabeled embeddings `b`.
pub fn associate<B: Backend>(a: Tensor<B, 2>, b: Tensor<B, 2>) -> Result<Association<B>> {
    let [n, a_width] = a.dims();
    let [m, b_width] = b.dims();

    if n == 0 || m == 0 {
        return Err(AssocError::EmptyInput(format!(
            "association needs labeled and unlabeled samples, got {} and {}",
            n, m
        )));
    }
    ensure_dim("unlabeled embedding width", b_width, a_width)?;

    let match_ab = a.matmul(b.transpose());
    let p_ab = row_softmax(match_ab.clone());
    let p_ba = row_softmax(match_ab.clone().transpose());
    let p_aba = p_ab.clone().matmul(p_ba.clone());

    Ok(Association {
        match_ab,
        p_ab,
        p_ba,
        p_aba,
    })
}
