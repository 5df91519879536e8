//! Inference module for evaluating a trained session
//!
//! This module provides:
//! - Chunked evaluation of arbitrarily large image sets
//! - Confusion matrix and accuracy over predictions
//!
//! Evaluation always runs on the inner (non-autodiff) backend with the
//! parameters of the training network.

pub mod batched;
pub mod metrics;

// Re-export main types for convenience
pub use batched::batched_apply;
pub use metrics::{argmax_rows, confusion_matrix, ConfusionMatrix};

/// Which head output an evaluation returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Embedding vectors `[batch, E]`
    Embedding,
    /// Class scores `[batch, num_labels]`
    Logits,
}
