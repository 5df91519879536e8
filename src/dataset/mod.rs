//! Dataset module for labeled and unlabeled image sets
//!
//! This module provides:
//! - In-memory image sets with optional class labels
//! - Per-class balanced sampling of labeled batches
//! - Shuffled sampling of unlabeled batches
//! - Mixed labeled/unlabeled batches gathered into tensors

pub mod batcher;
pub mod image_set;
pub mod sampling;

// Re-export main types for convenience
pub use batcher::{SemisupBatch, SemisupBatcher};
pub use image_set::{ImageItem, ImageSet};
pub use sampling::{
    group_by_label, sample_by_label, PerClassSampler, SampledBatch, UnlabeledSampler,
};
