//! Mixed labeled/unlabeled training batches
//!
//! One training step of association learning needs a balanced labeled batch
//! and an unlabeled batch. [`SemisupBatcher`] draws both from their samplers and
//! gathers the images into tensors.

use burn::tensor::{backend::Backend, Tensor};
use tracing::debug;

use super::image_set::ImageSet;
use super::sampling::{group_by_label, PerClassSampler, SampledBatch, UnlabeledSampler};
use crate::utils::error::{AssocError, Result};

/// Labeled images with their label records, plus unlabeled images
#[derive(Debug, Clone)]
pub struct SemisupBatch<B: Backend> {
    /// Labeled images `[N, C, H, W]`, grouped by class
    pub labeled: Tensor<B, 4>,
    /// Indices and label records of the labeled images
    pub sampled: SampledBatch,
    /// Unlabeled images `[M, C, H, W]`
    pub unlabeled: Tensor<B, 4>,
}

/// Endless source of mixed batches
pub struct SemisupBatcher {
    labeled: ImageSet,
    unlabeled: ImageSet,
    per_class: PerClassSampler,
    unlabeled_sampler: UnlabeledSampler,
}

impl SemisupBatcher {
    pub fn new(
        labeled: ImageSet,
        unlabeled: ImageSet,
        per_class: PerClassSampler,
        unlabeled_batch_size: usize,
        seed: u64,
    ) -> Result<Self> {
        if labeled.shape() != unlabeled.shape() {
            return Err(AssocError::Shape(format!(
                "labeled images {:?} and unlabeled images {:?} differ in shape",
                labeled.shape(),
                unlabeled.shape()
            )));
        }
        let unlabeled_sampler =
            UnlabeledSampler::new(unlabeled.num_samples(), unlabeled_batch_size, seed)?;

        debug!(
            "Batcher: {} labeled ({} per batch), {} unlabeled ({} per batch)",
            labeled.num_samples(),
            per_class.batch_size(),
            unlabeled.num_samples(),
            unlabeled_batch_size
        );

        Ok(Self {
            labeled,
            unlabeled,
            per_class,
            unlabeled_sampler,
        })
    }

    /// Batcher over a flat labeled set: `n_per_class` images of every class
    pub fn flat(
        labeled: ImageSet,
        unlabeled: ImageSet,
        num_labels: usize,
        n_per_class: usize,
        unlabeled_batch_size: usize,
        seed: u64,
    ) -> Result<Self> {
        let labels = labeled
            .labels()
            .ok_or_else(|| AssocError::Data("labeled set carries no labels".to_string()))?;
        let by_class = group_by_label(labels, num_labels)?;
        let per_class = PerClassSampler::flat(by_class, n_per_class, seed)?;
        Self::new(labeled, unlabeled, per_class, unlabeled_batch_size, seed)
    }

    pub fn labeled_batch_size(&self) -> usize {
        self.per_class.batch_size()
    }

    pub fn unlabeled_batch_size(&self) -> usize {
        self.unlabeled_sampler.batch_size()
    }

    pub fn next_batch<B: Backend>(&mut self, device: &B::Device) -> Result<SemisupBatch<B>> {
        let sampled = self.per_class.next_batch();
        let labeled = self.labeled.to_tensor(&sampled.indices, device)?;
        let unlabeled = self
            .unlabeled
            .to_tensor(&self.unlabeled_sampler.next_batch(), device)?;

        Ok(SemisupBatch {
            labeled,
            sampled,
            unlabeled,
        })
    }
}
