//! Parameter-shared embedding and logit heads
//!
//! [`SemisupNet`] owns the single parameter set of a session: the embedder,
//! the linear logit head, and optional virtual embeddings. Training code uses
//! the network on the autodiff backend; evaluation code uses `valid()`, which
//! yields the same parameters on the inner backend. There is no second copy
//! of the weights to keep in sync.

use burn::{
    module::{Module, Param},
    nn::{Initializer, Linear, LinearConfig},
    tensor::{backend::Backend, Distribution, Tensor, TensorData},
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use super::embedder::Embedder;

/// Standard deviation of the logit weight initialization
pub const LOGIT_INIT_STDDEV: f64 = 1.0 / 192.0;

/// Standard deviation of the virtual embedding initialization
pub const VIRTUAL_EMBEDDING_STDDEV: f64 = 0.01;

/// Embedder plus a fully connected logit projection
#[derive(Module, Debug)]
pub struct SemisupNet<B: Backend, M> {
    pub embedder: M,
    pub logit: Linear<B>,
    pub virtual_embeddings: Option<Param<Tensor<B, 2>>>,
    num_labels: usize,
}

impl<B: Backend, M: Embedder<B>> SemisupNet<B, M> {
    /// Wrap `embedder` with a freshly initialized logit head.
    ///
    /// The head has zero bias and truncated-normal weights (stddev 1/192), no
    /// activation and no weight penalty.
    pub fn new(
        embedder: M,
        num_labels: usize,
        virtual_embeddings: Option<(usize, usize)>,
        seed: u64,
        device: &B::Device,
    ) -> Self {
        let logit = logit_head(embedder.embedding_size(), num_labels, seed, device);
        let virtual_embeddings = virtual_embeddings.map(|(count, size)| {
            Param::from_tensor(Tensor::random(
                [count, size],
                Distribution::Normal(0.0, VIRTUAL_EMBEDDING_STDDEV),
                device,
            ))
        });

        Self {
            embedder,
            logit,
            virtual_embeddings,
            num_labels,
        }
    }

    /// Images `[batch, C, H, W]` to embeddings `[batch, E]`
    pub fn embed(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.embedder.embed(images)
    }

    /// Embeddings `[batch, E]` to class scores `[batch, num_labels]`
    pub fn logits(&self, embedding: Tensor<B, 2>) -> Tensor<B, 2> {
        self.logit.forward(embedding)
    }

    /// Current value of the virtual embeddings, if configured
    pub fn virtual_embeddings(&self) -> Option<Tensor<B, 2>> {
        self.virtual_embeddings.as_ref().map(|param| param.val())
    }

    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    pub fn embedding_size(&self) -> usize {
        self.embedder.embedding_size()
    }
}

/// Linear layer with zero bias and truncated-normal weights
pub fn logit_head<B: Backend>(
    embedding_size: usize,
    num_labels: usize,
    seed: u64,
    device: &B::Device,
) -> Linear<B> {
    let mut linear = LinearConfig::new(embedding_size, num_labels)
        .with_initializer(Initializer::Zeros)
        .init(device);

    let weights = truncated_normal(embedding_size * num_labels, LOGIT_INIT_STDDEV, seed);
    linear.weight = Param::from_tensor(Tensor::from_data(
        TensorData::new(weights, [embedding_size, num_labels]),
        device,
    ));

    linear
}

/// Draw `count` samples of N(0, stddev²), redrawing anything beyond two standard deviations
pub fn truncated_normal(count: usize, stddev: f64, seed: u64) -> Vec<f32> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut values = Vec::with_capacity(count);

    while values.len() < count {
        let z: f64 = rng.sample(StandardNormal);
        if z.abs() <= 2.0 {
            values.push((z * stddev) as f32);
        }
    }

    values
}
