//! Embedding networks
//!
//! An [`Embedder`] maps a batch of images `[batch, C, H, W]` to embedding
//! vectors `[batch, E]`. Association training is agnostic to the
//! architecture; any Burn module implementing the trait can be plugged into a
//! [`SemisupNet`](super::SemisupNet).
//!
//! Training-mode behaviour (batch-norm statistics, dropout) follows the
//! backend: on an autodiff backend the module trains, on the inner backend
//! obtained through `valid()` it evaluates with the same parameters.

use burn::{
    config::Config,
    module::{Module, ModuleDisplay},
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

/// A feature extractor producing one embedding vector per image
pub trait Embedder<B: Backend>: Module<B> + ModuleDisplay {
    /// Embed a batch of images `[batch, C, H, W]` into `[batch, E]`
    fn embed(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Embedding width `E`
    fn embedding_size(&self) -> usize;
}

/// Configuration for the convolutional embedder
#[derive(Config, Debug)]
pub struct ConvEmbedderConfig {
    /// Number of input channels
    #[config(default = "3")]
    pub in_channels: usize,

    /// Filters of the first block, doubled by every following block
    #[config(default = "32")]
    pub base_filters: usize,

    /// Width of the produced embedding
    #[config(default = "128")]
    pub embedding_size: usize,
}

/// A CNN block with Conv2d, BatchNorm, ReLU, and MaxPool
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
    pub relu: Relu,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        let bn = BatchNormConfig::new(out_channels).init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        Self {
            conv,
            bn,
            relu: Relu::new(),
            pool,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        let x = self.relu.forward(x);
        self.pool.forward(x)
    }
}

/// Three conv blocks, global average pooling, and a linear embedding layer
#[derive(Module, Debug)]
pub struct ConvEmbedder<B: Backend> {
    pub conv1: ConvBlock<B>,
    pub conv2: ConvBlock<B>,
    pub conv3: ConvBlock<B>,
    pub global_pool: AdaptiveAvgPool2d,
    pub fc: Linear<B>,
    embedding_size: usize,
}

impl ConvEmbedderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvEmbedder<B> {
        let base = self.base_filters;

        ConvEmbedder {
            conv1: ConvBlock::new(self.in_channels, base, device),
            conv2: ConvBlock::new(base, base * 2, device),
            conv3: ConvBlock::new(base * 2, base * 4, device),
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: LinearConfig::new(base * 4, self.embedding_size).init(device),
            embedding_size: self.embedding_size,
        }
    }
}

impl<B: Backend> Embedder<B> for ConvEmbedder<B> {
    fn embed(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(images);
        let x = self.conv2.forward(x);
        let x = self.conv3.forward(x);

        // [B, C, H, W] -> [B, C, 1, 1] -> [B, C]
        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        self.fc.forward(x)
    }

    fn embedding_size(&self) -> usize {
        self.embedding_size
    }
}

/// Configuration for the fully connected embedder
#[derive(Config, Debug)]
pub struct MlpEmbedderConfig {
    /// Flattened input size `C * H * W`
    pub input_size: usize,

    #[config(default = "64")]
    pub hidden_size: usize,

    #[config(default = "32")]
    pub embedding_size: usize,
}

/// Flatten, one hidden ReLU layer, linear embedding
#[derive(Module, Debug)]
pub struct MlpEmbedder<B: Backend> {
    pub fc1: Linear<B>,
    pub relu: Relu,
    pub fc2: Linear<B>,
    embedding_size: usize,
}

impl MlpEmbedderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> MlpEmbedder<B> {
        MlpEmbedder {
            fc1: LinearConfig::new(self.input_size, self.hidden_size).init(device),
            relu: Relu::new(),
            fc2: LinearConfig::new(self.hidden_size, self.embedding_size).init(device),
            embedding_size: self.embedding_size,
        }
    }
}

impl<B: Backend> Embedder<B> for MlpEmbedder<B> {
    fn embed(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, channels, height, width] = images.dims();
        let x = images.reshape([batch_size, channels * height * width]);
        let x = self.fc1.forward(x);
        let x = self.relu.forward(x);
        self.fc2.forward(x)
    }

    fn embedding_size(&self) -> usize {
        self.embedding_size
    }
}

#[cfg(all(test, feature = "ndarray"))]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_conv_embedder_output_shape() {
        let device = Default::default();
        let model = ConvEmbedderConfig::new()
            .with_base_filters(4)
            .with_embedding_size(16)
            .init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 16, 16], &device);
        let output = model.embed(input);

        assert_eq!(output.dims(), [2, 16]);
        assert_eq!(model.embedding_size(), 16);
    }

    #[test]
    fn test_mlp_embedder_output_shape() {
        let device = Default::default();
        let model = MlpEmbedderConfig::new(12)
            .with_hidden_size(8)
            .with_embedding_size(5)
            .init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::ones([3, 3, 2, 2], &device);
        assert_eq!(model.embed(input).dims(), [3, 5]);
    }
}
