//! Chunked evaluation of large image sets
//!
//! Evaluation sets can be far larger than what fits through the network at
//! once. [`batched_apply`] feeds fixed-size chunks through an endpoint and
//! concatenates the outputs along the sample axis.

use burn::tensor::{backend::Backend, Tensor};
use tracing::debug;

use crate::utils::error::{AssocError, Result};

/// Apply `endpoint` to `images` in chunks of at most `batch_size` samples.
///
/// The output has exactly as many rows as `images` has samples.
pub fn batched_apply<B, F>(
    images: &Tensor<B, 4>,
    batch_size: usize,
    mut endpoint: F,
) -> Result<Tensor<B, 2>>
where
    B: Backend,
    F: FnMut(Tensor<B, 4>) -> Tensor<B, 2>,
{
    if batch_size == 0 {
        return Err(AssocError::Config(
            "evaluation batch size must be greater than 0".to_string(),
        ));
    }

    let [num_samples, _, _, _] = images.dims();
    if num_samples == 0 {
        return Err(AssocError::EmptyInput("no images to evaluate".to_string()));
    }

    let outputs: Vec<Tensor<B, 2>> = (0..num_samples)
        .step_by(batch_size)
        .map(|start| {
            let len = batch_size.min(num_samples - start);
            endpoint(images.clone().narrow(0, start, len))
        })
        .collect();

    debug!(
        samples = num_samples,
        chunks = outputs.len(),
        batch_size,
        "batched evaluation"
    );

    Ok(Tensor::cat(outputs, 0))
}

#[cfg(all(test, feature = "ndarray"))]
mod tests {
    use super::*;
    use crate::utils::tensor::to_vec;
    use burn::tensor::Int;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn flatten(images: Tensor<TestBackend, 4>) -> Tensor<TestBackend, 2> {
        let [n, c, h, w] = images.dims();
        images.reshape([n, c * h * w])
    }

    #[test]
    fn test_sample_count_across_chunk_boundaries() {
        let device = Default::default();
        for count in [1, 99, 100, 101, 250] {
            let images = Tensor::<TestBackend, 4>::ones([count, 1, 2, 2], &device);
            let mut calls = 0;
            let output = batched_apply(&images, 100, |chunk| {
                calls += 1;
                assert!(chunk.dims()[0] <= 100);
                flatten(chunk)
            })
            .unwrap();

            assert_eq!(output.dims(), [count, 4]);
            assert_eq!(calls, count.div_ceil(100));
        }
    }

    #[test]
    fn test_order_is_preserved() {
        let device = Default::default();
        let images = Tensor::<TestBackend, 1, Int>::arange(0..7, &device)
            .float()
            .reshape([7, 1, 1, 1]);
        let output = batched_apply(&images, 3, flatten).unwrap();
        assert_eq!(
            to_vec(output).unwrap(),
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
        );
    }

    #[test]
    fn test_invalid_arguments() {
        let device = Default::default();
        let images = Tensor::<TestBackend, 4>::ones([3, 1, 2, 2], &device);
        assert!(matches!(
            batched_apply(&images, 0, flatten),
            Err(AssocError::Config(_))
        ));

        let empty = Tensor::<TestBackend, 4>::ones([0, 1, 2, 2], &device);
        assert!(matches!(
            batched_apply(&empty, 10, flatten),
            Err(AssocError::EmptyInput(_))
        ));
    }
}
