//! Host-side tensor reads

use burn::tensor::{backend::Backend, ElementConversion, Int, Tensor};

use super::error::Result;

/// Copy a float tensor to a flat host vector
pub fn to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    Ok(tensor.into_data().convert::<f32>().to_vec::<f32>()?)
}

/// Copy an integer tensor to a flat host vector
pub fn int_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D, Int>) -> Result<Vec<i64>> {
    Ok(tensor.into_data().convert::<i64>().to_vec::<i64>()?)
}

/// Read a single-element tensor as `f64`
pub fn to_scalar<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> f64 {
    tensor.into_scalar().elem::<f64>()
}
