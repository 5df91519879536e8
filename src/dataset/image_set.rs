//! In-memory image sets
//!
//! Images are stored as one flattened CHW float buffer. Samplers work on
//! sample indices; [`ImageSet::to_tensor`] gathers the selected images into a
//! `[batch, C, H, W]` tensor.

use burn::data::dataset::Dataset;
use burn::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::utils::error::{AssocError, Result};

/// A single image with its optional class label
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageItem {
    /// Image data as flattened CHW float array
    pub image: Vec<f32>,
    /// Class label, `None` for unlabeled samples
    pub label: Option<usize>,
}

/// Images sharing one `[C, H, W]` shape, optionally labeled
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageSet {
    shape: [usize; 3],
    data: Vec<f32>,
    labels: Option<Vec<usize>>,
}

impl ImageSet {
    /// Labeled set from a flattened buffer of `labels.len()` images
    pub fn labeled(data: Vec<f32>, shape: [usize; 3], labels: Vec<usize>) -> Result<Self> {
        Self::check(&data, shape, labels.len())?;
        Ok(Self {
            shape,
            data,
            labels: Some(labels),
        })
    }

    /// Unlabeled set; the image count is derived from the buffer length
    pub fn unlabeled(data: Vec<f32>, shape: [usize; 3]) -> Result<Self> {
        let sample_size = shape.iter().product::<usize>().max(1);
        Self::check(&data, shape, data.len() / sample_size)?;
        Ok(Self {
            shape,
            data,
            labels: None,
        })
    }

    fn check(data: &[f32], shape: [usize; 3], count: usize) -> Result<()> {
        if shape.contains(&0) {
            return Err(AssocError::Shape(format!("empty image shape {:?}", shape)));
        }
        let expected = count * shape.iter().product::<usize>();
        if data.len() != expected {
            return Err(AssocError::Shape(format!(
                "{} values do not form {} images of shape {:?}",
                data.len(),
                count,
                shape
            )));
        }
        Ok(())
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// Number of values per image
    pub fn sample_size(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn num_samples(&self) -> usize {
        self.data.len() / self.sample_size()
    }

    pub fn image(&self, index: usize) -> Option<&[f32]> {
        let size = self.sample_size();
        self.data.get(index * size..(index + 1) * size)
    }

    pub fn labels(&self) -> Option<&[usize]> {
        self.labels.as_deref()
    }

    /// Gather the images at `indices` into a `[batch, C, H, W]` tensor
    pub fn to_tensor<B: Backend>(
        &self,
        indices: &[usize],
        device: &B::Device,
    ) -> Result<Tensor<B, 4>> {
        let count = self.num_samples();
        if let Some(&bad) = indices.iter().find(|&&i| i >= count) {
            return Err(AssocError::Data(format!(
                "index {} out of range for {} images",
                bad, count
            )));
        }

        let size = self.sample_size();
        let data: Vec<f32> = indices
            .par_iter()
            .flat_map_iter(|&i| self.data[i * size..(i + 1) * size].iter().copied())
            .collect();

        let [c, h, w] = self.shape;
        Ok(Tensor::from_data(
            TensorData::new(data, [indices.len(), c, h, w]),
            device,
        ))
    }

    /// Every image as a tensor
    pub fn all_to_tensor<B: Backend>(&self, device: &B::Device) -> Result<Tensor<B, 4>> {
        let indices: Vec<usize> = (0..self.num_samples()).collect();
        self.to_tensor(&indices, device)
    }
}

impl Dataset<ImageItem> for ImageSet {
    fn get(&self, index: usize) -> Option<ImageItem> {
        let image = self.image(index)?.to_vec();
        let label = self.labels.as_ref().and_then(|labels| labels.get(index).copied());
        Some(ImageItem { image, label })
    }

    fn len(&self) -> usize {
        self.num_samples()
    }
}
