//! Sampling utilities
//!
//! - [`sample_by_label`]: pick an equal number of labeled samples per class
//! - [`PerClassSampler`]: endless balanced batches, `n_per_class` samples of
//!   every class per batch, each class paired with an arbitrary label record
//!   (a class id, or a hierarchical label record)
//! - [`UnlabeledSampler`]: endless shuffled batches of unlabeled samples
//!
//! All randomness comes from seeded ChaCha generators.

use burn::tensor::{backend::Backend, Int, Tensor, TensorData};
use rand::seq::{index, SliceRandom};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::utils::error::{AssocError, Result};

/// Group sample indices by class id
pub fn group_by_label(labels: &[usize], num_labels: usize) -> Result<Vec<Vec<usize>>> {
    let mut groups = vec![Vec::new(); num_labels];
    for (i, &label) in labels.iter().enumerate() {
        let group = groups.get_mut(label).ok_or_else(|| {
            AssocError::InvalidLabel(format!("label {} outside [0, {})", label, num_labels))
        })?;
        group.push(i);
    }
    Ok(groups)
}

/// Indices of `n_per_label` samples of every class, drawn without replacement.
///
/// `None` keeps every sample. Indices are grouped by class in class order.
pub fn sample_by_label(
    labels: &[usize],
    num_labels: usize,
    n_per_label: Option<usize>,
    seed: u64,
) -> Result<Vec<usize>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut picked = Vec::new();

    for (class, members) in group_by_label(labels, num_labels)?.into_iter().enumerate() {
        let n = n_per_label.unwrap_or(members.len());
        if n > members.len() {
            return Err(AssocError::Data(format!(
                "class {} has {} samples, {} requested",
                class,
                members.len(),
                n
            )));
        }
        picked.extend(index::sample(&mut rng, members.len(), n).iter().map(|i| members[i]));
    }

    Ok(picked)
}

/// Endless stream over a pool of indices, reshuffled every pass
#[derive(Debug, Clone)]
struct ShuffledStream {
    pool: Vec<usize>,
    order: Vec<usize>,
    cursor: usize,
    rng: ChaCha8Rng,
}

impl ShuffledStream {
    fn new(pool: Vec<usize>, seed: u64) -> Self {
        Self {
            pool,
            order: Vec::new(),
            cursor: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    fn draw(&mut self, n: usize) -> Vec<usize> {
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            if self.cursor == self.order.len() {
                self.order = self.pool.clone();
                self.order.shuffle(&mut self.rng);
                self.cursor = 0;
            }
            out.push(self.order[self.cursor]);
            self.cursor += 1;
        }
        out
    }
}

/// Sample indices with one label record per sample
#[derive(Debug, Clone, PartialEq)]
pub struct SampledBatch {
    pub indices: Vec<usize>,
    /// Flattened `[len, label_width]` label records
    pub labels: Vec<i64>,
    pub label_width: usize,
}

impl SampledBatch {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Label records as a `[len, label_width]` tensor
    pub fn label_records<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2, Int> {
        Tensor::from_data(
            TensorData::new(self.labels.clone(), [self.len(), self.label_width]),
            device,
        )
    }

    /// Class ids as a `[len]` tensor; only for single-column records
    pub fn class_labels<B: Backend>(&self, device: &B::Device) -> Result<Tensor<B, 1, Int>> {
        if self.label_width != 1 {
            return Err(AssocError::Shape(format!(
                "label records have {} columns, class labels need 1",
                self.label_width
            )));
        }
        Ok(Tensor::from_data(
            TensorData::new(self.labels.clone(), [self.len()]),
            device,
        ))
    }
}

/// Balanced labeled batches: `n_per_class` samples of every class
#[derive(Debug, Clone)]
pub struct PerClassSampler {
    streams: Vec<ShuffledStream>,
    records: Vec<Vec<i64>>,
    n_per_class: usize,
    label_width: usize,
}

impl PerClassSampler {
    /// Sampler whose class `c` samples are labeled with `class_records[c]`
    pub fn new(
        indices_by_class: Vec<Vec<usize>>,
        class_records: Vec<Vec<i64>>,
        n_per_class: usize,
        seed: u64,
    ) -> Result<Self> {
        if indices_by_class.is_empty() {
            return Err(AssocError::EmptyInput("no classes to sample from".to_string()));
        }
        if n_per_class == 0 {
            return Err(AssocError::Config(
                "n_per_class must be greater than 0".to_string(),
            ));
        }
        if class_records.len() != indices_by_class.len() {
            return Err(AssocError::Shape(format!(
                "{} classes but {} label records",
                indices_by_class.len(),
                class_records.len()
            )));
        }
        if let Some(class) = indices_by_class.iter().position(Vec::is_empty) {
            return Err(AssocError::EmptyInput(format!("class {} has no samples", class)));
        }

        let label_width = class_records[0].len();
        if label_width == 0 || class_records.iter().any(|r| r.len() != label_width) {
            return Err(AssocError::Shape(
                "label records must share one non-zero width".to_string(),
            ));
        }

        let streams = indices_by_class
            .into_iter()
            .enumerate()
            .map(|(class, pool)| ShuffledStream::new(pool, seed.wrapping_add(class as u64)))
            .collect();

        Ok(Self {
            streams,
            records: class_records,
            n_per_class,
            label_width,
        })
    }

    /// Sampler labeling class `c` with the single id `c`
    pub fn flat(
        indices_by_class: Vec<Vec<usize>>,
        n_per_class: usize,
        seed: u64,
    ) -> Result<Self> {
        let records = (0..indices_by_class.len()).map(|c| vec![c as i64]).collect();
        Self::new(indices_by_class, records, n_per_class, seed)
    }

    pub fn batch_size(&self) -> usize {
        self.streams.len() * self.n_per_class
    }

    pub fn num_classes(&self) -> usize {
        self.streams.len()
    }

    /// Next balanced batch, grouped by class in class order
    pub fn next_batch(&mut self) -> SampledBatch {
        let n = self.n_per_class;
        let draws: Vec<Vec<usize>> = self
            .streams
            .par_iter_mut()
            .map(|stream| stream.draw(n))
            .collect();

        let labels = self
            .records
            .iter()
            .flat_map(|record| std::iter::repeat(record).take(n).flatten().copied())
            .collect();

        SampledBatch {
            indices: draws.into_iter().flatten().collect(),
            labels,
            label_width: self.label_width,
        }
    }
}

/// Shuffled batches over all unlabeled samples
#[derive(Debug, Clone)]
pub struct UnlabeledSampler {
    stream: ShuffledStream,
    batch_size: usize,
}

impl UnlabeledSampler {
    pub fn new(num_samples: usize, batch_size: usize, seed: u64) -> Result<Self> {
        if num_samples == 0 {
            return Err(AssocError::EmptyInput("no unlabeled samples".to_string()));
        }
        if batch_size == 0 {
            return Err(AssocError::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            stream: ShuffledStream::new((0..num_samples).collect(), seed),
            batch_size,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn next_batch(&mut self) -> Vec<usize> {
        self.stream.draw(self.batch_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_by_label() {
        let groups = group_by_label(&[1, 0, 1, 2], 3).unwrap();
        assert_eq!(groups, vec![vec![1], vec![0, 2], vec![3]]);
        assert!(group_by_label(&[0, 3], 3).is_err());
    }

    #[test]
    fn test_sample_by_label_counts() {
        let labels: Vec<usize> = (0..30).map(|i| i % 3).collect();
        let picked = sample_by_label(&labels, 3, Some(4), 7).unwrap();

        assert_eq!(picked.len(), 12);
        for (chunk, class) in picked.chunks(4).zip(0..) {
            assert!(chunk.iter().all(|&i| labels[i] == class));
            let mut unique = chunk.to_vec();
            unique.sort_unstable();
            unique.dedup();
            assert_eq!(unique.len(), 4);
        }

        assert_eq!(picked, sample_by_label(&labels, 3, Some(4), 7).unwrap());
        assert_eq!(sample_by_label(&labels, 3, None, 7).unwrap().len(), 30);
    }

    #[test]
    fn test_sample_by_label_too_few() {
        let labels = vec![0, 0, 1];
        assert!(matches!(
            sample_by_label(&labels, 2, Some(2), 0),
            Err(AssocError::Data(_))
        ));
    }

    #[test]
    fn test_per_class_batches() {
        let mut sampler =
            PerClassSampler::flat(vec![vec![0, 1, 2], vec![3, 4], vec![5]], 2, 1).unwrap();
        assert_eq!(sampler.batch_size(), 6);

        for _ in 0..5 {
            let batch = sampler.next_batch();
            assert_eq!(batch.len(), 6);
            assert_eq!(batch.labels, vec![0, 0, 1, 1, 2, 2]);
            assert!(batch.indices[..2].iter().all(|&i| i <= 2));
            assert!(batch.indices[2..4].iter().all(|&i| i == 3 || i == 4));
            assert_eq!(&batch.indices[4..], &[5, 5]);
        }
    }

    #[test]
    fn test_per_class_stream_covers_pool() {
        let mut sampler = PerClassSampler::flat(vec![(0..10).collect()], 5, 3).unwrap();
        let mut seen: Vec<usize> = sampler
            .next_batch()
            .indices
            .into_iter()
            .chain(sampler.next_batch().indices)
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_per_class_records() {
        let records = vec![vec![0, 2, 1, 1], vec![1, -1, 1, 0]];
        let mut sampler = PerClassSampler::new(vec![vec![0], vec![1]], records, 1, 0).unwrap();
        let batch = sampler.next_batch();

        assert_eq!(batch.label_width, 4);
        assert_eq!(batch.labels, vec![0, 2, 1, 1, 1, -1, 1, 0]);
    }

    #[test]
    fn test_per_class_invalid() {
        assert!(PerClassSampler::flat(vec![vec![0], vec![]], 1, 0).is_err());
        assert!(PerClassSampler::flat(vec![vec![0]], 0, 0).is_err());
        assert!(
            PerClassSampler::new(vec![vec![0], vec![1]], vec![vec![0], vec![1, 2]], 1, 0).is_err()
        );
    }

    #[test]
    fn test_unlabeled_epochs() {
        let mut sampler = UnlabeledSampler::new(6, 4, 9).unwrap();
        let mut first_epoch: Vec<usize> = sampler.next_batch();
        first_epoch.extend(&sampler.next_batch()[..2]);
        first_epoch.sort_unstable();
        assert_eq!(first_epoch, (0..6).collect::<Vec<_>>());

        assert!(UnlabeledSampler::new(0, 4, 0).is_err());
    }
}
