//! Exponential moving averages for monitoring
//!
//! Trackers are created lazily by name and advanced at most once per global
//! step. The effective decay ramps up with the step count,
//! `min(decay, (1 + step) / (10 + step))`, and the average is zero-debiased,
//! so early readings are not pulled towards zero.
//!
//! Values may be scalars or whole tensors (flattened); a tracker averages
//! element-wise and keeps its length for its lifetime.

use std::collections::BTreeMap;

use tracing::trace;

use crate::utils::error::{AssocError, Result};

/// Tracker state before its latest update
#[derive(Debug, Clone)]
struct Snapshot {
    biased: Vec<f64>,
    average: Vec<f64>,
    last_step: Option<u64>,
}

/// Moving average of one named value
#[derive(Debug, Clone)]
pub struct ExponentialMovingAverage {
    name: String,
    biased: Vec<f64>,
    average: Vec<f64>,
    local_step: u64,
    last_step: Option<u64>,
    previous: Option<Snapshot>,
}

impl ExponentialMovingAverage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            biased: Vec::new(),
            average: Vec::new(),
            local_step: 0,
            last_step: None,
            previous: None,
        }
    }

    /// Decay applied at `step`
    pub fn decay_at(step: u64, max_decay: f64) -> f64 {
        let step = step as f64;
        max_decay.min((1.0 + step) / (10.0 + step))
    }

    /// Fold `values` in at global step `step` and return the smoothed values.
    pub fn update(&mut self, step: u64, values: &[f64], max_decay: f64) -> Result<&[f64]> {
        if self.last_step == Some(step) {
            return Err(AssocError::DuplicateAverage {
                name: self.name.clone(),
                step,
            });
        }
        let snapshot = Snapshot {
            biased: self.biased.clone(),
            average: self.average.clone(),
            last_step: self.last_step,
        };
        if self.local_step == 0 {
            self.biased = vec![0.0; values.len()];
        } else if values.len() != self.biased.len() {
            return Err(AssocError::Shape(format!(
                "moving average '{}' tracks {} values, got {}",
                self.name,
                self.biased.len(),
                values.len()
            )));
        }

        let decay = Self::decay_at(step, max_decay);
        for (biased, &value) in self.biased.iter_mut().zip(values) {
            *biased += (value - *biased) * (1.0 - decay);
        }
        self.local_step += 1;
        self.last_step = Some(step);
        self.previous = Some(snapshot);

        let bias_correction = 1.0 - decay.powi(self.local_step as i32);
        self.average = self.biased.iter().map(|b| b / bias_correction).collect();

        trace!(name = %self.name, step, decay, "moving average updated");
        Ok(&self.average)
    }

    /// Undo the latest update. Only one update can be undone.
    pub fn rollback(&mut self) -> bool {
        let Some(snapshot) = self.previous.take() else {
            return false;
        };
        self.biased = snapshot.biased;
        self.average = snapshot.average;
        self.last_step = snapshot.last_step;
        self.local_step -= 1;
        true
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Smoothed values, empty before the first update
    pub fn values(&self) -> &[f64] {
        &self.average
    }

    /// First smoothed value
    pub fn value(&self) -> Option<f64> {
        self.average.first().copied()
    }

    /// Number of updates folded in so far
    pub fn updates(&self) -> u64 {
        self.local_step
    }

    /// Global step of the latest update
    pub fn last_step(&self) -> Option<u64> {
        self.last_step
    }
}

/// Named moving averages sharing one decay
#[derive(Debug, Clone)]
pub struct MovingAverages {
    decay: f64,
    trackers: BTreeMap<String, ExponentialMovingAverage>,
}

impl MovingAverages {
    pub fn new(decay: f64) -> Self {
        Self {
            decay,
            trackers: BTreeMap::new(),
        }
    }

    pub fn decay(&self) -> f64 {
        self.decay
    }

    /// Update (creating on first use) the tracker `name` at `step`.
    pub fn update(&mut self, name: &str, step: u64, values: &[f64]) -> Result<Vec<f64>> {
        let decay = self.decay;
        let tracker = self
            .trackers
            .entry(name.to_string())
            .or_insert_with(|| ExponentialMovingAverage::new(name));
        Ok(tracker.update(step, values, decay)?.to_vec())
    }

    /// Scalar shorthand for [`MovingAverages::update`]
    pub fn update_scalar(&mut self, name: &str, step: u64, value: f64) -> Result<f64> {
        let average = self.update(name, step, &[value])?;
        Ok(average[0])
    }

    /// `base`, `base_1`, `base_2`, ... : the first name not yet updated at `step`.
    ///
    /// Repeated statistics within a step get distinct but stable names.
    pub fn unique_name(&self, base: &str, step: u64) -> String {
        let taken = |name: &str| {
            self.trackers
                .get(name)
                .is_some_and(|tracker| tracker.last_step() == Some(step))
        };

        if !taken(base) {
            return base.to_string();
        }
        let mut suffix = 1;
        loop {
            let candidate = format!("{}_{}", base, suffix);
            if !taken(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }

    /// Undo every update made at `step`; trackers created at `step` are removed.
    ///
    /// Returns the number of updates undone.
    pub fn rollback_step(&mut self, step: u64) -> usize {
        let mut undone = 0;
        for tracker in self.trackers.values_mut() {
            if tracker.last_step() == Some(step) && tracker.rollback() {
                undone += 1;
            }
        }
        self.trackers.retain(|_, tracker| tracker.updates() > 0);
        undone
    }

    pub fn get(&self, name: &str) -> Option<&ExponentialMovingAverage> {
        self.trackers.get(name)
    }

    /// Current scalar average of `name`
    pub fn value(&self, name: &str) -> Option<f64> {
        self.trackers.get(name).and_then(|tracker| tracker.value())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.trackers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decay_schedule() {
        assert!((ExponentialMovingAverage::decay_at(0, 0.99) - 0.1).abs() < 1e-12);
        assert!((ExponentialMovingAverage::decay_at(1, 0.99) - 2.0 / 11.0).abs() < 1e-12);
        assert_eq!(ExponentialMovingAverage::decay_at(10_000, 0.99), 0.99);
    }

    #[test]
    fn test_debiased_updates() {
        let mut averages = MovingAverages::new(0.99);

        let first = averages.update_scalar("loss", 0, 1.0).unwrap();
        assert!((first - 1.0).abs() < 1e-12);

        let second = averages.update_scalar("loss", 1, 3.0).unwrap();
        assert!((second - 2.707_692).abs() < 1e-5, "{}", second);
        assert_eq!(averages.get("loss").unwrap().updates(), 2);
    }

    #[test]
    fn test_late_steps_use_full_decay() {
        let mut averages = MovingAverages::new(0.99);
        for step in 0..2000 {
            averages.update_scalar("constant", step, 4.0).unwrap();
        }
        let average = averages.value("constant").unwrap();
        assert!((average - 4.0).abs() < 1e-6, "{}", average);
    }

    #[test]
    fn test_duplicate_update_rejected() {
        let mut averages = MovingAverages::new(0.99);
        averages.update_scalar("p_aba", 3, 0.5).unwrap();

        match averages.update_scalar("p_aba", 3, 0.5) {
            Err(AssocError::DuplicateAverage { name, step }) => {
                assert_eq!(name, "p_aba");
                assert_eq!(step, 3);
            }
            other => panic!("expected duplicate error, got {:?}", other),
        }

        // One tracker, not two
        assert_eq!(averages.len(), 1);
        assert!(averages.update_scalar("p_aba", 4, 0.5).is_ok());
    }

    #[test]
    fn test_unique_names_per_step() {
        let mut averages = MovingAverages::new(0.99);
        assert_eq!(averages.unique_name("p_aba", 0), "p_aba");
        averages.update_scalar("p_aba", 0, 1.0).unwrap();
        assert_eq!(averages.unique_name("p_aba", 0), "p_aba_1");
        averages.update_scalar("p_aba_1", 0, 1.0).unwrap();
        assert_eq!(averages.unique_name("p_aba", 0), "p_aba_2");

        // Names are reused in the next step
        assert_eq!(averages.unique_name("p_aba", 1), "p_aba");
    }

    #[test]
    fn test_rollback_step() {
        let mut averages = MovingAverages::new(0.99);
        averages.update_scalar("loss", 0, 1.0).unwrap();
        averages.update_scalar("loss", 1, 3.0).unwrap();
        averages.update_scalar("fresh", 1, 5.0).unwrap();

        assert_eq!(averages.rollback_step(1), 2);
        assert!(averages.get("fresh").is_none());
        let loss = averages.get("loss").unwrap();
        assert_eq!(loss.updates(), 1);
        assert_eq!(loss.last_step(), Some(0));
        assert!((loss.value().unwrap() - 1.0).abs() < 1e-12);

        // The step can be replayed
        let second = averages.update_scalar("loss", 1, 3.0).unwrap();
        assert!((second - 2.707_692).abs() < 1e-5);
        assert_eq!(averages.rollback_step(7), 0);
    }

    #[test]
    fn test_tensor_values() {
        let mut averages = MovingAverages::new(0.99);
        let average = averages.update("p_aba", 0, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(average.len(), 4);
        assert!((average[3] - 4.0).abs() < 1e-12);

        assert!(matches!(
            averages.update("p_aba", 1, &[1.0, 2.0]),
            Err(AssocError::Shape(_))
        ));
    }
}
