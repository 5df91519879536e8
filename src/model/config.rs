//! Session Configuration Module
//!
//! Defines the configuration of an association training session: label
//! space, input geometry, tree depth cutoff, and monitoring settings.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::utils::error::{AssocError, Result};

/// Default decay of the monitoring moving averages
pub const DEFAULT_EMA_DECAY: f64 = 0.99;

/// Default chunk size of the batched evaluation helper
pub const DEFAULT_TEST_BATCH_SIZE: usize = 100;

/// Default tree depth cutoff (effectively "all levels")
pub const DEFAULT_MAX_DEPTH: usize = 99;

/// Configuration of a [`SemisupModel`](crate::training::SemisupModel)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemisupConfig {
    /// Number of logit outputs. For hierarchical training this is the tree's logit width.
    pub num_labels: usize,

    /// Per-sample input shape `[channels, height, width]`
    pub input_shape: [usize; 3],

    /// Tree levels at or below this depth are ignored by hierarchical losses
    pub max_depth: usize,

    /// Chunk size used by the batched evaluation helper
    pub test_batch_size: usize,

    /// Decay of the monitoring moving averages
    pub ema_decay: f64,

    /// Optional trainable virtual embeddings `(count, size)`
    pub virtual_embeddings: Option<(usize, usize)>,

    /// Seed for the logit head initialization
    pub seed: u64,
}

impl Default for SemisupConfig {
    fn default() -> Self {
        Self {
            num_labels: 10,
            input_shape: [1, 28, 28],
            max_depth: DEFAULT_MAX_DEPTH,
            test_batch_size: DEFAULT_TEST_BATCH_SIZE,
            ema_decay: DEFAULT_EMA_DECAY,
            virtual_embeddings: None,
            seed: 42,
        }
    }
}

impl SemisupConfig {
    /// Create a configuration for `num_labels` classes and the given input shape
    pub fn new(num_labels: usize, input_shape: [usize; 3]) -> Self {
        Self {
            num_labels,
            input_shape,
            ..Default::default()
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_test_batch_size(mut self, test_batch_size: usize) -> Self {
        self.test_batch_size = test_batch_size;
        self
    }

    pub fn with_virtual_embeddings(mut self, count: usize, size: usize) -> Self {
        self.virtual_embeddings = Some((count, size));
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.num_labels == 0 {
            return Err(AssocError::Config(
                "num_labels must be greater than 0".to_string(),
            ));
        }

        if self.input_shape.iter().any(|&d| d == 0) {
            return Err(AssocError::Config(format!(
                "input_shape must be positive, got {:?}",
                self.input_shape
            )));
        }

        if self.test_batch_size == 0 {
            return Err(AssocError::Config(
                "test_batch_size must be greater than 0".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.ema_decay) {
            return Err(AssocError::Config(
                "ema_decay must be in range [0.0, 1.0)".to_string(),
            ));
        }

        if let Some((count, size)) = self.virtual_embeddings {
            if count == 0 || size == 0 {
                return Err(AssocError::Config(
                    "virtual embeddings need a positive count and size".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = SemisupConfig::default();
        assert_eq!(config.max_depth, 99);
        assert_eq!(config.test_batch_size, 100);
        assert_eq!(config.ema_decay, 0.99);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SemisupConfig::new(0, [3, 32, 32]);
        assert!(config.validate().is_err());

        config = SemisupConfig::new(10, [3, 0, 32]);
        assert!(config.validate().is_err());

        config = SemisupConfig::new(10, [3, 32, 32]).with_test_batch_size(0);
        assert!(config.validate().is_err());

        config = SemisupConfig::new(10, [3, 32, 32]);
        config.ema_decay = 1.0;
        assert!(config.validate().is_err());

        config = SemisupConfig::new(10, [3, 32, 32]).with_virtual_embeddings(0, 8);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let config = SemisupConfig::new(7, [3, 16, 16])
            .with_max_depth(2)
            .with_virtual_embeddings(20, 8);
        config.save(&path).unwrap();

        let loaded = SemisupConfig::load(&path).unwrap();
        assert_eq!(loaded.num_labels, 7);
        assert_eq!(loaded.input_shape, [3, 16, 16]);
        assert_eq!(loaded.max_depth, 2);
        assert_eq!(loaded.virtual_embeddings, Some((20, 8)));
    }

    #[test]
    fn test_config_serializes_only_session_fields() {
        let value = serde_json::to_value(SemisupConfig::default()).unwrap();
        let mut keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            [
                "ema_decay",
                "input_shape",
                "max_depth",
                "num_labels",
                "seed",
                "test_batch_size",
                "virtual_embeddings"
            ]
        );
    }
}
