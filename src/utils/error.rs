//! Error Handling Module
//!
//! Defines the error type for association-based semi-supervised training.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Main error type for association training operations
#[derive(Error, Debug)]
pub enum AssocError {
    /// Tensor shapes that do not fit together (embedding widths, label widths, logit widths)
    #[error("Shape mismatch: {0}")]
    Shape(String),

    /// A label value or label record that cannot be interpreted
    #[error("Invalid label: {0}")]
    InvalidLabel(String),

    /// A label tree that cannot be flattened
    #[error("Invalid label tree: {0}")]
    InvalidTree(String),

    /// An operation received no samples
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// A moving average was updated twice within one global step
    #[error("Moving average '{name}' was already updated at step {step}")]
    DuplicateAverage { name: String, step: u64 },

    /// A training step was requested with an empty loss registry
    #[error("No losses registered for this training step")]
    NoLosses,

    /// A hierarchical loss was requested on a session without a label tree
    #[error("Hierarchical loss requested but no label tree was configured")]
    MissingTree,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tensor data could not be converted to host values
    #[error("Tensor data error: {0}")]
    Data(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for AssocError {
    fn from(err: serde_json::Error) -> Self {
        AssocError::Serialization(err.to_string())
    }
}

impl From<burn::tensor::DataError> for AssocError {
    fn from(err: burn::tensor::DataError) -> Self {
        AssocError::Data(format!("{:?}", err))
    }
}

/// Convenience Result type for association training operations
pub type Result<T> = std::result::Result<T, AssocError>;

/// Fail with [`AssocError::Shape`] unless `actual == expected`.
pub(crate) fn ensure_dim(what: &str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(AssocError::Shape(format!(
            "{}: expected {}, got {}",
            what, expected, actual
        )));
    }
    Ok(())
}
