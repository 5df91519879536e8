//! # Associative Semi-Supervised Learning
//!
//! A Rust library for semi-supervised learning by association using the Burn
//! framework.
//!
//! ## Features
//!
//! - **Learning by association**: walker and visit losses over the
//!   similarity between labeled and unlabeled embeddings
//! - **Hierarchical labels**: per-node and per-level losses over a label tree
//! - **Monitoring**: zero-debiased moving averages and per-step summaries
//! - **Batched evaluation** of arbitrarily large image sets
//!
//! ## Modules
//!
//! - `backend`: Backend selection (NdArray CPU or CUDA)
//! - `dataset`: In-memory image sets, balanced samplers and mixed batches
//! - `model`: Embedders, the shared logit head, config and label trees
//! - `training`: Association, losses, moving averages and the training session
//! - `inference`: Batched evaluation and confusion matrices
//! - `utils`: Errors, logging, summaries and tensor helpers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use assoc_ssl::model::{MlpEmbedderConfig, SemisupConfig};
//! use assoc_ssl::SemisupModel;
//!
//! let config = SemisupConfig::new(10, [1, 28, 28]);
//! let embedder = MlpEmbedderConfig::new(784).init(&device);
//! let mut model = SemisupModel::<TrainingBackend, _>::new(embedder, config, None, &device)?;
//! let mut train_op = model.create_train_op(1e-3);
//!
//! let sup = model.image_to_embedding(labeled_images)?;
//! let unsup = model.image_to_embedding(unlabeled_images)?;
//! model.add_semisup_loss(sup.clone(), unsup, labels.clone(), 1.0, 1.0)?;
//! model.add_logit_loss(model.embedding_to_logit(sup)?, labels, 1.0)?;
//! let step = train_op.run(&mut model)?;
//! ```

pub mod backend;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{ImageSet, PerClassSampler, SemisupBatcher, UnlabeledSampler};
pub use inference::{ConfusionMatrix, Endpoint};
pub use model::{Embedder, LabelTree, SemisupConfig, SemisupNet, TreeNodeSpec, TreeStructure};
pub use training::{MovingAverages, SemisupModel, TrainOp, TrainStep};
pub use utils::error::{AssocError, Result};
pub use utils::summary::SummaryWriter;

/// Default number of images per evaluation chunk
pub const DEFAULT_TEST_BATCH_SIZE: usize = model::config::DEFAULT_TEST_BATCH_SIZE;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
