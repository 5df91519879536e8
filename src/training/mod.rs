//! Training module for association-based semi-supervised learning
//!
//! This module provides:
//! - The association engine (similarity, `p_ab`, `p_ba`, `p_aba`)
//! - Walker, visit and supervised losses, flat and hierarchical
//! - Moving-average monitoring of losses and round-trip accuracy
//! - The training session and its optimizer step
//!
//! ## Associative Learning
//!
//! A walker starts at a labeled embedding, steps to an unlabeled embedding
//! with probability proportional to `exp(similarity)`, and steps back to a
//! labeled one. Training pushes the round trip to end on a sample of the same
//! class (walker loss) while visiting every unlabeled sample about equally
//! often (visit loss). A supervised logit loss trains the classifier head on
//! the labeled samples.

pub mod association;
pub mod averages;
pub mod collection;
pub mod loss;
pub mod session;
pub mod train_op;
pub mod tree_loss;

// Re-export main types for convenience
pub use association::{associate, Association};
pub use averages::{ExponentialMovingAverage, MovingAverages};
pub use collection::{LossCollection, LossHistory, LossKind};
pub use loss::{walk_statistics, WalkStatistics};
pub use session::SemisupModel;
pub use train_op::{TrainOp, TrainStep};
