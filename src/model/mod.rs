//! Model module: embedding networks, the parameter-shared logit head, and
//! label taxonomies
//!
//! This module provides:
//! - The [`Embedder`] trait for pluggable feature extractors, with a CNN and
//!   an MLP implementation
//! - [`SemisupNet`], the single parameter set shared by training and
//!   evaluation
//! - Session configuration
//! - Hierarchical label trees and their flattened metadata

pub mod config;
pub mod embedder;
pub mod net;
pub mod tree;

// Re-export main types for convenience
pub use config::SemisupConfig;
pub use embedder::{ConvEmbedder, ConvEmbedderConfig, Embedder, MlpEmbedder, MlpEmbedderConfig};
pub use net::SemisupNet;
pub use tree::{LabelTree, TreeNodeSpec, TreeStructure};
