//! Hierarchical losses over a flattened label tree
//!
//! Logits are laid out as disjoint node segments given by
//! [`TreeStructure::offsets`] and [`TreeStructure::node_sizes`]. Label records
//! are `[per-node class id | per-level class id | per-node usage mask]`.
//!
//! These functions only slice and compute; recording the terms is up to the
//! session.

use burn::tensor::{backend::Backend, Int, Tensor};

use super::loss::{equality_matrix, sparse_softmax_cross_entropy};
use crate::model::tree::TreeStructure;
use crate::utils::error::{ensure_dim, AssocError, Result};
use crate::utils::tensor::int_to_vec;

/// Weight of the root classifier in the per-node loss
pub const ROOT_WEIGHT: f64 = 1.0;

/// Weight of every classifier below the root
pub const INNER_NODE_WEIGHT: f64 = 0.4;

/// Number of leading levels covered by the per-level loss
pub const MULTITASK_LEVELS: usize = 2;

/// Depth-dependent weight of a node classifier
pub fn depth_weight(depth: usize) -> f64 {
    if depth == 0 {
        ROOT_WEIGHT
    } else {
        INNER_NODE_WEIGHT
    }
}

/// Per-node supervised loss term
#[derive(Debug, Clone)]
pub struct NodeLoss<B: Backend> {
    pub node: usize,
    pub depth: usize,
    /// Start of the node's logit segment
    pub offset: usize,
    /// Width of the node's logit segment
    pub width: usize,
    pub loss: Tensor<B, 1>,
}

/// Per-level supervised loss term
#[derive(Debug, Clone)]
pub struct LevelLoss<B: Backend> {
    pub level: usize,
    pub offset: usize,
    pub width: usize,
    pub loss: Tensor<B, 1>,
}

/// Check a `[N, width]` label record tensor against the tree.
///
/// Reads the records to the host once: every per-node child id whose usage
/// mask is set must lie in `[0, node_sizes[node])`, every per-node id must
/// stay below the node width, and every per-level id below the width of that
/// level. Negative ids are allowed where they are masked out.
pub fn check_label_records<B: Backend>(
    labels: &Tensor<B, 2, Int>,
    tree: &dyn TreeStructure,
) -> Result<usize> {
    let [n, width] = labels.dims();
    if n == 0 {
        return Err(AssocError::EmptyInput("no labeled samples".to_string()));
    }
    ensure_dim("hierarchical label width", width, tree.label_width())?;

    let values = int_to_vec(labels.clone())?;
    let sizes = tree.node_sizes();
    let level_sizes = tree.level_sizes();
    let level_offset = tree.level_label_offset();
    let usage_offset = tree.usage_offset();

    for (row, record) in values.chunks(width).enumerate() {
        for (node, &size) in sizes.iter().enumerate() {
            let id = record[node];
            let used = record[usage_offset + node] != 0;
            if id >= size as i64 || (used && id < 0) {
                return Err(AssocError::InvalidLabel(format!(
                    "sample {}: node {} child id {} outside [0, {})",
                    row, node, id, size
                )));
            }
        }
        for level in 0..tree.depth() {
            let id = record[level_offset + level];
            let size = level_sizes[level + 1];
            if id >= size as i64 {
                return Err(AssocError::InvalidLabel(format!(
                    "sample {}: level {} class id {} outside [0, {})",
                    row, level, id, size
                )));
            }
        }
    }

    Ok(n)
}

fn check_logits<B: Backend>(logits: &Tensor<B, 2>, n: usize, required: usize) -> Result<()> {
    let [rows, width] = logits.dims();
    ensure_dim("logit rows", rows, n)?;
    if width < required {
        return Err(AssocError::Shape(format!(
            "logits have {} columns, tree needs {}",
            width, required
        )));
    }
    Ok(())
}

/// Column `column` of the label records as a `[N]` tensor
pub fn label_column<B: Backend>(labels: &Tensor<B, 2, Int>, column: usize) -> Tensor<B, 1, Int> {
    let [n, _] = labels.dims();
    labels.clone().narrow(1, column, 1).reshape([n])
}

/// Equality matrix of every tree level in `[0, min(max_depth, depth))`
pub fn level_equality_matrices<B: Backend>(
    labels: &Tensor<B, 2, Int>,
    tree: &dyn TreeStructure,
    max_depth: usize,
) -> Result<Vec<Tensor<B, 2>>> {
    check_label_records(labels, tree)?;

    let levels = max_depth.min(tree.depth());
    Ok((0..levels)
        .map(|level| equality_matrix(label_column(labels, tree.level_label_offset() + level)))
        .collect())
}

/// One weighted cross-entropy per tree node shallower than `max_depth`.
///
/// A sample only contributes to a node's loss when the node lies on its path
/// (usage mask 1). The mask is scaled by [`depth_weight`] and `weight`.
pub fn tree_logit_losses<B: Backend>(
    logits: Tensor<B, 2>,
    labels: &Tensor<B, 2, Int>,
    tree: &dyn TreeStructure,
    max_depth: usize,
    weight: f64,
) -> Result<Vec<NodeLoss<B>>> {
    let n = check_label_records(labels, tree)?;
    check_logits(&logits, n, tree.logit_width())?;

    let offsets = tree.offsets();
    let sizes = tree.node_sizes();
    let usage_offset = tree.usage_offset();

    let mut terms = Vec::new();
    for (node, &depth) in tree.node_depths().iter().enumerate() {
        if depth >= max_depth {
            continue;
        }

        let (offset, width) = (offsets[node], sizes[node]);
        let node_logits = logits.clone().narrow(1, offset, width);
        let node_labels = label_column(labels, node);
        let weights = label_column(labels, usage_offset + node)
            .float()
            .mul_scalar(depth_weight(depth) * weight);

        terms.push(NodeLoss {
            node,
            depth,
            offset,
            width,
            loss: sparse_softmax_cross_entropy(node_logits, node_labels, weights),
        });
    }

    Ok(terms)
}

/// One cross-entropy per leading tree level, slicing logits by level.
///
/// Samples carry weight 1.0 at every level their path reaches. Unlike a plain
/// uniform weighting, a sample whose path ends above a level (a shallow leaf,
/// level id `-1`) gets weight 0 there and is left out of that level's term;
/// for full-depth paths both weightings coincide.
pub fn tree_multitask_logit_losses<B: Backend>(
    logits: Tensor<B, 2>,
    labels: &Tensor<B, 2, Int>,
    tree: &dyn TreeStructure,
) -> Result<Vec<LevelLoss<B>>> {
    let n = check_label_records(labels, tree)?;

    let levels = MULTITASK_LEVELS.min(tree.depth());
    let level_offsets = tree.level_offsets();
    let level_sizes = tree.level_sizes();
    if let Some(last) = levels.checked_sub(1) {
        check_logits(&logits, n, level_offsets[last] + level_sizes[last + 1])?;
    }

    let mut terms = Vec::with_capacity(levels);
    for level in 0..levels {
        let (offset, width) = (level_offsets[level], level_sizes[level + 1]);
        let level_logits = logits.clone().narrow(1, offset, width);
        let level_labels = label_column(labels, tree.level_label_offset() + level);
        let weights = level_labels.clone().greater_equal_elem(0).float();

        terms.push(LevelLoss {
            level,
            offset,
            width,
            loss: sparse_softmax_cross_entropy(level_logits, level_labels, weights),
        });
    }

    Ok(terms)
}
