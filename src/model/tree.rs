//! Hierarchical label taxonomy
//!
//! Hierarchical training predicts a path through a label tree instead of a
//! single flat class. Every internal ("classifier") node owns a contiguous
//! segment of the logit vector with one score per child; the segments of all
//! classifier nodes partition the logit vector.
//!
//! A hierarchical label record is a fixed-width integer row made of three
//! segments:
//!
//! ```text
//! [ per-node child id (K) | per-level class id (D) | per-node usage mask (K) ]
//! ```
//!
//! where `K` is the number of classifier nodes and `D` the number of classifier
//! levels. Entries that do not apply to a sample are `-1` (ids) or `0` (mask).
//!
//! Loss construction only depends on the [`TreeStructure`] trait; [`LabelTree`]
//! is the implementation used when the taxonomy is given as a nested
//! [`TreeNodeSpec`].

use std::collections::VecDeque;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::utils::error::{AssocError, Result};

/// Offset metadata of a label taxonomy, fixed after construction.
///
/// Node ordering must match the ordering baked into the label records.
pub trait TreeStructure: Send + Sync + std::fmt::Debug {
    /// Number of classifier nodes (`K`)
    fn num_nodes(&self) -> usize;

    /// Number of classifier levels (`D`)
    fn depth(&self) -> usize;

    /// Depth of every classifier node, in node order
    fn node_depths(&self) -> &[usize];

    /// Start of every node's segment in the logit vector
    fn offsets(&self) -> &[usize];

    /// Width of every node's segment (its number of children)
    fn node_sizes(&self) -> &[usize];

    /// Start of every level's logit range, `depth()` entries
    fn level_offsets(&self) -> &[usize];

    /// Number of tree nodes (internal and leaves) at every depth, `depth() + 1` entries.
    /// The logit range of level `d` is `level_sizes()[d + 1]` wide.
    fn level_sizes(&self) -> &[usize];

    /// Width of one hierarchical label record
    fn label_width(&self) -> usize {
        2 * self.num_nodes() + self.depth()
    }

    /// Width of the logit vector
    fn logit_width(&self) -> usize {
        self.node_sizes().iter().sum()
    }

    /// Column of the first per-level class id
    fn level_label_offset(&self) -> usize {
        self.num_nodes()
    }

    /// Column of the first usage-mask entry
    fn usage_offset(&self) -> usize {
        self.num_nodes() + self.depth()
    }
}

/// Nested description of a label taxonomy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNodeSpec {
    pub name: String,
    #[serde(default)]
    pub children: Vec<TreeNodeSpec>,
}

impl TreeNodeSpec {
    pub fn leaf(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn node(name: impl Into<String>, children: Vec<TreeNodeSpec>) -> Self {
        Self {
            name: name.into(),
            children,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Load a taxonomy from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChildRef {
    /// Classifier index of the child, `None` for leaves
    node: Option<usize>,
    /// Rank of the child among all tree nodes at its depth
    level_position: usize,
}

/// Breadth-first flattening of a [`TreeNodeSpec`]
#[derive(Debug, Clone)]
pub struct LabelTree {
    node_names: Vec<String>,
    node_depths: Vec<usize>,
    offsets: Vec<usize>,
    node_sizes: Vec<usize>,
    level_offsets: Vec<usize>,
    level_sizes: Vec<usize>,
    depth: usize,
    children: Vec<Vec<ChildRef>>,
    leaves: Vec<(String, Vec<usize>)>,
}

struct Visited<'a> {
    spec: &'a TreeNodeSpec,
    depth: usize,
    level_position: usize,
    classifier: Option<usize>,
    parent: Option<usize>,
}

impl LabelTree {
    /// Flatten `root` breadth-first. The root must have at least one child.
    pub fn new(root: &TreeNodeSpec) -> Result<Self> {
        if root.is_leaf() {
            return Err(AssocError::InvalidTree(format!(
                "root '{}' has no children",
                root.name
            )));
        }

        let mut visited: Vec<Visited> = Vec::new();
        let mut per_depth_count: Vec<usize> = Vec::new();
        let mut num_classifiers = 0usize;
        let mut queue = VecDeque::new();
        queue.push_back((root, 0usize, None::<usize>));

        while let Some((spec, depth, parent)) = queue.pop_front() {
            if per_depth_count.len() <= depth {
                per_depth_count.push(0);
            }
            let level_position = per_depth_count[depth];
            per_depth_count[depth] += 1;

            let classifier = if spec.is_leaf() {
                None
            } else {
                num_classifiers += 1;
                Some(num_classifiers - 1)
            };

            let index = visited.len();
            visited.push(Visited {
                spec,
                depth,
                level_position,
                classifier,
                parent,
            });
            for child in &spec.children {
                queue.push_back((child, depth + 1, Some(index)));
            }
        }

        let mut node_names = Vec::with_capacity(num_classifiers);
        let mut node_depths = Vec::with_capacity(num_classifiers);
        let mut node_sizes = Vec::with_capacity(num_classifiers);
        let mut children: Vec<Vec<ChildRef>> = vec![Vec::new(); num_classifiers];

        for entry in &visited {
            if entry.classifier.is_some() {
                node_names.push(entry.spec.name.clone());
                node_depths.push(entry.depth);
                node_sizes.push(entry.spec.children.len());
            }
            if let Some(parent) = entry.parent {
                // Parents are always classifier nodes; BFS keeps children in declaration order.
                if let Some(parent_node) = visited[parent].classifier {
                    children[parent_node].push(ChildRef {
                        node: entry.classifier,
                        level_position: entry.level_position,
                    });
                }
            }
        }

        let mut offsets = Vec::with_capacity(num_classifiers);
        let mut running = 0usize;
        for &size in &node_sizes {
            offsets.push(running);
            running += size;
        }

        let depth = node_depths.iter().copied().max().map_or(0, |d| d + 1);
        let level_offsets = (0..depth)
            .map(|d| {
                node_depths
                    .iter()
                    .zip(&node_sizes)
                    .filter(|(nd, _)| **nd < d)
                    .map(|(_, &size)| size)
                    .sum()
            })
            .collect();
        let level_sizes = per_depth_count.iter().take(depth + 1).copied().collect();

        let mut leaves = Vec::new();
        collect_leaves(root, &mut Vec::new(), &mut leaves);

        Ok(Self {
            node_names,
            node_depths,
            offsets,
            node_sizes,
            level_offsets,
            level_sizes,
            depth,
            children,
            leaves,
        })
    }

    /// Names of the classifier nodes in node order
    pub fn node_names(&self) -> &[String] {
        &self.node_names
    }

    /// Leaf names with their root-to-leaf child-index paths, depth-first
    pub fn leaves(&self) -> &[(String, Vec<usize>)] {
        &self.leaves
    }

    /// Encode a root-to-node path of child indices as a label record.
    ///
    /// The path may stop at an internal node; levels below it stay `-1`.
    pub fn encode_path(&self, path: &[usize]) -> Result<Vec<i64>> {
        if path.is_empty() {
            return Err(AssocError::InvalidLabel("empty tree path".to_string()));
        }

        let k = self.num_nodes();
        let d = self.depth;
        let mut record = vec![-1i64; 2 * k + d];
        for mask in &mut record[k + d..] {
            *mask = 0;
        }

        let mut current = Some(0usize);
        for (level, &child) in path.iter().enumerate() {
            let node = current.ok_or_else(|| {
                AssocError::InvalidLabel(format!("path {:?} continues below a leaf", path))
            })?;
            let child_ref = self.children[node].get(child).ok_or_else(|| {
                AssocError::InvalidLabel(format!(
                    "node '{}' has {} children, got child index {}",
                    self.node_names[node],
                    self.node_sizes[node],
                    child
                ))
            })?;

            record[node] = child as i64;
            record[k + level] = child_ref.level_position as i64;
            record[k + d + node] = 1;
            current = child_ref.node;
        }

        Ok(record)
    }

    /// Encode the path to the named leaf
    pub fn encode_leaf(&self, name: &str) -> Result<Vec<i64>> {
        let (_, path) = self
            .leaves
            .iter()
            .find(|(leaf, _)| leaf == name)
            .ok_or_else(|| AssocError::InvalidLabel(format!("unknown leaf '{}'", name)))?;
        self.encode_path(path)
    }
}

fn collect_leaves(spec: &TreeNodeSpec, path: &mut Vec<usize>, out: &mut Vec<(String, Vec<usize>)>) {
    if spec.is_leaf() {
        out.push((spec.name.clone(), path.clone()));
        return;
    }
    for (i, child) in spec.children.iter().enumerate() {
        path.push(i);
        collect_leaves(child, path, out);
        path.pop();
    }
}

impl TreeStructure for LabelTree {
    fn num_nodes(&self) -> usize {
        self.node_sizes.len()
    }

    fn depth(&self) -> usize {
        self.depth
    }

    fn node_depths(&self) -> &[usize] {
        &self.node_depths
    }

    fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    fn node_sizes(&self) -> &[usize] {
        &self.node_sizes
    }

    fn level_offsets(&self) -> &[usize] {
        &self.level_offsets
    }

    fn level_sizes(&self) -> &[usize] {
        &self.level_sizes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_tree() -> LabelTree {
        // root -> mid -> {a, b, c}
        let spec = TreeNodeSpec::node(
            "root",
            vec![TreeNodeSpec::node(
                "mid",
                vec![
                    TreeNodeSpec::leaf("a"),
                    TreeNodeSpec::leaf("b"),
                    TreeNodeSpec::leaf("c"),
                ],
            )],
        );
        LabelTree::new(&spec).unwrap()
    }

    fn wide_tree() -> LabelTree {
        let spec = TreeNodeSpec::node(
            "root",
            vec![
                TreeNodeSpec::node("A", vec![TreeNodeSpec::leaf("a0"), TreeNodeSpec::leaf("a1")]),
                TreeNodeSpec::node(
                    "B",
                    vec![
                        TreeNodeSpec::leaf("b0"),
                        TreeNodeSpec::leaf("b1"),
                        TreeNodeSpec::leaf("b2"),
                    ],
                ),
                TreeNodeSpec::leaf("C"),
            ],
        );
        LabelTree::new(&spec).unwrap()
    }

    #[test]
    fn test_chain_tree_metadata() {
        let tree = chain_tree();
        assert_eq!(tree.num_nodes(), 2);
        assert_eq!(tree.depth(), 2);
        assert_eq!(tree.node_sizes(), &[1, 3]);
        assert_eq!(tree.offsets(), &[0, 1]);
        assert_eq!(tree.node_depths(), &[0, 1]);
        assert_eq!(tree.level_offsets(), &[0, 1]);
        assert_eq!(tree.level_sizes(), &[1, 1, 3]);
        assert_eq!(tree.label_width(), 6);
        assert_eq!(tree.logit_width(), 4);
    }

    #[test]
    fn test_chain_tree_encoding() {
        let tree = chain_tree();
        assert_eq!(tree.encode_path(&[0, 2]).unwrap(), vec![0, 2, 0, 2, 1, 1]);
        assert_eq!(tree.encode_leaf("c").unwrap(), vec![0, 2, 0, 2, 1, 1]);
    }

    #[test]
    fn test_wide_tree_metadata() {
        let tree = wide_tree();
        assert_eq!(tree.node_names(), &["root", "A", "B"]);
        assert_eq!(tree.node_sizes(), &[3, 2, 3]);
        assert_eq!(tree.offsets(), &[0, 3, 5]);
        assert_eq!(tree.level_offsets(), &[0, 3]);
        assert_eq!(tree.level_sizes(), &[1, 3, 5]);
        assert_eq!(tree.label_width(), 8);

        // Level ranges partition the logit vector
        let level_total: usize = (0..tree.depth()).map(|d| tree.level_sizes()[d + 1]).sum();
        assert_eq!(level_total, tree.logit_width());
    }

    #[test]
    fn test_wide_tree_encoding() {
        let tree = wide_tree();
        assert_eq!(
            tree.encode_path(&[1, 2]).unwrap(),
            vec![1, -1, 2, 1, 4, 1, 0, 1]
        );
        // Shallow leaf: second level stays unset
        assert_eq!(
            tree.encode_path(&[2]).unwrap(),
            vec![2, -1, -1, 2, -1, 1, 0, 0]
        );
    }

    #[test]
    fn test_invalid_paths() {
        let tree = wide_tree();
        assert!(tree.encode_path(&[]).is_err());
        assert!(tree.encode_path(&[3]).is_err());
        assert!(tree.encode_path(&[2, 0]).is_err());
        assert!(tree.encode_leaf("zz").is_err());
    }

    #[test]
    fn test_leaves_depth_first() {
        let tree = wide_tree();
        let names: Vec<&str> = tree.leaves().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a0", "a1", "b0", "b1", "b2", "C"]);
        assert_eq!(tree.leaves()[3].1, vec![1, 1]);
    }

    #[test]
    fn test_leaf_root_rejected() {
        assert!(LabelTree::new(&TreeNodeSpec::leaf("only")).is_err());
    }

    #[test]
    fn test_spec_from_json() {
        let json = r#"{"name": "root", "children": [{"name": "x"}, {"name": "y"}]}"#;
        let spec: TreeNodeSpec = serde_json::from_str(json).unwrap();
        let tree = LabelTree::new(&spec).unwrap();
        assert_eq!(tree.num_nodes(), 1);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.level_sizes(), &[1, 2]);
    }
}
