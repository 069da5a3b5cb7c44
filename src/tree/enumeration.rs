//! Pre-order enumeration of a tree.
//!
//! Produces index-aligned arrays of node references, depths and heights.
//! Depth counts edges from the root; height counts edges to the deepest leaf
//! below the node.

use super::Node;

/// Depths and heights of a tree in pre-order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Shape {
    /// Distance from the root, root is 0.
    pub depths: Vec<usize>,
    /// Distance to the deepest descendant, leaves are 0.
    pub heights: Vec<usize>,
}

impl Shape {
    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.depths.len()
    }

    /// Always false for a shape taken from a tree.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.depths.is_empty()
    }

    /// Height of the root.
    #[must_use]
    pub fn root_height(&self) -> usize {
        self.heights.first().copied().unwrap_or(0)
    }

    /// Pre-order index of each node's parent, `None` for the root.
    #[must_use]
    pub fn parents(&self) -> Vec<Option<usize>> {
        parents(&self.depths)
    }
}

/// Parent indices recovered from pre-order depths.
///
/// The parent of node `i` is the closest earlier node one level up.
#[must_use]
pub fn parents(depths: &[usize]) -> Vec<Option<usize>> {
    let mut last_at_depth: Vec<usize> = Vec::new();
    depths
        .iter()
        .enumerate()
        .map(|(i, &d)| {
            last_at_depth.truncate(d);
            let parent = d.checked_sub(1).and_then(|p| last_at_depth.get(p).copied());
            last_at_depth.push(i);
            parent
        })
        .collect()
}

/// Pre-order nodes with their depths and heights.
#[derive(Debug)]
pub struct Enumeration<'a, V> {
    /// Nodes in pre-order.
    pub nodes: Vec<&'a Node<V>>,
    /// Depth of each node.
    pub depths: Vec<usize>,
    /// Height of each node.
    pub heights: Vec<usize>,
}

impl<'a, V> Enumeration<'a, V> {
    pub(super) fn new(root: &'a Node<V>) -> Self {
        let mut enumeration = Self {
            nodes: Vec::new(),
            depths: Vec::new(),
            heights: Vec::new(),
        };
        enumeration.visit(root, 0);
        enumeration
    }

    fn visit(&mut self, node: &'a Node<V>, depth: usize) -> usize {
        let index = self.nodes.len();
        self.nodes.push(node);
        self.depths.push(depth);
        self.heights.push(0);

        let height = node
            .children()
            .iter()
            .map(|child| self.visit(child, depth + 1) + 1)
            .max()
            .unwrap_or(0);
        self.heights[index] = height;
        height
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Never true: a tree has at least its root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drop the node references.
    #[must_use]
    pub fn into_shape(self) -> Shape {
        Shape {
            depths: self.depths,
            heights: self.heights,
        }
    }
}
