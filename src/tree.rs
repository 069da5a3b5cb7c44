//! Strictly owned expression trees.
//!
//! A [`Node`] owns its primitive and its children. There are no parent
//! pointers: operators address nodes by their pre-order index and exchange
//! subtrees by swapping node contents in place.
//!
//! ```text
//!        F{add}            index 0, depth 0, height 2
//!       /      \
//!   F{neg}    T{two}       index 1 (depth 1, height 1), index 3 (depth 1, height 0)
//!     |
//!   T{one}                 index 2, depth 2, height 0
//! ```

pub mod enumeration;

pub use enumeration::{Enumeration, Shape, parents};

use crate::error::InvariantError;
use crate::primitive::{Primitive, PrimitiveKind};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;

/// A tree node: one primitive and `arity` owned children.
#[derive(Clone)]
pub struct Node<V> {
    value: Primitive<V>,
    children: Vec<Node<V>>,
}

impl<V> Node<V> {
    /// Create a node. Arity is checked at compile time, not here.
    #[must_use]
    pub fn new(value: Primitive<V>, children: Vec<Node<V>>) -> Self {
        Self { value, children }
    }

    /// Create a childless node.
    #[must_use]
    pub fn leaf(value: Primitive<V>) -> Self {
        Self::new(value, Vec::new())
    }

    /// The node's primitive.
    #[must_use]
    pub fn value(&self) -> &Primitive<V> {
        &self.value
    }

    /// The node's children, in order.
    #[must_use]
    pub fn children(&self) -> &[Node<V>] {
        &self.children
    }

    /// Mutable children. The slice keeps the arity fixed.
    pub fn children_mut(&mut self) -> &mut [Node<V>] {
        &mut self.children
    }

    /// True if the node has no children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Replace the primitive, keeping the children.
    ///
    /// Returns the old primitive. Callers keep arity consistent.
    pub fn replace_value(&mut self, value: Primitive<V>) -> Primitive<V> {
        std::mem::replace(&mut self.value, value)
    }

    /// Number of nodes in the tree.
    #[must_use]
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(Node::size).sum::<usize>()
    }

    /// Depth of the deepest node, which is the height of the root.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.children
            .iter()
            .map(|c| c.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Node at pre-order `index`, root is 0.
    #[must_use]
    pub fn node_at(&self, index: usize) -> Option<&Node<V>> {
        if index == 0 {
            return Some(self);
        }
        let mut index = index - 1;
        for child in &self.children {
            let size = child.size();
            if index < size {
                return child.node_at(index);
            }
            index -= size;
        }
        None
    }

    /// Mutable node at pre-order `index`, root is 0.
    pub fn node_at_mut(&mut self, index: usize) -> Option<&mut Node<V>> {
        if index == 0 {
            return Some(self);
        }
        let mut index = index - 1;
        for child in &mut self.children {
            let size = child.size();
            if index < size {
                return child.node_at_mut(index);
            }
            index -= size;
        }
        None
    }

    /// Replace the subtree at `index` with `subtree`, returning the old one.
    pub fn replace_at(&mut self, index: usize, subtree: Node<V>) -> Option<Node<V>> {
        self.node_at_mut(index)
            .map(|slot| std::mem::replace(slot, subtree))
    }

    /// Pre-order enumeration with depths and heights.
    #[must_use]
    pub fn enumerate(&self) -> Enumeration<'_, V> {
        Enumeration::new(self)
    }

    /// Depths and heights in pre-order, without borrowing the nodes.
    #[must_use]
    pub fn shape(&self) -> Shape {
        self.enumerate().into_shape()
    }

    /// Indented rendering, one node per line.
    #[must_use]
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        self.pretty_into(0, &mut out);
        out
    }

    fn pretty_into(&self, indent: usize, out: &mut String) {
        for _ in 0..indent {
            out.push_str("  ");
        }
        out.push_str(self.value.name());
        out.push('\n');
        for child in &self.children {
            child.pretty_into(indent + 1, out);
        }
    }
}

impl<V: Clone> Node<V> {
    /// Evaluate the tree bottom-up into a value.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantError::ArityMismatch`] if a node's child count
    /// disagrees with its primitive, or [`InvariantError::UnresolvedEphemeral`]
    /// if a generator was stored without being instantiated.
    pub fn compile(&self) -> Result<V, InvariantError> {
        match self.value.kind() {
            PrimitiveKind::Functional { arity, compose } => {
                if self.children.len() != *arity {
                    return Err(self.arity_mismatch());
                }
                let args = self
                    .children
                    .iter()
                    .map(Node::compile)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(compose(&args))
            }
            PrimitiveKind::Terminal { value } => {
                if self.children.is_empty() {
                    Ok(value.clone())
                } else {
                    Err(self.arity_mismatch())
                }
            }
            PrimitiveKind::Ephemeral { .. } => Err(InvariantError::UnresolvedEphemeral {
                primitive: self.value.name().to_string(),
            }),
        }
    }

    fn arity_mismatch(&self) -> InvariantError {
        InvariantError::ArityMismatch {
            primitive: self.value.name().to_string(),
            arity: self.value.arity(),
            children: self.children.len(),
        }
    }
}

impl<V> PartialEq for Node<V> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.children == other.children
    }
}

impl<V> fmt::Debug for Node<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("value", &self.value)
            .field("children", &self.children)
            .finish()
    }
}

impl<V> fmt::Display for Node<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.value.is_functional() {
            write!(f, "F{{{}}}(", self.value)?;
            for (i, child) in self.children.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{child}")?;
            }
            f.write_str(")")
        } else {
            write!(f, "T{{{}}}", self.value)
        }
    }
}

impl<V> Serialize for Node<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.value.is_functional() {
            let mut map = serializer.serialize_map(Some(2))?;
            map.serialize_entry("functional", self.value.name())?;
            map.serialize_entry("children", &self.children)?;
            map.end()
        } else {
            let mut map = serializer.serialize_map(Some(1))?;
            map.serialize_entry("terminal", self.value.name())?;
            map.end()
        }
    }
}
