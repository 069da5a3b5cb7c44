//! Random tree construction.
//!
//! Every method builds top-down with a remaining-depth counter. When the
//! counter reaches zero the node is a terminal, so no built tree is deeper
//! than the requested depth.
//!
//! | Strategy       | Above depth 0                                   |
//! |----------------|-------------------------------------------------|
//! | `Full`         | always a functional                             |
//! | `Grow`         | uniform over functionals and terminals together |
//! | `GrowBalanced` | coin flip between the two sets, then uniform    |
//! | `HalfAndHalf`  | coin flip per tree between `Full` and a grow    |
//!
//! Ramped initialization spreads a population over depths `1..=max_depth`.

use crate::primitive::PrimitiveSet;
use crate::tree::Node;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Tree construction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Perfectly balanced trees of exactly the requested depth.
    Full,
    /// Functionals and terminals drawn from their union.
    Grow,
    /// Functionals and terminals with equal odds.
    GrowBalanced,
    /// `Full` or the configured grow flavour, 50/50 per tree.
    #[default]
    HalfAndHalf,
}

/// Grow variant used by [`Strategy::HalfAndHalf`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum GrowFlavor {
    /// [`Strategy::Grow`].
    Grow,
    /// [`Strategy::GrowBalanced`].
    #[default]
    Balanced,
}

/// Initialization settings for a population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitConfig {
    /// Construction strategy.
    pub strategy: Strategy,
    /// Spread trees over depths `1..=max_depth` instead of all at `max_depth`.
    pub ramped: bool,
    /// Grow flavour for half-and-half.
    #[serde(default)]
    pub half_grow: GrowFlavor,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::HalfAndHalf,
            ramped: true,
            half_grow: GrowFlavor::Balanced,
        }
    }
}

#[derive(Clone, Copy)]
enum Method {
    Full,
    Grow,
    GrowBalanced,
}

/// Builds random trees over a primitive set.
#[derive(Debug, Clone, Copy)]
pub struct TreeBuilder<'a, V> {
    set: &'a PrimitiveSet<V>,
    strategy: Strategy,
    half_grow: GrowFlavor,
}

impl<'a, V: Clone> TreeBuilder<'a, V> {
    /// Builder with the default half-and-half grow flavour.
    #[must_use]
    pub fn new(set: &'a PrimitiveSet<V>, strategy: Strategy) -> Self {
        Self {
            set,
            strategy,
            half_grow: GrowFlavor::default(),
        }
    }

    /// Builder configured from [`InitConfig`].
    #[must_use]
    pub fn from_config(set: &'a PrimitiveSet<V>, config: &InitConfig) -> Self {
        Self::new(set, config.strategy).with_half_grow(config.half_grow)
    }

    /// Set the grow flavour used by half-and-half.
    #[must_use]
    pub fn with_half_grow(mut self, flavor: GrowFlavor) -> Self {
        self.half_grow = flavor;
        self
    }

    /// The configured strategy.
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Build one tree no deeper than `max_depth`.
    #[must_use]
    pub fn build<R: Rng>(&self, max_depth: usize, rng: &mut R) -> Node<V> {
        let method = match self.strategy {
            Strategy::Full => Method::Full,
            Strategy::Grow => Method::Grow,
            Strategy::GrowBalanced => Method::GrowBalanced,
            Strategy::HalfAndHalf => {
                if rng.gen_bool(0.5) {
                    Method::Full
                } else {
                    match self.half_grow {
                        GrowFlavor::Grow => Method::Grow,
                        GrowFlavor::Balanced => Method::GrowBalanced,
                    }
                }
            }
        };
        self.make(max_depth, method, rng)
    }

    fn make<R: Rng>(&self, remaining: usize, method: Method, rng: &mut R) -> Node<V> {
        if remaining == 0 {
            return Node::leaf(self.set.random_terminal(rng));
        }

        let value = match method {
            Method::Full => Some(self.set.random_functional(rng)),
            Method::Grow => {
                let n_funcs = self.set.functionals().len();
                let k = rng.gen_range(0..n_funcs + self.set.terminals().len());
                if k < n_funcs {
                    Some(self.set.functional_at(k))
                } else {
                    return Node::leaf(self.set.terminal_at(k - n_funcs, rng));
                }
            }
            Method::GrowBalanced => rng
                .gen_bool(0.5)
                .then(|| self.set.random_functional(rng)),
        };

        match value {
            Some(functional) => {
                let children = (0..functional.arity())
                    .map(|_| self.make(remaining - 1, method, rng))
                    .collect();
                Node::new(functional, children)
            }
            None => Node::leaf(self.set.random_terminal(rng)),
        }
    }

    /// Build `count` trees spread over depths by [`ramped_depths`].
    #[must_use]
    pub fn build_ramped<R: Rng>(&self, count: usize, max_depth: usize, rng: &mut R) -> Vec<Node<V>> {
        ramped_depths(count, max_depth)
            .into_iter()
            .flat_map(|(depth, n)| std::iter::repeat_n(depth, n))
            .map(|depth| self.build(depth, rng))
            .collect()
    }

    /// Build `count` trees, ramped or all at `max_depth`.
    #[must_use]
    pub fn build_many<R: Rng>(
        &self,
        count: usize,
        max_depth: usize,
        ramped: bool,
        rng: &mut R,
    ) -> Vec<Node<V>> {
        if ramped {
            self.build_ramped(count, max_depth, rng)
        } else {
            (0..count).map(|_| self.build(max_depth, rng)).collect()
        }
    }
}

/// Split `count` trees over depths `1..=max_depth`.
///
/// Returns `(depth, trees)` pairs in increasing depth. Each depth gets
/// `count / max_depth` trees and the remainder is handed out one per depth
/// from `max_depth` downward. A `max_depth` of 0 puts everything at depth 0.
#[must_use]
pub fn ramped_depths(count: usize, max_depth: usize) -> Vec<(usize, usize)> {
    if max_depth == 0 {
        return vec![(0, count)];
    }
    let per_depth = count / max_depth;
    let remainder = count % max_depth;
    (1..=max_depth)
        .map(|depth| (depth, per_depth + usize::from(depth > max_depth - remainder)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::fixtures::{binary_set, int_set};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn test_full_depth_two_binary_has_seven_nodes() {
        let mut rng = SmallRng::seed_from_u64(42);
        let set = binary_set();
        let tree = TreeBuilder::new(&set, Strategy::Full).build(2, &mut rng);
        assert_eq!(tree.size(), 7);
        assert_eq!(tree.depth(), 2);
        let e = tree.enumerate();
        for (node, depth) in e.nodes.iter().zip(&e.depths) {
            assert_eq!(node.is_leaf(), *depth == 2);
        }
    }

    #[test]
    fn test_full_is_exact_depth() {
        let mut rng = SmallRng::seed_from_u64(42);
        let set = int_set();
        let builder = TreeBuilder::new(&set, Strategy::Full);
        for depth in 0..6 {
            let tree = builder.build(depth, &mut rng);
            assert_eq!(tree.depth(), depth);
            let shape = tree.shape();
            for (i, node) in tree.enumerate().nodes.iter().enumerate() {
                if node.is_leaf() {
                    assert_eq!(shape.depths[i], depth);
                }
            }
        }
    }

    #[test]
    fn test_grow_bounded_and_resolved() {
        let mut rng = SmallRng::seed_from_u64(7);
        let set = int_set();
        for strategy in [Strategy::Grow, Strategy::GrowBalanced, Strategy::HalfAndHalf] {
            let builder = TreeBuilder::new(&set, strategy);
            for _ in 0..200 {
                let tree = builder.build(5, &mut rng);
                assert!(tree.depth() <= 5);
                assert!(tree.enumerate().nodes.iter().all(|n| !n.value().is_ephemeral()));
                assert!(tree.compile().is_ok());
            }
        }
    }

    #[test]
    fn test_depth_zero_is_terminal() {
        let mut rng = SmallRng::seed_from_u64(1);
        let set = int_set();
        let tree = TreeBuilder::new(&set, Strategy::Full).build(0, &mut rng);
        assert_eq!(tree.size(), 1);
        assert!(!tree.value().is_functional());
    }

    #[test]
    fn test_half_and_half_mixes_methods() {
        let mut rng = SmallRng::seed_from_u64(3);
        let set = binary_set();
        let builder = TreeBuilder::new(&set, Strategy::HalfAndHalf);
        let sizes: Vec<usize> = (0..100).map(|_| builder.build(3, &mut rng).size()).collect();
        assert!(sizes.contains(&15));
        assert!(sizes.iter().any(|&s| s < 15));
    }

    #[test]
    fn test_ramped_depths() {
        assert_eq!(ramped_depths(10, 5), [(1, 2), (2, 2), (3, 2), (4, 2), (5, 2)]);
        assert_eq!(ramped_depths(12, 5), [(1, 2), (2, 2), (3, 2), (4, 3), (5, 3)]);
        assert_eq!(ramped_depths(3, 5), [(1, 0), (2, 0), (3, 1), (4, 1), (5, 1)]);
        assert_eq!(ramped_depths(4, 0), [(0, 4)]);
        for count in 0..40 {
            let split = ramped_depths(count, 6);
            assert_eq!(split.iter().map(|(_, n)| n).sum::<usize>(), count);
            if count >= 6 {
                assert!(split.iter().all(|&(_, n)| n > 0));
            }
        }
    }

    #[test]
    fn test_build_ramped() {
        let mut rng = SmallRng::seed_from_u64(42);
        let set = binary_set();
        let trees = TreeBuilder::new(&set, Strategy::Full).build_ramped(10, 4, &mut rng);
        assert_eq!(trees.len(), 10);
        let mut depths: Vec<usize> = trees.iter().map(Node::depth).collect();
        depths.dedup();
        assert_eq!(depths, [1, 2, 3, 4]);
    }
}
