//! Mutation operators for trees.
//!
//! Four operators, from smallest to largest change:
//!
//! - [`SingleNodeMutation`]: swap one node's primitive for another of the
//!   same arity.
//! - [`NodeWiseMutation`]: do the same independently at every node with
//!   probability `p`.
//! - [`SubtreeMutation`]: replace a uniformly picked subtree with a freshly
//!   built one that fits the depth bound.
//! - [`GuidedSubtreeMutation`]: the same replacement, but the node is drawn
//!   from a [`NodeLikelihood`], such as [`ArityDepthLikelihood`] or
//!   [`LevelExpLikelihood`].
//!
//! [`MutationPolicy`] combines the enabled operators for the pipeline.
//! Every operator reports how many nodes it changed.

pub mod likelihood;

pub use likelihood::{
    ArityDepthLikelihood, LevelExpLikelihood, NodeLikelihood, NodeSampler, UniformLikelihood,
};

use crate::builder::{GrowFlavor, Strategy, TreeBuilder};
use crate::error::{InvariantError, ParamError};
use crate::primitive::PrimitiveSet;
use crate::tree::{Node, Shape};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// How much room a replacement subtree gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum HeightBudget {
    /// `max_depth - depth(node)`: the replacement may fill the slot.
    #[default]
    DepthOnly,
    /// `max_depth - depth(node) - height(node)`, at least 0: the replacement
    /// is no taller than the headroom the old subtree left.
    DepthAndHeight,
}

impl HeightBudget {
    /// Height limit for a replacement at a node of `depth` and `height`.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantError::DepthExceeded`] if the node already sits
    /// below `max_depth`.
    pub fn limit(self, max_depth: usize, depth: usize, height: usize) -> Result<usize, InvariantError> {
        let room = max_depth
            .checked_sub(depth)
            .ok_or(InvariantError::DepthExceeded {
                operator: "subtree mutation",
                max_depth,
                depth,
            })?;
        Ok(match self {
            Self::DepthOnly => room,
            Self::DepthAndHeight => room.saturating_sub(height),
        })
    }
}

/// Replace one node's primitive with one of the same arity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SingleNodeMutation;

impl SingleNodeMutation {
    /// Mutate one uniformly picked node. Always reports 1.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantError::NoSameArityPrimitive`] if the tree holds a
    /// functional whose arity the set does not provide.
    pub fn apply<V: Clone, R: Rng>(
        &self,
        tree: &mut Node<V>,
        set: &PrimitiveSet<V>,
        rng: &mut R,
    ) -> Result<usize, InvariantError> {
        let index = rng.gen_range(0..tree.size());
        if let Some(node) = tree.node_at_mut(index) {
            let value = set.random_with_arity(node.value().arity(), rng)?;
            node.replace_value(value);
        }
        Ok(1)
    }
}

/// Replace each node's primitive independently with probability `p`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeWiseMutation {
    /// Per-node mutation probability.
    pub p: f64,
}

impl NodeWiseMutation {
    /// Node-wise mutation with probability `p`.
    ///
    /// # Errors
    ///
    /// Returns [`ParamError::Probability`] if `p` is outside `[0, 1]`.
    pub fn new(p: f64) -> Result<Self, ParamError> {
        Ok(Self {
            p: crate::error::check_probability("node-wise p", p)?,
        })
    }

    /// Visit every node; mutate when a uniform draw falls below `p`.
    ///
    /// Returns the number of mutated nodes.
    ///
    /// # Errors
    ///
    /// See [`SingleNodeMutation::apply`].
    pub fn apply<V: Clone, R: Rng>(
        &self,
        tree: &mut Node<V>,
        set: &PrimitiveSet<V>,
        rng: &mut R,
    ) -> Result<usize, InvariantError> {
        let mut count = 0;
        self.visit(tree, set, rng, &mut count)?;
        Ok(count)
    }

    fn visit<V: Clone, R: Rng>(
        &self,
        node: &mut Node<V>,
        set: &PrimitiveSet<V>,
        rng: &mut R,
        count: &mut usize,
    ) -> Result<(), InvariantError> {
        if rng.r#gen::<f64>() < self.p {
            let value = set.random_with_arity(node.value().arity(), rng)?;
            node.replace_value(value);
            *count += 1;
        }
        for child in node.children_mut() {
            self.visit(child, set, rng, count)?;
        }
        Ok(())
    }
}

/// Replace a uniformly picked subtree with a fresh random one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtreeMutation {
    /// Depth bound of the mutated tree.
    pub max_depth: usize,
    /// Room given to the replacement.
    pub budget: HeightBudget,
    /// How the replacement is built.
    pub strategy: Strategy,
    /// Grow flavour when `strategy` is half-and-half.
    #[serde(default)]
    pub half_grow: GrowFlavor,
}

impl SubtreeMutation {
    /// Subtree mutation with the default budget and strategy.
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            budget: HeightBudget::default(),
            strategy: Strategy::default(),
            half_grow: GrowFlavor::default(),
        }
    }

    /// Use `budget` for replacements.
    #[must_use]
    pub fn with_budget(mut self, budget: HeightBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Build replacements with `strategy`.
    #[must_use]
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Grow flavour for half-and-half replacements.
    #[must_use]
    pub fn with_half_grow(mut self, flavor: GrowFlavor) -> Self {
        self.half_grow = flavor;
        self
    }

    /// Replace one uniformly picked subtree.
    ///
    /// Returns the size of the new subtree.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantError::DepthExceeded`] if the picked node is
    /// already deeper than `max_depth`.
    pub fn apply<V: Clone, R: Rng>(
        &self,
        tree: &mut Node<V>,
        set: &PrimitiveSet<V>,
        rng: &mut R,
    ) -> Result<usize, InvariantError> {
        let shape = tree.shape();
        let index = rng.gen_range(0..shape.len());
        self.replace(tree, &shape, index, set, rng)
    }

    fn replace<V: Clone, R: Rng>(
        &self,
        tree: &mut Node<V>,
        shape: &Shape,
        index: usize,
        set: &PrimitiveSet<V>,
        rng: &mut R,
    ) -> Result<usize, InvariantError> {
        let limit = self
            .budget
            .limit(self.max_depth, shape.depths[index], shape.heights[index])?;
        let replacement = TreeBuilder::new(set, self.strategy)
            .with_half_grow(self.half_grow)
            .build(limit, rng);
        let size = replacement.size();
        tree.replace_at(index, replacement);
        Ok(size)
    }
}

/// Subtree mutation with the node drawn from a likelihood.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuidedSubtreeMutation<L> {
    /// Replacement settings.
    pub subtree: SubtreeMutation,
    /// Node weights.
    pub likelihood: L,
}

impl<L: NodeLikelihood> GuidedSubtreeMutation<L> {
    /// Guided mutation over `subtree` settings.
    #[must_use]
    pub fn new(subtree: SubtreeMutation, likelihood: L) -> Self {
        Self {
            subtree,
            likelihood,
        }
    }

    /// Draw a node by inverse-CDF sampling and replace its subtree.
    ///
    /// # Errors
    ///
    /// See [`SubtreeMutation::apply`].
    pub fn apply<V: Clone, R: Rng>(
        &self,
        tree: &mut Node<V>,
        set: &PrimitiveSet<V>,
        rng: &mut R,
    ) -> Result<usize, InvariantError> {
        let enumeration = tree.enumerate();
        let sampler = NodeSampler::from_weights(self.likelihood.weights(&enumeration));
        let shape = enumeration.into_shape();
        let index = sampler.sample(rng);
        self.subtree.replace(tree, &shape, index, set, rng)
    }
}

/// Which mutation operators run, and how they combine.
///
/// Per individual the enabled operators are visited in a random order. Each
/// fires with probability `p_mut`, except node-wise mutation, which uses
/// `p_mut` as its per-node probability. Without `multi`, the first operator
/// visited decides the outcome alone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationPolicy {
    /// Enable [`SingleNodeMutation`].
    pub single: bool,
    /// Enable [`NodeWiseMutation`].
    pub node_wise: bool,
    /// Enable [`SubtreeMutation`].
    pub subtree: bool,
    /// Enable [`GuidedSubtreeMutation`] with [`ArityDepthLikelihood`].
    pub guided: bool,
    /// Enable [`GuidedSubtreeMutation`] with [`LevelExpLikelihood`].
    pub level_exp: bool,
    /// Per-level decay base for `level_exp`.
    pub level_exp_base: f64,
    /// Let every enabled operator have its turn.
    pub multi: bool,
    /// Room given to subtree replacements.
    #[serde(default)]
    pub budget: HeightBudget,
    /// How subtree replacements are built.
    #[serde(default)]
    pub strategy: Strategy,
    /// Grow flavour of half-and-half replacements.
    #[serde(default)]
    pub half_grow: GrowFlavor,
}

impl Default for MutationPolicy {
    fn default() -> Self {
        Self {
            single: true,
            node_wise: false,
            subtree: true,
            guided: false,
            level_exp: false,
            level_exp_base: LevelExpLikelihood::default().exp,
            multi: false,
            budget: HeightBudget::DepthOnly,
            strategy: Strategy::HalfAndHalf,
            half_grow: GrowFlavor::Balanced,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Single,
    NodeWise,
    Subtree,
    Guided,
    LevelExp,
}

impl MutationPolicy {
    /// Check that at least one operator is enabled and that the
    /// level-exponential base is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ParamError::NoMutationOperator`] or
    /// [`ParamError::LevelExpBase`].
    pub fn validate(&self) -> Result<(), ParamError> {
        if self.enabled().is_empty() {
            return Err(ParamError::NoMutationOperator);
        }
        if self.level_exp && !(self.level_exp_base.is_finite() && self.level_exp_base > 0.0) {
            return Err(ParamError::LevelExpBase(self.level_exp_base));
        }
        Ok(())
    }

    fn enabled(&self) -> Vec<Operator> {
        [
            (self.single, Operator::Single),
            (self.node_wise, Operator::NodeWise),
            (self.subtree, Operator::Subtree),
            (self.guided, Operator::Guided),
            (self.level_exp, Operator::LevelExp),
        ]
        .into_iter()
        .filter_map(|(on, op)| on.then_some(op))
        .collect()
    }

    /// Mutate `tree` under this policy. Returns true if any operator fired.
    ///
    /// # Errors
    ///
    /// Propagates the operators' invariant errors.
    pub fn apply<V: Clone, R: Rng>(
        &self,
        tree: &mut Node<V>,
        set: &PrimitiveSet<V>,
        max_depth: usize,
        p_mut: f64,
        rng: &mut R,
    ) -> Result<bool, InvariantError> {
        let subtree = SubtreeMutation {
            max_depth,
            budget: self.budget,
            strategy: self.strategy,
            half_grow: self.half_grow,
        };
        let mut operators = self.enabled();
        operators.shuffle(rng);

        let mut changed = false;
        for op in operators {
            let fired = if op == Operator::NodeWise {
                NodeWiseMutation { p: p_mut }.apply(tree, set, rng)? > 0
            } else if rng.r#gen::<f64>() < p_mut {
                match op {
                    Operator::Single => SingleNodeMutation.apply(tree, set, rng)?,
                    Operator::Subtree => subtree.apply(tree, set, rng)?,
                    Operator::Guided => {
                        GuidedSubtreeMutation::new(subtree, ArityDepthLikelihood).apply(tree, set, rng)?
                    }
                    Operator::LevelExp => {
                        GuidedSubtreeMutation::new(subtree, LevelExpLikelihood::new(self.level_exp_base))
                            .apply(tree, set, rng)?
                    }
                    Operator::NodeWise => 0,
                };
                true
            } else {
                false
            };
            changed |= fired;
            if !self.multi {
                break;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::fixtures::{binary_set, int_set};
    use crate::primitive::Primitive;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn full_tree(depth: usize, rng: &mut SmallRng) -> Node<i64> {
        TreeBuilder::new(&int_set(), Strategy::Full).build(depth, rng)
    }

    fn changed_nodes(a: &Node<i64>, b: &Node<i64>) -> usize {
        let (ea, eb) = (a.enumerate(), b.enumerate());
        ea.nodes
            .iter()
            .zip(&eb.nodes)
            .filter(|(x, y)| x.value() != y.value())
            .count()
    }

    #[test]
    fn test_height_budget() {
        assert_eq!(HeightBudget::DepthOnly.limit(6, 2, 3), Ok(4));
        assert_eq!(HeightBudget::DepthAndHeight.limit(6, 2, 3), Ok(1));
        assert_eq!(HeightBudget::DepthAndHeight.limit(6, 4, 3), Ok(0));
        assert!(matches!(
            HeightBudget::DepthOnly.limit(3, 4, 0),
            Err(InvariantError::DepthExceeded { .. })
        ));
    }

    #[test]
    fn test_single_node_keeps_shape() {
        let mut rng = SmallRng::seed_from_u64(42);
        let set = int_set();
        for _ in 0..200 {
            let original = full_tree(3, &mut rng);
            let mut tree = original.clone();
            assert_eq!(SingleNodeMutation.apply(&mut tree, &set, &mut rng), Ok(1));
            assert_eq!(tree.shape(), original.shape());
            assert!(changed_nodes(&original, &tree) <= 1);
            assert!(tree.compile().is_ok());
        }
    }

    #[test]
    fn test_node_wise_p_zero_changes_nothing() {
        let mut rng = SmallRng::seed_from_u64(42);
        let set = int_set();
        let original = full_tree(4, &mut rng);
        let mut tree = original.clone();
        let count = NodeWiseMutation::new(0.0)
            .unwrap()
            .apply(&mut tree, &set, &mut rng)
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(tree, original);
    }

    #[test]
    fn test_node_wise_p_one_changes_every_node() {
        let mut rng = SmallRng::seed_from_u64(42);
        let set = int_set();
        let original = full_tree(4, &mut rng);
        let mut tree = original.clone();
        let count = NodeWiseMutation::new(1.0)
            .unwrap()
            .apply(&mut tree, &set, &mut rng)
            .unwrap();
        assert_eq!(count, original.size());
        assert_eq!(tree.shape(), original.shape());
        assert!(tree.compile().is_ok());
    }

    #[test]
    fn test_node_wise_rejects_bad_probability() {
        assert!(NodeWiseMutation::new(1.5).is_err());
    }

    #[test]
    fn test_subtree_respects_max_depth() {
        let mut rng = SmallRng::seed_from_u64(42);
        let set = int_set();
        for budget in [HeightBudget::DepthOnly, HeightBudget::DepthAndHeight] {
            let op = SubtreeMutation::new(5)
                .with_budget(budget)
                .with_strategy(Strategy::Full);
            let mut tree = full_tree(3, &mut rng);
            for _ in 0..300 {
                op.apply(&mut tree, &set, &mut rng).unwrap();
                assert!(tree.depth() <= 5);
                assert!(tree.compile().is_ok());
            }
        }
    }

    #[test]
    fn test_subtree_depth_only_can_fill_slot() {
        let mut rng = SmallRng::seed_from_u64(1);
        let set = binary_set();
        let op = SubtreeMutation::new(4).with_strategy(Strategy::Full);
        let mut reached = false;
        for _ in 0..100 {
            let mut tree = TreeBuilder::new(&set, Strategy::Full).build(1, &mut rng);
            op.apply(&mut tree, &set, &mut rng).unwrap();
            reached |= tree.depth() == 4;
        }
        assert!(reached);
    }

    #[test]
    fn test_guided_respects_max_depth() {
        let mut rng = SmallRng::seed_from_u64(42);
        let set = int_set();
        let op = GuidedSubtreeMutation::new(SubtreeMutation::new(6), ArityDepthLikelihood);
        let mut tree = full_tree(4, &mut rng);
        for _ in 0..300 {
            op.apply(&mut tree, &set, &mut rng).unwrap();
            assert!(tree.depth() <= 6);
        }
    }

    #[test]
    fn test_level_exp_respects_max_depth() {
        let mut rng = SmallRng::seed_from_u64(42);
        let set = int_set();
        for budget in [HeightBudget::DepthOnly, HeightBudget::DepthAndHeight] {
            let op = GuidedSubtreeMutation::new(
                SubtreeMutation::new(5).with_budget(budget),
                LevelExpLikelihood::new(2.0),
            );
            let mut tree = full_tree(3, &mut rng);
            for _ in 0..300 {
                op.apply(&mut tree, &set, &mut rng).unwrap();
                assert!(tree.depth() <= 5);
                assert!(tree.compile().is_ok());
            }
        }
    }

    /// Full binary tree of depth 2 whose nodes are named `n0..n6` in
    /// pre-order; none of these names are in `binary_set`.
    fn labelled_tree() -> Node<i64> {
        let leaf = |i: usize| Node::leaf(Primitive::terminal(format!("n{i}"), 0));
        let node = |i: usize, l, r| {
            Node::new(Primitive::functional(format!("n{i}"), 2, |a: &[i64]| a[0]), vec![l, r])
        };
        node(0, node(1, leaf(2), leaf(3)), node(4, leaf(5), leaf(6)))
    }

    fn first_difference(a: &Node<i64>, b: &Node<i64>) -> Option<usize> {
        let (ea, eb) = (a.enumerate(), b.enumerate());
        ea.nodes
            .iter()
            .zip(&eb.nodes)
            .position(|(x, y)| x.value().name() != y.value().name())
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn test_guided_uniform_replaces_each_node_equally() {
        let mut rng = SmallRng::seed_from_u64(9);
        let set = binary_set();
        let op = GuidedSubtreeMutation::new(SubtreeMutation::new(4), UniformLikelihood);
        let original = labelled_tree();
        let size = original.size();

        let draws = 70_000;
        let mut counts = vec![0usize; size];
        for _ in 0..draws {
            let mut tree = original.clone();
            op.apply(&mut tree, &set, &mut rng).unwrap();
            counts[first_difference(&original, &tree).unwrap()] += 1;
        }
        let expected = 1.0 / size as f64;
        for c in counts {
            assert!((c as f64 / draws as f64 - expected).abs() < 0.01);
        }
    }

    #[test]
    fn test_subtree_uses_half_grow_flavour() {
        let mut rng = SmallRng::seed_from_u64(4);
        let set = binary_set();
        let op = SubtreeMutation::new(3)
            .with_strategy(Strategy::HalfAndHalf)
            .with_half_grow(GrowFlavor::Grow);
        assert_eq!(op.half_grow, GrowFlavor::Grow);
        for _ in 0..200 {
            let mut tree = Node::leaf(set.terminals()[0].clone());
            op.apply(&mut tree, &set, &mut rng).unwrap();
            assert!(tree.depth() <= 3);
        }

        let policy = MutationPolicy {
            single: false,
            subtree: true,
            half_grow: GrowFlavor::Grow,
            ..MutationPolicy::default()
        };
        let mut tree = Node::leaf(set.terminals()[0].clone());
        assert!(policy.apply(&mut tree, &set, 3, 1.0, &mut rng).unwrap());
        assert!(tree.depth() <= 3);
    }

    #[test]
    fn test_policy_rejects_bad_level_exp_base() {
        let policy = MutationPolicy {
            level_exp: true,
            level_exp_base: 0.0,
            ..MutationPolicy::default()
        };
        assert_eq!(policy.validate(), Err(ParamError::LevelExpBase(0.0)));
        let policy = MutationPolicy {
            level_exp_base: f64::NAN,
            ..policy
        };
        assert!(matches!(policy.validate(), Err(ParamError::LevelExpBase(_))));
        let disabled = MutationPolicy {
            level_exp_base: 0.0,
            ..MutationPolicy::default()
        };
        assert!(disabled.validate().is_ok());
    }

    #[test]
    fn test_policy_validate() {
        let none = MutationPolicy {
            single: false,
            node_wise: false,
            subtree: false,
            guided: false,
            ..MutationPolicy::default()
        };
        assert_eq!(none.validate(), Err(ParamError::NoMutationOperator));
        assert!(MutationPolicy::default().validate().is_ok());
    }

    #[test]
    fn test_policy_probability_extremes() {
        let mut rng = SmallRng::seed_from_u64(42);
        let set = int_set();
        let policy = MutationPolicy {
            node_wise: true,
            guided: true,
            level_exp: true,
            multi: true,
            ..MutationPolicy::default()
        };
        let original = full_tree(3, &mut rng);

        let mut tree = original.clone();
        assert!(!policy.apply(&mut tree, &set, 5, 0.0, &mut rng).unwrap());
        assert_eq!(tree, original);

        for _ in 0..50 {
            let mut tree = original.clone();
            assert!(policy.apply(&mut tree, &set, 5, 1.0, &mut rng).unwrap());
            assert!(tree.depth() <= 5);
        }
    }
}
