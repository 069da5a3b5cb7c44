//! Node likelihoods and inverse-CDF sampling for guided mutation.
//!
//! A [`NodeLikelihood`] gives every pre-order node an unnormalized weight.
//! [`NodeSampler`] normalizes the weights, orders them by decreasing
//! probability, accumulates them into a CDF and draws one node index.

#![allow(clippy::cast_precision_loss)]

use crate::tree::{Enumeration, parents};
use log::warn;
use rand::Rng;

/// Assigns a selection weight to every node of a tree.
pub trait NodeLikelihood: Send + Sync {
    /// One non-negative weight per node of `tree`, in pre-order.
    fn weights<V>(&self, tree: &Enumeration<'_, V>) -> Vec<f64>;
}

/// Every node is equally likely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UniformLikelihood;

impl NodeLikelihood for UniformLikelihood {
    fn weights<V>(&self, tree: &Enumeration<'_, V>) -> Vec<f64> {
        vec![1.0; tree.len()]
    }
}

/// Internal nodes share one weight; leaves fade with the fan-out above them.
///
/// Each internal node weighs `1 / #internal`. A leaf weighs the inverse of
/// the product of its ancestors' arities, so a leaf reached through many
/// wide functionals is rarely picked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArityDepthLikelihood;

impl NodeLikelihood for ArityDepthLikelihood {
    fn weights<V>(&self, tree: &Enumeration<'_, V>) -> Vec<f64> {
        let parents = parents(&tree.depths);
        let internal = tree.nodes.iter().filter(|n| !n.is_leaf()).count();
        let internal_weight = if internal == 0 { 1.0 } else { 1.0 / internal as f64 };

        // Product of ancestor arities, filled in pre-order so parents come first.
        let mut fan_out = vec![1.0_f64; tree.len()];
        for i in 1..tree.len() {
            if let Some(p) = parents[i] {
                fan_out[i] = fan_out[p] * tree.nodes[p].children().len() as f64;
            }
        }

        tree.nodes
            .iter()
            .zip(&fan_out)
            .map(|(node, &f)| if node.is_leaf() { 1.0 / f } else { internal_weight })
            .collect()
    }
}

/// Internal nodes and leaves each get half the mass.
///
/// Internal nodes share their half uniformly. Leaves share theirs in
/// proportion to `exp^-depth`, so with `exp > 1` shallow leaves are picked
/// more often. A lone leaf takes all the mass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelExpLikelihood {
    /// Base of the per-level decay of leaf weights.
    pub exp: f64,
}

impl Default for LevelExpLikelihood {
    fn default() -> Self {
        Self { exp: 2.0 }
    }
}

impl LevelExpLikelihood {
    /// Leaf weights decay by a factor of `exp` per level.
    #[must_use]
    pub fn new(exp: f64) -> Self {
        Self { exp }
    }
}

impl NodeLikelihood for LevelExpLikelihood {
    fn weights<V>(&self, tree: &Enumeration<'_, V>) -> Vec<f64> {
        let internal = tree.nodes.iter().filter(|n| !n.is_leaf()).count();
        let leaf_decay: Vec<f64> = tree
            .nodes
            .iter()
            .zip(&tree.depths)
            .map(|(node, &d)| {
                if node.is_leaf() {
                    self.exp.powi(-i32::try_from(d).unwrap_or(i32::MAX))
                } else {
                    0.0
                }
            })
            .collect();
        let leaf_total: f64 = leaf_decay.iter().sum();

        let (internal_share, leaf_share) = if internal == 0 { (0.0, 1.0) } else { (0.5, 0.5) };
        let internal_weight = if internal == 0 { 0.0 } else { internal_share / internal as f64 };

        tree.nodes
            .iter()
            .zip(&leaf_decay)
            .map(|(node, &decay)| {
                if node.is_leaf() {
                    leaf_share * decay / leaf_total
                } else {
                    internal_weight
                }
            })
            .collect()
    }
}

/// Inverse-CDF sampler over node indices.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSampler {
    cumulative: Vec<f64>,
    order: Vec<usize>,
}

impl NodeSampler {
    /// Build a sampler from unnormalized weights.
    ///
    /// Weights that are negative, NaN, infinite, or that sum to zero fall
    /// back to a uniform distribution.
    #[must_use]
    pub fn from_weights(mut weights: Vec<f64>) -> Self {
        if !normalize(&mut weights) {
            warn!(
                "degenerate node weights over {} nodes, sampling uniformly",
                weights.len()
            );
            let uniform = 1.0 / weights.len().max(1) as f64;
            weights.iter_mut().for_each(|w| *w = uniform);
        }

        let mut order: Vec<usize> = (0..weights.len()).collect();
        order.sort_by(|&a, &b| weights[b].total_cmp(&weights[a]));

        let mut total = 0.0;
        let cumulative = order
            .iter()
            .map(|&i| {
                total += weights[i];
                total
            })
            .collect();

        Self { cumulative, order }
    }

    /// Number of nodes covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True if there is nothing to sample.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Draw a pre-order node index. Returns 0 for an empty sampler.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> usize {
        let u: f64 = rng.r#gen();
        let slot = self
            .cumulative
            .iter()
            .position(|&c| u < c)
            .unwrap_or(self.order.len().saturating_sub(1));
        self.order.get(slot).copied().unwrap_or(0)
    }
}

/// Scale `weights` in place so they sum to 1.
///
/// Returns false, leaving the slice untouched, when the weights cannot form a
/// distribution.
pub fn normalize(weights: &mut [f64]) -> bool {
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return false;
    }
    let total: f64 = weights.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return false;
    }
    weights.iter_mut().for_each(|w| *w /= total);
    true
}
