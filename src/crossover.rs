//! Depth-bounded one-point crossover.
//!
//! Picks a node in the first tree, then a node in the second tree whose
//! subtree fits in the first tree's slot and vice versa, and exchanges the
//! two subtrees in place. Neither offspring can exceed the depth bound.

use crate::error::InvariantError;
use crate::tree::Node;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// One-point subtree crossover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnePointCrossover {
    /// Depth bound for both offspring. `None` disables the bound.
    pub max_depth: Option<usize>,
}

impl OnePointCrossover {
    /// Crossover bounded at `max_depth`.
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth: Some(max_depth),
        }
    }

    /// Crossover with no depth bound.
    #[must_use]
    pub fn unbounded() -> Self {
        Self { max_depth: None }
    }

    /// Exchange a random subtree of `t1` with a compatible one of `t2`.
    ///
    /// Returns the pre-order indices `(rn1, rn2)` that were swapped.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantError::DepthExceeded`] if a parent is already deeper
    /// than the bound, and [`InvariantError::NoCrossoverCandidate`] if no node
    /// of `t2` fits. Both mean an earlier operator broke the bound.
    pub fn apply<V, R: Rng>(
        &self,
        t1: &mut Node<V>,
        t2: &mut Node<V>,
        rng: &mut R,
    ) -> Result<(usize, usize), InvariantError> {
        let s1 = t1.shape();
        let s2 = t2.shape();

        let (rn1, rn2) = match self.max_depth {
            None => (rng.gen_range(0..s1.len()), rng.gen_range(0..s2.len())),
            Some(max_depth) => {
                for depth in [s1.root_height(), s2.root_height()] {
                    if depth > max_depth {
                        return Err(InvariantError::DepthExceeded {
                            operator: "crossover",
                            max_depth,
                            depth,
                        });
                    }
                }

                let rn1 = rng.gen_range(0..s1.len());
                let (d1, h1) = (s1.depths[rn1], s1.heights[rn1]);
                let candidates: Vec<usize> = (0..s2.len())
                    .filter(|&i| d1 + s2.heights[i] <= max_depth && s2.depths[i] + h1 <= max_depth)
                    .collect();
                if candidates.is_empty() {
                    return Err(InvariantError::NoCrossoverCandidate {
                        max_depth,
                        node_depth: d1,
                        node_height: h1,
                    });
                }
                (rn1, candidates[rng.gen_range(0..candidates.len())])
            }
        };

        swap_subtrees(t1, rn1, t2, rn2)?;
        Ok((rn1, rn2))
    }
}

/// Swap the subtree at pre-order `i1` of `t1` with the one at `i2` of `t2`.
fn swap_subtrees<V>(
    t1: &mut Node<V>,
    i1: usize,
    t2: &mut Node<V>,
    i2: usize,
) -> Result<(), InvariantError> {
    let (size1, size2) = (t1.size(), t2.size());
    let out_of_range = |index, size| InvariantError::NodeOutOfRange {
        operator: "crossover",
        index,
        size,
    };
    let a = t1.node_at_mut(i1).ok_or_else(|| out_of_range(i1, size1))?;
    let b = t2.node_at_mut(i2).ok_or_else(|| out_of_range(i2, size2))?;
    std::mem::swap(a, b);
    Ok(())
}
