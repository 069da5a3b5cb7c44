//! Individuals and the problem boundary.
//!
//! An [`Individual`] owns one tree and caches its fitness. A [`Problem`]
//! turns a tree into a fitness value in two steps: draw the tree onto a
//! canvas, then score the canvas. The engine never looks inside the canvas.

use crate::error::InvariantError;
use crate::tree::Node;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Lower fitness is better.
    #[default]
    Minimize,
    /// Higher fitness is better.
    Maximize,
}

impl Objective {
    /// True if `a` is strictly better than `b`.
    #[must_use]
    pub fn better(self, a: f64, b: f64) -> bool {
        match self {
            Self::Minimize => a < b,
            Self::Maximize => a > b,
        }
    }

    /// The worst possible fitness.
    #[must_use]
    pub fn worst(self) -> f64 {
        match self {
            Self::Minimize => f64::INFINITY,
            Self::Maximize => f64::NEG_INFINITY,
        }
    }
}

/// Draws trees onto a canvas and scores canvases.
///
/// Implementations are shared by reference across pipeline threads; each
/// thread works on its own canvas.
pub trait Problem<V>: Sync {
    /// Per-thread scratch space a tree is drawn onto.
    type Canvas: Send;

    /// A fresh canvas.
    fn canvas(&self) -> Self::Canvas;

    /// Render `tree` onto `canvas`.
    ///
    /// # Errors
    ///
    /// Returns an [`InvariantError`] if the tree cannot be compiled.
    fn draw(&self, tree: &Node<V>, canvas: &mut Self::Canvas) -> Result<(), InvariantError>;

    /// Score a drawn canvas.
    fn evaluate(&self, canvas: &Self::Canvas) -> f64;

    /// Optimization direction.
    fn objective(&self) -> Objective {
        Objective::Minimize
    }

    /// Draw then evaluate. NaN scores become the worst fitness.
    ///
    /// # Errors
    ///
    /// See [`Problem::draw`].
    fn fitness(&self, tree: &Node<V>, canvas: &mut Self::Canvas) -> Result<f64, InvariantError> {
        self.draw(tree, canvas)?;
        let fitness = self.evaluate(canvas);
        Ok(if fitness.is_nan() {
            self.objective().worst()
        } else {
            fitness
        })
    }
}

/// A tree with a cached fitness.
#[derive(Clone)]
pub struct Individual<V> {
    tree: Node<V>,
    fitness: f64,
    valid: bool,
}

impl<V> fmt::Debug for Individual<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Individual")
            .field("tree", &format_args!("{}", self.tree))
            .field("fitness", &self.fitness())
            .finish()
    }
}

impl<V> Individual<V> {
    /// Wrap a tree. The fitness starts invalid.
    #[must_use]
    pub fn new(tree: Node<V>) -> Self {
        Self {
            tree,
            fitness: f64::NAN,
            valid: false,
        }
    }

    /// The tree.
    #[must_use]
    pub fn tree(&self) -> &Node<V> {
        &self.tree
    }

    /// Mutable tree access. Invalidates the cached fitness.
    pub fn tree_mut(&mut self) -> &mut Node<V> {
        self.valid = false;
        &mut self.tree
    }

    /// Run `edit` on the tree and invalidate the fitness only if it reports a
    /// change.
    ///
    /// # Errors
    ///
    /// Returns whatever `edit` returns; the fitness is left untouched then.
    pub fn modify<E, F>(&mut self, edit: F) -> Result<bool, E>
    where
        F: FnOnce(&mut Node<V>) -> Result<bool, E>,
    {
        let changed = edit(&mut self.tree)?;
        if changed {
            self.valid = false;
        }
        Ok(changed)
    }

    /// Unwrap the tree.
    #[must_use]
    pub fn into_tree(self) -> Node<V> {
        self.tree
    }

    /// Cached fitness, if valid.
    #[must_use]
    pub fn fitness(&self) -> Option<f64> {
        self.valid.then_some(self.fitness)
    }

    /// True if the cached fitness reflects the tree.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Mark the cached fitness stale.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Evaluate the tree if its fitness is stale, and return the fitness.
    ///
    /// # Errors
    ///
    /// See [`Problem::draw`].
    pub fn evaluate<P>(&mut self, problem: &P, canvas: &mut P::Canvas) -> Result<f64, InvariantError>
    where
        P: Problem<V> + ?Sized,
    {
        if !self.valid {
            self.fitness = problem.fitness(&self.tree, canvas)?;
            self.valid = true;
        }
        Ok(self.fitness)
    }

    /// Fitness for ranking: the cached value, or the worst under `objective`
    /// when stale.
    #[must_use]
    pub fn rank_fitness(&self, objective: Objective) -> f64 {
        self.fitness().unwrap_or_else(|| objective.worst())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::{Objective, Problem};
    use crate::error::InvariantError;
    use crate::tree::Node;

    /// Fitness is the distance between the compiled value and `target`.
    #[derive(Debug)]
    pub(crate) struct Distance {
        pub(crate) target: i64,
        pub(crate) objective: Objective,
    }

    impl Problem<i64> for Distance {
        type Canvas = i64;

        fn canvas(&self) -> i64 {
            0
        }

        fn draw(&self, tree: &Node<i64>, canvas: &mut i64) -> Result<(), InvariantError> {
            *canvas = tree.compile()?;
            Ok(())
        }

        #[allow(clippy::cast_precision_loss)]
        fn evaluate(&self, canvas: &i64) -> f64 {
            canvas.abs_diff(self.target) as f64
        }

        fn objective(&self) -> Objective {
            self.objective
        }
    }
}
