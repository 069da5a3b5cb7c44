//! Selection operators.
//!
//! Selection works on a fitness slice and returns population indices, so it
//! never touches the trees. Tournament selection is the default policy.

// Selection uses intentional casts for statistics
#![allow(clippy::cast_precision_loss)]

use crate::error::ParamError;
use crate::individual::Objective;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Picks individuals for the next generation.
pub trait Selector: Send + Sync {
    /// Choose `count` indices into `fitness`, with repetition.
    ///
    /// # Errors
    ///
    /// Returns a [`ParamError`] if `count` is zero, if the population is
    /// empty, or if the selector's own settings are invalid.
    fn select<R: Rng>(
        &self,
        fitness: &[f64],
        count: usize,
        objective: Objective,
        rng: &mut R,
    ) -> Result<Vec<usize>, ParamError>;
}

/// Tournament selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tournament {
    /// Number of individuals competing in each tournament.
    pub size: usize,
}

impl Default for Tournament {
    fn default() -> Self {
        Self { size: 3 }
    }
}

impl Tournament {
    /// Tournament with `size` contestants.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self { size }
    }
}

impl Selector for Tournament {
    fn select<R: Rng>(
        &self,
        fitness: &[f64],
        count: usize,
        objective: Objective,
        rng: &mut R,
    ) -> Result<Vec<usize>, ParamError> {
        if count < 1 {
            return Err(ParamError::SelectionSize(count));
        }
        if self.size < 1 {
            return Err(ParamError::TournamentSize(self.size));
        }
        if fitness.is_empty() {
            return Err(ParamError::PopulationSize(0));
        }
        Ok((0..count)
            .map(|_| tournament_select(fitness, self.size, objective, rng))
            .collect())
    }
}

/// Tournament selection: draw `k` individuals with replacement and return
/// the best.
fn tournament_select<R: Rng>(fitness: &[f64], k: usize, objective: Objective, rng: &mut R) -> usize {
    let pop_size = fitness.len();
    let mut best_idx = rng.gen_range(0..pop_size);

    for _ in 1..k {
        let idx = rng.gen_range(0..pop_size);
        if objective.better(fitness[idx], fitness[best_idx]) {
            best_idx = idx;
        }
    }

    best_idx
}

/// Index of the best fitness, first one on ties.
#[must_use]
pub fn best_index(fitness: &[f64], objective: Objective) -> Option<usize> {
    (0..fitness.len()).reduce(|best, i| {
        if objective.better(fitness[i], fitness[best]) {
            i
        } else {
            best
        }
    })
}

/// Index of the worst fitness, first one on ties.
#[must_use]
pub fn worst_index(fitness: &[f64], objective: Objective) -> Option<usize> {
    (0..fitness.len()).reduce(|worst, i| {
        if objective.better(fitness[worst], fitness[i]) {
            i
        } else {
            worst
        }
    })
}

/// Fitness summary of a population.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitnessStats {
    /// Mean of the finite fitness values.
    pub mean: f64,
    /// Best fitness under the objective.
    pub best: f64,
    /// Worst fitness under the objective.
    pub worst: f64,
    /// Standard deviation of the finite fitness values.
    pub std: f64,
}

impl FitnessStats {
    /// Calculate statistics from fitness values.
    ///
    /// Infinite values, which stand for failed evaluations, count toward
    /// best and worst but not toward mean and standard deviation.
    #[must_use]
    pub fn from_fitness(fitness: &[f64], objective: Objective) -> Self {
        let (Some(b), Some(w)) = (best_index(fitness, objective), worst_index(fitness, objective)) else {
            return Self {
                mean: 0.0,
                best: 0.0,
                worst: 0.0,
                std: 0.0,
            };
        };

        let finite: Vec<f64> = fitness.iter().copied().filter(|f| f.is_finite()).collect();
        let (mean, std) = if finite.is_empty() {
            (f64::NAN, f64::NAN)
        } else {
            let n = finite.len() as f64;
            let mean = finite.iter().sum::<f64>() / n;
            let variance = finite.iter().map(|f| (f - mean).powi(2)).sum::<f64>() / n;
            (mean, variance.sqrt())
        };

        Self {
            mean,
            best: fitness[b],
            worst: fitness[w],
            std,
        }
    }
}
