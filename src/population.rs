//! A generation of individuals.
//!
//! Initialization builds the trees with [`TreeBuilder`]; evaluation of stale
//! individuals runs in parallel with rayon, one canvas per worker.

use crate::builder::{InitConfig, TreeBuilder};
use crate::error::{InvariantError, ParamError};
use crate::individual::{Individual, Objective, Problem};
use crate::primitive::PrimitiveSet;
use crate::selection::{FitnessStats, best_index, worst_index};
use rand::Rng;
use rayon::prelude::*;
use std::fmt;

/// Individuals plus the direction they are ranked in.
#[derive(Clone)]
pub struct Population<V> {
    individuals: Vec<Individual<V>>,
    objective: Objective,
}

impl<V> fmt::Debug for Population<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Population")
            .field("len", &self.individuals.len())
            .field("objective", &self.objective)
            .finish_non_exhaustive()
    }
}

impl<V: Clone> Population<V> {
    /// Build `size` random trees no deeper than `max_depth`.
    ///
    /// # Errors
    ///
    /// Returns [`ParamError::PopulationSize`] for an empty population.
    pub fn initialize<R: Rng>(
        set: &PrimitiveSet<V>,
        init: &InitConfig,
        size: usize,
        max_depth: usize,
        objective: Objective,
        rng: &mut R,
    ) -> Result<Self, ParamError> {
        if size < 1 {
            return Err(ParamError::PopulationSize(size));
        }
        let trees = TreeBuilder::from_config(set, init).build_many(size, max_depth, init.ramped, rng);
        Ok(Self::new(trees.into_iter().map(Individual::new).collect(), objective))
    }
}

impl<V> Population<V> {
    /// Wrap existing individuals.
    #[must_use]
    pub fn new(individuals: Vec<Individual<V>>, objective: Objective) -> Self {
        Self {
            individuals,
            objective,
        }
    }

    /// The ranking direction.
    #[must_use]
    pub fn objective(&self) -> Objective {
        self.objective
    }

    /// The individuals.
    #[must_use]
    pub fn individuals(&self) -> &[Individual<V>] {
        &self.individuals
    }

    /// Take the individuals out.
    #[must_use]
    pub fn into_individuals(self) -> Vec<Individual<V>> {
        self.individuals
    }

    /// Number of individuals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    /// True if there are no individuals.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    /// Ranking fitness of every individual; stale ones rank worst.
    #[must_use]
    pub fn fitness(&self) -> Vec<f64> {
        self.individuals
            .iter()
            .map(|ind| ind.rank_fitness(self.objective))
            .collect()
    }

    /// The best individual.
    #[must_use]
    pub fn best(&self) -> Option<&Individual<V>> {
        best_index(&self.fitness(), self.objective).map(|i| &self.individuals[i])
    }

    /// Overwrite the worst individual with `elite`.
    pub fn replace_worst(&mut self, elite: Individual<V>) {
        if let Some(i) = worst_index(&self.fitness(), self.objective) {
            self.individuals[i] = elite;
        }
    }

    /// Fitness summary.
    #[must_use]
    pub fn stats(&self) -> FitnessStats {
        FitnessStats::from_fitness(&self.fitness(), self.objective)
    }

    /// Mean tree size and mean tree depth.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_shape(&self) -> (f64, f64) {
        if self.individuals.is_empty() {
            return (0.0, 0.0);
        }
        let n = self.individuals.len() as f64;
        let (size, depth) = self
            .individuals
            .iter()
            .fold((0usize, 0usize), |(s, d), ind| (s + ind.tree().size(), d + ind.tree().depth()));
        (size as f64 / n, depth as f64 / n)
    }
}

impl<V: Send + Sync> Population<V> {
    /// Evaluate every stale individual in parallel.
    ///
    /// Returns how many individuals were evaluated.
    ///
    /// # Errors
    ///
    /// Returns the first [`InvariantError`] raised while drawing a tree.
    pub fn evaluate<P: Problem<V>>(&mut self, problem: &P) -> Result<usize, InvariantError> {
        let stale = self.individuals.iter().filter(|ind| !ind.is_valid()).count();
        self.individuals
            .par_iter_mut()
            .filter(|ind| !ind.is_valid())
            .try_for_each_init(
                || problem.canvas(),
                |canvas, ind| ind.evaluate(problem, canvas).map(|_| ()),
            )?;
        Ok(stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Strategy;
    use crate::individual::fixtures::Distance;
    use crate::primitive::fixtures::int_set;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn problem() -> Distance {
        Distance {
            target: 7,
            objective: Objective::Minimize,
        }
    }

    #[test]
    fn test_initialize_ramped() {
        let mut rng = SmallRng::seed_from_u64(42);
        let set = int_set();
        let init = InitConfig {
            strategy: Strategy::Full,
            ramped: true,
            ..InitConfig::default()
        };
        let pop = Population::initialize(&set, &init, 20, 4, Objective::Minimize, &mut rng).unwrap();
        assert_eq!(pop.len(), 20);
        for depth in 1..=4 {
            assert!(pop.individuals().iter().any(|i| i.tree().depth() == depth));
        }
    }

    #[test]
    fn test_initialize_rejects_empty() {
        let mut rng = SmallRng::seed_from_u64(42);
        let result = Population::initialize(
            &int_set(),
            &InitConfig::default(),
            0,
            4,
            Objective::Minimize,
            &mut rng,
        );
        assert_eq!(result.err(), Some(ParamError::PopulationSize(0)));
    }

    #[test]
    fn test_evaluate_only_stale() {
        let mut rng = SmallRng::seed_from_u64(42);
        let set = int_set();
        let mut pop =
            Population::initialize(&set, &InitConfig::default(), 50, 4, Objective::Minimize, &mut rng)
                .unwrap();
        let problem = problem();
        assert_eq!(pop.evaluate(&problem).unwrap(), 50);
        assert!(pop.individuals().iter().all(Individual::is_valid));
        assert_eq!(pop.evaluate(&problem).unwrap(), 0);
    }

    #[test]
    fn test_best_and_replace_worst() {
        let mut rng = SmallRng::seed_from_u64(3);
        let set = int_set();
        let mut pop =
            Population::initialize(&set, &InitConfig::default(), 30, 3, Objective::Minimize, &mut rng)
                .unwrap();
        pop.evaluate(&problem()).unwrap();

        let best = pop.best().unwrap().clone();
        let best_fit = best.fitness().unwrap();
        assert!(pop.fitness().iter().all(|&f| f >= best_fit));

        let worst_before = pop.stats().worst;
        pop.replace_worst(best);
        assert_eq!(pop.len(), 30);
        assert!(pop.stats().worst <= worst_before);
    }
}
