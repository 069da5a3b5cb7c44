//! The per-generation Select → Crossover → Mutate → Collect pipeline.
//!
//! ```text
//!                       ┌─ Crossover ─ Mutate ─ fwd ─┐
//!  Select ─▶ [queue] ──┼─ Crossover ─ Mutate ─ fwd ─┼─▶ [fan-in] ─▶ Collect
//!                       └─ Crossover ─ Mutate ─ fwd ─┘
//!                              `width` lanes         WaitGroup closes fan-in
//! ```
//!
//! Every stage is a scoped thread joined by bounded channels. A stage closes
//! its output by dropping its sender once its input is drained. Lanes share
//! the Select queue, so each lane sees a disjoint share of the selected
//! individuals. The fan-in channel closes only after a barrier over all
//! forwarders.
//!
//! Each stage owns its own RNG, seeded from the run seed, the generation,
//! the lane and the stage.
//!
//! A stage that fails returns its error and drops its channel ends. Stages
//! downstream see their input close and stages upstream see their sends
//! fail, so every thread finishes and the coordinator reports the first
//! error.

use crate::crossover::OnePointCrossover;
use crate::error::{GpError, GpResult, ParamError, check_probability};
use crate::individual::{Individual, Objective, Problem};
use crate::mutation::MutationPolicy;
use crate::population::Population;
use crate::primitive::PrimitiveSet;
use crate::selection::Selector;
use crossbeam::channel::{Receiver, Sender, bounded};
use crossbeam::sync::WaitGroup;
use crossbeam::thread::{self, ScopedJoinHandle};
use log::debug;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of parallel Crossover → Mutate lanes.
    pub width: usize,
    /// Capacity of the per-lane and fan-in queues.
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            width: 4,
            queue_capacity: 1,
        }
    }
}

impl PipelineConfig {
    /// Check the topology.
    ///
    /// # Errors
    ///
    /// Returns [`ParamError::PipelineWidth`] for zero lanes.
    pub fn validate(&self) -> Result<(), ParamError> {
        if self.width < 1 {
            return Err(ParamError::PipelineWidth(self.width));
        }
        Ok(())
    }
}

/// An individual in flight, with its fitness after each stage.
#[derive(Clone)]
pub struct PipelineIndividual<V> {
    /// The individual being transformed.
    pub individual: Individual<V>,
    /// Fitness when selected.
    pub initial_fitness: f64,
    /// Fitness after crossover.
    pub crossover_fitness: f64,
    /// Fitness after mutation.
    pub mutation_fitness: f64,
}

impl<V> PipelineIndividual<V> {
    fn selected(individual: Individual<V>, fitness: f64) -> Self {
        Self {
            individual,
            initial_fitness: fitness,
            crossover_fitness: fitness,
            mutation_fitness: fitness,
        }
    }

    /// True if crossover produced a strictly better fitness.
    #[must_use]
    pub fn crossover_improved(&self, objective: Objective) -> bool {
        objective.better(self.crossover_fitness, self.initial_fitness)
    }

    /// True if mutation produced a strictly better fitness.
    #[must_use]
    pub fn mutation_improved(&self, objective: Objective) -> bool {
        objective.better(self.mutation_fitness, self.crossover_fitness)
    }
}

impl<V> fmt::Debug for PipelineIndividual<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineIndividual")
            .field("individual", &self.individual)
            .field("initial_fitness", &self.initial_fitness)
            .field("crossover_fitness", &self.crossover_fitness)
            .field("mutation_fitness", &self.mutation_fitness)
            .finish()
    }
}

/// Everything a generation needs, shared read-only by all stages.
pub struct Pipeline<'a, V, P, S> {
    /// Primitive vocabulary for mutation.
    pub set: &'a PrimitiveSet<V>,
    /// Fitness boundary.
    pub problem: &'a P,
    /// Selection policy.
    pub selector: &'a S,
    /// Crossover operator.
    pub crossover: OnePointCrossover,
    /// Enabled mutation operators.
    pub mutation: MutationPolicy,
    /// Depth bound for mutation.
    pub max_depth: usize,
    /// Probability that a pair is crossed over.
    pub p_cross: f64,
    /// Mutation probability.
    pub p_mut: f64,
    /// Topology.
    pub config: PipelineConfig,
    /// Run seed.
    pub seed: u64,
}

impl<V, P, S> fmt::Debug for Pipeline<'_, V, P, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("crossover", &self.crossover)
            .field("mutation", &self.mutation)
            .field("max_depth", &self.max_depth)
            .field("p_cross", &self.p_cross)
            .field("p_mut", &self.p_mut)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

const SELECT: u64 = 0;
const CROSSOVER: u64 = 1;
const MUTATE: u64 = 2;

type StageHandle<'scope> = (&'static str, ScopedJoinHandle<'scope, GpResult<()>>);

impl<V, P, S> Pipeline<'_, V, P, S>
where
    V: Clone + Send + Sync,
    P: Problem<V>,
    S: Selector,
{
    /// Run one generation over `population`.
    ///
    /// Returns exactly `selection_size` records, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns [`GpError::Param`] before any thread starts if the selection,
    /// topology, probabilities or mutation policy are invalid; otherwise the first error raised by a stage,
    /// [`GpError::StagePanicked`] for a panicking stage, or
    /// [`GpError::IncompleteGeneration`] if records went missing.
    pub fn run(
        &self,
        population: &Population<V>,
        selection_size: usize,
        generation: u64,
    ) -> GpResult<Vec<PipelineIndividual<V>>> {
        self.config.validate()?;
        check_probability("p_cross", self.p_cross)?;
        check_probability("p_mut", self.p_mut)?;
        self.mutation.validate()?;
        let mut select_rng = stage_rng(self.seed, generation, 0, SELECT);
        let chosen = self.selector.select(
            &population.fitness(),
            selection_size,
            population.objective(),
            &mut select_rng,
        )?;

        let width = self.config.width;
        let capacity = self.config.queue_capacity.max(1);
        let (select_tx, select_rx) = bounded(selection_size);
        let (fan_tx, fan_rx) = bounded(capacity);
        let barrier = WaitGroup::new();

        let outcome = thread::scope(|scope| {
            let mut handles: Vec<StageHandle<'_>> = Vec::with_capacity(3 * width + 1);

            let individuals = population.individuals();
            handles.push((
                "select",
                scope.spawn(move |_| self.select_stage(individuals, &chosen, &select_tx)),
            ));

            for lane in 0..width {
                let (cross_tx, cross_rx) = bounded(capacity);
                let (mut_tx, mut_rx) = bounded(capacity);
                let input = select_rx.clone();
                let mut cross_rng = stage_rng(self.seed, generation, lane as u64, CROSSOVER);
                let mut mut_rng = stage_rng(self.seed, generation, lane as u64, MUTATE);

                handles.push((
                    "crossover",
                    scope.spawn(move |_| self.crossover_stage(lane, &input, &cross_tx, &mut cross_rng)),
                ));
                handles.push((
                    "mutate",
                    scope.spawn(move |_| self.mutate_stage(lane, &cross_rx, &mut_tx, &mut mut_rng)),
                ));

                let out = fan_tx.clone();
                let done = barrier.clone();
                handles.push((
                    "fan-in",
                    scope.spawn(move |_| {
                        for record in &mut_rx {
                            if out.send(record).is_err() {
                                break;
                            }
                        }
                        drop(out);
                        drop(done);
                        Ok(())
                    }),
                ));
            }
            drop(select_rx);

            handles.push((
                "fan-in closer",
                scope.spawn(move |_| {
                    barrier.wait();
                    drop(fan_tx);
                    Ok(())
                }),
            ));

            let records: Vec<PipelineIndividual<V>> = fan_rx.iter().collect();

            let mut first_error = None;
            for (stage, handle) in handles {
                let result = handle
                    .join()
                    .unwrap_or(Err(GpError::StagePanicked { stage }));
                if let Err(e) = result {
                    first_error.get_or_insert(e);
                }
            }
            match first_error {
                Some(e) => Err(e),
                None => Ok(records),
            }
        })
        .unwrap_or(Err(GpError::StagePanicked { stage: "pipeline" }))?;

        if outcome.len() != selection_size {
            return Err(GpError::IncompleteGeneration {
                expected: selection_size,
                collected: outcome.len(),
            });
        }
        Ok(outcome)
    }

    /// Deep-copy the chosen individuals and emit them with their fitness.
    fn select_stage(
        &self,
        individuals: &[Individual<V>],
        chosen: &[usize],
        output: &Sender<PipelineIndividual<V>>,
    ) -> GpResult<()> {
        let mut canvas = self.problem.canvas();
        for &i in chosen {
            let mut individual = individuals[i].clone();
            let fitness = individual.evaluate(self.problem, &mut canvas)?;
            if output.send(PipelineIndividual::selected(individual, fitness)).is_err() {
                break;
            }
        }
        debug!("select: emitted {} individuals", chosen.len());
        Ok(())
    }

    /// Cross over consecutive pairs with probability `p_cross`.
    fn crossover_stage(
        &self,
        lane: usize,
        input: &Receiver<PipelineIndividual<V>>,
        output: &Sender<PipelineIndividual<V>>,
        rng: &mut SmallRng,
    ) -> GpResult<()> {
        let mut canvas = self.problem.canvas();
        let mut seen = 0usize;
        while let Ok(mut first) = input.recv() {
            let Ok(mut second) = input.recv() else {
                seen += 1;
                first.crossover_fitness = first.initial_fitness;
                let _ = output.send(first);
                break;
            };
            seen += 2;

            if rng.r#gen::<f64>() < self.p_cross {
                self.crossover.apply(
                    first.individual.tree_mut(),
                    second.individual.tree_mut(),
                    rng,
                )?;
            }
            for record in [&mut first, &mut second] {
                record.crossover_fitness = record.individual.evaluate(self.problem, &mut canvas)?;
            }

            if output.send(first).is_err() || output.send(second).is_err() {
                break;
            }
        }
        debug!("lane {lane}: crossover saw {seen} individuals");
        Ok(())
    }

    /// Mutate each individual under the policy and re-evaluate if it changed.
    fn mutate_stage(
        &self,
        lane: usize,
        input: &Receiver<PipelineIndividual<V>>,
        output: &Sender<PipelineIndividual<V>>,
        rng: &mut SmallRng,
    ) -> GpResult<()> {
        let mut canvas = self.problem.canvas();
        let mut mutated = 0usize;
        for mut record in input {
            let changed = record.individual.modify(|tree| {
                self.mutation
                    .apply(tree, self.set, self.max_depth, self.p_mut, &mut *rng)
            })?;
            mutated += usize::from(changed);
            record.mutation_fitness = record.individual.evaluate(self.problem, &mut canvas)?;
            if output.send(record).is_err() {
                break;
            }
        }
        debug!("lane {lane}: mutated {mutated} individuals");
        Ok(())
    }
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// RNG for one stage thread.
fn stage_rng(seed: u64, generation: u64, lane: u64, stage: u64) -> SmallRng {
    let mixed = [generation, lane, stage]
        .into_iter()
        .fold(splitmix64(seed), |h, v| splitmix64(h ^ v));
    SmallRng::seed_from_u64(mixed)
}
