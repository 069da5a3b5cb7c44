//! Main evolution loop.
//!
//! Initializes and evaluates a population, then runs the generation
//! pipeline once per generation. After each generation the loop applies
//! elitism, records statistics, logs progress, and periodically writes a
//! JSON snapshot of the best individual.

// Evolution uses intentional casts for statistics
#![allow(clippy::cast_precision_loss)]

use crate::builder::InitConfig;
use crate::crossover::OnePointCrossover;
use crate::error::{GpResult, ParamError, check_probability};
use crate::individual::{Individual, Objective, Problem};
use crate::mutation::MutationPolicy;
use crate::pipeline::{Pipeline, PipelineConfig, PipelineIndividual};
use crate::population::Population;
use crate::primitive::PrimitiveSet;
use crate::selection::{FitnessStats, Tournament};
use crate::tree::Node;
use log::{info, warn};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Configuration for the evolution process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    /// Population size, also the number selected per generation.
    pub population_size: usize,
    /// Number of generations to run.
    pub generations: usize,
    /// Number of individuals competing in each tournament.
    pub tournament_size: usize,
    /// Probability that a selected pair is crossed over.
    pub p_cross: f64,
    /// Mutation probability.
    pub p_mut: f64,
    /// Depth bound for every tree.
    pub max_depth: usize,
    /// Initial population construction.
    pub init: InitConfig,
    /// Enabled mutation operators.
    pub mutation: MutationPolicy,
    /// Pipeline topology.
    pub pipeline: PipelineConfig,
    /// Carry the best individual into the next generation.
    pub elitism: bool,
    /// Write a snapshot every N generations; 0 writes only the final one.
    pub snapshot_interval: usize,
    /// Directory for snapshots; none disables them.
    pub output_dir: Option<PathBuf>,
    /// RNG seed for reproducibility.
    pub seed: u64,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 500,
            generations: 100,
            tournament_size: 3,
            p_cross: 0.8,
            p_mut: 0.1,
            max_depth: 8,
            init: InitConfig::default(),
            mutation: MutationPolicy::default(),
            pipeline: PipelineConfig::default(),
            elitism: false,
            snapshot_interval: 25,
            output_dir: None,
            seed: 42,
        }
    }
}

impl EvolutionConfig {
    /// Check every parameter before any work starts.
    ///
    /// # Errors
    ///
    /// Returns the first invalid parameter found.
    pub fn validate(&self) -> Result<(), ParamError> {
        if self.population_size < 1 {
            return Err(ParamError::PopulationSize(self.population_size));
        }
        if self.tournament_size < 1 {
            return Err(ParamError::TournamentSize(self.tournament_size));
        }
        if self.max_depth < 1 {
            return Err(ParamError::MaxDepth(self.max_depth));
        }
        check_probability("p_cross", self.p_cross)?;
        check_probability("p_mut", self.p_mut)?;
        self.pipeline.validate()?;
        self.mutation.validate()
    }
}

/// Statistics for a single generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    /// Generation number, starting at 1.
    pub generation: usize,
    /// Fitness summary after replacement.
    pub fitness: FitnessStats,
    /// Mean number of nodes per tree.
    pub mean_size: f64,
    /// Mean tree depth.
    pub mean_depth: f64,
    /// Share of individuals that crossover made strictly better.
    pub crossover_improvement: f64,
    /// Share of individuals that mutation made strictly better.
    pub mutation_improvement: f64,
}

/// Overall statistics from an evolution run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionStats {
    /// Statistics per generation.
    pub generations: Vec<GenerationStats>,
    /// Best fitness achieved.
    pub best_fitness: f64,
    /// Generation where best fitness was achieved; 0 is the initial population.
    pub best_generation: usize,
    /// Total time in seconds.
    pub elapsed_seconds: f64,
}

/// JSON record of the best individual at some generation.
#[derive(Debug, Serialize)]
#[serde(bound = "")]
pub struct Snapshot<'a, V> {
    /// Generation the snapshot was taken at.
    pub generation: usize,
    /// Fitness of the tree.
    pub fitness: f64,
    /// Number of nodes.
    pub size: usize,
    /// Tree depth.
    pub depth: usize,
    /// The tree.
    pub tree: &'a Node<V>,
}

impl<'a, V> Snapshot<'a, V> {
    /// Snapshot of `individual` at `generation`.
    #[must_use]
    pub fn new(generation: usize, individual: &'a Individual<V>, objective: Objective) -> Self {
        let tree = individual.tree();
        Self {
            generation,
            fitness: individual.rank_fitness(objective),
            size: tree.size(),
            depth: tree.depth(),
            tree,
        }
    }
}

/// Path of the snapshot for `generation`.
#[must_use]
pub fn snapshot_path(dir: &Path, generation: usize) -> PathBuf {
    dir.join(format!("best_{generation}.json"))
}

/// Write a snapshot as pretty JSON.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file written.
pub fn write_snapshot<V>(dir: &Path, snapshot: &Snapshot<'_, V>) -> GpResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = snapshot_path(dir, snapshot.generation);
    let mut writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(&mut writer, snapshot)?;
    writer.flush()?;
    Ok(path)
}

fn improvement_ratios<V>(records: &[PipelineIndividual<V>], objective: Objective) -> (f64, f64) {
    if records.is_empty() {
        return (0.0, 0.0);
    }
    let n = records.len() as f64;
    let crossover = records.iter().filter(|r| r.crossover_improved(objective)).count();
    let mutation = records.iter().filter(|r| r.mutation_improved(objective)).count();
    (crossover as f64 / n, mutation as f64 / n)
}

/// Run the evolution process.
///
/// Calls `on_generation` after every generation, for progress reporting.
/// Returns the best individual seen during the run and the run statistics.
///
/// # Errors
///
/// Returns a [`crate::GpError`] if the configuration is invalid, if a
/// generation fails, or if the final snapshot cannot be written.
pub fn evolve<V, P, F>(
    config: &EvolutionConfig,
    set: &PrimitiveSet<V>,
    problem: &P,
    mut on_generation: F,
) -> GpResult<(Individual<V>, EvolutionStats)>
where
    V: Clone + Send + Sync,
    P: Problem<V>,
    F: FnMut(&GenerationStats),
{
    config.validate()?;
    let start_time = Instant::now();
    let objective = problem.objective();

    let mut rng = SmallRng::seed_from_u64(config.seed);
    let mut population = Population::initialize(
        set,
        &config.init,
        config.population_size,
        config.max_depth,
        objective,
        &mut rng,
    )?;
    population.evaluate(problem)?;

    let mut best = population
        .best()
        .cloned()
        .ok_or(ParamError::PopulationSize(0))?;
    let mut best_fitness = best.rank_fitness(objective);
    let mut best_generation = 0;
    info!(
        "initial population of {}: best={best_fitness:.4}",
        population.len()
    );

    let selector = Tournament::new(config.tournament_size);
    let pipeline = Pipeline {
        set,
        problem,
        selector: &selector,
        crossover: OnePointCrossover::new(config.max_depth),
        mutation: config.mutation,
        max_depth: config.max_depth,
        p_cross: config.p_cross,
        p_mut: config.p_mut,
        config: config.pipeline,
        seed: config.seed,
    };

    let mut gen_stats = Vec::with_capacity(config.generations);
    for generation in 1..=config.generations {
        let records = pipeline.run(&population, config.population_size, generation as u64)?;
        let (crossover_improvement, mutation_improvement) = improvement_ratios(&records, objective);

        let elite = if config.elitism {
            population.best().cloned()
        } else {
            None
        };
        population = Population::new(
            records.into_iter().map(|r| r.individual).collect(),
            objective,
        );
        population.evaluate(problem)?;
        if let Some(elite) = elite {
            population.replace_worst(elite);
        }

        let (mean_size, mean_depth) = population.mean_shape();
        let stats = GenerationStats {
            generation,
            fitness: population.stats(),
            mean_size,
            mean_depth,
            crossover_improvement,
            mutation_improvement,
        };

        if let Some(candidate) = population.best() {
            let fitness = candidate.rank_fitness(objective);
            if objective.better(fitness, best_fitness) {
                best = candidate.clone();
                best_fitness = fitness;
                best_generation = generation;
            }
        }

        info!(
            "gen {:>5}: best={:.4} mean={:.4} std={:.4} size={:.1} depth={:.2} xo+={:.3} mut+={:.3}",
            generation,
            stats.fitness.best,
            stats.fitness.mean,
            stats.fitness.std,
            stats.mean_size,
            stats.mean_depth,
            stats.crossover_improvement,
            stats.mutation_improvement,
        );
        on_generation(&stats);
        gen_stats.push(stats);

        // The last generation is covered by the final snapshot below.
        let due = config.snapshot_interval > 0
            && generation.is_multiple_of(config.snapshot_interval)
            && generation != config.generations;
        if let (true, Some(dir)) = (due, &config.output_dir) {
            let snapshot = Snapshot::new(generation, &best, objective);
            if let Err(e) = write_snapshot(dir, &snapshot) {
                warn!("failed to write snapshot for generation {generation}: {e}");
            }
        }
    }

    if let Some(dir) = &config.output_dir {
        let path = write_snapshot(dir, &Snapshot::new(config.generations, &best, objective))?;
        info!("wrote best individual to {}", path.display());
    }

    let elapsed = start_time.elapsed().as_secs_f64();
    Ok((
        best,
        EvolutionStats {
            generations: gen_stats,
            best_fitness,
            best_generation,
            elapsed_seconds: elapsed,
        },
    ))
}
