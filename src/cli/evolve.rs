//! CLI command for evolving a regression tree.

use crate::cli::{CliError, seed_or_clock};
use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::PathBuf;
use treegp::regression::{self, Regression, Target};
use treegp::{
    EvolutionConfig, EvolutionStats, GrowFlavor, HeightBudget, Individual, InitConfig,
    MutationPolicy, PipelineConfig, Strategy, evolve,
};

/// Mutation operators selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum MutationKind {
    /// Replace one node's primitive.
    Single,
    /// Replace each node's primitive with probability p-mut.
    NodeWise,
    /// Replace a uniformly chosen subtree.
    Subtree,
    /// Replace a subtree chosen by arity and depth.
    Guided,
    /// Replace an internal node or a leaf, shallow leaves preferred.
    LevelExp,
}

/// Arguments of the `evolve` command.
#[derive(clap::Args, Debug)]
pub(crate) struct EvolveArgs {
    /// Number of generations
    #[arg(short, long, default_value = "100")]
    generations: usize,

    /// Population size
    #[arg(short, long, default_value = "500")]
    population: usize,

    /// Tournament size
    #[arg(short = 'k', long, default_value = "3")]
    tournament_size: usize,

    /// Crossover probability
    #[arg(long, default_value = "0.8")]
    p_cross: f64,

    /// Mutation probability
    #[arg(long, default_value = "0.1")]
    p_mut: f64,

    /// Number of parallel pipeline lanes
    #[arg(short, long, default_value = "4")]
    width: usize,

    /// Capacity of each pipeline queue
    #[arg(long, default_value = "1")]
    queue_capacity: usize,

    /// Write a snapshot every N generations (0: only at the end)
    #[arg(long, default_value = "25")]
    snapshot_interval: usize,

    /// Maximum tree depth
    #[arg(short = 'd', long, default_value = "8")]
    max_depth: usize,

    /// Initialization strategy
    #[arg(long, value_enum, default_value = "half-and-half")]
    init: Strategy,

    /// Grow flavour used by half-and-half
    #[arg(long, value_enum, default_value = "balanced")]
    half_grow: GrowFlavor,

    /// Spread initial depths over 1..=max-depth
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    ramped: bool,

    /// Enabled mutation operators
    #[arg(short, long, value_enum, value_delimiter = ',', default_value = "single,subtree")]
    mutations: Vec<MutationKind>,

    /// Per-level decay base of level-exp mutation
    #[arg(long, default_value = "2.0")]
    level_exp_base: f64,

    /// Let every enabled mutation operator fire, not just the first
    #[arg(long)]
    multi: bool,

    /// Room given to subtree replacements
    #[arg(long, value_enum, default_value = "depth-only")]
    budget: HeightBudget,

    /// Keep the best individual across generations
    #[arg(long)]
    elitism: bool,

    /// Target function
    #[arg(long, value_enum, default_value = "quartic")]
    target: Target,

    /// Number of sample points on [-2, 2]
    #[arg(long, default_value = "64")]
    samples: usize,

    /// Random seed (default: random)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Directory for best-individual snapshots
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Load the evolution settings from a JSON file; other settings flags are ignored
    #[arg(long)]
    config: Option<PathBuf>,

    /// Show progress bar
    #[arg(long)]
    progress: bool,
}

impl EvolveArgs {
    fn mutation_policy(&self) -> MutationPolicy {
        let on = |kind| self.mutations.contains(&kind);
        MutationPolicy {
            single: on(MutationKind::Single),
            node_wise: on(MutationKind::NodeWise),
            subtree: on(MutationKind::Subtree),
            guided: on(MutationKind::Guided),
            level_exp: on(MutationKind::LevelExp),
            level_exp_base: self.level_exp_base,
            multi: self.multi,
            budget: self.budget,
            strategy: self.init,
            half_grow: self.half_grow,
        }
    }

    fn to_config(&self) -> EvolutionConfig {
        EvolutionConfig {
            population_size: self.population,
            generations: self.generations,
            tournament_size: self.tournament_size,
            p_cross: self.p_cross,
            p_mut: self.p_mut,
            max_depth: self.max_depth,
            init: InitConfig {
                strategy: self.init,
                ramped: self.ramped,
                half_grow: self.half_grow,
            },
            mutation: self.mutation_policy(),
            pipeline: PipelineConfig {
                width: self.width,
                queue_capacity: self.queue_capacity,
            },
            elitism: self.elitism,
            snapshot_interval: self.snapshot_interval,
            output_dir: self.output.clone(),
            seed: seed_or_clock(self.seed),
        }
    }
}

/// Execute the evolve command.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the run fails.
pub(crate) fn execute(args: &EvolveArgs) -> Result<(), CliError> {
    let config = match &args.config {
        Some(path) => serde_json::from_str::<EvolutionConfig>(&fs::read_to_string(path)?)?,
        None => args.to_config(),
    };
    config.validate()?;

    let set = regression::primitives()?;
    let problem = Regression::new(args.target, args.samples);

    println!("Starting evolution:");
    println!("  Target: {}", args.target);
    println!("  Population: {}", config.population_size);
    println!("  Generations: {}", config.generations);
    println!("  Lanes: {}", config.pipeline.width);
    println!("  Seed: {}", config.seed);
    println!();

    let pb = if args.progress {
        let pb = ProgressBar::new(config.generations as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} gens {msg}")
                .map_err(|e| CliError::new(e.to_string()))?
                .progress_chars("=>-"),
        );
        Some(pb)
    } else {
        None
    };

    let (best, stats) = evolve(&config, &set, &problem, |generation| {
        if let Some(pb) = &pb {
            pb.set_message(format!("best={:.4}", generation.fitness.best));
            pb.inc(1);
        }
    })?;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    print_results(&config, &best, &stats);
    Ok(())
}

fn print_results<V>(config: &EvolutionConfig, best: &Individual<V>, stats: &EvolutionStats) {
    println!();
    println!("Evolution complete!");
    println!("  Best fitness: {:.6}", stats.best_fitness);
    println!("  Best generation: {}", stats.best_generation);
    println!("  Elapsed time: {:.1}s", stats.elapsed_seconds);
    println!(
        "  Best tree: size {}, depth {}",
        best.tree().size(),
        best.tree().depth()
    );
    println!("{}", best.tree().pretty());
    if let Some(dir) = &config.output_dir {
        println!();
        println!("Snapshots: {}/best_*.json", dir.display());
    }
}
