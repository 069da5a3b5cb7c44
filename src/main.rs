//! treegp CLI - evolve expression trees and sample random ones.

// Allow print in the CLI binary
#![allow(clippy::print_stdout, clippy::print_stderr)]

mod cli;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use treegp::Strategy;
use treegp::regression::Target;

/// treegp - tree-based genetic programming
#[derive(Parser, Debug)]
#[command(name = "treegp")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Evolve a tree that fits a target function
    Evolve(cli::evolve::EvolveArgs),

    /// Build random trees and print them as JSON
    Sample {
        /// Number of trees
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,

        /// Maximum tree depth
        #[arg(short = 'd', long, default_value = "4")]
        max_depth: usize,

        /// Construction strategy
        #[arg(long, value_enum, default_value = "half-and-half")]
        strategy: Strategy,

        /// Spread depths over 1..=max-depth
        #[arg(long)]
        ramped: bool,

        /// Random seed (default: random)
        #[arg(short, long)]
        seed: Option<u64>,

        /// Print one compact JSON document per line
        #[arg(long)]
        compact: bool,

        /// Also score each tree against this target function
        #[arg(long)]
        eval: Option<Target>,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let result = match args.command {
        Commands::Evolve(evolve) => cli::evolve::execute(&evolve),
        Commands::Sample {
            count,
            max_depth,
            strategy,
            ramped,
            seed,
            compact,
            eval,
            output,
        } => cli::sample::execute(&cli::sample::SampleOptions {
            count,
            max_depth,
            strategy,
            ramped,
            seed,
            compact,
            eval,
            output,
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
