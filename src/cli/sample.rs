//! CLI command that prints random trees as JSON.

use crate::cli::{CliError, seed_or_clock};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use treegp::regression::{self, Expr, Regression, Target};
use treegp::{Node, Problem, Strategy, TreeBuilder};

/// Options of the `sample` command.
#[derive(Debug)]
pub(crate) struct SampleOptions {
    pub(crate) count: usize,
    pub(crate) max_depth: usize,
    pub(crate) strategy: Strategy,
    pub(crate) ramped: bool,
    pub(crate) seed: Option<u64>,
    pub(crate) compact: bool,
    pub(crate) eval: Option<Target>,
    pub(crate) output: Option<PathBuf>,
}

#[derive(Serialize)]
struct Sample<'a> {
    size: usize,
    depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    fitness: Option<f64>,
    tree: &'a Node<Expr>,
}

/// Execute the sample command.
///
/// # Errors
///
/// Returns an error if the primitives are invalid or output fails.
pub(crate) fn execute(options: &SampleOptions) -> Result<(), CliError> {
    let set = regression::primitives()?;
    let mut rng = SmallRng::seed_from_u64(seed_or_clock(options.seed));
    let trees = TreeBuilder::new(&set, options.strategy).build_many(
        options.count,
        options.max_depth,
        options.ramped,
        &mut rng,
    );

    let problem = options.eval.map(|target| Regression::new(target, 64));
    let mut canvas = problem.as_ref().map(Regression::canvas);

    let mut out: Box<dyn Write> = match &options.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout().lock()),
    };

    for tree in &trees {
        let fitness = match (&problem, &mut canvas) {
            (Some(problem), Some(canvas)) => Some(
                problem
                    .fitness(tree, canvas)
                    .map_err(|e| CliError::new(e.to_string()))?,
            ),
            _ => None,
        };
        let sample = Sample {
            size: tree.size(),
            depth: tree.depth(),
            fitness,
            tree,
        };
        if options.compact {
            serde_json::to_writer(&mut out, &sample)?;
        } else {
            serde_json::to_writer_pretty(&mut out, &sample)?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}
