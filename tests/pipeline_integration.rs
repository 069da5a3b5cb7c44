//! Integration tests: the generation pipeline and the evolution driver on
//! the bundled regression problem.

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use rand::SeedableRng;
use rand::rngs::SmallRng;
use treegp::evolution::snapshot_path;
use treegp::regression::{Regression, Target, primitives};
use treegp::{
    EvolutionConfig, GpError, InitConfig, MutationPolicy, Objective, OnePointCrossover, ParamError,
    Pipeline, PipelineConfig, Population, Problem, Tournament, evolve,
};

const MAX_DEPTH: usize = 5;

fn all_mutations() -> MutationPolicy {
    MutationPolicy {
        single: true,
        node_wise: true,
        subtree: true,
        guided: true,
        level_exp: true,
        multi: true,
        ..MutationPolicy::default()
    }
}

#[test]
fn test_pipeline_width_and_probability_grid() {
    let set = primitives().unwrap();
    let problem = Regression::new(Target::Quartic, 32);
    let selector = Tournament::new(3);
    let mut rng = SmallRng::seed_from_u64(42);
    let mut population = Population::initialize(
        &set,
        &InitConfig::default(),
        30,
        MAX_DEPTH,
        Objective::Minimize,
        &mut rng,
    )
    .unwrap();
    population.evaluate(&problem).unwrap();

    for width in [1, 2, 4] {
        for (p_cross, p_mut) in [(0.0, 0.0), (0.5, 0.3), (1.0, 1.0)] {
            let pipeline = Pipeline {
                set: &set,
                problem: &problem,
                selector: &selector,
                crossover: OnePointCrossover::new(MAX_DEPTH),
                mutation: all_mutations(),
                max_depth: MAX_DEPTH,
                p_cross,
                p_mut,
                config: PipelineConfig {
                    width,
                    queue_capacity: 1,
                },
                seed: 7,
            };
            for size in [1, 17, 30] {
                let records = pipeline.run(&population, size, 1).unwrap();
                assert_eq!(records.len(), size, "width {width}, p ({p_cross}, {p_mut})");
                for record in &records {
                    let tree = record.individual.tree();
                    assert!(tree.depth() <= MAX_DEPTH);
                    assert!(record.individual.is_valid());
                    assert!(!record.mutation_fitness.is_nan());
                }
            }
        }
    }
}

#[test]
fn test_pipeline_rejects_zero_selection() {
    let set = primitives().unwrap();
    let problem = Regression::new(Target::Sine, 8);
    let selector = Tournament::default();
    let mut rng = SmallRng::seed_from_u64(1);
    let population = Population::initialize(
        &set,
        &InitConfig::default(),
        4,
        3,
        problem.objective(),
        &mut rng,
    )
    .unwrap();
    let pipeline = Pipeline {
        set: &set,
        problem: &problem,
        selector: &selector,
        crossover: OnePointCrossover::new(3),
        mutation: MutationPolicy::default(),
        max_depth: 3,
        p_cross: 0.8,
        p_mut: 0.1,
        config: PipelineConfig::default(),
        seed: 1,
    };
    let err = pipeline.run(&population, 0, 1).unwrap_err();
    assert!(matches!(err, GpError::Param(ParamError::SelectionSize(0))));
}

#[test]
fn test_evolve_regression_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let set = primitives().unwrap();
    let problem = Regression::new(Target::Poly, 32);
    let config = EvolutionConfig {
        population_size: 60,
        generations: 6,
        max_depth: MAX_DEPTH,
        mutation: all_mutations(),
        snapshot_interval: 3,
        output_dir: Some(dir.path().to_path_buf()),
        elitism: true,
        ..EvolutionConfig::default()
    };

    let (best, stats) = evolve(&config, &set, &problem, |_| {}).unwrap();

    assert!(best.tree().depth() <= MAX_DEPTH);
    assert!(stats.best_fitness.is_finite());
    assert_eq!(stats.generations.len(), 6);
    for pair in stats.generations.windows(2) {
        assert!(pair[1].fitness.best <= pair[0].fitness.best);
    }
    for generation in &stats.generations {
        assert!((0.0..=1.0).contains(&generation.crossover_improvement));
        assert!((0.0..=1.0).contains(&generation.mutation_improvement));
    }

    let mut canvas = problem.canvas();
    let fitness = problem.fitness(best.tree(), &mut canvas).unwrap();
    assert!((fitness - stats.best_fitness).abs() < 1e-9);

    for generation in [3, 6] {
        let text = std::fs::read_to_string(snapshot_path(dir.path(), generation)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["generation"], generation);
        assert!(json["depth"].as_u64().unwrap() <= MAX_DEPTH as u64);
    }
}

#[test]
fn test_single_lane_runs_are_reproducible() {
    let set = primitives().unwrap();
    let problem = Regression::new(Target::Quartic, 16);
    let config = EvolutionConfig {
        population_size: 30,
        generations: 4,
        max_depth: 4,
        pipeline: PipelineConfig {
            width: 1,
            queue_capacity: 1,
        },
        seed: 99,
        ..EvolutionConfig::default()
    };

    let (a, stats_a) = evolve(&config, &set, &problem, |_| {}).unwrap();
    let (b, stats_b) = evolve(&config, &set, &problem, |_| {}).unwrap();
    assert_eq!(a.tree().to_string(), b.tree().to_string());
    assert_eq!(stats_a.best_fitness.to_bits(), stats_b.best_fitness.to_bits());
}

#[test]
fn test_evolve_rejects_invalid_config() {
    let set = primitives().unwrap();
    let problem = Regression::new(Target::Quartic, 8);
    let config = EvolutionConfig {
        mutation: MutationPolicy {
            single: false,
            subtree: false,
            ..MutationPolicy::default()
        },
        ..EvolutionConfig::default()
    };
    let err = evolve(&config, &set, &problem, |_| {}).unwrap_err();
    assert!(matches!(err, GpError::Param(ParamError::NoMutationOperator)));
}
