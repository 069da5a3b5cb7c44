// Allow unwrap and unreadable literals in tests (test code is not production)
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::unreadable_literal))]
//! treegp: tree-based genetic programming.
//!
//! Candidate solutions are trees of typed primitives. A population evolves
//! through depth-bounded one-point crossover and a family of mutation
//! operators, driven once per generation by a concurrent staged pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │     evolve: generation loop, snapshots       │
//! ├──────────────────────────────────────────────┤
//! │  Pipeline: Select → Crossover → Mutate → fan-in
//! ├──────────────────────────────────────────────┤
//! │  Operators: builder, crossover, mutation     │
//! ├──────────────────────────────────────────────┤
//! │  Node, Enumeration, Primitive, PrimitiveSet  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Problems plug in through [`Problem`]: a tree is drawn onto a canvas and
//! the canvas is scored. [`regression`] is a bundled example.

pub mod builder;
pub mod crossover;
pub mod error;
pub mod evolution;
pub mod individual;
pub mod mutation;
pub mod pipeline;
pub mod population;
pub mod primitive;
pub mod regression;
pub mod selection;
pub mod tree;

pub use builder::{GrowFlavor, InitConfig, Strategy, TreeBuilder, ramped_depths};
pub use crossover::OnePointCrossover;
pub use error::{GpError, GpResult, InvariantError, ParamError};
pub use evolution::{EvolutionConfig, EvolutionStats, GenerationStats, Snapshot, evolve};
pub use individual::{Individual, Objective, Problem};
pub use mutation::{
    ArityDepthLikelihood, GuidedSubtreeMutation, HeightBudget, LevelExpLikelihood, MutationPolicy,
    NodeLikelihood, NodeSampler, NodeWiseMutation, SingleNodeMutation, SubtreeMutation,
    UniformLikelihood,
};
pub use pipeline::{Pipeline, PipelineConfig, PipelineIndividual};
pub use population::Population;
pub use primitive::{Primitive, PrimitiveKind, PrimitiveSet};
pub use selection::{FitnessStats, Selector, Tournament};
pub use tree::{Enumeration, Node, Shape};
