//! Error types for tree construction, genetic operators and the pipeline.
//!
//! Errors fall in two classes:
//!
//! - [`InvariantError`]: a builder or operator produced (or was handed) a tree
//!   that breaks a structural bound. These are bugs, not runtime conditions,
//!   and the evolution driver stops the run on the first one.
//! - [`ParamError`]: a configuration value is out of range. These are
//!   reported before any work begins.
//!
//! [`GpError`] is the union carried through the pipeline and the driver.

use thiserror::Error;

/// A broken structural invariant. Fatal to the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantError {
    /// A tree is already deeper than the bound an operator must respect.
    #[error("{operator}: tree depth {depth} exceeds max depth {max_depth}")]
    DepthExceeded {
        /// Operator that detected the violation.
        operator: &'static str,
        /// Configured bound.
        max_depth: usize,
        /// Offending depth.
        depth: usize,
    },
    /// No node of the second parent fits the depth budget of the first pick.
    #[error(
        "crossover: no candidate within max depth {max_depth} for node at depth {node_depth} with height {node_height}"
    )]
    NoCrossoverCandidate {
        /// Configured bound.
        max_depth: usize,
        /// Depth of the node picked in the first parent.
        node_depth: usize,
        /// Height of the node picked in the first parent.
        node_height: usize,
    },
    /// A functional node has the wrong number of children.
    #[error("functional {primitive} has arity {arity} but {children} children")]
    ArityMismatch {
        /// Primitive name.
        primitive: String,
        /// Declared arity.
        arity: usize,
        /// Actual number of children.
        children: usize,
    },
    /// An ephemeral generator reached compilation without being resolved.
    #[error("ephemeral {primitive} was never instantiated")]
    UnresolvedEphemeral {
        /// Primitive name.
        primitive: String,
    },
    /// Mutation found no functional sharing the arity of the node it replaces.
    #[error("no primitive with arity {arity} to replace a node")]
    NoSameArityPrimitive {
        /// Arity of the node being replaced.
        arity: usize,
    },    /// A pre-order index an operator picked is outside the tree.
    #[error("{operator}: node index {index} out of range for tree of size {size}")]
    NodeOutOfRange {
        /// Operator that picked the index.
        operator: &'static str,
        /// Offending index.
        index: usize,
        /// Size of the tree.
        size: usize,
    },
}

/// An invalid parameter, detected before any work starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    /// Selection must produce at least one individual.
    #[error("selection size must be at least 1, got {0}")]
    SelectionSize(usize),
    /// Tournaments need at least one contestant.
    #[error("tournament size must be at least 1, got {0}")]
    TournamentSize(usize),
    /// A probability outside `[0, 1]`.
    #[error("{name} must be within [0, 1], got {value}")]
    Probability {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: f64,
    },
    /// The pipeline needs at least one lane.
    #[error("pipeline width must be at least 1, got {0}")]
    PipelineWidth(usize),
    /// Populations need at least one individual.
    #[error("population size must be at least 1, got {0}")]
    PopulationSize(usize),
    /// Ramped initialization needs at least depth 1.
    #[error("max depth must be at least 1, got {0}")]
    MaxDepth(usize),
    /// A primitive list was empty.
    #[error("{0} set is empty")]
    EmptyPrimitives(&'static str),
    /// A primitive was registered in the wrong list.
    #[error("primitive {name} cannot be used as a {expected}")]
    PrimitiveKind {
        /// Primitive name.
        name: String,
        /// Role the list expected.
        expected: &'static str,
    },
    /// A functional declared zero arity.
    #[error("functional {0} must have arity of at least 1")]
    ZeroArity(String),
    /// No mutation operator is enabled.
    #[error("mutation policy enables no operator")]
    NoMutationOperator,
    /// The level-exponential decay base must be finite and positive.
    #[error("level-exp base must be finite and positive, got {0}")]
    LevelExpBase(f64),
}

/// Any failure of a generation or a run.
#[derive(Debug, Error)]
pub enum GpError {
    /// Structural invariant violation.
    #[error("invariant violated: {0}")]
    Invariant(#[from] InvariantError),
    /// Invalid parameter.
    #[error("invalid parameter: {0}")]
    Param(#[from] ParamError),
    /// A pipeline stage thread panicked.
    #[error("pipeline stage {stage} panicked")]
    StagePanicked {
        /// Stage name.
        stage: &'static str,
    },
    /// The collector gathered fewer records than were selected.
    #[error("generation incomplete: expected {expected} individuals, collected {collected}")]
    IncompleteGeneration {
        /// Selection size.
        expected: usize,
        /// Records actually collected.
        collected: usize,
    },
    /// File I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON encoding or decoding failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for fallible engine operations.
pub type GpResult<T> = Result<T, GpError>;

/// Check that `value` is a probability.
///
/// # Errors
///
/// Returns [`ParamError::Probability`] when `value` is outside `[0, 1]` or NaN.
pub fn check_probability(name: &'static str, value: f64) -> Result<f64, ParamError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ParamError::Probability { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invariant_message_names_operator() {
        let err = InvariantError::DepthExceeded {
            operator: "crossover",
            max_depth: 3,
            depth: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("crossover"));
        assert!(msg.contains('3'));
        assert!(msg.contains('5'));
    }

    #[test]
    fn test_check_probability() {
        assert!(check_probability("p", 0.0).is_ok());
        assert!(check_probability("p", 1.0).is_ok());
        assert!(check_probability("p", 1.5).is_err());
        assert!(check_probability("p", f64::NAN).is_err());
    }

    #[test]
    fn test_gp_error_from_param() {
        let err: GpError = ParamError::SelectionSize(0).into();
        assert!(matches!(err, GpError::Param(ParamError::SelectionSize(0))));
    }
}
