//! Primitive vocabulary for trees.
//!
//! A primitive is one node's behaviour. Functionals sit on internal nodes and
//! compose their already-compiled children; terminals are leaves; ephemerals
//! are leaf generators that must be turned into a concrete terminal before
//! they are stored in a tree.
//!
//! The value type `V` is whatever a compiled tree produces: a number, a
//! closure over inputs, a drawing command.

use crate::error::{InvariantError, ParamError};
use rand::{Rng, RngCore};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Composes the compiled values of a functional's children.
pub type ComposeFn<V> = Arc<dyn Fn(&[V]) -> V + Send + Sync>;

/// Produces a fresh terminal name and value from an ephemeral.
pub type GenerateFn<V> = Arc<dyn Fn(&mut dyn RngCore) -> (String, V) + Send + Sync>;

/// The three kinds of primitive.
#[derive(Clone)]
pub enum PrimitiveKind<V> {
    /// Internal node with a fixed number of children.
    Functional {
        /// Number of children, at least 1.
        arity: usize,
        /// Builds this node's value from its children's values.
        compose: ComposeFn<V>,
    },
    /// Leaf with a concrete value.
    Terminal {
        /// Value produced when compiled.
        value: V,
    },
    /// Leaf generator, resolved into a [`PrimitiveKind::Terminal`] on placement.
    Ephemeral {
        /// Draws a new terminal.
        generate: GenerateFn<V>,
    },
}

/// A named unit of tree vocabulary.
#[derive(Clone)]
pub struct Primitive<V> {
    name: Arc<str>,
    kind: PrimitiveKind<V>,
}

impl<V> Primitive<V> {
    /// Create a functional primitive.
    pub fn functional<F>(name: impl Into<Arc<str>>, arity: usize, compose: F) -> Self
    where
        F: Fn(&[V]) -> V + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind: PrimitiveKind::Functional {
                arity,
                compose: Arc::new(compose),
            },
        }
    }

    /// Create a terminal primitive.
    pub fn terminal(name: impl Into<Arc<str>>, value: V) -> Self {
        Self {
            name: name.into(),
            kind: PrimitiveKind::Terminal { value },
        }
    }

    /// Create an ephemeral terminal generator.
    pub fn ephemeral<F>(name: impl Into<Arc<str>>, generate: F) -> Self
    where
        F: Fn(&mut dyn RngCore) -> (String, V) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind: PrimitiveKind::Ephemeral {
                generate: Arc::new(generate),
            },
        }
    }

    /// Name used for display and serialization.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The primitive's kind.
    #[must_use]
    pub fn kind(&self) -> &PrimitiveKind<V> {
        &self.kind
    }

    /// Number of children a node holding this primitive must have.
    #[must_use]
    pub fn arity(&self) -> usize {
        match self.kind {
            PrimitiveKind::Functional { arity, .. } => arity,
            PrimitiveKind::Terminal { .. } | PrimitiveKind::Ephemeral { .. } => 0,
        }
    }

    /// True for functionals.
    #[must_use]
    pub fn is_functional(&self) -> bool {
        matches!(self.kind, PrimitiveKind::Functional { .. })
    }

    /// True for unresolved ephemerals.
    #[must_use]
    pub fn is_ephemeral(&self) -> bool {
        matches!(self.kind, PrimitiveKind::Ephemeral { .. })
    }

    fn kind_label(&self) -> &'static str {
        match self.kind {
            PrimitiveKind::Functional { .. } => "functional",
            PrimitiveKind::Terminal { .. } => "terminal",
            PrimitiveKind::Ephemeral { .. } => "ephemeral",
        }
    }
}

impl<V: Clone> Primitive<V> {
    /// Resolve an ephemeral into a fresh terminal.
    ///
    /// Functionals and terminals are returned as they are.
    #[must_use]
    pub fn instantiate<R: Rng>(&self, rng: &mut R) -> Self {
        match &self.kind {
            PrimitiveKind::Ephemeral { generate } => {
                let rng: &mut dyn RngCore = rng;
                let (name, value) = generate(rng);
                Self::terminal(name, value)
            }
            PrimitiveKind::Functional { .. } | PrimitiveKind::Terminal { .. } => self.clone(),
        }
    }
}

impl<V> PartialEq for Primitive<V> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.arity() == other.arity()
            && self.kind_label() == other.kind_label()
    }
}

impl<V> fmt::Debug for Primitive<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Primitive")
            .field("name", &self.name)
            .field("kind", &self.kind_label())
            .field("arity", &self.arity())
            .finish()
    }
}

impl<V> fmt::Debug for PrimitiveKind<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Functional { arity, .. } => f
                .debug_struct("Functional")
                .field("arity", arity)
                .finish_non_exhaustive(),
            Self::Terminal { .. } => f.debug_struct("Terminal").finish_non_exhaustive(),
            Self::Ephemeral { .. } => f.debug_struct("Ephemeral").finish_non_exhaustive(),
        }
    }
}

impl<V> fmt::Display for Primitive<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Read-only registry of functionals and terminals.
///
/// Functionals are indexed by arity so that mutation can find a compatible
/// replacement in constant time.
#[derive(Clone)]
pub struct PrimitiveSet<V> {
    functionals: Vec<Primitive<V>>,
    terminals: Vec<Primitive<V>>,
    by_arity: BTreeMap<usize, Vec<usize>>,
}

impl<V: Clone> PrimitiveSet<V> {
    /// Build a set from ordered functional and terminal lists.
    ///
    /// # Errors
    ///
    /// Returns an error if either list is empty, if a functional has arity 0,
    /// or if a primitive is registered in the wrong list.
    pub fn new(
        functionals: Vec<Primitive<V>>,
        terminals: Vec<Primitive<V>>,
    ) -> Result<Self, ParamError> {
        if functionals.is_empty() {
            return Err(ParamError::EmptyPrimitives("functional"));
        }
        if terminals.is_empty() {
            return Err(ParamError::EmptyPrimitives("terminal"));
        }

        let mut by_arity: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, f) in functionals.iter().enumerate() {
            if !f.is_functional() {
                return Err(ParamError::PrimitiveKind {
                    name: f.name().to_string(),
                    expected: "functional",
                });
            }
            if f.arity() == 0 {
                return Err(ParamError::ZeroArity(f.name().to_string()));
            }
            by_arity.entry(f.arity()).or_default().push(i);
        }
        if let Some(t) = terminals.iter().find(|t| t.is_functional()) {
            return Err(ParamError::PrimitiveKind {
                name: t.name().to_string(),
                expected: "terminal",
            });
        }

        Ok(Self {
            functionals,
            terminals,
            by_arity,
        })
    }

    /// Registered functionals, in order.
    #[must_use]
    pub fn functionals(&self) -> &[Primitive<V>] {
        &self.functionals
    }

    /// Registered terminals and ephemerals, in order.
    #[must_use]
    pub fn terminals(&self) -> &[Primitive<V>] {
        &self.terminals
    }

    /// True if a node of this arity can be replaced. Arity 0 means terminal.
    #[must_use]
    pub fn has_arity(&self, arity: usize) -> bool {
        arity == 0 || self.by_arity.contains_key(&arity)
    }

    /// Pick a functional uniformly.
    #[must_use]
    pub fn random_functional<R: Rng>(&self, rng: &mut R) -> Primitive<V> {
        self.functionals[rng.gen_range(0..self.functionals.len())].clone()
    }

    /// Pick a terminal uniformly, resolving ephemerals.
    #[must_use]
    pub fn random_terminal<R: Rng>(&self, rng: &mut R) -> Primitive<V> {
        self.terminals[rng.gen_range(0..self.terminals.len())].instantiate(rng)
    }

    /// Functional at `index`, as stored.
    pub(crate) fn functional_at(&self, index: usize) -> Primitive<V> {
        self.functionals[index].clone()
    }

    /// Terminal at `index`, resolved.
    pub(crate) fn terminal_at<R: Rng>(&self, index: usize, rng: &mut R) -> Primitive<V> {
        self.terminals[index].instantiate(rng)
    }

    /// Pick a primitive of the same arity class: a terminal for arity 0, a
    /// functional of exactly `arity` otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantError::NoSameArityPrimitive`] when no functional has
    /// that arity.
    pub fn random_with_arity<R: Rng>(
        &self,
        arity: usize,
        rng: &mut R,
    ) -> Result<Primitive<V>, InvariantError> {
        if arity == 0 {
            return Ok(self.random_terminal(rng));
        }
        let pool = self
            .by_arity
            .get(&arity)
            .ok_or(InvariantError::NoSameArityPrimitive { arity })?;
        Ok(self.functionals[pool[rng.gen_range(0..pool.len())]].clone())
    }
}

impl<V> fmt::Debug for PrimitiveSet<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |ps: &[Primitive<V>]| ps.iter().map(|p| p.name().to_string()).collect::<Vec<_>>();
        f.debug_struct("PrimitiveSet")
            .field("functionals", &names(&self.functionals))
            .field("terminals", &names(&self.terminals))
            .finish_non_exhaustive()
    }
}

/// Small integer primitive set shared by unit tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use super::{Primitive, PrimitiveSet};
    use rand::Rng;

    /// Binary `add`/`mul`, unary `neg`, ternary `if`; terminals `one`, `two`
    /// and an ephemeral `k` in `0..10`.
    pub(crate) fn int_set() -> PrimitiveSet<i64> {
        PrimitiveSet::new(
            vec![
                Primitive::functional("add", 2, |a: &[i64]| a[0].wrapping_add(a[1])),
                Primitive::functional("mul", 2, |a: &[i64]| a[0].wrapping_mul(a[1])),
                Primitive::functional("neg", 1, |a: &[i64]| a[0].wrapping_neg()),
                Primitive::functional("if", 3, |a: &[i64]| if a[0] > 0 { a[1] } else { a[2] }),
            ],
            vec![
                Primitive::terminal("one", 1),
                Primitive::terminal("two", 2),
                Primitive::ephemeral("k", |rng| {
                    let v = rng.gen_range(0..10);
                    (format!("k{v}"), v)
                }),
            ],
        )
        .expect("valid primitive set")
    }

    /// Only binary functionals, only plain terminals.
    pub(crate) fn binary_set() -> PrimitiveSet<i64> {
        PrimitiveSet::new(
            vec![
                Primitive::functional("add", 2, |a: &[i64]| a[0].wrapping_add(a[1])),
                Primitive::functional("sub", 2, |a: &[i64]| a[0].wrapping_sub(a[1])),
            ],
            vec![Primitive::terminal("one", 1), Primitive::terminal("two", 2)],
        )
        .expect("valid primitive set")
    }
}
