//! Symbolic regression on a single variable.
//!
//! Trees compile to real functions of `x`; fitness is the root mean square
//! error against a target function sampled on `[-2, 2]`. This is the
//! problem the command line tool evolves against.

use crate::error::{InvariantError, ParamError};
use crate::individual::{Objective, Problem};
use crate::primitive::{Primitive, PrimitiveSet};
use crate::tree::Node;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A compiled expression in `x`.
pub type Expr = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

const PROTECT_EPS: f64 = 1e-9;
const DOMAIN: (f64, f64) = (-2.0, 2.0);

fn unary(name: &'static str, op: fn(f64) -> f64) -> Primitive<Expr> {
    Primitive::functional(name, 1, move |args: &[Expr]| {
        let a = Arc::clone(&args[0]);
        Arc::new(move |x: f64| op(a(x))) as Expr
    })
}

fn binary(name: &'static str, op: fn(f64, f64) -> f64) -> Primitive<Expr> {
    Primitive::functional(name, 2, move |args: &[Expr]| {
        let (a, b) = (Arc::clone(&args[0]), Arc::clone(&args[1]));
        Arc::new(move |x: f64| op(a(x), b(x))) as Expr
    })
}

fn constant(value: f64) -> Expr {
    Arc::new(move |_: f64| value)
}

/// Division that yields 1 when the divisor is too close to zero.
#[must_use]
pub fn protected_div(a: f64, b: f64) -> f64 {
    if b.abs() < PROTECT_EPS { 1.0 } else { a / b }
}

/// Square root of the absolute value.
#[must_use]
pub fn protected_sqrt(a: f64) -> f64 {
    a.abs().sqrt()
}

/// The functional primitives.
#[must_use]
pub fn functionals() -> Vec<Primitive<Expr>> {
    vec![
        binary("add", |a, b| a + b),
        binary("sub", |a, b| a - b),
        binary("mul", |a, b| a * b),
        binary("div", protected_div),
        binary("min", f64::min),
        binary("max", f64::max),
        Primitive::functional("if", 3, |args: &[Expr]| {
            let (c, a, b) = (
                Arc::clone(&args[0]),
                Arc::clone(&args[1]),
                Arc::clone(&args[2]),
            );
            Arc::new(move |x: f64| if c(x) > 0.0 { a(x) } else { b(x) }) as Expr
        }),
        unary("neg", |a| -a),
        unary("abs", f64::abs),
        unary("sqrt", protected_sqrt),
        unary("sin", f64::sin),
        unary("cos", f64::cos),
    ]
}

/// The terminal primitives: `x`, a few constants and an ephemeral constant
/// drawn from U(-5, 5).
#[must_use]
pub fn terminals() -> Vec<Primitive<Expr>> {
    let mut terminals = vec![Primitive::terminal("x", Arc::new(|x: f64| x) as Expr)];
    for value in [-1.0, 0.0, 1.0, 2.0, 10.0] {
        terminals.push(Primitive::terminal(format!("{value}"), constant(value)));
    }
    terminals.push(Primitive::ephemeral("const", |rng| {
        let value = rng.gen_range(-5.0..5.0);
        (format!("{value:.2}"), constant(value))
    }));
    terminals
}

/// The full regression primitive set.
///
/// # Errors
///
/// Propagates [`PrimitiveSet::new`] validation.
pub fn primitives() -> Result<PrimitiveSet<Expr>, ParamError> {
    PrimitiveSet::new(functionals(), terminals())
}

/// Bundled target functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// x⁴ + x³ + x² + x
    #[default]
    Quartic,
    /// sin x + x / 2
    Sine,
    /// x² + 2x + 1
    Poly,
}

impl Target {
    /// Value of the target at `x`.
    #[must_use]
    pub fn eval(self, x: f64) -> f64 {
        match self {
            Self::Quartic => x * (1.0 + x * (1.0 + x * (1.0 + x))),
            Self::Sine => x.sin() + x / 2.0,
            Self::Poly => x * x + 2.0 * x + 1.0,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Quartic => "quartic",
            Self::Sine => "sine",
            Self::Poly => "poly",
        };
        f.write_str(name)
    }
}

/// Fit a tree to sampled `(x, y)` pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct Regression {
    samples: Vec<f64>,
    targets: Vec<f64>,
}

impl Regression {
    /// Sample `target` at `n` evenly spaced points on `[-2, 2]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(target: Target, n: usize) -> Self {
        let (lo, hi) = DOMAIN;
        let samples: Vec<f64> = match n {
            0 => Vec::new(),
            1 => vec![f64::midpoint(lo, hi)],
            _ => (0..n)
                .map(|i| lo + (hi - lo) * i as f64 / (n - 1) as f64)
                .collect(),
        };
        let targets = samples.iter().map(|&x| target.eval(x)).collect();
        Self { samples, targets }
    }

    /// Use explicit sample points and target values, paired by index.
    #[must_use]
    pub fn from_samples(samples: Vec<f64>, targets: Vec<f64>) -> Self {
        Self { samples, targets }
    }

    /// Sample points.
    #[must_use]
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Target values.
    #[must_use]
    pub fn targets(&self) -> &[f64] {
        &self.targets
    }
}

impl Problem<Expr> for Regression {
    type Canvas = Vec<f64>;

    fn canvas(&self) -> Vec<f64> {
        Vec::with_capacity(self.samples.len())
    }

    fn draw(&self, tree: &Node<Expr>, canvas: &mut Vec<f64>) -> Result<(), InvariantError> {
        let f = tree.compile()?;
        canvas.clear();
        canvas.extend(self.samples.iter().map(|&x| f(x)));
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn evaluate(&self, canvas: &Vec<f64>) -> f64 {
        if canvas.is_empty() {
            return f64::INFINITY;
        }
        let mut sum = 0.0;
        for (y, t) in canvas.iter().zip(&self.targets) {
            if !y.is_finite() {
                return f64::INFINITY;
            }
            sum += (y - t).powi(2);
        }
        let rmse = (sum / canvas.len() as f64).sqrt();
        if rmse.is_finite() { rmse } else { f64::INFINITY }
    }

    fn objective(&self) -> Objective {
        Objective::Minimize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn func(set: &PrimitiveSet<Expr>, name: &str) -> Primitive<Expr> {
        set.functionals().iter().find(|p| p.name() == name).unwrap().clone()
    }

    fn term(set: &PrimitiveSet<Expr>, name: &str) -> Node<Expr> {
        Node::leaf(set.terminals().iter().find(|p| p.name() == name).unwrap().clone())
    }

    #[test]
    fn test_primitive_set_shape() {
        let set = primitives().unwrap();
        assert_eq!(set.functionals().len(), 12);
        assert_eq!(set.terminals().len(), 7);
        assert!(set.has_arity(3));
        assert_eq!(set.terminals()[1].name(), "-1");
        assert_eq!(set.terminals()[5].name(), "10");
    }

    #[test]
    fn test_protected_operators() {
        assert!((protected_div(3.0, 0.0) - 1.0).abs() < 1e-12);
        assert!((protected_div(3.0, 2.0) - 1.5).abs() < 1e-12);
        assert!((protected_sqrt(-4.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_ephemeral_const_in_range() {
        let mut rng = SmallRng::seed_from_u64(42);
        let set = primitives().unwrap();
        for _ in 0..200 {
            let t = Node::leaf(set.random_terminal(&mut rng));
            assert!(!t.value().is_ephemeral());
            let v = t.compile().unwrap()(0.0);
            assert!((-5.0..10.0 + 1e-12).contains(&v));
        }
    }

    #[test]
    fn test_exact_tree_has_zero_error() {
        let set = primitives().unwrap();
        // (x * x) + ((x + x) + 1)
        let tree = Node::new(
            func(&set, "add"),
            vec![
                Node::new(func(&set, "mul"), vec![term(&set, "x"), term(&set, "x")]),
                Node::new(
                    func(&set, "add"),
                    vec![
                        Node::new(func(&set, "add"), vec![term(&set, "x"), term(&set, "x")]),
                        term(&set, "1"),
                    ],
                ),
            ],
        );
        let problem = Regression::new(Target::Poly, 21);
        let mut canvas = problem.canvas();
        let fitness = problem.fitness(&tree, &mut canvas).unwrap();
        assert!(fitness < 1e-12);
        assert_eq!(canvas.len(), 21);
    }

    #[test]
    fn test_if_selects_branch() {
        let set = primitives().unwrap();
        let tree = Node::new(
            func(&set, "if"),
            vec![term(&set, "x"), term(&set, "10"), term(&set, "-1")],
        );
        let f = tree.compile().unwrap();
        assert!((f(1.0) - 10.0).abs() < 1e-12);
        assert!((f(-1.0) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_non_finite_output_is_worst() {
        let inf = Node::leaf(Primitive::terminal("inf", constant(f64::INFINITY)));
        let problem = Regression::new(Target::Sine, 5);
        let mut canvas = problem.canvas();
        assert!(problem.fitness(&inf, &mut canvas).unwrap().is_infinite());

        let nan = Node::leaf(Primitive::terminal("nan", constant(f64::NAN)));
        assert!(problem.fitness(&nan, &mut canvas).unwrap().is_infinite());
    }

    #[test]
    fn test_samples_cover_domain() {
        let problem = Regression::new(Target::Quartic, 5);
        let expected = [-2.0, -1.0, 0.0, 1.0, 2.0];
        assert_eq!(problem.samples().len(), expected.len());
        for (x, e) in problem.samples().iter().zip(expected) {
            assert!((x - e).abs() < 1e-12);
        }
        assert!((problem.targets()[3] - 4.0).abs() < 1e-12);
    }
}
