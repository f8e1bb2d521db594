//! Expression module for representing mathematical expressions.
//!
//! This module defines the `Expr` tree shared by every other part of the crate.
//! The same tree is:
//! - Symbolically differentiated (see [`crate::differentiate`])
//! - Evaluated numerically against variable bindings (see [`crate::eval`])
//! - JIT compiled into machine code using Cranelift (see [`crate::builder`])
//! - Simplified using algebraic rules
//!
//! # Expression Tree Structure
//! The expression tree is built recursively with each node being one of:
//! - Leaf nodes: Constants and Variables
//! - Unary operations: Abs, Neg, Exp, Ln, Sqrt, Sin, Cos
//! - Binary operations: Add, Sub, Mul, Div
//! - Powers: integer, floating point, or expression exponents
//!
//! # Building expressions
//! The arithmetic operators are overloaded for `Expr` and `f64`, so an equation
//! can be written the way it reads on paper:
//!
//! ```
//! use jacobian_descent::expr::Expr;
//!
//! let [x, y, z]: [Expr; 3] = Expr::symbols("x, y, z").try_into().unwrap();
//! let f1 = 3.0 * x.clone() + x.clone().powi(2) - 2.0 * y * z - 0.1;
//! assert_eq!(f1.variables(), vec!["x", "y", "z"]);
//! ```

use itertools::Itertools;

use crate::eval::powi;

/// An expression tree node representing mathematical operations.
///
/// The expression tree is built recursively using Box<Expr> for nested expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A constant floating point value
    Const(f64),
    /// A reference to a variable by name
    Var(String),
    /// Addition of two expressions
    Add(Box<Expr>, Box<Expr>),
    /// Multiplication of two expressions
    Mul(Box<Expr>, Box<Expr>),
    /// Subtraction of two expressions
    Sub(Box<Expr>, Box<Expr>),
    /// Division of two expressions
    Div(Box<Expr>, Box<Expr>),
    /// Absolute value of an expression
    Abs(Box<Expr>),
    /// Exponentiation of an expression by an integer constant
    Pow(Box<Expr>, i64),
    /// Exponentiation of an expression by a floating point constant
    PowFloat(Box<Expr>, f64),
    /// Exponentiation of an expression by another expression
    PowExpr(Box<Expr>, Box<Expr>),
    /// Exponential function of an expression
    Exp(Box<Expr>),
    /// Natural logarithm of an expression
    Ln(Box<Expr>),
    /// Square root of an expression
    Sqrt(Box<Expr>),
    /// Sine of an expression (argument in radians)
    Sin(Box<Expr>),
    /// Cosine of an expression (argument in radians)
    Cos(Box<Expr>),
    /// Negation of an expression
    Neg(Box<Expr>),
}

impl Expr {
    /// Creates a variable node.
    pub fn var(name: impl Into<String>) -> Expr {
        Expr::Var(name.into())
    }

    /// Creates a constant node.
    pub fn constant(value: f64) -> Expr {
        Expr::Const(value)
    }

    /// Creates one variable per name in a comma-separated list.
    ///
    /// Whitespace around names is trimmed and empty entries are skipped,
    /// so `"x, y, z"` yields `[x, y, z]`.
    pub fn symbols(names: &str) -> Vec<Expr> {
        names
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(Expr::var)
            .collect()
    }

    pub fn boxed(self) -> Box<Expr> {
        Box::new(self)
    }

    /// Raises the expression to an integer power.
    pub fn powi(self, exp: i64) -> Expr {
        Expr::Pow(self.boxed(), exp)
    }

    /// Raises the expression to a floating point power.
    pub fn powf(self, exp: f64) -> Expr {
        Expr::PowFloat(self.boxed(), exp)
    }

    /// Raises the expression to the power of another expression.
    pub fn pow(self, exponent: Expr) -> Expr {
        Expr::PowExpr(self.boxed(), exponent.boxed())
    }

    pub fn exp(self) -> Expr {
        Expr::Exp(self.boxed())
    }

    pub fn ln(self) -> Expr {
        Expr::Ln(self.boxed())
    }

    pub fn sqrt(self) -> Expr {
        Expr::Sqrt(self.boxed())
    }

    pub fn sin(self) -> Expr {
        Expr::Sin(self.boxed())
    }

    pub fn cos(self) -> Expr {
        Expr::Cos(self.boxed())
    }

    pub fn abs(self) -> Expr {
        Expr::Abs(self.boxed())
    }

    /// Returns the names of all variables in the expression, in order of
    /// first appearance and without duplicates.
    pub fn variables(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_variables(&mut names);
        names.into_iter().unique().collect()
    }

    fn collect_variables(&self, names: &mut Vec<String>) {
        match self {
            Expr::Const(_) => {}
            Expr::Var(name) => names.push(name.clone()),
            Expr::Add(left, right)
            | Expr::Sub(left, right)
            | Expr::Mul(left, right)
            | Expr::Div(left, right)
            | Expr::PowExpr(left, right) => {
                left.collect_variables(names);
                right.collect_variables(names);
            }
            Expr::Pow(inner, _)
            | Expr::PowFloat(inner, _)
            | Expr::Abs(inner)
            | Expr::Exp(inner)
            | Expr::Ln(inner)
            | Expr::Sqrt(inner)
            | Expr::Sin(inner)
            | Expr::Cos(inner)
            | Expr::Neg(inner) => inner.collect_variables(names),
        }
    }

    /// Returns true if the expression references the named variable.
    pub fn depends_on(&self, variable: &str) -> bool {
        self.variables().iter().any(|name| name == variable)
    }

    /// Simplifies the expression by folding constants and applying basic algebraic rules.
    ///
    /// # Constant Folding
    /// - Evaluates constant expressions: 2 + 3 → 5
    /// - Special functions of constants are folded when the result is finite
    ///
    /// # Identity Rules
    /// - Additive identity: x + 0 → x, x - 0 → x, 0 - x → -x
    /// - Multiplicative identity: x * 1 → x, x / 1 → x
    /// - Multiplication by zero: x * 0 → 0
    /// - Negative one: x * (-1) → -x
    /// - Self subtraction: x - x → 0
    /// - Double negation: -(-x) → x
    ///
    /// # Exponent Rules
    /// - Zero exponent: x^0 → 1
    /// - First power: x^1 → x
    /// - Integral float exponents become integer powers
    ///
    /// x / x → 1 is not applied, so a vanishing denominator still evaluates
    /// as undefined after simplification.
    pub fn simplify(&self) -> Expr {
        match self {
            Expr::Const(_) | Expr::Var(_) => self.clone(),

            Expr::Add(left, right) => {
                let l = left.simplify();
                let r = right.simplify();
                match (&l, &r) {
                    (Expr::Const(a), Expr::Const(b)) => Expr::Const(a + b),
                    (expr, Expr::Const(0.0)) | (Expr::Const(0.0), expr) => expr.clone(),
                    // x + (-y) -> x - y
                    (expr, Expr::Neg(inner)) => Expr::Sub(expr.clone().boxed(), inner.clone()),
                    _ => Expr::Add(l.boxed(), r.boxed()),
                }
            }

            Expr::Sub(left, right) => {
                let l = left.simplify();
                let r = right.simplify();
                match (&l, &r) {
                    (Expr::Const(a), Expr::Const(b)) => Expr::Const(a - b),
                    (expr, Expr::Const(0.0)) => expr.clone(),
                    (Expr::Const(0.0), expr) => Expr::Neg(expr.clone().boxed()),
                    (a, b) if a == b => Expr::Const(0.0),
                    _ => Expr::Sub(l.boxed(), r.boxed()),
                }
            }

            Expr::Mul(left, right) => {
                let l = left.simplify();
                let r = right.simplify();
                match (&l, &r) {
                    (Expr::Const(a), Expr::Const(b)) => Expr::Const(a * b),
                    (Expr::Const(0.0), _) | (_, Expr::Const(0.0)) => Expr::Const(0.0),
                    (expr, Expr::Const(1.0)) | (Expr::Const(1.0), expr) => expr.clone(),
                    (expr, Expr::Const(-1.0)) | (Expr::Const(-1.0), expr) => {
                        Expr::Neg(expr.clone().boxed())
                    }
                    // c1 * (c2 * x) -> (c1 * c2) * x
                    (Expr::Const(a), Expr::Mul(inner, x)) => match inner.as_ref() {
                        Expr::Const(b) => Expr::Mul(Expr::Const(a * b).boxed(), x.clone()),
                        _ => Expr::Mul(l.clone().boxed(), r.clone().boxed()),
                    },
                    // x * c -> c * x keeps coefficients in front
                    (expr, Expr::Const(c)) => Expr::Mul(Expr::Const(*c).boxed(), expr.clone().boxed()),
                    (a, b) if a == b => Expr::Pow(l.clone().boxed(), 2),
                    _ => Expr::Mul(l.boxed(), r.boxed()),
                }
            }

            Expr::Div(left, right) => {
                let l = left.simplify();
                let r = right.simplify();
                match (&l, &r) {
                    (Expr::Const(a), Expr::Const(b)) if *b != 0.0 => Expr::Const(a / b),
                    (expr, Expr::Const(1.0)) => expr.clone(),
                    (expr, Expr::Const(-1.0)) => Expr::Neg(expr.clone().boxed()),
                    _ => Expr::Div(l.boxed(), r.boxed()),
                }
            }

            Expr::Neg(expr) => {
                let e = expr.simplify();
                match e {
                    Expr::Const(a) => Expr::Const(-a),
                    Expr::Neg(inner) => *inner,
                    _ => Expr::Neg(e.boxed()),
                }
            }

            Expr::Abs(expr) => {
                let e = expr.simplify();
                match e {
                    Expr::Const(a) => Expr::Const(a.abs()),
                    Expr::Abs(_) => e,
                    _ => Expr::Abs(e.boxed()),
                }
            }

            Expr::Pow(base, exp) => {
                let b = base.simplify();
                match (b, *exp) {
                    (_, 0) => Expr::Const(1.0),
                    (Expr::Const(a), n) => fold(Expr::Pow(Expr::Const(a).boxed(), n), powi(a, n)),
                    (expr, 1) => expr,
                    (Expr::Pow(inner, m), n) => Expr::Pow(inner, m * n),
                    (expr, n) => Expr::Pow(expr.boxed(), n),
                }
            }

            Expr::PowFloat(base, exp) => {
                let b = base.simplify();
                match b {
                    Expr::Const(a) => fold(Expr::PowFloat(Expr::Const(a).boxed(), *exp), a.powf(*exp)),
                    expr if *exp == 1.0 => expr,
                    expr if exp.fract() == 0.0 && exp.abs() < i32::MAX as f64 => {
                        Expr::Pow(expr.boxed(), *exp as i64).simplify()
                    }
                    expr => Expr::PowFloat(expr.boxed(), *exp),
                }
            }

            Expr::PowExpr(base, exponent) => {
                let b = base.simplify();
                let e = exponent.simplify();
                match e {
                    Expr::Const(c) => Expr::PowFloat(b.boxed(), c).simplify(),
                    _ => Expr::PowExpr(b.boxed(), e.boxed()),
                }
            }

            Expr::Exp(expr) => unary(expr, Expr::Exp, f64::exp),
            Expr::Ln(expr) => unary(expr, Expr::Ln, f64::ln),
            Expr::Sqrt(expr) => unary(expr, Expr::Sqrt, f64::sqrt),
            Expr::Sin(expr) => unary(expr, Expr::Sin, f64::sin),
            Expr::Cos(expr) => unary(expr, Expr::Cos, f64::cos),
        }
    }
}

/// Replaces a constant sub-tree by its value, unless the value is not finite.
fn fold(original: Expr, value: f64) -> Expr {
    if value.is_finite() {
        Expr::Const(value)
    } else {
        original
    }
}

fn unary(inner: &Expr, node: fn(Box<Expr>) -> Expr, f: fn(f64) -> f64) -> Expr {
    match inner.simplify() {
        Expr::Const(a) => fold(node(Expr::Const(a).boxed()), f(a)),
        e => node(e.boxed()),
    }
}

/// Implements string formatting for expressions.
///
/// This implementation converts expressions to their standard mathematical notation:
/// - Constants are formatted as numbers
/// - Variables are formatted as their names
/// - Binary operations (+,-,*,/) are wrapped in parentheses
/// - Functions (exp, ln, sqrt, sin, cos) use function call notation
/// - Absolute value uses |x| notation
/// - Exponents use ^
/// - Negation uses - prefix
impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Const(val) => write!(f, "{val}"),
            Expr::Var(name) => write!(f, "{name}"),
            Expr::Add(left, right) => write!(f, "({left} + {right})"),
            Expr::Mul(left, right) => write!(f, "({left} * {right})"),
            Expr::Sub(left, right) => write!(f, "({left} - {right})"),
            Expr::Div(left, right) => write!(f, "({left} / {right})"),
            Expr::Abs(expr) => write!(f, "|{expr}|"),
            Expr::Pow(base, exp) => write!(f, "({base}^{exp})"),
            Expr::PowFloat(base, exp) => write!(f, "({base}^{exp})"),
            Expr::PowExpr(base, exponent) => write!(f, "({base}^{exponent})"),
            Expr::Exp(expr) => write!(f, "exp({expr})"),
            Expr::Ln(expr) => write!(f, "ln({expr})"),
            Expr::Sqrt(expr) => write!(f, "sqrt({expr})"),
            Expr::Sin(expr) => write!(f, "sin({expr})"),
            Expr::Cos(expr) => write!(f, "cos({expr})"),
            Expr::Neg(expr) => write!(f, "-{expr}"),
        }
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $variant:ident) => {
        impl std::ops::$trait for Expr {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::$variant(self.boxed(), rhs.boxed())
            }
        }

        impl std::ops::$trait<f64> for Expr {
            type Output = Expr;

            fn $method(self, rhs: f64) -> Expr {
                Expr::$variant(self.boxed(), Expr::from(rhs).boxed())
            }
        }

        impl std::ops::$trait<Expr> for f64 {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::$variant(Expr::from(self).boxed(), rhs.boxed())
            }
        }
    };
}

impl_binary_op!(Add, add, Add);
impl_binary_op!(Sub, sub, Sub);
impl_binary_op!(Mul, mul, Mul);
impl_binary_op!(Div, div, Div);

impl std::ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Neg(self.boxed())
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Const(value)
    }
}
