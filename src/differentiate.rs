//! Symbolic differentiation and Jacobian construction.
//!
//! Derivatives are exact: they are new expression trees built by applying the
//! rules of calculus, never finite differences. A derivative that has no value
//! at some point (for example d|f|/dx where f = 0) is still a valid tree; it
//! reports [`ExprError::Undefined`] when evaluated there.

use itertools::Itertools;

use crate::errors::ExprError;
use crate::expr::Expr;
use crate::matrix::SymbolicMatrix;

/// Symbolic differentiation of an expression type.
pub trait Differentiate {
    /// Computes the partial derivative with respect to the named variable.
    fn derivative(&self, with_respect_to: &str) -> Expr;

    /// Computes the partial derivatives with respect to each variable, in order.
    fn gradient(&self, variables: &[String]) -> Vec<Expr> {
        variables
            .iter()
            .map(|variable| self.derivative(variable))
            .collect()
    }
}

impl Differentiate for Expr {
    /// Recursively applies the rules of differentiation:
    /// - d/dx(c) = 0 for constants
    /// - d/dx(x) = 1 for the variable we're differentiating with respect to
    /// - d/dx(y) = 0 for other variables
    /// - Sum rule: d/dx(f + g) = df/dx + dg/dx
    /// - Product rule: d/dx(f * g) = f * dg/dx + g * df/dx
    /// - Quotient rule: d/dx(f/g) = (g * df/dx - f * dg/dx) / g^2
    /// - Chain rule for abs: d/dx|f| = f/|f| * df/dx
    /// - Power rule: d/dx(f^n) = n * f^(n-1) * df/dx
    /// - General power rule: d/dx(f^g) = f^g * (dg/dx * ln(f) + g * df/dx / f)
    /// - Chain rule for exp, ln, sqrt, sin and cos
    /// - Negation: d/dx(-f) = -(df/dx)
    ///
    /// The result is not simplified.
    fn derivative(&self, with_respect_to: &str) -> Expr {
        match self {
            Expr::Const(_) => Expr::Const(0.0),

            Expr::Var(name) => {
                if name == with_respect_to {
                    Expr::Const(1.0)
                } else {
                    Expr::Const(0.0)
                }
            }

            Expr::Add(left, right) => Expr::Add(
                left.derivative(with_respect_to).boxed(),
                right.derivative(with_respect_to).boxed(),
            ),

            Expr::Sub(left, right) => Expr::Sub(
                left.derivative(with_respect_to).boxed(),
                right.derivative(with_respect_to).boxed(),
            ),

            Expr::Mul(left, right) => Expr::Add(
                Expr::Mul(left.clone(), right.derivative(with_respect_to).boxed()).boxed(),
                Expr::Mul(right.clone(), left.derivative(with_respect_to).boxed()).boxed(),
            ),

            Expr::Div(left, right) => Expr::Div(
                Expr::Sub(
                    Expr::Mul(right.clone(), left.derivative(with_respect_to).boxed()).boxed(),
                    Expr::Mul(left.clone(), right.derivative(with_respect_to).boxed()).boxed(),
                )
                .boxed(),
                Expr::Pow(right.clone(), 2).boxed(),
            ),

            Expr::Abs(expr) => Expr::Mul(
                Expr::Div(expr.clone(), Expr::Abs(expr.clone()).boxed()).boxed(),
                expr.derivative(with_respect_to).boxed(),
            ),

            Expr::Pow(base, exp) => Expr::Mul(
                Expr::Mul(
                    Expr::Const(*exp as f64).boxed(),
                    Expr::Pow(base.clone(), exp - 1).boxed(),
                )
                .boxed(),
                base.derivative(with_respect_to).boxed(),
            ),

            Expr::PowFloat(base, exp) => Expr::Mul(
                Expr::Mul(
                    Expr::Const(*exp).boxed(),
                    Expr::PowFloat(base.clone(), exp - 1.0).boxed(),
                )
                .boxed(),
                base.derivative(with_respect_to).boxed(),
            ),

            Expr::PowExpr(base, exponent) => Expr::Mul(
                Expr::PowExpr(base.clone(), exponent.clone()).boxed(),
                Expr::Add(
                    Expr::Mul(
                        exponent.derivative(with_respect_to).boxed(),
                        Expr::Ln(base.clone()).boxed(),
                    )
                    .boxed(),
                    Expr::Mul(
                        exponent.clone(),
                        Expr::Div(base.derivative(with_respect_to).boxed(), base.clone()).boxed(),
                    )
                    .boxed(),
                )
                .boxed(),
            ),

            Expr::Exp(expr) => Expr::Mul(
                Expr::Exp(expr.clone()).boxed(),
                expr.derivative(with_respect_to).boxed(),
            ),

            Expr::Ln(expr) => Expr::Mul(
                Expr::Div(Expr::Const(1.0).boxed(), expr.clone()).boxed(),
                expr.derivative(with_respect_to).boxed(),
            ),

            Expr::Sqrt(expr) => Expr::Mul(
                Expr::Div(
                    Expr::Const(1.0).boxed(),
                    Expr::Mul(Expr::Const(2.0).boxed(), Expr::Sqrt(expr.clone()).boxed()).boxed(),
                )
                .boxed(),
                expr.derivative(with_respect_to).boxed(),
            ),

            Expr::Sin(expr) => Expr::Mul(
                Expr::Cos(expr.clone()).boxed(),
                expr.derivative(with_respect_to).boxed(),
            ),

            Expr::Cos(expr) => Expr::Mul(
                Expr::Neg(Expr::Sin(expr.clone()).boxed()).boxed(),
                expr.derivative(with_respect_to).boxed(),
            ),

            Expr::Neg(expr) => Expr::Neg(expr.derivative(with_respect_to).boxed()),
        }
    }
}

/// Computes the symbolic Jacobian `J[i][j] = ∂functions[i]/∂variables[j]`.
///
/// Every entry is simplified. The matrix has one row per function and one
/// column per variable; it does not need to be square.
///
/// # Errors
/// - [`ExprError::EmptySystem`] if there are no functions or no variables
/// - [`ExprError::DuplicateVariable`] if a variable name appears twice
pub fn jacobian<D: Differentiate>(
    functions: &[D],
    variables: &[String],
) -> Result<SymbolicMatrix, ExprError> {
    if functions.is_empty() || variables.is_empty() {
        return Err(ExprError::EmptySystem);
    }
    if let Some(duplicate) = variables.iter().duplicates().next() {
        return Err(ExprError::DuplicateVariable(duplicate.clone()));
    }

    Ok(SymbolicMatrix::from_fn(
        functions.len(),
        variables.len(),
        |i, j| functions[i].derivative(&variables[j]).simplify(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{Bindings, Evaluate};

    fn var(name: &str) -> Expr {
        Expr::var(name)
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn at(x: f64, y: f64, z: f64) -> Bindings {
        Bindings::from_iter([("x", x), ("y", y), ("z", z)])
    }

    #[test]
    fn test_derivative_rules() {
        // Test constant derivative
        assert_eq!(Expr::Const(5.0).derivative("x"), Expr::Const(0.0));

        // Test variable derivatives (x)' = 1, (y)' = 0
        assert_eq!(var("x").derivative("x"), Expr::Const(1.0));
        assert_eq!(var("y").derivative("x"), Expr::Const(0.0));

        // Test sum rule (u+v)' = u' + v'
        assert_eq!(
            (var("x") + var("y")).derivative("x"),
            Expr::Add(Expr::Const(1.0).boxed(), Expr::Const(0.0).boxed())
        );

        // Test product rule (u*v)' = u*v' + v*u'
        assert_eq!(
            (var("x") * var("y")).derivative("x"),
            Expr::Add(
                Expr::Mul(var("x").boxed(), Expr::Const(0.0).boxed()).boxed(),
                Expr::Mul(var("y").boxed(), Expr::Const(1.0).boxed()).boxed()
            )
        );

        // Test power rule (x^3)' = 3 * x^2 * 1
        assert_eq!(
            var("x").powi(3).derivative("x"),
            Expr::Mul(
                Expr::Mul(Expr::Const(3.0).boxed(), var("x").powi(2).boxed()).boxed(),
                Expr::Const(1.0).boxed()
            )
        );
    }

    #[test]
    fn test_simplified_derivatives() {
        assert_eq!(var("x").powi(2).derivative("x").simplify(), 2.0 * var("x"));
        assert_eq!((3.0 * var("x")).derivative("x").simplify(), Expr::Const(3.0));
        assert_eq!((var("y") * var("z")).derivative("y").simplify(), var("z"));
        assert_eq!((-var("z")).derivative("z").simplify(), Expr::Const(-1.0));
    }

    #[test]
    fn test_reference_partials_are_exact() {
        let [x, y, z]: [Expr; 3] = Expr::symbols("x, y, z").try_into().unwrap();
        let f1 = 3.0 * x.clone() + x.powi(2) - 2.0 * y * z - 0.1;

        let df_dx = f1.derivative("x").simplify();
        let df_dy = f1.derivative("y").simplify();
        let df_dz = f1.derivative("z").simplify();

        // ∂f1/∂y = -2z and ∂f1/∂z = -2y do not involve x at all
        assert_eq!(df_dx.variables(), vec!["x"]);
        assert_eq!(df_dy.variables(), vec!["z"]);
        assert_eq!(df_dz.variables(), vec!["y"]);

        for &(x, y, z) in &[(0.0, 0.0, 0.0), (1.5, -2.0, 4.0), (-3.0, 0.25, -7.5)] {
            let b = at(x, y, z);
            assert_eq!(df_dx.evaluate(&b).unwrap(), 3.0 + 2.0 * x);
            assert_eq!(df_dy.evaluate(&b).unwrap(), -2.0 * z);
            assert_eq!(df_dz.evaluate(&b).unwrap(), -2.0 * y);
        }
    }

    #[test]
    fn test_chain_rules_match_closed_forms() {
        let b = Bindings::from_iter([("x", 0.7)]);
        let x = 0.7_f64;
        let cases = [
            (var("x").exp(), x.exp()),
            (var("x").ln(), 1.0 / x),
            (var("x").sqrt(), 0.5 / x.sqrt()),
            (var("x").sin(), x.cos()),
            (var("x").cos(), -x.sin()),
            (var("x").powf(2.5), 2.5 * x.powf(1.5)),
            (var("x").pow(var("x")), x.powf(x) * (x.ln() + 1.0)),
            (1.0 / var("x"), -1.0 / (x * x)),
        ];
        for (expr, expected) in cases {
            let got = expr.derivative("x").evaluate(&b).unwrap();
            approx::assert_relative_eq!(got, expected, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_abs_derivative_is_undefined_at_zero() {
        let d = var("x").abs().derivative("x");
        assert!(matches!(
            d.evaluate(&Bindings::from_iter([("x", 0.0)])),
            Err(ExprError::Undefined { .. })
        ));
        assert_eq!(d.evaluate(&Bindings::from_iter([("x", -2.0)])).unwrap(), -1.0);
    }

    #[test]
    fn test_jacobian() {
        let functions = vec![var("x").powi(2) * var("y"), var("x") * var("y").powi(2)];
        let j = jacobian(&functions, &names(&["x", "y"])).unwrap();
        assert_eq!(j.shape(), (2, 2));

        let b = Bindings::from_iter([("x", 2.0), ("y", 3.0)]);
        let values = j.evaluate(&b).unwrap();
        assert_eq!(values[(0, 0)], 12.0);
        assert_eq!(values[(0, 1)], 4.0);
        assert_eq!(values[(1, 0)], 9.0);
        assert_eq!(values[(1, 1)], 12.0);
    }

    #[test]
    fn test_gradient_matches_jacobian_rows() {
        let variables = names(&["x", "y", "z"]);
        let functions = vec![
            3.0 * var("x") + var("x").powi(2) - 2.0 * var("y") * var("z") - 0.1,
            var("y").sin() * var("z").exp(),
        ];
        let j = jacobian(&functions, &variables).unwrap();

        for (i, function) in functions.iter().enumerate() {
            let gradient = function
                .gradient(&variables)
                .into_iter()
                .map(|d| d.simplify())
                .collect::<Vec<_>>();
            assert_eq!(Some(gradient.as_slice()), j.row(i));
        }
        assert!(functions[1].gradient(&[]).is_empty());
    }

    #[test]
    fn test_jacobian_non_square() {
        let functions = vec![var("x") + var("y") + var("z")];
        let j = jacobian(&functions, &names(&["x", "y", "z"])).unwrap();
        assert_eq!(j.shape(), (1, 3));
        assert!(j.entries().iter().all(|e| *e == Expr::Const(1.0)));
    }

    #[test]
    fn test_jacobian_rejects_invalid_input() {
        let functions = vec![var("x")];
        assert_eq!(
            jacobian::<Expr>(&[], &names(&["x"])),
            Err(ExprError::EmptySystem)
        );
        assert_eq!(jacobian(&functions, &[]), Err(ExprError::EmptySystem));
        assert_eq!(
            jacobian(&functions, &names(&["x", "y", "x"])),
            Err(ExprError::DuplicateVariable("x".to_string()))
        );
    }
}
