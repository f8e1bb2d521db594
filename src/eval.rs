//! Numeric evaluation of symbolic expressions.
//!
//! Evaluation substitutes a value for every variable through [`Bindings`] and
//! computes the result in double precision. Scalars, vectors of expressions
//! and symbolic matrices are all evaluated through the same [`Evaluate`] trait:
//!
//! ```
//! use jacobian_descent::eval::{Bindings, Evaluate};
//! use jacobian_descent::expr::Expr;
//!
//! let f = Expr::var("x") * 2.0 + Expr::var("y");
//! let bindings = Bindings::from_iter([("x", 1.5), ("y", -1.0)]);
//! assert_eq!(f.evaluate(&bindings).unwrap(), 2.0);
//! ```

use std::collections::HashMap;

use nalgebra::{DMatrix, DVector};

use crate::errors::ExprError;
use crate::expr::Expr;
use crate::matrix::SymbolicMatrix;

/// A mapping from variable names to numeric values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    values: HashMap<String, f64>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `variables[i]` to `point[i]` for every position.
    ///
    /// # Errors
    /// Returns [`ExprError::DimensionMismatch`] if the lengths differ.
    pub fn from_point(variables: &[String], point: &DVector<f64>) -> Result<Self, ExprError> {
        if variables.len() != point.len() {
            return Err(ExprError::DimensionMismatch {
                expected: variables.len(),
                got: point.len(),
            });
        }
        Ok(variables
            .iter()
            .cloned()
            .zip(point.iter().copied())
            .collect())
    }

    pub fn insert(&mut self, variable: impl Into<String>, value: f64) -> Option<f64> {
        self.values.insert(variable.into(), value)
    }

    /// Returns the value bound to `variable`.
    ///
    /// # Errors
    /// Returns [`ExprError::UnboundVariable`] if the variable has no binding.
    pub fn get(&self, variable: &str) -> Result<f64, ExprError> {
        self.values
            .get(variable)
            .copied()
            .ok_or_else(|| ExprError::UnboundVariable(variable.to_string()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Numeric evaluation against a set of variable bindings.
pub trait Evaluate {
    type Output;

    /// Evaluates every expression with the given bindings.
    ///
    /// # Errors
    /// - [`ExprError::UnboundVariable`] if a variable has no binding
    /// - [`ExprError::Undefined`] if a result is NaN or infinite
    fn evaluate(&self, bindings: &Bindings) -> Result<Self::Output, ExprError>;
}

impl Evaluate for Expr {
    type Output = f64;

    fn evaluate(&self, bindings: &Bindings) -> Result<f64, ExprError> {
        let value = eval_raw(self, bindings)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ExprError::Undefined {
                expr: self.to_string(),
            })
        }
    }
}

impl Evaluate for [Expr] {
    type Output = DVector<f64>;

    fn evaluate(&self, bindings: &Bindings) -> Result<DVector<f64>, ExprError> {
        let values = self
            .iter()
            .map(|expr| expr.evaluate(bindings))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DVector::from_vec(values))
    }
}

impl Evaluate for SymbolicMatrix {
    type Output = DMatrix<f64>;

    fn evaluate(&self, bindings: &Bindings) -> Result<DMatrix<f64>, ExprError> {
        let values = self
            .entries()
            .iter()
            .map(|expr| expr.evaluate(bindings))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DMatrix::from_row_slice(self.nrows(), self.ncols(), &values))
    }
}

/// Evaluates without the finiteness check, so that intermediate infinities
/// can still cancel out (e.g. 1 / (1 / 0) = 0).
fn eval_raw(expr: &Expr, bindings: &Bindings) -> Result<f64, ExprError> {
    Ok(match expr {
        Expr::Const(val) => *val,
        Expr::Var(name) => bindings.get(name)?,
        Expr::Add(left, right) => eval_raw(left, bindings)? + eval_raw(right, bindings)?,
        Expr::Sub(left, right) => eval_raw(left, bindings)? - eval_raw(right, bindings)?,
        Expr::Mul(left, right) => eval_raw(left, bindings)? * eval_raw(right, bindings)?,
        Expr::Div(left, right) => eval_raw(left, bindings)? / eval_raw(right, bindings)?,
        Expr::Abs(inner) => eval_raw(inner, bindings)?.abs(),
        Expr::Pow(base, exp) => powi(eval_raw(base, bindings)?, *exp),
        Expr::PowFloat(base, exp) => eval_raw(base, bindings)?.powf(*exp),
        Expr::PowExpr(base, exponent) => {
            eval_raw(base, bindings)?.powf(eval_raw(exponent, bindings)?)
        }
        Expr::Exp(inner) => eval_raw(inner, bindings)?.exp(),
        Expr::Ln(inner) => eval_raw(inner, bindings)?.ln(),
        Expr::Sqrt(inner) => eval_raw(inner, bindings)?.sqrt(),
        Expr::Sin(inner) => eval_raw(inner, bindings)?.sin(),
        Expr::Cos(inner) => eval_raw(inner, bindings)?.cos(),
        Expr::Neg(inner) => -eval_raw(inner, bindings)?,
    })
}

/// Integer power by repeated squaring, matching the code the JIT emits.
pub(crate) fn powi(base: f64, exp: i64) -> f64 {
    let mut result = 1.0;
    let mut current = base;
    let mut remaining = exp.unsigned_abs();
    while remaining > 0 {
        if remaining & 1 == 1 {
            result *= current;
        }
        remaining >>= 1;
        if remaining > 0 {
            current *= current;
        }
    }
    if exp < 0 {
        1.0 / result
    } else {
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Expr {
        Expr::var(name)
    }

    #[test]
    fn test_evaluate_scalar() {
        let b = Bindings::from_iter([("x", 2.0), ("y", 3.0), ("z", 4.0)]);
        let cases = [
            ((var("x") + var("y")) * (var("x") - var("y")), -5.0),
            (var("x").powi(3) + var("y").powi(2) * var("z"), 44.0),
            ((var("x") + var("y") + var("z")) / (var("x") + 1.0), 3.0),
            (-var("z").sqrt(), -2.0),
            (var("x").powi(-2), 0.25),
            ((var("x") - var("y")).abs(), 1.0),
        ];
        for (expr, expected) in cases {
            assert_eq!(expr.evaluate(&b).unwrap(), expected, "{expr}");
        }
    }

    #[test]
    fn test_unbound_variable() {
        let b = Bindings::from_iter([("x", 1.0)]);
        assert_eq!(
            (var("x") + var("undefined_var")).evaluate(&b),
            Err(ExprError::UnboundVariable("undefined_var".to_string()))
        );
    }

    #[test]
    fn test_undefined_results() {
        let b = Bindings::from_iter([("x", 0.0)]);
        assert!(matches!(
            (1.0 / var("x")).evaluate(&b),
            Err(ExprError::Undefined { .. })
        ));
        assert!(matches!(
            var("x").ln().evaluate(&b),
            Err(ExprError::Undefined { .. })
        ));
        assert!(matches!(
            (var("x") - 1.0).sqrt().evaluate(&b),
            Err(ExprError::Undefined { .. })
        ));
        // intermediate infinities may cancel
        assert_eq!((1.0 / (1.0 / var("x"))).evaluate(&b).unwrap(), 0.0);
    }

    #[test]
    fn test_evaluate_vector_and_matrix() {
        let variables = vec!["x".to_string(), "y".to_string()];
        let b = Bindings::from_point(&variables, &DVector::from_vec(vec![1.0, 2.0])).unwrap();

        let exprs = vec![var("x") + var("y"), var("x") * var("y")];
        assert_eq!(
            exprs.evaluate(&b).unwrap(),
            DVector::from_vec(vec![3.0, 2.0])
        );

        let m = SymbolicMatrix::from_fn(2, 3, |i, j| (i as f64) * var("x") + (j as f64) * var("y"));
        let values = m.evaluate(&b).unwrap();
        assert_eq!(values.shape(), (2, 3));
        assert_eq!(values[(1, 2)], 5.0);
        assert_eq!(values[(0, 1)], 2.0);
    }

    #[test]
    fn test_bindings_insert() {
        let mut b = Bindings::new();
        assert!(b.is_empty());
        assert_eq!(b.insert("x", 1.0), None);
        assert_eq!(b.insert("y", 4.0), None);
        assert_eq!(b.insert("x", 3.0), Some(1.0));
        assert_eq!(b.len(), 2);
        assert_eq!(b.get("x"), Ok(3.0));
        assert_eq!((var("x") * var("y").sqrt()).evaluate(&b).unwrap(), 6.0);
    }

    #[test]
    fn test_bindings_from_point_length_mismatch() {
        let variables = vec!["x".to_string()];
        assert_eq!(
            Bindings::from_point(&variables, &DVector::from_vec(vec![1.0, 2.0])),
            Err(ExprError::DimensionMismatch {
                expected: 1,
                got: 2
            })
        );
    }

    #[test]
    fn test_powi_matches_std() {
        for exp in -6..=9 {
            approx::assert_relative_eq!(powi(1.3, exp), 1.3_f64.powi(exp as i32), max_relative = 1e-14);
        }
        assert_eq!(powi(0.0, 0), 1.0);
        assert_eq!(powi(-2.0, 3), -8.0);
    }
}
