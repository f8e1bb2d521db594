//! Systems of nonlinear equations.
//!
//! An [`EquationSystem`] couples an ordered list of equations with the ordered
//! list of variables they are solved for. Position `i` of every numeric point
//! is the value of `variables[i]`.
//!
//! # Example
//!
//! ```
//! use jacobian_descent::system::EquationSystem;
//! use nalgebra::DVector;
//!
//! let system = EquationSystem::reference();
//! let residuals = system.residuals(&DVector::zeros(3)).unwrap();
//! assert_eq!(residuals, DVector::from_vec(vec![-0.1, -0.2, -0.3]));
//! ```

use std::collections::HashMap;

use itertools::Itertools;
use nalgebra::DVector;

use crate::differentiate::jacobian;
use crate::errors::ExprError;
use crate::eval::{Bindings, Evaluate};
use crate::expr::Expr;
use crate::matrix::SymbolicMatrix;

/// Represents a square system of equations `f(x) = 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct EquationSystem {
    equations: Vec<Expr>,
    variables: Vec<String>,
    /// Maps variable names to their indices in a point
    variable_map: HashMap<String, u32>,
}

impl EquationSystem {
    /// Creates a system from equations and the variables to solve for.
    ///
    /// # Errors
    /// - [`ExprError::EmptySystem`] if there are no equations
    /// - [`ExprError::DuplicateVariable`] if a variable is listed twice
    /// - [`ExprError::UnboundVariable`] if an equation uses an unlisted variable
    /// - [`ExprError::NotSquare`] if the equation and variable counts differ
    pub fn new(equations: Vec<Expr>, variables: Vec<String>) -> Result<Self, ExprError> {
        if equations.is_empty() || variables.is_empty() {
            return Err(ExprError::EmptySystem);
        }
        if let Some(duplicate) = variables.iter().duplicates().next() {
            return Err(ExprError::DuplicateVariable(duplicate.clone()));
        }
        if let Some(unknown) = equations
            .iter()
            .flat_map(Expr::variables)
            .find(|name| !variables.contains(name))
        {
            return Err(ExprError::UnboundVariable(unknown));
        }
        if equations.len() != variables.len() {
            return Err(ExprError::NotSquare {
                equations: equations.len(),
                variables: variables.len(),
            });
        }

        Ok(Self::build(equations, variables))
    }

    /// Creates a system whose variables are every variable used by the
    /// equations, sorted alphabetically.
    pub fn from_equations(equations: Vec<Expr>) -> Result<Self, ExprError> {
        let variables = equations
            .iter()
            .flat_map(Expr::variables)
            .unique()
            .sorted()
            .collect();
        Self::new(equations, variables)
    }

    /// The demonstration system in `x`, `y`, `z`:
    ///
    /// ```text
    /// f1 = 3x + x² − 2yz − 0.1
    /// f2 = 2y − y² + 3xz − 0.2
    /// f3 = −z + z² + 2xy − 0.3
    /// ```
    pub fn reference() -> Self {
        let x = Expr::var("x");
        let y = Expr::var("y");
        let z = Expr::var("z");

        let f1 = 3.0 * x.clone() + x.clone().powi(2) - 2.0 * y.clone() * z.clone() - 0.1;
        let f2 = 2.0 * y.clone() - y.clone().powi(2) + 3.0 * x.clone() * z.clone() - 0.2;
        let f3 = -z.clone() + z.powi(2) + 2.0 * x * y - 0.3;

        Self::build(
            vec![f1, f2, f3],
            vec!["x".to_string(), "y".to_string(), "z".to_string()],
        )
    }

    fn build(equations: Vec<Expr>, variables: Vec<String>) -> Self {
        let variable_map = variables
            .iter()
            .enumerate()
            .map(|(i, v)| (v.clone(), i as u32))
            .collect();
        Self {
            equations,
            variables,
            variable_map,
        }
    }

    /// Computes the symbolic Jacobian of the system.
    pub fn jacobian(&self) -> Result<SymbolicMatrix, ExprError> {
        jacobian(&self.equations, &self.variables)
    }

    /// Binds each variable to the matching component of `point`.
    pub fn bindings(&self, point: &DVector<f64>) -> Result<Bindings, ExprError> {
        Bindings::from_point(&self.variables, point)
    }

    /// Evaluates every equation at `point`.
    ///
    /// This is also the way to check a candidate solution by hand: every
    /// component of the result is zero at an exact root.
    pub fn residuals(&self, point: &DVector<f64>) -> Result<DVector<f64>, ExprError> {
        self.equations.evaluate(&self.bindings(point)?)
    }

    pub fn equations(&self) -> &[Expr] {
        &self.equations
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn variable_map(&self) -> &HashMap<String, u32> {
        &self.variable_map
    }

    /// Number of equations, which is also the number of variables.
    pub fn dimension(&self) -> usize {
        self.equations.len()
    }
}

impl Default for EquationSystem {
    fn default() -> Self {
        Self::reference()
    }
}
