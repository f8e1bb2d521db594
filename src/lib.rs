//! Jacobian-based descent solver for square systems of nonlinear equations.
//!
//! This crate solves `f(x) = 0` with an adaptive-step variant of Newton's method.
//! Equations are built as symbolic expression trees, differentiated exactly, and
//! evaluated either by walking the tree or through native code compiled with
//! [Cranelift](https://github.com/bytecodealliance/wasmtime/tree/main/cranelift).
//!
//! # Features
//!
//! - Symbolic differentiation and Jacobian construction
//! - Interpreted or JIT-compiled evaluation
//! - Pure, step-wise solver state machine with pluggable diagnostics
//!
//! # Example
//!
//! ```rust
//! use jacobian_descent::prelude::*;
//! use nalgebra::DVector;
//!
//! let [x, y] = <[Expr; 2]>::try_from(Expr::symbols("x, y")).unwrap();
//! let system = EquationSystem::new(
//!     vec![x.clone() * x.clone() + y.clone() - 2.0, x - y],
//!     vec!["x".to_string(), "y".to_string()],
//! )
//! .unwrap();
//!
//! let solver = Solver::new(system, SolverConfig::default()).unwrap();
//! let outcome = solver
//!     .solve(DVector::from_vec(vec![0.5, 0.5]), &mut NullReporter)
//!     .unwrap();
//! assert_eq!(outcome.status, Status::Converged);
//! ```

pub use solver::{Solver, SolverConfig};
pub use system::EquationSystem;

pub mod prelude {
    pub use crate::differentiate::{jacobian, Differentiate};
    pub use crate::eval::{Bindings, Evaluate};
    pub use crate::expr::Expr;
    pub use crate::report::{ConsoleReporter, NullReporter, Reporter};
    pub use crate::solver::{Backend, Outcome, Solver, SolverConfig, Status};
    pub use crate::system::EquationSystem;
}

/// JIT compilation functionality using Cranelift
pub mod builder;
/// Natively compiled residuals and Jacobian
pub mod compiled;
/// Symbolic differentiation and Jacobians
pub mod differentiate;
/// Error types for the various failure modes
pub mod errors;
/// Numeric evaluation of expressions
pub mod eval;
/// Expression tree representation
pub mod expr;
/// Reading the initial guess
pub mod input;
/// Matrices of expressions
pub mod matrix;
/// Diagnostics output
pub mod report;
/// The iterative solver
pub mod solver;
/// Adaptive step size
pub mod step;
/// System of equations
pub mod system;
/// Host math functions for JIT-compiled code
pub(crate) mod operators;
/// Type aliases for JIT-compiled functions
pub mod types;
