//! Error types for the jacobian-descent crate.
//!
//! This module defines the error types for every stage of a solve. The main error types are:
//!
//! - `ExprError`: Errors while differentiating or evaluating symbolic expressions
//! - `BuilderError`: Errors during JIT compilation with Cranelift
//! - `StepError`: Failures of the adaptive step-size computation
//! - `InputError`: Malformed initial guess input
//! - `ConfigError`: Invalid solver configuration
//! - `SolverError`: High-level errors when setting up or running a solve
//!
//! Each error type implements the standard Error trait and provides detailed error messages.

use cranelift_codegen::CodegenError;
use cranelift_module::ModuleError;
use thiserror::Error;

/// Errors that can occur while manipulating or evaluating symbolic expressions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    /// A variable appears in an expression but no value was bound to it
    #[error("unbound variable: {0}")]
    UnboundVariable(String),
    /// The expression has no finite value at the requested point
    #[error("expression is undefined at the given point: {expr}")]
    Undefined { expr: String },
    /// A system was built without any equations or variables
    #[error("equation system is empty")]
    EmptySystem,
    /// The same variable name was declared twice
    #[error("duplicate variable: {0}")]
    DuplicateVariable(String),
    /// The number of equations does not match the number of variables
    #[error("system is not square: {equations} equations, {variables} variables")]
    NotSquare { equations: usize, variables: usize },
    /// A numeric vector does not match the number of variables
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Errors that can occur during JIT compilation of expressions.
///
/// This enum represents various failure modes in the process of converting our AST
/// into machine code using Cranelift as the JIT compiler backend.
#[derive(Error, Debug)]
pub enum BuilderError {
    /// Error when the target machine architecture is not supported
    #[error("host machine is not supported: {0}")]
    HostMachineNotSupported(String),
    /// Error when a Cranelift setting cannot be applied
    #[error("invalid compiler setting: {0}")]
    Setting(String),
    /// Error during Cranelift code generation
    #[error("codegen error: {0}")]
    CodegenError(CodegenError),
    /// Error in the Cranelift JIT module
    #[error("module error: {0}")]
    ModuleError(ModuleError),
    /// Error when defining the JIT function
    #[error("function error: {0}")]
    FunctionError(String),
    /// Error when declaring the JIT function or one of its imports
    #[error("declaration error: {0}")]
    DeclarationError(String),
    /// Error when an expression references a variable outside the input layout
    #[error("variable not in input layout: {0}")]
    UnboundVariable(String),
}

/// Failures of the adaptive step-size computation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepError {
    /// `(J·Jᵗ·f)ᵗ(J·Jᵗ·f)` evaluated to exactly zero
    #[error("zero denominator in step size")]
    Degenerate,
    /// The step could not be represented in double precision
    #[error("step size is not finite: numerator {numerator}, denominator {denominator}")]
    NonFinite { numerator: f64, denominator: f64 },
    /// The residual vector and Jacobian have incompatible shapes
    #[error("residual of length {residual} does not fit a {rows}x{cols} Jacobian")]
    DimensionMismatch {
        residual: usize,
        rows: usize,
        cols: usize,
    },
}

/// Errors raised while reading the initial guess.
#[derive(Error, Debug)]
pub enum InputError {
    /// A component could not be parsed as a floating point number
    #[error("could not parse element [{index}, 1] from {input:?}")]
    Parse { index: usize, input: String },
    /// The input ended before every component was read
    #[error("input ended after {read} of {expected} elements")]
    UnexpectedEof { read: usize, expected: usize },
    /// A comma separated vector has the wrong number of components
    #[error("expected {expected} components, got {got}")]
    Count { expected: usize, got: usize },
    /// Reading from or writing to the terminal failed
    #[error("i/o error")]
    Io(#[from] std::io::Error),
}

/// Invalid solver configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("tolerance must be a positive finite number, got {0}")]
    Tolerance(f64),
    #[error("max_iterations must be at least 1")]
    MaxIterations,
}

/// High-level errors that can occur when setting up or running a solve.
///
/// Conditions the loop itself handles (a degenerate step, an undefined
/// derivative, running out of iterations) end in a terminal status instead.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("invalid configuration")]
    Config(#[from] ConfigError),
    #[error("invalid equation system")]
    Expr(#[from] ExprError),
    #[error("failed to build JIT function")]
    Builder(#[from] BuilderError),
    #[error("invalid initial guess")]
    Input(#[from] InputError),
    /// Writing diagnostics failed
    #[error("failed to write report")]
    Report(#[from] std::io::Error),
    /// The initial guess does not have one component per variable
    #[error("initial guess has {got} components, system has {expected} variables")]
    GuessLength { expected: usize, got: usize },
}
