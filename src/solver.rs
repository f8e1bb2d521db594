//! The iterative solver.
//!
//! Each iteration evaluates the residuals `f` and the Jacobian `J` at the
//! current vector, computes the adaptive step with [`step_size`] and moves to
//!
//! ```text
//! vector_new = vector - step · J · f
//! ```
//!
//! The run converges when the largest componentwise change
//! `max |vector_new[i] - vector[i]|` is strictly below the tolerance.
//!
//! The loop body is the pure transition [`Solver::step`], which consumes a
//! [`SolverState`] and returns the next one. [`Solver::solve`] drives it
//! until the state is terminal.
//!
//! # Example
//!
//! ```
//! use jacobian_descent::prelude::*;
//! use nalgebra::DVector;
//!
//! let solver = Solver::new(EquationSystem::reference(), SolverConfig::default()).unwrap();
//! let outcome = solver.solve(DVector::zeros(3), &mut NullReporter).unwrap();
//! assert_eq!(outcome.status, Status::Converged);
//! ```

use std::fmt;

use log::{debug, error, info, warn};
use nalgebra::{DMatrix, DVector};

use crate::compiled::CompiledSystem;
use crate::errors::{ConfigError, ExprError, SolverError, StepError};
use crate::eval::Evaluate;
use crate::matrix::SymbolicMatrix;
use crate::report::Reporter;
use crate::step::{descend, step_size};
use crate::system::EquationSystem;

/// How expressions are evaluated at each iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// Walk the expression trees
    #[default]
    Interpreted,
    /// Compile the residuals and the Jacobian to machine code once
    Jit,
}

/// Solver parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    /// Convergence threshold on the largest componentwise update
    pub tolerance: f64,
    /// Upper bound on the number of iterations
    pub max_iterations: usize,
    pub backend: Backend,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-5,
            max_iterations: 100,
            backend: Backend::default(),
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(ConfigError::Tolerance(self.tolerance));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::MaxIterations);
        }
        Ok(())
    }
}

/// Why a run stopped early.
#[derive(Debug, Clone, PartialEq)]
pub enum AbortReason {
    /// `(J·Jᵗ·f)ᵗ(J·Jᵗ·f)` was exactly zero
    ZeroDenominator,
    /// The step or the updated vector overflowed double precision
    NonFiniteStep,
    /// The residuals or the Jacobian could not be evaluated at the current vector
    Evaluation(ExprError),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::ZeroDenominator => write!(f, "zero denominator"),
            AbortReason::NonFiniteStep => write!(f, "step size is not finite"),
            AbortReason::Evaluation(err) => write!(f, "{err}"),
        }
    }
}

impl From<StepError> for AbortReason {
    fn from(err: StepError) -> Self {
        match err {
            StepError::Degenerate => AbortReason::ZeroDenominator,
            StepError::NonFinite { .. } => AbortReason::NonFiniteStep,
            StepError::DimensionMismatch { residual, rows, .. } => {
                AbortReason::Evaluation(ExprError::DimensionMismatch {
                    expected: rows,
                    got: residual,
                })
            }
        }
    }
}

/// State of the iteration state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Running,
    Converged,
    MaxIterationsReached,
    Aborted(AbortReason),
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Status::Running)
    }
}

/// Everything the loop carries from one iteration to the next.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverState {
    /// Zero-based index of the current iteration
    pub iteration: usize,
    pub vector: DVector<f64>,
    pub status: Status,
}

impl SolverState {
    pub fn new(guess: DVector<f64>) -> Self {
        Self {
            iteration: 0,
            vector: guess,
            status: Status::Running,
        }
    }

    fn with_status(self, status: Status) -> Self {
        Self { status, ..self }
    }
}

/// Diagnostics for one completed iteration.
#[derive(Debug, Clone)]
pub struct IterationReport<'a> {
    /// Zero-based iteration index
    pub iteration: usize,
    /// Vector the iteration started from
    pub vector: DVector<f64>,
    pub jacobian: &'a SymbolicMatrix,
    pub jacobian_transpose: &'a SymbolicMatrix,
    pub residuals: DVector<f64>,
    pub jacobian_value: DMatrix<f64>,
    pub jacobian_transpose_value: DMatrix<f64>,
    pub step: f64,
    pub vector_new: DVector<f64>,
    /// Largest componentwise change, `max |vector_new - vector|`
    pub max_diff: f64,
}

/// Result of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub status: Status,
    pub vector: DVector<f64>,
    /// Final value of the zero-based iteration counter
    pub iterations: usize,
}

impl Outcome {
    /// The iteration count as shown to users, one more than the counter.
    pub fn displayed_iterations(&self) -> usize {
        self.iterations + 1
    }

    /// True for the statuses that end the process with exit code 0.
    pub fn is_success(&self) -> bool {
        matches!(self.status, Status::Converged | Status::MaxIterationsReached)
    }
}

impl From<SolverState> for Outcome {
    fn from(state: SolverState) -> Self {
        Self {
            status: state.status,
            vector: state.vector,
            iterations: state.iteration,
        }
    }
}

enum Engine {
    Interpreted,
    Jit(CompiledSystem),
}

/// Solves an [`EquationSystem`] from an initial guess.
///
/// The symbolic Jacobian and its transpose are computed once, when the solver
/// is created, and only evaluated numerically per iteration.
pub struct Solver {
    system: EquationSystem,
    config: SolverConfig,
    jacobian: SymbolicMatrix,
    jacobian_transpose: SymbolicMatrix,
    engine: Engine,
}

impl Solver {
    /// # Errors
    /// - [`SolverError::Config`] if the configuration is invalid
    /// - [`SolverError::Expr`] if the Jacobian cannot be formed
    /// - [`SolverError::Builder`] if the JIT backend fails to compile
    pub fn new(system: EquationSystem, config: SolverConfig) -> Result<Self, SolverError> {
        config.validate()?;
        let jacobian = system.jacobian()?;
        let jacobian_transpose = jacobian.transpose();
        let engine = match config.backend {
            Backend::Interpreted => Engine::Interpreted,
            Backend::Jit => Engine::Jit(CompiledSystem::new(&system, &jacobian)?),
        };
        debug!("jacobian: {jacobian}");

        Ok(Self {
            system,
            config,
            jacobian,
            jacobian_transpose,
            engine,
        })
    }

    pub fn system(&self) -> &EquationSystem {
        &self.system
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn jacobian(&self) -> &SymbolicMatrix {
        &self.jacobian
    }

    pub fn jacobian_transpose(&self) -> &SymbolicMatrix {
        &self.jacobian_transpose
    }

    /// Runs the solver to a terminal state.
    ///
    /// # Errors
    /// - [`SolverError::GuessLength`] if `guess` does not have one value per variable
    /// - [`SolverError::Report`] if the reporter fails to write
    pub fn solve(
        &self,
        guess: DVector<f64>,
        reporter: &mut dyn Reporter,
    ) -> Result<Outcome, SolverError> {
        if guess.len() != self.system.dimension() {
            return Err(SolverError::GuessLength {
                expected: self.system.dimension(),
                got: guess.len(),
            });
        }

        let mut state = SolverState::new(guess);
        while !state.status.is_terminal() {
            let (next, report) = self.step(state);
            if let Some(report) = report {
                reporter.iteration(&report)?;
            }
            state = next;
        }

        let outcome = Outcome::from(state);
        reporter.finished(&outcome)?;
        Ok(outcome)
    }

    /// Performs one transition of the state machine.
    ///
    /// A terminal state is returned unchanged. A running state at the
    /// iteration cap becomes [`Status::MaxIterationsReached`]. Otherwise one
    /// iteration is computed and reported, and the state either converges,
    /// aborts or moves on to the next iteration.
    pub fn step(&self, state: SolverState) -> (SolverState, Option<IterationReport<'_>>) {
        if state.status.is_terminal() {
            return (state, None);
        }
        if state.iteration >= self.config.max_iterations {
            warn!(
                "maximum number of iterations ({}) reached without convergence",
                self.config.max_iterations
            );
            return (state.with_status(Status::MaxIterationsReached), None);
        }

        let (residuals, jacobian_value, jacobian_transpose_value) =
            match self.evaluate(&state.vector) {
                Ok(values) => values,
                Err(err) => {
                    error!("iteration {}: {err}", state.iteration + 1);
                    let status = Status::Aborted(AbortReason::Evaluation(err));
                    return (state.with_status(status), None);
                }
            };

        let step = match step_size(&residuals, &jacobian_value) {
            Ok(step) => step,
            Err(err) => {
                error!("iteration {}: {err}, aborting", state.iteration + 1);
                let status = Status::Aborted(AbortReason::from(err));
                return (state.with_status(status), None);
            }
        };

        let vector_new = descend(&state.vector, step, &residuals, &jacobian_value);
        if vector_new.iter().any(|v| !v.is_finite()) {
            error!(
                "iteration {}: updated vector is not finite, aborting",
                state.iteration + 1
            );
            return (state.with_status(Status::Aborted(AbortReason::NonFiniteStep)), None);
        }
        let max_diff = (&vector_new - &state.vector).amax();
        debug!(
            "iteration = {}, step = {step}, max diff = {max_diff}",
            state.iteration + 1
        );

        let converged = max_diff < self.config.tolerance;
        let SolverState {
            iteration, vector, ..
        } = state;

        let next = if converged {
            info!("converged after {} iterations", iteration + 1);
            SolverState {
                iteration,
                vector: vector_new.clone(),
                status: Status::Converged,
            }
        } else {
            SolverState {
                iteration: iteration + 1,
                vector: vector_new.clone(),
                status: Status::Running,
            }
        };

        let report = IterationReport {
            iteration,
            vector,
            jacobian: &self.jacobian,
            jacobian_transpose: &self.jacobian_transpose,
            residuals,
            jacobian_value,
            jacobian_transpose_value,
            step,
            vector_new,
            max_diff,
        };
        (next, Some(report))
    }

    /// Residuals, Jacobian and Jacobian transpose at `point`.
    fn evaluate(
        &self,
        point: &DVector<f64>,
    ) -> Result<(DVector<f64>, DMatrix<f64>, DMatrix<f64>), ExprError> {
        match &self.engine {
            Engine::Interpreted => {
                let bindings = self.system.bindings(point)?;
                let residuals = self.system.equations().evaluate(&bindings)?;
                let jacobian = self.jacobian.evaluate(&bindings)?;
                let transpose = self.jacobian_transpose.evaluate(&bindings)?;
                Ok((residuals, jacobian, transpose))
            }
            Engine::Jit(compiled) => {
                let residuals = compiled.residuals(point)?;
                let jacobian = compiled.jacobian(point)?;
                let transpose = jacobian.transpose();
                Ok((residuals, jacobian, transpose))
            }
        }
    }
}

impl fmt::Debug for Solver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Solver")
            .field("system", &self.system)
            .field("config", &self.config)
            .field("jacobian", &self.jacobian)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;
    use crate::report::NullReporter;
    use approx::assert_relative_eq;

    fn reference_solver(config: SolverConfig) -> Solver {
        Solver::new(EquationSystem::reference(), config).unwrap()
    }

    fn solve(solver: &Solver, guess: &[f64]) -> Outcome {
        solver
            .solve(DVector::from_column_slice(guess), &mut NullReporter)
            .unwrap()
    }

    /// Records what the solver reports.
    #[derive(Default)]
    struct Recorder {
        iterations: Vec<(usize, f64)>,
        finished: Vec<Outcome>,
    }

    impl Reporter for Recorder {
        fn iteration(&mut self, report: &IterationReport<'_>) -> std::io::Result<()> {
            self.iterations.push((report.iteration, report.max_diff));
            Ok(())
        }

        fn finished(&mut self, outcome: &Outcome) -> std::io::Result<()> {
            self.finished.push(outcome.clone());
            Ok(())
        }
    }

    #[test]
    fn test_converges_from_origin() {
        let solver = reference_solver(SolverConfig::default());
        let mut recorder = Recorder::default();
        let outcome = solver.solve(DVector::zeros(3), &mut recorder).unwrap();

        assert_eq!(outcome.status, Status::Converged);
        assert!(outcome.iterations < 100);
        assert!(outcome.is_success());

        let residuals = solver.system().residuals(&outcome.vector).unwrap();
        assert!(residuals.amax() < 1e-4, "residuals {residuals}");

        // one report per iteration, the last one below tolerance
        assert_eq!(recorder.iterations.len(), outcome.displayed_iterations());
        let (last_iteration, last_diff) = *recorder.iterations.last().unwrap();
        assert_eq!(last_iteration, outcome.iterations);
        assert!(last_diff < 1e-5);
        assert!(recorder.iterations[..recorder.iterations.len() - 1]
            .iter()
            .all(|&(_, diff)| diff >= 1e-5));
        assert_eq!(recorder.finished, vec![outcome]);
    }

    #[test]
    fn test_converges_near_historical_root() {
        let solver = reference_solver(SolverConfig::default());
        let outcome = solve(&solver, &[-3.0, 0.0, 0.0]);

        assert_eq!(outcome.status, Status::Converged);
        assert_relative_eq!(outcome.vector[0], -3.03, epsilon = 0.01);
        assert_relative_eq!(outcome.vector[1], -0.04, epsilon = 0.01);
        assert_relative_eq!(outcome.vector[2], -0.03, epsilon = 0.01);
        assert!(solver.system().residuals(&outcome.vector).unwrap().amax() < 1e-3);
    }

    #[test]
    fn test_converged_vector_is_a_fixed_point() {
        let solver = reference_solver(SolverConfig::default());
        let outcome = solve(&solver, &[0.0, 0.0, 0.0]);
        assert_eq!(outcome.status, Status::Converged);

        let (next, report) = solver.step(SolverState::new(outcome.vector.clone()));
        let report = report.unwrap();
        assert!(report.max_diff < 1e-5);
        assert_eq!(report.iteration, 0);
        assert_eq!(next.status, Status::Converged);
        assert_eq!(next.vector, report.vector_new);
    }

    #[test]
    fn test_step_transitions() {
        let solver = reference_solver(SolverConfig::default());
        let start = SolverState::new(DVector::zeros(3));

        let (next, report) = solver.step(start.clone());
        let report = report.unwrap();
        assert_eq!(next.status, Status::Running);
        assert_eq!(next.iteration, 1);
        assert_eq!(report.vector, start.vector);
        assert_eq!(report.residuals, DVector::from_vec(vec![-0.1, -0.2, -0.3]));
        assert_eq!(report.jacobian_transpose_value, report.jacobian_value.transpose());
        assert_eq!(
            next.vector,
            &start.vector - &report.jacobian_value * &report.residuals * report.step
        );

        // terminal states are left alone
        let done = SolverState {
            status: Status::Converged,
            ..start
        };
        let (same, report) = solver.step(done.clone());
        assert_eq!(same, done);
        assert!(report.is_none());
    }

    #[test]
    fn test_max_iterations_reached() {
        let solver = reference_solver(SolverConfig {
            max_iterations: 1,
            ..SolverConfig::default()
        });
        let mut recorder = Recorder::default();
        let outcome = solver
            .solve(DVector::from_vec(vec![5.0, -5.0, 2.0]), &mut recorder)
            .unwrap();

        assert_eq!(outcome.status, Status::MaxIterationsReached);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.displayed_iterations(), 2);
        assert_eq!(recorder.iterations.len(), 1);
        assert!(outcome.is_success());
    }

    #[test]
    fn test_zero_denominator_aborts() {
        // at the root of a linear system f = 0, so A0 = 0
        let system = EquationSystem::new(
            vec![Expr::var("x") - 1.0, 2.0 * Expr::var("y")],
            vec!["x".to_string(), "y".to_string()],
        )
        .unwrap();
        let solver = Solver::new(system, SolverConfig::default()).unwrap();
        let guess = DVector::from_vec(vec![1.0, 0.0]);
        let outcome = solve(&solver, guess.as_slice());

        assert_eq!(outcome.status, Status::Aborted(AbortReason::ZeroDenominator));
        assert_eq!(outcome.vector, guess);
        assert_eq!(outcome.iterations, 0);
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_undefined_value_aborts() {
        let system = EquationSystem::new(
            vec![Expr::var("x").ln()],
            vec!["x".to_string()],
        )
        .unwrap();
        let solver = Solver::new(system, SolverConfig::default()).unwrap();
        let outcome = solve(&solver, &[0.0]);

        assert!(matches!(
            outcome.status,
            Status::Aborted(AbortReason::Evaluation(ExprError::Undefined { .. }))
        ));
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_overflowing_step_aborts() {
        let solver = reference_solver(SolverConfig::default());
        for magnitude in [1e40, 1e50, 1e60] {
            let guess = [magnitude; 3];
            let mut recorder = Recorder::default();
            let outcome = solver
                .solve(DVector::from_column_slice(&guess), &mut recorder)
                .unwrap();

            assert_eq!(
                outcome.status,
                Status::Aborted(AbortReason::NonFiniteStep),
                "{guess:?}"
            );
            assert_eq!(outcome.vector, DVector::from_column_slice(&guess));
            assert_eq!(outcome.iterations, 0);
            assert!(recorder.iterations.is_empty());
            assert!(!outcome.is_success());
        }
    }

    #[test]
    fn test_always_terminates() {
        let config = SolverConfig {
            max_iterations: 25,
            ..SolverConfig::default()
        };
        let solver = reference_solver(config);
        let guesses = [
            [0.0, 0.0, 0.0],
            [1.0, 1.0, 1.0],
            [5.0, -5.0, 2.0],
            [-10.0, 10.0, -10.0],
            [1e3, 1e3, 1e3],
        ];
        for guess in guesses {
            let outcome = solve(&solver, &guess);
            assert!(outcome.status.is_terminal(), "{guess:?}");
            assert!(outcome.iterations <= 25, "{guess:?}");
            if outcome.status == Status::MaxIterationsReached {
                assert_eq!(outcome.iterations, 25);
            }
        }
    }

    #[test]
    fn test_jit_backend_matches_interpreter() {
        let interpreted = reference_solver(SolverConfig::default());
        let jit = reference_solver(SolverConfig {
            backend: Backend::Jit,
            ..SolverConfig::default()
        });

        for guess in [[0.0, 0.0, 0.0], [-3.0, 0.0, 0.0], [1.0, 1.0, 1.0]] {
            let a = solve(&interpreted, &guess);
            let b = solve(&jit, &guess);
            assert_eq!(a.status, b.status);
            assert_eq!(a.iterations, b.iterations);
            assert_relative_eq!(a.vector, b.vector, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_guess_length() {
        let solver = reference_solver(SolverConfig::default());
        let result = solver.solve(DVector::zeros(2), &mut NullReporter);
        assert!(matches!(
            result,
            Err(SolverError::GuessLength {
                expected: 3,
                got: 2
            })
        ));
    }

    #[test]
    fn test_config_validation() {
        assert_eq!(SolverConfig::default().validate(), Ok(()));
        assert_eq!(SolverConfig::default().tolerance, 1e-5);
        assert_eq!(SolverConfig::default().max_iterations, 100);
        assert_eq!(SolverConfig::default().backend, Backend::Interpreted);

        for tolerance in [0.0, -1e-5, f64::NAN, f64::INFINITY] {
            let config = SolverConfig {
                tolerance,
                ..SolverConfig::default()
            };
            assert!(matches!(config.validate(), Err(ConfigError::Tolerance(_))));
        }
        let config = SolverConfig {
            max_iterations: 0,
            ..SolverConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::MaxIterations));
        assert!(matches!(
            Solver::new(EquationSystem::reference(), config),
            Err(SolverError::Config(ConfigError::MaxIterations))
        ));
    }
}
