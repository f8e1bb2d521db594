//! Diagnostics for solver runs.
//!
//! The solver hands every completed iteration and the final outcome to a
//! [`Reporter`]. [`ConsoleReporter`] prints the full per-iteration trace,
//! [`NullReporter`] discards it.

use std::io::{self, Write};

use colored::Colorize;

use crate::solver::{AbortReason, IterationReport, Outcome, Status};

/// Receives diagnostics from [`Solver::solve`](crate::solver::Solver::solve).
pub trait Reporter {
    /// Called once per completed iteration, before the convergence decision
    /// takes effect.
    fn iteration(&mut self, report: &IterationReport<'_>) -> io::Result<()>;

    /// Called once when the solver reaches a terminal state.
    fn finished(&mut self, outcome: &Outcome) -> io::Result<()>;
}

/// Discards all diagnostics.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn iteration(&mut self, _report: &IterationReport<'_>) -> io::Result<()> {
        Ok(())
    }

    fn finished(&mut self, _outcome: &Outcome) -> io::Result<()> {
        Ok(())
    }
}

/// Writes a human readable trace of the run.
///
/// Iterations are numbered from 1 on display.
#[derive(Debug)]
pub struct ConsoleReporter<W: Write> {
    out: W,
}

impl ConsoleReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn iteration(&mut self, report: &IterationReport<'_>) -> io::Result<()> {
        let out = &mut self.out;
        writeln!(
            out,
            "\n{}",
            format!("=== Iteration {} ===", report.iteration + 1).bold()
        )?;
        writeln!(out, "{}:{}", "Current guess vector".cyan(), report.vector)?;
        writeln!(out, "{}:\n{}", "Jacobian (symbolic)".cyan(), report.jacobian)?;
        writeln!(
            out,
            "{}:\n{}",
            "Jacobian transpose".cyan(),
            report.jacobian_transpose
        )?;
        writeln!(
            out,
            "{}:{}",
            "Function values at current guess".cyan(),
            report.residuals
        )?;
        writeln!(
            out,
            "{}:{}",
            "Jacobian evaluated at current guess".cyan(),
            report.jacobian_value
        )?;
        writeln!(
            out,
            "{}:{}",
            "Jacobian transpose evaluated at current guess".cyan(),
            report.jacobian_transpose_value
        )?;
        writeln!(out, "{}: {}", "Step size (μ₀)".cyan(), report.step)?;
        writeln!(out, "{}:{}", "Updated guess vector".cyan(), report.vector_new)?;
        writeln!(
            out,
            "{}: {}",
            "Convergence metric (max diff)".cyan(),
            report.max_diff
        )
    }

    fn finished(&mut self, outcome: &Outcome) -> io::Result<()> {
        let out = &mut self.out;
        match &outcome.status {
            Status::Converged => writeln!(out, "\n{}", "Converged successfully!".green())?,
            Status::Aborted(AbortReason::ZeroDenominator) => writeln!(
                out,
                "{}",
                "Zero denominator encountered! Aborting iteration.".red()
            )?,
            Status::Aborted(reason) => {
                writeln!(out, "{}", format!("Aborting iteration: {reason}").red())?
            }
            Status::Running | Status::MaxIterationsReached => {}
        }

        writeln!(out, "\n{}", "=== Final Result ===".bold())?;
        writeln!(out, "{}:{}", "Final solution vector".cyan(), outcome.vector)?;
        if outcome.status == Status::MaxIterationsReached {
            writeln!(
                out,
                "{}",
                "Warning: Maximum iterations reached. Initial guess may be too far from solution."
                    .yellow()
            )?;
        }
        writeln!(
            out,
            "{}: {}",
            "Total iterations performed".cyan(),
            outcome.displayed_iterations()
        )?;
        out.flush()
    }
}
