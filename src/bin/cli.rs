use clap::{Parser, ValueEnum};
use jacobian_descent::{
    input::{parse_vector, read_vector},
    prelude::*,
};
use simplelog::{ColorChoice, CombinedLogger, Config, LevelFilter, TermLogger, TerminalMode};
use std::error::Error;
use std::io;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "jacobian-descent")]
#[command(about = "Solve the demonstration system of nonlinear equations by Jacobian descent")]
#[command(version)]
struct Args {
    /// Convergence threshold on the largest componentwise update
    #[arg(long, default_value_t = 1e-5)]
    tolerance: f64,

    /// Maximum number of iterations
    #[arg(long, default_value_t = 100)]
    max_iterations: usize,

    /// Expression evaluation backend
    #[arg(long, value_enum, default_value_t = Backend::Interpreted)]
    backend: Backend,

    /// Initial guess as comma separated values, e.g. "0,0,0". Prompted for when omitted
    #[arg(long, allow_hyphen_values = true)]
    guess: Option<String>,

    /// Print the residuals at the given comma separated point and exit
    #[arg(long, allow_hyphen_values = true, value_name = "POINT")]
    check: Option<String>,

    /// Log verbosity
    #[arg(long, value_enum, default_value_t = LogLevel::Warn)]
    log_level: LogLevel,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = CombinedLogger::init(vec![TermLogger::new(
        args.log_level.into(),
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )]) {
        eprintln!("Warning: logging disabled: {e}");
    }

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the process should exit successfully.
fn run(args: &Args) -> Result<bool, Box<dyn Error>> {
    let system = EquationSystem::reference();

    if let Some(point) = &args.check {
        let point = parse_vector(point, system.dimension())?;
        let residuals = system.residuals(&point)?;
        for (equation, value) in system.equations().iter().zip(residuals.iter()) {
            println!("{equation} = {value}");
        }
        return Ok(true);
    }

    let config = SolverConfig {
        tolerance: args.tolerance,
        max_iterations: args.max_iterations,
        backend: args.backend,
    };
    let solver = Solver::new(system, config)?;

    let guess = match &args.guess {
        Some(text) => parse_vector(text, solver.system().dimension())?,
        None => read_vector(solver.system().dimension(), io::stdin().lock(), io::stdout())?,
    };

    let outcome = solver.solve(guess, &mut ConsoleReporter::stdout())?;
    Ok(outcome.is_success())
}
