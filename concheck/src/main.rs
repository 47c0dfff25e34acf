use clap::Parser;
use color_eyre::eyre::Result;
use concheck::{run, RunConfig, RunOutcome, Target};

/// Runs a target under the scheduler for several rounds, checking each round's recorded
/// history against its reference specification.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Which fixture to drive.
    #[clap(long, value_enum, default_value_t = Target::AtomicRegister)]
    target: Target,

    /// How many rounds to run before reporting success.
    #[clap(long, default_value_t = 100)]
    rounds: usize,

    /// The step budget handed to every round.
    #[clap(long, default_value_t = 10_000)]
    step_budget: usize,

    /// Seeds round 0's schedule policy; later rounds derive their seed from this one.
    #[clap(long, default_value_t = 0)]
    seed: u64,

    /// `tracing_subscriber::EnvFilter` directive string, e.g. `concheck=debug,scheduler=trace`.
    #[clap(long, env = "RUST_LOG", default_value = "concheck=info")]
    log_filter: String,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::new(&cli.log_filter)).init();

    let config = RunConfig { target: cli.target, rounds: cli.rounds, step_budget: cli.step_budget, seed: cli.seed };

    match run(&config)? {
        RunOutcome::Success { rounds_run, rounds_aborted } => {
            tracing::info!(rounds_run, rounds_aborted, "no violation found");
            Ok(())
        }
        RunOutcome::Violation { round, counterexample, history } => {
            eprintln!("violation in round {round}:\n{counterexample}\n\nhistory:\n{history}");
            std::process::exit(1);
        }
        RunOutcome::Panicked { round, thread, method_name, message, history } => {
            eprintln!("round {round} thread {thread} panicked in {method_name:?}: {message}\n\nhistory so far:\n{history}");
            std::process::exit(2);
        }
    }
}
