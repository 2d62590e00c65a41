//! CLI entry point for the stigmergic migration orchestrator.
//!
//! A `clap` derive `Cli`/`Commands` pair, a small `Reporter` impl that
//! writes plain lines to stderr, and `status`/`doctor` subcommands
//! alongside the main run command.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use indicatif::{ProgressBar, ProgressStyle};
use stigmergy::config::Config;
use stigmergy::effectors::{NullLlmEffector, NullPatternDetector, NullTestRunner, NullVcsEffector};
use stigmergy::lock::RunLock;
use stigmergy::orchestrator::Orchestrator;
use stigmergy::roles::discover::{DiscoverRole, InMemoryFileSource};
use stigmergy::roles::test::TestRole;
use stigmergy::roles::transform::{ContentSource, TransformRole};
use stigmergy::roles::validate::ValidateRole;
use stigmergy::store::PheromoneStore;
use stigmergy_types::StopReason;

mod reporter;
mod source;

use reporter::{CliReporter, Reporter};
use source::{read_target_files, FsContentSource};

#[derive(Parser, Debug)]
#[command(name = "stigmergy", version, about = "Stigmergic multi-agent code migration orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Print role activity every tick instead of only the final summary.
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the orchestrator to a stop condition.
    Run(RunArgs),
    /// Report the current status of a previously started run's state directory.
    Status {
        #[arg(long, default_value = ".stigmergy")]
        state_dir: PathBuf,
    },
    /// Check the state directory and lock for obvious problems.
    Doctor {
        #[arg(long, default_value = ".stigmergy")]
        state_dir: PathBuf,
    },
    /// Print a shell completion script to stdout.
    Completions { shell: Shell },
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Root directory containing the files to migrate.
    #[arg(long)]
    target: PathBuf,

    /// Optional TOML config file layered on top of defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    max_ticks: Option<u64>,

    #[arg(long)]
    max_tokens_total: Option<u64>,

    #[arg(long)]
    max_budget_usd: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    /// Plan and discover without running Transform/Test/Validate effectors.
    #[arg(long)]
    dry_run: bool,

    /// Resume a run already in progress at the state directory instead of
    /// failing on a held lock.
    #[arg(long)]
    resume: bool,

    /// Pause after any file reaches `needs_review` rather than continuing
    /// past it (still counts as loop-terminal for the stop condition).
    #[arg(long)]
    review: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let reporter = CliReporter { verbose: cli.verbose };

    let result = match cli.command {
        Commands::Run(args) => run(&args, &reporter),
        Commands::Status { state_dir } => status(&state_dir, &reporter),
        Commands::Doctor { state_dir } => doctor(&state_dir, &reporter),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "stigmergy", &mut std::io::stdout());
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            reporter.error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

fn run(args: &RunArgs, reporter: &CliReporter) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(max_ticks) = args.max_ticks {
        config.stop.max_ticks = max_ticks;
    }
    if let Some(max_tokens) = args.max_tokens_total {
        config.budgets.max_tokens_total = max_tokens;
    }
    if let Some(max_usd) = args.max_budget_usd {
        config.budgets.max_budget_usd = max_usd;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    let state_dir = config.state_dir.clone();
    let run_id = config.run_id();

    let _lock = if args.resume {
        RunLock::acquire_with_timeout(&state_dir, &run_id, std::time::Duration::from_secs(0))?
    } else {
        RunLock::acquire(&state_dir, &run_id)?
    };

    reporter.info(&format!("scanning target {}", args.target.display()));
    let files = read_target_files(&args.target)?;
    reporter.info(&format!("found {} candidate files", files.len()));

    let store = PheromoneStore::open(&state_dir)?;

    let mut orchestrator = Orchestrator::new(
        store,
        config.clone(),
        DiscoverRole::new(InMemoryFileSource { files }, NullPatternDetector),
        TransformRole {
            content: FsContentSource { root: args.target.clone() },
            llm: NullLlmEffector,
            guardrails: config.guardrails.clone(),
            max_claims_per_tick: 10,
        },
        TestRole { runner: NullTestRunner },
        ValidateRole { vcs: NullVcsEffector, guardrails: config.guardrails.clone() },
    )?;

    let summary = if args.dry_run {
        reporter.info("dry run: one tick of discovery only, no transform/test/validate effects committed");
        orchestrator.run_tick()?;
        orchestrator.finalize(StopReason::MaxTicks)?
    } else {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} tick {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );

        loop {
            let stop = orchestrator.run_tick()?;
            spinner.set_message(orchestrator.current_tick().to_string());
            spinner.tick();
            if reporter.verbose {
                reporter.info(&format!("tick {} complete", orchestrator.current_tick()));
            }
            if let Some(reason) = stop {
                spinner.finish_and_clear();
                break orchestrator.finalize(reason)?;
            }
        }
    };

    reporter.info(&format!(
        "stopped: {:?} — {} validated, {} failed, {} needs_review, {} skipped over {} ticks",
        summary.stop_reason,
        summary.files_validated,
        summary.files_failed,
        summary.files_needs_review,
        summary.files_skipped,
        summary.total_ticks
    ));

    if args.review && summary.files_needs_review > 0 {
        reporter.warn(&format!("{} files await human review", summary.files_needs_review));
    }

    Ok(())
}

fn status(state_dir: &PathBuf, reporter: &CliReporter) -> anyhow::Result<()> {
    let store = PheromoneStore::open(state_dir)?;
    let mut counts = std::collections::BTreeMap::new();
    for (_, entry) in store.all_status() {
        *counts.entry(entry.status).or_insert(0u32) += 1;
    }

    reporter.info(&format!("state dir: {}", state_dir.display()));
    for (status, count) in counts {
        reporter.info(&format!("  {status}: {count}"));
    }
    reporter.info(&format!("audit completeness: {:.3}", store.audit_log().completeness()));
    Ok(())
}

fn doctor(state_dir: &PathBuf, reporter: &CliReporter) -> anyhow::Result<()> {
    if !state_dir.exists() {
        reporter.warn(&format!("state dir {} does not exist yet", state_dir.display()));
        return Ok(());
    }

    if RunLock::is_locked(state_dir) {
        let lock_path = state_dir.join("run.lock");
        match RunLock::read_lock_info(&lock_path) {
            Ok(info) => reporter.warn(&format!(
                "state dir is locked by pid {} on {} since {}",
                info.pid, info.hostname, info.acquired_at
            )),
            Err(e) => reporter.error(&format!("lock file is present but unreadable: {e}")),
        }
    } else {
        reporter.info("no active run lock");
    }

    let store = PheromoneStore::open(state_dir)?;
    let completeness = store.audit_log().completeness();
    if completeness < 1.0 {
        reporter.error(&format!("audit completeness is {completeness:.3}, expected 1.0"));
    } else {
        reporter.info("audit completeness: 1.0");
    }

    Ok(())
}
