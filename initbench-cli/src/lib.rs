#![warn(missing_docs)]
//! initbench CLI Library
//!
//! Configuration, planning, process supervision, cache control, workspace
//! provisioning, and the run orchestrator behind the `initbench` binary.
//! Call [`run`] from `main` and exit with the returned code.
//!
//! # Example
//!
//! ```ignore
//! fn main() {
//!     let code = initbench_cli::run().unwrap_or(1);
//!     std::process::exit(code);
//! }
//! ```

mod cache;
mod config;
mod executor;
mod planner;
mod supervisor;
mod workspace;

pub use cache::{CacheController, SCRATCH_PREFIX};
pub use config::*;
pub use executor::{
    CancellationToken, Orchestrator, RunState, RunSummary, Services, failure_record, format_plan,
    format_progress, summarize_unit,
};
pub use planner::{
    ExecutionPlan, ResolvedPlan, ResumeMode, Selection, expand, resolve, select_for_resume,
};
pub use supervisor::*;
pub use workspace::WorkspaceProvisioner;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use initbench_core::{Catalog, PackageManager};
use initbench_ledger::{
    ResumeState, SummaryFormat, generate_json_summary, generate_markdown_summary, load_results,
    parse_existing, remove_for_units,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Exit code for a completed or operator-cancelled run
pub const EXIT_OK: i32 = 0;
/// Exit code after an internal fault
pub const EXIT_FAULT: i32 = 1;

/// initbench CLI arguments
#[derive(Parser, Debug)]
#[command(name = "initbench")]
#[command(
    author,
    about = "initbench - timing scaffolding-tool init across versions, package managers, \
             features, and cache states",
    disable_version_flag = true
)]
pub struct Cli {
    /// Optional subcommand (Run, Plan, Summary, InitConfig); defaults to Run
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file (default: discover initbench.toml upwards from the current directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Timed iterations per configuration (1-100)
    #[arg(long, short = 'n', global = true)]
    pub iterations: Option<u32>,

    /// Run the smoke test after every successful init
    #[arg(long, global = true)]
    pub secondary_tests: bool,

    /// What to do with results already in the ledger
    #[arg(long, value_enum, global = true)]
    pub resume_mode: Option<ResumeMode>,

    /// Rerun exactly the configurations that failed in the ledger
    #[arg(long, global = true, conflicts_with = "resume_mode")]
    pub rerun_failed: bool,

    /// Version to run; repeatable. Unknown names run `<package>@<name>`
    #[arg(long = "version", value_name = "NAME", global = true)]
    pub versions: Vec<String>,

    /// Package manager to run; repeatable
    #[arg(long = "package-manager", value_name = "PM", global = true)]
    pub package_managers: Vec<PackageManager>,

    /// Feature set to run, by name; repeatable
    #[arg(long = "feature-set", value_name = "NAME", global = true)]
    pub feature_sets: Vec<String>,

    /// Primary cache state to run; repeatable
    #[arg(long, value_enum, global = true)]
    pub cache: Vec<Toggle>,

    /// Secondary cache state to run; repeatable
    #[arg(long, value_enum, global = true)]
    pub secondary_cache: Vec<Toggle>,

    /// Ledger file (default from config: benchmark-results.csv)
    #[arg(long, global = true)]
    pub results_file: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the selected configurations (default)
    Run,
    /// List the configurations a run would execute
    Plan,
    /// Summarize the ledger
    Summary {
        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format: markdown, json
        #[arg(long, default_value = "markdown")]
        format: SummaryFormat,
    },
    /// Print the default configuration
    InitConfig,
}

/// Cache state selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    /// Cache enabled (warm)
    On,
    /// Cache disabled (cold)
    Off,
}

impl Toggle {
    fn enabled(self) -> bool {
        matches!(self, Toggle::On)
    }
}

/// Run the initbench CLI, returning the process exit code.
pub fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the initbench CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<i32> {
    // Initialize logging
    let filter = if cli.verbose {
        "initbench=debug"
    } else {
        "initbench=info"
    };
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    if let Some(Commands::InitConfig) = cli.command {
        print!("{}", BenchConfig::default_toml());
        return Ok(EXIT_OK);
    }

    let config = load_config(&cli)?;

    match &cli.command {
        Some(Commands::Plan) => {
            show_plan(&cli, &config)?;
            Ok(EXIT_OK)
        }
        Some(Commands::Summary { output, format }) => {
            write_summary(&config, output.as_deref(), *format)?;
            Ok(EXIT_OK)
        }
        Some(Commands::InitConfig) => Ok(EXIT_OK),
        Some(Commands::Run) | None => run_benchmarks(&cli, &config),
    }
}

/// Load the configuration and apply command-line overrides
fn load_config(cli: &Cli) -> anyhow::Result<BenchConfig> {
    let mut config = match &cli.config {
        Some(path) => BenchConfig::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => BenchConfig::discover().unwrap_or_default(),
    };
    if let Some(iterations) = cli.iterations {
        config.runner.iterations = iterations;
    }
    if cli.secondary_tests {
        config.runner.secondary_tests = true;
    }
    if let Some(path) = &cli.results_file {
        config.runner.results_file = path.display().to_string();
    }
    config.validate()?;
    Ok(config)
}

fn non_empty<T>(values: Vec<T>) -> Option<Vec<T>> {
    if values.is_empty() { None } else { Some(values) }
}

fn dedup<T: PartialEq + Clone>(values: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(values.len());
    for value in values {
        if !out.contains(value) {
            out.push(value.clone());
        }
    }
    out
}

/// Build the catalog and selection from configuration and flags.
///
/// Any selection flag restricts expansion to the named values. Versions and
/// package managers missing from the configuration are added; feature sets
/// must be configured.
pub fn build_selection(cli: &Cli, mut catalog: Catalog) -> anyhow::Result<(Catalog, Selection)> {
    for name in &cli.versions {
        if catalog.version(name).is_none() {
            let version = catalog.version_or_default(name);
            tracing::info!("Adding version {} ({})", version.name, version.command);
            catalog.versions.push(version);
        }
    }
    for pm in &cli.package_managers {
        if !catalog.package_managers.contains(pm) {
            catalog.package_managers.push(*pm);
        }
    }
    for name in &cli.feature_sets {
        if catalog.feature_set(name).is_none() {
            let known: Vec<&str> = catalog.feature_sets.iter().map(|f| f.name.as_str()).collect();
            anyhow::bail!("Unknown feature set '{}' (known: {})", name, known.join(", "));
        }
    }

    let mut selection = Selection {
        versions: non_empty(dedup(&cli.versions)),
        package_managers: non_empty(dedup(&cli.package_managers)),
        feature_sets: non_empty(dedup(&cli.feature_sets)),
        cache: None,
        secondary_cache: None,
    };
    if !cli.cache.is_empty() {
        selection.cache = Some(dedup(&cli.cache).into_iter().map(Toggle::enabled).collect());
    }
    if !cli.secondary_cache.is_empty() {
        selection.secondary_cache = Some(
            dedup(&cli.secondary_cache)
                .into_iter()
                .map(Toggle::enabled)
                .collect(),
        );
    }
    Ok((catalog, selection))
}

fn resume_mode(cli: &Cli) -> ResumeMode {
    if cli.rerun_failed {
        ResumeMode::RerunFailed
    } else {
        cli.resume_mode.unwrap_or_default()
    }
}

/// Expand the selection and narrow it against the ledger, without side effects
fn plan_run(cli: &Cli, config: &BenchConfig) -> anyhow::Result<(Catalog, ResolvedPlan)> {
    let (catalog, selection) = build_selection(cli, config.catalog())?;
    let ledger_path = PathBuf::from(&config.runner.results_file);

    let existing: Option<ResumeState> = ledger_path
        .exists()
        .then(|| parse_existing(&ledger_path, &catalog));
    let units = if cli.rerun_failed {
        Vec::new()
    } else {
        expand(&catalog, &selection)
    };
    let resolved = resolve(units, existing.as_ref(), resume_mode(cli), cli.rerun_failed);

    if let Some(state) = &existing {
        if !state.completed.is_empty() {
            tracing::info!(
                "Found {} completed tests in existing results.",
                state.completed.len()
            );
        }
        if !state.failed.is_empty() {
            tracing::warn!("{} test(s) failed previously.", state.failed.len());
        }
    }
    Ok((catalog, resolved))
}

fn show_plan(cli: &Cli, config: &BenchConfig) -> anyhow::Result<()> {
    let (_, resolved) = plan_run(cli, config)?;
    print!("{}", format_plan(&resolved.plan, config.runner.iterations));
    if resolved.discard_ledger {
        println!("Existing results would be discarded.");
    }
    if !resolved.replaced.is_empty() {
        println!(
            "{} existing result(s) would be replaced.",
            resolved.replaced.len()
        );
    }
    Ok(())
}

fn write_summary(
    config: &BenchConfig,
    output: Option<&Path>,
    format: SummaryFormat,
) -> anyhow::Result<()> {
    let ledger_path = PathBuf::from(&config.runner.results_file);
    if !ledger_path.exists() {
        anyhow::bail!("No results found at {}", ledger_path.display());
    }
    let records = load_results(&ledger_path, &BTreeSet::new())
        .with_context(|| format!("Failed to read {}", ledger_path.display()))?;

    let now = chrono::Utc::now();
    let content = match format {
        SummaryFormat::Markdown => generate_markdown_summary(&records, now),
        SummaryFormat::Json => generate_json_summary(&records, now)?,
    };

    match output {
        Some(path) => {
            std::fs::write(path, &content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!("Summary written to: {}", path.display());
        }
        None => print!("{}", content),
    }
    Ok(())
}

/// Run with interrupt handling; internal faults kill tracked processes and exit 1
fn run_benchmarks(cli: &Cli, config: &BenchConfig) -> anyhow::Result<i32> {
    let supervisor = Arc::new(ProcessSupervisor::new(config.kill_grace()?));
    let token = CancellationToken::new();
    {
        let token = token.clone();
        let supervisor = Arc::clone(&supervisor);
        ctrlc::set_handler(move || {
            if !token.is_cancelled() {
                eprintln!("\nInterrupted, stopping...");
            }
            token.cancel();
            supervisor.terminate_all();
        })
        .context("Failed to install interrupt handler")?;
    }

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        execute_run(cli, config, Arc::clone(&supervisor), token.clone())
    }));
    Ok(settle(result, &supervisor))
}

/// Exit code for a finished run; faults kill tracked processes and skip any flush
fn settle(
    result: std::thread::Result<anyhow::Result<i32>>,
    supervisor: &ProcessSupervisor,
) -> i32 {
    match result {
        Ok(Ok(code)) => code,
        Ok(Err(e)) => {
            supervisor.terminate_all();
            tracing::error!("{:#}", e);
            EXIT_FAULT
        }
        Err(panic) => {
            supervisor.terminate_all();
            let message = if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            tracing::error!("Internal fault: {}", message);
            EXIT_FAULT
        }
    }
}

fn execute_run(
    cli: &Cli,
    config: &BenchConfig,
    supervisor: Arc<ProcessSupervisor>,
    token: CancellationToken,
) -> anyhow::Result<i32> {
    let (_, resolved) = plan_run(cli, config)?;
    let ledger_path = PathBuf::from(&config.runner.results_file);

    if cli.rerun_failed && resolved.plan.units.is_empty() {
        tracing::warn!("No failed tests found in {}. Exiting.", ledger_path.display());
        return Ok(EXIT_OK);
    }

    let loaded = prepare_ledger(&ledger_path, &resolved)?;
    let iterations = config.runner.iterations;
    tracing::info!(
        "Running {} test configuration(s) with {} iteration(s) each ({} total runs)",
        resolved.plan.units.len(),
        iterations,
        resolved.plan.units.len() * iterations as usize
    );

    let services = Services {
        supervisor,
        caches: CacheController::new(config.caches.clone()),
        workspaces: WorkspaceProvisioner::new(
            expand_home(&config.runner.fixture_dir),
            expand_home(&config.runner.runs_dir),
        ),
        ledger_path,
    };
    let state = RunState::new(iterations, config.runner.secondary_tests).with_results(loaded);
    let mut orchestrator = Orchestrator::new(services, state, token)
        .with_env(config.runner.env.clone());
    orchestrator.arm_flush();

    let summary = orchestrator.run(&resolved.plan);

    if summary.cancelled {
        tracing::warn!("Interrupted, saving partial results...");
        let saved = orchestrator.teardown()?;
        tracing::info!("Saved {} new result(s)", saved);
        return Ok(EXIT_OK);
    }

    orchestrator.finish()?;
    println!(
        "\nBenchmark complete: {}/{} configurations completed | {}/{} total runs",
        summary.completed, summary.total, summary.runs_completed, summary.total_runs
    );
    Ok(EXIT_OK)
}

/// Apply a resolved plan to the ledger and load the results it keeps
pub fn prepare_ledger(
    ledger_path: &Path,
    resolved: &ResolvedPlan,
) -> anyhow::Result<Vec<initbench_ledger::BenchmarkRecord>> {
    if resolved.discard_ledger {
        tracing::warn!("Starting from scratch (will overwrite existing results)");
        if ledger_path.exists() {
            std::fs::remove_file(ledger_path)
                .with_context(|| format!("Failed to remove {}", ledger_path.display()))?;
        }
        return Ok(Vec::new());
    }
    if !ledger_path.exists() {
        return Ok(Vec::new());
    }
    if !resolved.replaced.is_empty() {
        let removed = remove_for_units(ledger_path, &resolved.replaced)?;
        tracing::info!("Removed {} old result(s) from {}", removed, ledger_path.display());
    }
    let loaded = load_results(ledger_path, &resolved.unit_ids())?;
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use initbench_ledger::{BenchmarkRecord, SaveMode, SecondaryStatus, UnitStatus, save};

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("initbench").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_default_command_is_run() {
        let cli = parse(&[]);
        assert!(cli.command.is_none());
        assert!(!cli.rerun_failed);
        assert_eq!(resume_mode(&cli), ResumeMode::Resume);
    }

    #[test]
    fn test_run_flags() {
        let cli = parse(&[
            "run",
            "-n",
            "3",
            "--version",
            "canary",
            "--version",
            "9.1.0",
            "--package-manager",
            "pnpm",
            "--feature-set",
            "a11y",
            "--cache",
            "off",
            "--resume-mode",
            "rerun-failed-and-resume",
        ]);
        assert!(matches!(cli.command, Some(Commands::Run)));
        assert_eq!(cli.iterations, Some(3));
        assert_eq!(resume_mode(&cli), ResumeMode::RerunFailedAndResume);

        let (catalog, selection) = build_selection(&cli, Catalog::default()).unwrap();
        assert_eq!(
            catalog.version("9.1.0").unwrap().command,
            "storybook@9.1.0"
        );
        assert!(catalog.package_managers.contains(&PackageManager::Pnpm));
        assert_eq!(selection.cache, Some(vec![false]));
        assert_eq!(selection.secondary_cache, None);

        // 2 versions × pnpm × a11y × cold
        assert_eq!(expand(&catalog, &selection).len(), 2);
    }

    #[test]
    fn test_no_selection_flags_means_all() {
        let (catalog, selection) = build_selection(&parse(&[]), Catalog::default()).unwrap();
        assert!(!selection.is_restricted());
        assert_eq!(catalog, Catalog::default());
    }

    #[test]
    fn test_unknown_feature_set_is_rejected() {
        let cli = parse(&["--feature-set", "nope"]);
        let err = build_selection(&cli, Catalog::default()).unwrap_err();
        assert!(err.to_string().contains("Unknown feature set 'nope'"));
    }

    #[test]
    fn test_rerun_failed_conflicts_with_resume_mode() {
        let result = Cli::try_parse_from([
            "initbench",
            "--rerun-failed",
            "--resume-mode",
            "resume",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_summary_flags() {
        let cli = parse(&["summary", "--format", "json", "-o", "out.json"]);
        match cli.command {
            Some(Commands::Summary { output, format }) => {
                assert_eq!(format, SummaryFormat::Json);
                assert_eq!(output, Some(PathBuf::from("out.json")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    fn record(id: &str, status: UnitStatus) -> BenchmarkRecord {
        BenchmarkRecord {
            test_id: id.to_string(),
            version: "10.0.7".to_string(),
            package_manager: "npm".to_string(),
            features: "a11y".to_string(),
            with_cache: "no".to_string(),
            with_secondary_cache: "-".to_string(),
            iterations: 1,
            success_count: if status == UnitStatus::Yes { 1 } else { 0 },
            duration_mean: "1.00".to_string(),
            duration_median: "1.00".to_string(),
            duration_min: "1.00".to_string(),
            duration_max: "1.00".to_string(),
            duration_std_dev: "0.00".to_string(),
            success: status,
            error: String::new(),
            secondary_status: SecondaryStatus::NotRun,
            secondary_pass_count: None,
            secondary_fail_count: None,
            command: String::new(),
        }
    }

    #[test]
    fn test_prepare_ledger_rerun_failed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        save(
            &[
                record("test-0001", UnitStatus::Yes),
                record("test-0002", UnitStatus::No),
            ],
            &path,
            SaveMode::Overwrite,
        )
        .unwrap();

        let catalog = Catalog::default();
        let state = parse_existing(&path, &catalog);
        let resolved = resolve(Vec::new(), Some(&state), ResumeMode::Resume, true);
        assert_eq!(resolved.plan.units.len(), 1);

        let kept = prepare_ledger(&path, &resolved).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].test_id, "test-0001");

        // The failed row is gone from the file too
        let after = parse_existing(&path, &catalog);
        assert!(after.failed.is_empty());
        assert!(after.completed.contains("test-0001"));
    }

    #[test]
    fn test_resume_keeps_rows_that_do_not_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        save(&[record("test-0001", UnitStatus::Yes)], &path, SaveMode::Overwrite).unwrap();
        let mut fields = record("test-0002", UnitStatus::Yes).to_fields();
        fields[13] = String::new();
        let odd = initbench_ledger::format_row(fields).unwrap();
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str(&odd);
        content.push('\n');
        std::fs::write(&path, content).unwrap();

        let catalog = Catalog::default();
        let state = parse_existing(&path, &catalog);
        let units: Vec<_> = expand(&catalog, &Selection::all()).into_iter().take(2).collect();
        let resolved = resolve(units, Some(&state), ResumeMode::Resume, false);
        assert!(resolved.plan.units.is_empty());

        let kept = prepare_ledger(&path, &resolved).unwrap();
        assert_eq!(kept.len(), 1);

        let services = Services {
            supervisor: Arc::new(ProcessSupervisor::default()),
            caches: CacheController::new(CacheConfig::default()),
            workspaces: WorkspaceProvisioner::new(
                dir.path().join("fixture"),
                dir.path().join("runs"),
            ),
            ledger_path: path.clone(),
        };
        let mut orchestrator = Orchestrator::new(
            services,
            RunState::new(1, false).with_results(kept),
            CancellationToken::new(),
        );
        orchestrator.run(&resolved.plan);
        assert_eq!(orchestrator.finish().unwrap(), 1);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"test-0001\""));
        assert!(content.lines().any(|line| line == odd));
    }

    #[test]
    fn test_settle_passes_through_exit_code() {
        let supervisor = ProcessSupervisor::default();
        assert_eq!(settle(Ok(Ok(EXIT_OK)), &supervisor), EXIT_OK);
        assert!(!supervisor.is_closed());
    }

    #[test]
    fn test_settle_error_shuts_down_supervisor() {
        let supervisor = ProcessSupervisor::default();
        let code = settle(Ok(Err(anyhow::anyhow!("ledger unwritable"))), &supervisor);
        assert_eq!(code, EXIT_FAULT);
        assert!(supervisor.is_closed());
    }

    #[cfg(unix)]
    #[test]
    fn test_settle_panic_kills_live_process() {
        use std::time::{Duration, Instant};

        let supervisor = Arc::new(ProcessSupervisor::new(Duration::from_millis(100)));
        let runner = Arc::clone(&supervisor);
        let start = Instant::now();
        let child = std::thread::spawn(move || runner.run("sleep 30", &RunOptions::default()));
        while supervisor.active_count() == 0 && start.elapsed() < Duration::from_secs(5) {
            std::thread::sleep(Duration::from_millis(10));
        }

        let panicked = std::panic::catch_unwind(|| -> anyhow::Result<i32> {
            panic!("index out of bounds")
        });
        assert_eq!(settle(panicked, &supervisor), EXIT_FAULT);

        assert!(child.join().unwrap().is_err());
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(supervisor.active_count(), 0);
    }

    #[test]
    fn test_prepare_ledger_start_over_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        save(&[record("test-0001", UnitStatus::Yes)], &path, SaveMode::Overwrite).unwrap();

        let catalog = Catalog::default();
        let state = parse_existing(&path, &catalog);
        let units = expand(&catalog, &Selection::all());
        let resolved = resolve(units, Some(&state), ResumeMode::StartOver, false);

        assert!(prepare_ledger(&path, &resolved).unwrap().is_empty());
        assert!(!path.exists());
    }
}
