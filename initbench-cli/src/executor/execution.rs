//! Run Orchestration
//!
//! Drives every planned unit through its iterations, strictly one at a time:
//!
//! ```text
//! ExecutionPlan
//!       │
//!       ▼
//! ┌──────────────────┐
//! │   Orchestrator   │  per unit, per iteration:
//! │                  │  wipe caches → workspace → setup → timed init → smoke test
//! └────────┬─────────┘
//!          │
//!          ▼
//!  BenchmarkRecord → RunState (+ merge-append to the ledger when armed)
//! ```
//!
//! A unit that errors or panics outside an iteration is recorded as a
//! synthetic all-failed result and the run continues. Cancellation is polled
//! between units and iterations and before every spawn; an interrupted unit is
//! not recorded.

use super::cancellation::CancellationToken;
use super::formatting::{
    format_iteration_result, format_progress, format_running, format_secondary_result,
    format_unit_header, format_unit_summary,
};
use super::statistics::{failure_record, summarize_unit};
use crate::cache::CacheController;
use crate::planner::ExecutionPlan;
use crate::supervisor::{ProcessSupervisor, RunOptions};
use crate::workspace::WorkspaceProvisioner;
use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use initbench_core::{
    IterationOutcome, PackageManager, SecondaryTestOutcome, TestUnit, Timer, YARN_BERRY_RC,
    cold_cache_env,
};
use initbench_ledger::{BenchmarkRecord, LedgerError, SaveMode, save};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Error recorded when the isolated yarn berry setup fails
const ISOLATED_SETUP_ERROR: &str = "Failed to setup Yarn 2";

/// Error of an iteration abandoned on operator abort; never recorded
const CANCELLED_ERROR: &str = "Cancelled";

/// Variable the scaffolder reads to pick a package manager; must not leak from the harness
const USER_AGENT_VAR: &str = "npm_config_user_agent";

/// Capabilities the orchestrator runs against
#[derive(Debug, Clone)]
pub struct Services {
    /// Tracks and terminates every spawned command
    pub supervisor: Arc<ProcessSupervisor>,
    /// Cache wiping and scratch directories
    pub caches: CacheController,
    /// Per-iteration fixture copies
    pub workspaces: WorkspaceProvisioner,
    /// Ledger written by flushes and the final save
    pub ledger_path: PathBuf,
}

/// Results accumulated during a run
#[derive(Debug, Clone)]
pub struct RunState {
    /// Records in the order they were produced, after any loaded from a previous run
    pub results: Vec<BenchmarkRecord>,
    /// Iterations per unit
    pub iterations: u32,
    /// Run the smoke test after successful invocations
    pub secondary_tests: bool,
    flush_armed: bool,
}

impl RunState {
    /// Empty state with the flush disarmed
    pub fn new(iterations: u32, secondary_tests: bool) -> Self {
        Self {
            results: Vec::new(),
            iterations,
            secondary_tests,
            flush_armed: false,
        }
    }

    /// Start from records loaded out of a previous ledger
    pub fn with_results(mut self, results: Vec<BenchmarkRecord>) -> Self {
        self.results = results;
        self
    }

    /// Whether each new record is merge-appended to the ledger immediately
    pub fn is_flush_armed(&self) -> bool {
        self.flush_armed
    }
}

/// Counts reported after a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    /// Units recorded from real iterations
    pub completed: usize,
    /// Units planned
    pub total: usize,
    /// Iterations belonging to completed units
    pub runs_completed: usize,
    /// Iterations planned
    pub total_runs: usize,
    /// The run stopped early on operator abort
    pub cancelled: bool,
}

/// Removes the workspace when the iteration ends, however it ends
struct WorkspaceGuard<'a> {
    workspaces: &'a WorkspaceProvisioner,
    key: String,
}

impl Drop for WorkspaceGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.workspaces.cleanup(&self.key) {
            tracing::warn!("{:#}", e);
        }
    }
}

/// Runs an execution plan against the given services
pub struct Orchestrator {
    services: Services,
    state: RunState,
    token: CancellationToken,
    env: Vec<(String, String)>,
    progress: ProgressBar,
}

impl Orchestrator {
    /// Orchestrator over `services` that accumulates into `state`
    pub fn new(services: Services, state: RunState, token: CancellationToken) -> Self {
        Self {
            services,
            state,
            token,
            env: Vec::new(),
            progress: ProgressBar::hidden(),
        }
    }

    /// Extra variables passed to every command
    pub fn with_env<I>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.env.extend(env);
        self
    }

    /// Accumulated state
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Merge-append every new record to the ledger as soon as it is produced
    pub fn arm_flush(&mut self) {
        self.state.flush_armed = true;
    }

    /// Run every unit of the plan in order
    pub fn run(&mut self, plan: &ExecutionPlan) -> RunSummary {
        let iterations = self.state.iterations as usize;
        let mut summary = RunSummary {
            total: plan.units.len(),
            total_runs: plan.units.len() * iterations,
            ..RunSummary::default()
        };

        self.progress = ProgressBar::new(plan.units.len() as u64);
        self.progress.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        for unit in &plan.units {
            if self.token.is_cancelled() {
                break;
            }
            self.progress.set_message(unit.id.clone());

            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                self.run_unit(unit)
            }));

            match result {
                Ok(Ok(Some(outcomes))) => {
                    let record = summarize_unit(
                        unit,
                        &outcomes,
                        self.state.iterations,
                        self.state.secondary_tests,
                    );
                    let line = format_unit_summary(&record);
                    self.record(record);
                    self.say(&line);

                    summary.completed += 1;
                    summary.runs_completed += iterations;
                    self.say(&format_progress(
                        summary.completed,
                        summary.total,
                        plan.already_completed,
                        plan.total_configs,
                        summary.runs_completed,
                        summary.total_runs,
                    ));
                }
                Ok(Ok(None)) => break,
                Ok(Err(e)) => self.record_fatal(unit, &format!("{:#}", e)),
                Err(panic) => {
                    let message = if let Some(s) = panic.downcast_ref::<&str>() {
                        s.to_string()
                    } else if let Some(s) = panic.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "Unknown panic".to_string()
                    };
                    self.record_fatal(unit, &message);
                }
            }
            self.progress.inc(1);
        }

        summary.cancelled = self.token.is_cancelled();
        if summary.cancelled {
            self.progress.abandon_with_message("Interrupted");
        } else {
            self.progress.finish_with_message("Complete");
        }
        summary
    }

    /// Rewrite the ledger with every accumulated record.
    ///
    /// Rows that never loaded as records are carried over untouched.
    pub fn finish(&self) -> Result<usize, LedgerError> {
        save(
            &self.state.results,
            &self.services.ledger_path,
            SaveMode::Rewrite,
        )
    }

    /// Shutdown after an operator abort: kill tracked processes, then flush
    /// accumulated records with merge-append when the flush is armed.
    pub fn teardown(&self) -> Result<usize, LedgerError> {
        self.services.supervisor.terminate_all();
        if !self.state.flush_armed {
            return Ok(0);
        }
        save(
            &self.state.results,
            &self.services.ledger_path,
            SaveMode::Merge,
        )
    }

    fn say(&self, line: &str) {
        self.progress.suspend(|| println!("{}", line));
    }

    fn record(&mut self, record: BenchmarkRecord) {
        self.state.results.push(record);
        if self.state.flush_armed {
            if let Err(e) = save(
                &self.state.results,
                &self.services.ledger_path,
                SaveMode::Merge,
            ) {
                tracing::warn!("Failed to save results: {}", e);
            }
        }
    }

    fn record_fatal(&mut self, unit: &TestUnit, error: &str) {
        // Errors caused by the abort itself are not results
        if self.token.is_cancelled() {
            tracing::debug!(unit = %unit.id, error, "unit interrupted");
            return;
        }
        self.progress
            .suspend(|| tracing::error!("Fatal error in test {}: {}", unit.id, error));
        self.record(failure_record(unit, self.state.iterations, error));
    }

    /// All iterations of one unit; `None` when cancelled part way
    fn run_unit(&self, unit: &TestUnit) -> anyhow::Result<Option<Vec<IterationOutcome>>> {
        let mut outcomes = Vec::with_capacity(self.state.iterations as usize);
        for iteration in 0..self.state.iterations {
            if self.token.is_cancelled() {
                return Ok(None);
            }
            outcomes.push(self.run_iteration(unit, iteration)?);
        }
        if self.token.is_cancelled() {
            return Ok(None);
        }
        Ok(Some(outcomes))
    }

    fn base_options(&self, dir: &Path) -> RunOptions {
        RunOptions::in_dir(dir)
            .env("CI", "true")
            .envs(self.env.iter().cloned())
    }

    fn run_iteration(&self, unit: &TestUnit, iteration: u32) -> anyhow::Result<IterationOutcome> {
        let services = &self.services;
        self.say(&format_unit_header(unit, iteration, self.state.iterations));

        if !unit.cache_enabled {
            services
                .caches
                .wipe_package_manager_cache(unit.package_manager.name());
        }
        if unit.has_secondary_cache_dimension() && !unit.secondary_cache_enabled {
            services.caches.wipe_secondary_cache();
        }

        let key = unit.workspace_key(iteration);
        let dir = services.workspaces.setup(&key)?;
        let _guard = WorkspaceGuard {
            workspaces: &services.workspaces,
            key,
        };

        if unit.package_manager.requires_setup() && !self.setup_isolated(&dir, unit.package_manager)
        {
            return Ok(IterationOutcome::failed(0.0, ISOLATED_SETUP_ERROR));
        }

        let command = unit.init_command();
        self.say(&format_running(&command));

        let scratch = if unit.cache_enabled {
            None
        } else {
            Some(
                services
                    .caches
                    .create_scratch_cache_dir()
                    .context("Failed to create scratch cache directory")?,
            )
        };

        let mut options = self.base_options(&dir).env_remove(USER_AGENT_VAR);
        if let Some(scratch) = &scratch {
            options = options.envs(cold_cache_env(scratch.path()));
        }

        if self.token.is_cancelled() {
            if let Some(scratch) = scratch {
                services.caches.destroy_scratch_cache_dir(scratch);
            }
            return Ok(IterationOutcome::failed(0.0, CANCELLED_ERROR));
        }

        let timer = Timer::start();
        let result = self
            .progress
            .suspend(|| services.supervisor.run(&command, &options));
        let duration = timer.elapsed_secs();

        if let Some(scratch) = scratch {
            services.caches.destroy_scratch_cache_dir(scratch);
        }

        self.say(&format_iteration_result(result.is_ok(), duration));
        let outcome = match result {
            Ok(_) => IterationOutcome::succeeded(duration),
            Err(e) => IterationOutcome::failed(duration, e.to_string()),
        };

        if outcome.success && self.state.secondary_tests && !self.token.is_cancelled() {
            let smoke = self.run_secondary(&dir, unit.package_manager);
            self.say(&format_secondary_result(&smoke));
            return Ok(outcome.with_secondary(smoke));
        }
        Ok(outcome)
    }

    /// Prepare a workspace for a manager that needs per-project setup
    fn setup_isolated(&self, dir: &Path, pm: PackageManager) -> bool {
        if let Err(e) = std::fs::write(dir.join(".yarnrc.yml"), YARN_BERRY_RC) {
            tracing::warn!("Failed to write .yarnrc.yml in {}: {}", dir.display(), e);
            return false;
        }
        let options = self
            .base_options(dir)
            .env("YARN_ENABLE_IMMUTABLE_INSTALLS", "false")
            .captured();
        for command in pm.setup_commands() {
            if self.token.is_cancelled() {
                return false;
            }
            if let Err(e) = self.services.supervisor.run(command, &options) {
                tracing::warn!("Setup command `{}` failed: {}", command, e);
                return false;
            }
        }
        true
    }

    fn run_secondary(&self, dir: &Path, pm: PackageManager) -> SecondaryTestOutcome {
        let options = self.base_options(dir).captured();
        let timer = Timer::start();
        let result = self
            .services
            .supervisor
            .run(pm.secondary_test_command(), &options);
        let duration_secs = timer.elapsed_secs();

        match result {
            Ok(_) => SecondaryTestOutcome {
                success: true,
                duration_secs,
                error: None,
            },
            Err(e) => SecondaryTestOutcome {
                success: false,
                duration_secs,
                error: Some(match e.exit_code() {
                    Some(code) => format!("Smoke test failed with exit code {}", code),
                    None => e.to_string(),
                }),
            },
        }
    }
}
