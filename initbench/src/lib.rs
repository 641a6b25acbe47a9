#![warn(missing_docs)]
//! # initbench
//!
//! Benchmark harness for scaffolding-tool initialization.
//!
//! initbench times a tool's `init` across a matrix of dimensions:
//! - **Versions**: any number of published or pre-release versions
//! - **Package managers**: yarn, yarn berry, npm, bun, pnpm, each launched its own way
//! - **Feature sets**: named groups of init flags; sets with `test` add a smoke test
//! - **Cache states**: cold runs wipe and redirect every cache, warm runs reuse them
//!
//! Results land in a fully quoted CSV ledger, one row per configuration, so
//! an interrupted run can resume or rerun only what failed.
//!
//! ## Quick Start
//!
//! ```text
//! initbench init-config > initbench.toml
//! initbench plan --version canary --cache off
//! initbench -n 5 --secondary-tests
//! initbench summary -o summary.md
//! ```

// Re-export core types
pub use initbench_core::{
    Catalog, FeatureSet, IterationOutcome, PackageManager, SecondaryTestOutcome, TestUnit, Timer,
    Version, strip_iteration_suffix,
};

// Re-export stats
pub use initbench_stats::{Statistics, compute_statistics};

// Re-export ledger
pub use initbench_ledger::{
    BenchmarkRecord, LEDGER_HEADERS, LedgerError, ResumeState, SaveMode, SecondaryStatus,
    UnitStatus, generate_json_summary, generate_markdown_summary, load_results, parse_existing,
    remove_for_units, save, split_row,
};

// Re-export the runner
pub use initbench_cli::{
    BenchConfig, CacheConfig, CacheController, CancellationToken, Cli, EXIT_FAULT, EXIT_OK,
    ExecutionPlan, Orchestrator, ProcessSupervisor, ResumeMode, RunOptions, RunState, Selection,
    Services, WorkspaceProvisioner, expand, select_for_resume, summarize_unit,
};

/// Run the initbench CLI, returning the process exit code.
///
/// ```ignore
/// fn main() {
///     std::process::exit(initbench::run().unwrap_or(1));
/// }
/// ```
pub use initbench_cli::run;
