//! Benchmark Executor
//!
//! Runs planned units and turns their iterations into ledger records.
//!
//! ## Pipeline Overview
//!
//! ```text
//! ExecutionPlan (from the planner)
//!       │
//!       ▼
//! ┌─────────────┐
//! │  execution  │  Wipe caches, provision workspaces, time invocations
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │ statistics  │  Fold iteration outcomes into one record per unit
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │ formatting  │  Human-readable progress lines
//! └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`execution`] - Orchestrator, services and run state
//! - [`statistics`] - Per-unit aggregation and synthetic failure records
//! - [`formatting`] - Human-readable output formatting
//! - [`cancellation`] - Operator abort flag

mod cancellation;
mod execution;
mod formatting;
mod statistics;

// Re-export public API
pub use cancellation::CancellationToken;
pub use execution::{Orchestrator, RunState, RunSummary, Services};
pub use formatting::{format_plan, format_progress};
pub use statistics::{failure_record, summarize_unit};
