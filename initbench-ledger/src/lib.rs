#![warn(missing_docs)]
//! initbench Ledger - Durable Results
//!
//! One fully quoted CSV row per test unit, rewritten atomically:
//! - overwrite and idempotent merge-append
//! - deletion by unit id
//! - resume state reconstruction from previous runs
//! - markdown and JSON summaries

mod json;
mod ledger;
mod record;
mod row;
mod summary;

pub use json::{LedgerSnapshot, generate_json_summary};
pub use ledger::{ResumeState, SaveMode, load_results, parse_existing, remove_for_units, save};
pub use record::{BenchmarkRecord, LEDGER_HEADERS, SecondaryStatus, UnitStatus, yes_no};
pub use row::{format_row, split_row};
pub use summary::generate_markdown_summary;

use thiserror::Error;

/// Errors from reading or writing the ledger
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Filesystem failure
    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Row could not be tokenized or encoded
    #[error("ledger row error: {0}")]
    Csv(#[from] csv::Error),

    /// Temporary file could not replace the ledger
    #[error("failed to replace ledger: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Output format for `initbench summary`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SummaryFormat {
    /// Markdown comparison tables
    #[default]
    Markdown,
    /// JSON snapshot of all records
    Json,
}

impl std::str::FromStr for SummaryFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Ok(SummaryFormat::Markdown),
            "json" => Ok(SummaryFormat::Json),
            other => Err(format!("Unknown summary format: {}", other)),
        }
    }
}
