//! JSON Output

use crate::record::{BenchmarkRecord, UnitStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Machine-readable snapshot of a ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Schema identifier
    pub schema: String,
    /// When the snapshot was taken
    pub generated_at: DateTime<Utc>,
    /// Number of records
    pub total: usize,
    /// Records with status `yes`
    pub succeeded: usize,
    /// Records with status `no` or `partial`
    pub failed: usize,
    /// Every record, in ledger order
    pub records: Vec<BenchmarkRecord>,
}

/// Generate a prettified JSON snapshot of ledger records.
pub fn generate_json_summary(
    records: &[BenchmarkRecord],
    generated_at: DateTime<Utc>,
) -> Result<String, serde_json::Error> {
    let succeeded = records
        .iter()
        .filter(|r| r.success == UnitStatus::Yes)
        .count();
    let snapshot = LedgerSnapshot {
        schema: "initbench-ledger/v1".to_string(),
        generated_at,
        total: records.len(),
        succeeded,
        failed: records.len() - succeeded,
        records: records.to_vec(),
    };
    serde_json::to_string_pretty(&snapshot)
}
