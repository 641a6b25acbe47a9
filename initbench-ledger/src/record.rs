//! Ledger Records
//!
//! One `BenchmarkRecord` is persisted per test unit. Field values are kept in
//! the textual form they take in the ledger so rows read from older files can
//! be written back unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Column headers, in ledger order
pub const LEDGER_HEADERS: [&str; 19] = [
    "Test ID",
    "Version",
    "Package Manager",
    "Features",
    "With Cache",
    "With Secondary Cache",
    "Iterations",
    "Success Count",
    "Duration Mean (s)",
    "Duration Median (s)",
    "Duration Min (s)",
    "Duration Max (s)",
    "Duration StdDev (s)",
    "Success",
    "Error",
    "Secondary Test Status",
    "Secondary Test Pass Count",
    "Secondary Test Fail Count",
    "Command",
];

/// Overall outcome of a unit's iterations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    /// Every iteration succeeded
    Yes,
    /// Every iteration failed
    No,
    /// Some iterations failed
    Partial,
}

impl UnitStatus {
    /// Classify `success_count` successes out of `iterations`
    pub fn classify(success_count: u32, iterations: u32) -> Self {
        if success_count == 0 {
            UnitStatus::No
        } else if success_count >= iterations {
            UnitStatus::Yes
        } else {
            UnitStatus::Partial
        }
    }

    /// Ledger text
    pub fn as_str(self) -> &'static str {
        match self {
            UnitStatus::Yes => "yes",
            UnitStatus::No => "no",
            UnitStatus::Partial => "partial",
        }
    }

    /// Whether the unit needs a rerun
    pub fn is_failure(self) -> bool {
        matches!(self, UnitStatus::No | UnitStatus::Partial)
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "yes" => Ok(UnitStatus::Yes),
            "no" => Ok(UnitStatus::No),
            "partial" => Ok(UnitStatus::Partial),
            other => Err(format!("Unknown status: {}", other)),
        }
    }
}

/// Aggregated secondary (smoke) test outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecondaryStatus {
    /// Every smoke test passed
    Passed,
    /// Every smoke test failed
    Failed,
    /// Mixed results
    Partial,
    /// No smoke test ran
    #[serde(rename = "-")]
    NotRun,
}

impl SecondaryStatus {
    /// Classify pass/fail counts; no runs is `NotRun`
    pub fn classify(passed: u32, failed: u32) -> Self {
        match (passed, failed) {
            (0, 0) => SecondaryStatus::NotRun,
            (_, 0) => SecondaryStatus::Passed,
            (0, _) => SecondaryStatus::Failed,
            _ => SecondaryStatus::Partial,
        }
    }

    /// Ledger text
    pub fn as_str(self) -> &'static str {
        match self {
            SecondaryStatus::Passed => "passed",
            SecondaryStatus::Failed => "failed",
            SecondaryStatus::Partial => "partial",
            SecondaryStatus::NotRun => "-",
        }
    }
}

impl fmt::Display for SecondaryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecondaryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "passed" => Ok(SecondaryStatus::Passed),
            "failed" => Ok(SecondaryStatus::Failed),
            "partial" => Ok(SecondaryStatus::Partial),
            "-" | "" => Ok(SecondaryStatus::NotRun),
            other => Err(format!("Unknown secondary test status: {}", other)),
        }
    }
}

/// Text form of a yes/no flag
pub fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

/// Persisted result of one test unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRecord {
    /// Unit identifier
    pub test_id: String,
    /// Version name
    pub version: String,
    /// Package manager name
    pub package_manager: String,
    /// Feature set name
    pub features: String,
    /// `yes` or `no`
    pub with_cache: String,
    /// `yes`, `no`, or `-` when the feature set has no test capability
    pub with_secondary_cache: String,
    /// Iterations attempted
    pub iterations: u32,
    /// Iterations that succeeded
    pub success_count: u32,
    /// Mean of successful durations
    pub duration_mean: String,
    /// Median of successful durations
    pub duration_median: String,
    /// Shortest successful duration
    pub duration_min: String,
    /// Longest successful duration
    pub duration_max: String,
    /// Population standard deviation of successful durations
    pub duration_std_dev: String,
    /// Overall status
    pub success: UnitStatus,
    /// First error, a failure count, or empty
    pub error: String,
    /// Smoke test status
    pub secondary_status: SecondaryStatus,
    /// Smoke tests passed, `None` when smoke tests were disabled
    pub secondary_pass_count: Option<u32>,
    /// Smoke tests failed, `None` when smoke tests were disabled
    pub secondary_fail_count: Option<u32>,
    /// Timed command line
    pub command: String,
}

fn count_field(count: Option<u32>) -> String {
    count.map_or_else(|| "-".to_string(), |c| c.to_string())
}

impl BenchmarkRecord {
    /// Field values in `LEDGER_HEADERS` order
    pub fn to_fields(&self) -> Vec<String> {
        vec![
            self.test_id.clone(),
            self.version.clone(),
            self.package_manager.clone(),
            self.features.clone(),
            self.with_cache.clone(),
            self.with_secondary_cache.clone(),
            self.iterations.to_string(),
            self.success_count.to_string(),
            self.duration_mean.clone(),
            self.duration_median.clone(),
            self.duration_min.clone(),
            self.duration_max.clone(),
            self.duration_std_dev.clone(),
            self.success.to_string(),
            self.error.clone(),
            self.secondary_status.to_string(),
            count_field(self.secondary_pass_count),
            count_field(self.secondary_fail_count),
            self.command.clone(),
        ]
    }

    /// Rebuild a record from split row fields.
    ///
    /// Accepts the full layout (optionally without the trailing Command) and
    /// the legacy short layout `Test ID .. With Secondary Cache, Duration (s),
    /// Success, Error`. Returns `None` for rows that fit neither.
    pub fn from_fields(fields: &[String]) -> Option<Self> {
        let get = |i: usize| fields.get(i).map(|s| s.as_str()).unwrap_or("");
        let count = |s: &str| s.trim().parse::<u32>().ok();

        if fields.len() >= 15 {
            let iterations = count(get(6)).unwrap_or(1);
            Some(Self {
                test_id: get(0).to_string(),
                version: get(1).to_string(),
                package_manager: get(2).to_string(),
                features: get(3).to_string(),
                with_cache: get(4).to_string(),
                with_secondary_cache: get(5).to_string(),
                iterations,
                success_count: count(get(7)).unwrap_or(0),
                duration_mean: get(8).to_string(),
                duration_median: get(9).to_string(),
                duration_min: get(10).to_string(),
                duration_max: get(11).to_string(),
                duration_std_dev: get(12).to_string(),
                success: get(13).parse().ok()?,
                error: get(14).to_string(),
                secondary_status: get(15).parse().unwrap_or(SecondaryStatus::NotRun),
                secondary_pass_count: count(get(16)),
                secondary_fail_count: count(get(17)),
                command: get(18).to_string(),
            })
        } else if fields.len() >= 9 {
            let success: UnitStatus = get(7).parse().ok()?;
            let duration = get(6).to_string();
            Some(Self {
                test_id: get(0).to_string(),
                version: get(1).to_string(),
                package_manager: get(2).to_string(),
                features: get(3).to_string(),
                with_cache: get(4).to_string(),
                with_secondary_cache: get(5).to_string(),
                iterations: 1,
                success_count: u32::from(success == UnitStatus::Yes),
                duration_mean: duration.clone(),
                duration_median: duration.clone(),
                duration_min: duration.clone(),
                duration_max: duration,
                duration_std_dev: "0.00".to_string(),
                success,
                error: get(8).to_string(),
                secondary_status: SecondaryStatus::NotRun,
                secondary_pass_count: None,
                secondary_fail_count: None,
                command: String::new(),
            })
        } else {
            None
        }
    }

    /// Mean duration as a number, zero when unparsable
    pub fn mean_secs(&self) -> f64 {
        self.duration_mean.trim().parse().unwrap_or(0.0)
    }

    /// Median duration as a number, zero when unparsable
    pub fn median_secs(&self) -> f64 {
        self.duration_median.trim().parse().unwrap_or(0.0)
    }
}
