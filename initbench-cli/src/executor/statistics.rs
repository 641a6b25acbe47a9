//! Per-Unit Aggregation
//!
//! Folds the iteration outcomes of one unit into the ledger record. Only
//! successful durations feed the statistics; failed iterations contribute to
//! the status and error text.

use initbench_core::{IterationOutcome, TestUnit};
use initbench_ledger::{BenchmarkRecord, SecondaryStatus, UnitStatus, yes_no};
use initbench_stats::{Statistics, compute_statistics};

/// Error text used when every iteration failed without saying why
const UNKNOWN_ERROR: &str = "Unknown error";

fn base_record(unit: &TestUnit, iterations: u32) -> BenchmarkRecord {
    BenchmarkRecord {
        test_id: unit.id.clone(),
        version: unit.version.name.clone(),
        package_manager: unit.package_manager.name().to_string(),
        features: unit.feature_set.name.clone(),
        with_cache: yes_no(unit.cache_enabled).to_string(),
        with_secondary_cache: if unit.has_secondary_cache_dimension() {
            yes_no(unit.secondary_cache_enabled).to_string()
        } else {
            "-".to_string()
        },
        iterations,
        success_count: 0,
        duration_mean: String::new(),
        duration_median: String::new(),
        duration_min: String::new(),
        duration_max: String::new(),
        duration_std_dev: String::new(),
        success: UnitStatus::No,
        error: String::new(),
        secondary_status: SecondaryStatus::NotRun,
        secondary_pass_count: None,
        secondary_fail_count: None,
        command: unit.init_command(),
    }
}

fn apply_statistics(record: &mut BenchmarkRecord, stats: Statistics) {
    record.duration_mean = stats.mean;
    record.duration_median = stats.median;
    record.duration_min = stats.min;
    record.duration_max = stats.max;
    record.duration_std_dev = stats.std_dev;
}

/// Aggregate the outcomes of `iterations` attempts at `unit`
pub fn summarize_unit(
    unit: &TestUnit,
    outcomes: &[IterationOutcome],
    iterations: u32,
    secondary_tests: bool,
) -> BenchmarkRecord {
    let durations: Vec<f64> = outcomes
        .iter()
        .filter(|o| o.success)
        .map(|o| o.duration_secs)
        .collect();
    let success_count = durations.len() as u32;
    let failed_count = iterations.saturating_sub(success_count);

    let mut record = base_record(unit, iterations);
    record.success_count = success_count;
    record.success = UnitStatus::classify(success_count, iterations);
    apply_statistics(&mut record, compute_statistics(&durations));

    record.error = match record.success {
        UnitStatus::No => outcomes
            .iter()
            .find_map(|o| o.error.clone())
            .unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
        UnitStatus::Partial => format!("{} iteration(s) failed", failed_count),
        UnitStatus::Yes => String::new(),
    };

    if secondary_tests {
        let (passed, failed) = outcomes
            .iter()
            .filter_map(|o| o.secondary.as_ref())
            .fold((0u32, 0u32), |(p, f), s| {
                if s.success { (p + 1, f) } else { (p, f + 1) }
            });
        record.secondary_status = SecondaryStatus::classify(passed, failed);
        record.secondary_pass_count = Some(passed);
        record.secondary_fail_count = Some(failed);
    }

    record
}

/// Record for a unit that could not be run at all
pub fn failure_record(unit: &TestUnit, iterations: u32, error: &str) -> BenchmarkRecord {
    let mut record = base_record(unit, iterations);
    let zero = "0.00".to_string();
    record.duration_mean = zero.clone();
    record.duration_median = zero.clone();
    record.duration_min = zero.clone();
    record.duration_max = zero.clone();
    record.duration_std_dev = zero;
    record.error = error.to_string();
    record
}
