//! Output Formatting
//!
//! Human-readable lines printed while a run progresses, plus the plan
//! listing used by `initbench plan`.

use crate::planner::ExecutionPlan;
use initbench_core::{SecondaryTestOutcome, TestUnit};
use initbench_ledger::{BenchmarkRecord, yes_no};
use std::fmt::Write as _;

/// Header printed before each iteration
pub fn format_unit_header(unit: &TestUnit, iteration: u32, iterations: u32) -> String {
    let suffix = if iterations > 1 {
        format!(" (iteration {}/{})", iteration + 1, iterations)
    } else {
        String::new()
    };
    format!(
        "\n[{}{}] Starting benchmark:\n  Version: {}\n  Package Manager: {}\n  Features: {}\n  \
         With Cache: {}\n  With Secondary Cache: {}",
        unit.id,
        suffix,
        unit.version.name,
        unit.package_manager,
        unit.feature_set.name,
        unit.cache_enabled,
        unit.secondary_cache_enabled,
    )
}

/// Timed command about to run
pub fn format_running(command: &str) -> String {
    format!("  Running: {}", command)
}

/// Outcome of the timed invocation
pub fn format_iteration_result(success: bool, duration_secs: f64) -> String {
    format!(
        "  Result: {} ({:.2}s)",
        if success { "SUCCESS" } else { "FAILED" },
        duration_secs
    )
}

/// Outcome of the smoke test, with the error on a second line when it failed
pub fn format_secondary_result(outcome: &SecondaryTestOutcome) -> String {
    let mut line = format!(
        "  Smoke Test: {} ({:.2}s)",
        if outcome.success { "PASSED" } else { "FAILED" },
        outcome.duration_secs
    );
    if !outcome.success {
        let _ = write!(
            line,
            "\n  Smoke Test Error: {}",
            outcome.error.as_deref().unwrap_or("Unknown error")
        );
    }
    line
}

/// One-line aggregate for a finished unit
pub fn format_unit_summary(record: &BenchmarkRecord) -> String {
    let mut line = format!(
        "  Summary: {}/{} successful | Mean: {}s | Median: {}s | Min: {}s | Max: {}s | StdDev: {}s",
        record.success_count,
        record.iterations,
        record.duration_mean,
        record.duration_median,
        record.duration_min,
        record.duration_max,
        record.duration_std_dev,
    );
    if let (Some(passed), Some(failed)) =
        (record.secondary_pass_count, record.secondary_fail_count)
    {
        if passed + failed > 0 {
            let _ = write!(line, " | Smoke Test: {}/{} passed", passed, passed + failed);
        }
    }
    line
}

/// Progress after each recorded unit
pub fn format_progress(
    completed: usize,
    total: usize,
    already_completed: usize,
    total_configs: usize,
    runs_completed: usize,
    total_runs: usize,
) -> String {
    format!(
        "\nProgress: {}/{} configurations completed ({}/{} total) | {}/{} total runs",
        completed,
        total,
        already_completed + completed,
        total_configs,
        runs_completed,
        total_runs
    )
}

/// Table of the units a plan would run
pub fn format_plan(plan: &ExecutionPlan, iterations: u32) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "{} of {} configuration(s) to run, {} iteration(s) each ({} total runs)",
        plan.units.len(),
        plan.total_configs,
        iterations,
        plan.units.len() * iterations as usize
    );
    if plan.units.is_empty() {
        return output;
    }
    output.push_str(&"-".repeat(72));
    output.push('\n');
    let _ = writeln!(
        output,
        "{:<10} {:<14} {:<6} {:<18} {:<6} {:<9}",
        "Test ID", "Version", "PM", "Features", "Cache", "2nd Cache"
    );
    for unit in &plan.units {
        let secondary = if unit.has_secondary_cache_dimension() {
            yes_no(unit.secondary_cache_enabled)
        } else {
            "-"
        };
        let _ = writeln!(
            output,
            "{:<10} {:<14} {:<6} {:<18} {:<6} {:<9}",
            unit.id,
            unit.version.name,
            unit.package_manager.name(),
            unit.feature_set.name,
            yes_no(unit.cache_enabled),
            secondary
        );
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use initbench_core::{FeatureSet, PackageManager, Version};
    use initbench_ledger::{SecondaryStatus, UnitStatus};

    fn unit() -> TestUnit {
        TestUnit {
            id: "test-0002".to_string(),
            version: Version::new("canary", "storybook@0.0.0-canary"),
            package_manager: PackageManager::Bun,
            feature_set: FeatureSet::new("a11y+test", ["--features", "a11y", "--features", "test"]),
            cache_enabled: true,
            secondary_cache_enabled: false,
        }
    }

    #[test]
    fn test_unit_header() {
        let single = format_unit_header(&unit(), 0, 1);
        assert!(single.starts_with("\n[test-0002] Starting benchmark:\n"));
        assert!(single.contains("  Package Manager: bun\n"));
        assert!(single.contains("  With Cache: true\n"));
        assert!(single.ends_with("  With Secondary Cache: false"));

        let repeated = format_unit_header(&unit(), 1, 3);
        assert!(repeated.starts_with("\n[test-0002 (iteration 2/3)] Starting benchmark:"));
    }

    #[test]
    fn test_result_lines() {
        assert_eq!(format_iteration_result(true, 12.5), "  Result: SUCCESS (12.50s)");
        assert_eq!(format_iteration_result(false, 0.0), "  Result: FAILED (0.00s)");
        let failed = SecondaryTestOutcome {
            success: false,
            duration_secs: 3.0,
            error: Some("Smoke test failed with exit code 1".to_string()),
        };
        assert_eq!(
            format_secondary_result(&failed),
            "  Smoke Test: FAILED (3.00s)\n  Smoke Test Error: Smoke test failed with exit code 1"
        );
    }

    #[test]
    fn test_unit_summary() {
        let mut record = BenchmarkRecord {
            test_id: "test-0002".to_string(),
            version: "canary".to_string(),
            package_manager: "bun".to_string(),
            features: "a11y+test".to_string(),
            with_cache: "yes".to_string(),
            with_secondary_cache: "no".to_string(),
            iterations: 2,
            success_count: 2,
            duration_mean: "2.00".to_string(),
            duration_median: "2.00".to_string(),
            duration_min: "1.00".to_string(),
            duration_max: "3.00".to_string(),
            duration_std_dev: "1.00".to_string(),
            success: UnitStatus::Yes,
            error: String::new(),
            secondary_status: SecondaryStatus::NotRun,
            secondary_pass_count: None,
            secondary_fail_count: None,
            command: String::new(),
        };
        let plain = "  Summary: 2/2 successful | Mean: 2.00s | Median: 2.00s | Min: 1.00s | \
                     Max: 3.00s | StdDev: 1.00s";
        assert_eq!(format_unit_summary(&record), plain);

        record.secondary_pass_count = Some(1);
        record.secondary_fail_count = Some(1);
        assert_eq!(
            format_unit_summary(&record),
            format!("{} | Smoke Test: 1/2 passed", plain)
        );
    }

    #[test]
    fn test_progress_line() {
        assert_eq!(
            format_progress(2, 5, 3, 8, 6, 15),
            "\nProgress: 2/5 configurations completed (5/8 total) | 6/15 total runs"
        );
    }

    #[test]
    fn test_plan_listing() {
        let plan = ExecutionPlan::new(vec![unit()], 4);
        let listing = format_plan(&plan, 3);
        assert!(listing.starts_with(
            "1 of 4 configuration(s) to run, 3 iteration(s) each (3 total runs)\n"
        ));
        assert!(listing.contains("test-0002"));
        assert!(listing.lines().last().unwrap().contains("a11y+test"));

        let empty = format_plan(&ExecutionPlan::new(vec![], 4), 1);
        assert_eq!(empty.lines().count(), 1);
    }
}
