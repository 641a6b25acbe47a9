//! Ledger round-trips through the public API

use initbench_core::Catalog;
use initbench_ledger::{
    BenchmarkRecord, SaveMode, SecondaryStatus, UnitStatus, load_results, parse_existing,
    remove_for_units, save,
};
use std::collections::BTreeSet;

fn record(id: &str, status: UnitStatus, error: &str) -> BenchmarkRecord {
    BenchmarkRecord {
        test_id: id.to_string(),
        version: "10.0.7".to_string(),
        package_manager: "yarn2".to_string(),
        features: "a11y+test".to_string(),
        with_cache: "no".to_string(),
        with_secondary_cache: "no".to_string(),
        iterations: 3,
        success_count: match status {
            UnitStatus::Yes => 3,
            UnitStatus::Partial => 1,
            UnitStatus::No => 0,
        },
        duration_mean: "41.20".to_string(),
        duration_median: "40.00".to_string(),
        duration_min: "39.10".to_string(),
        duration_max: "44.50".to_string(),
        duration_std_dev: "2.35".to_string(),
        success: status,
        error: error.to_string(),
        secondary_status: SecondaryStatus::Passed,
        secondary_pass_count: Some(3),
        secondary_fail_count: Some(0),
        command: "yarn dlx storybook@10.0.7 init --yes --no-dev --package-manager=yarn2 \
                  --features a11y --features test"
            .to_string(),
    }
}

#[test]
fn test_overwrite_then_load_reproduces_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("benchmark-results.csv");

    let records = vec![
        record("test-0001", UnitStatus::Yes, ""),
        record("test-0002", UnitStatus::Partial, "2 iteration(s) failed"),
        record(
            "test-0003",
            UnitStatus::No,
            "Process exited with code 1, \"npx\" not found\nsee log",
        ),
    ];
    assert_eq!(save(&records, &path, SaveMode::Overwrite).unwrap(), 3);

    let loaded = load_results(&path, &BTreeSet::new()).unwrap();
    assert_eq!(loaded.len(), 3);
    assert_eq!(loaded[0], records[0]);
    assert_eq!(loaded[1], records[1]);
    // Newlines are flattened on write; quotes and commas survive
    assert_eq!(
        loaded[2].error,
        "Process exited with code 1, \"npx\" not found see log"
    );

    let state = parse_existing(&path, &Catalog::default());
    let ids: Vec<&str> = state.completed.iter().map(String::as_str).collect();
    assert_eq!(ids, vec!["test-0001", "test-0002", "test-0003"]);
    let failed: Vec<&str> = state.failed.iter().map(String::as_str).collect();
    assert_eq!(failed, vec!["test-0002", "test-0003"]);
    assert_eq!(state.failed_units.len(), 2);
    assert!(state.failed_units.iter().all(|u| !u.cache_enabled));
    assert!(state.failed_units.iter().all(|u| !u.secondary_cache_enabled));
}

#[test]
fn test_rerun_cycle_replaces_failed_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("benchmark-results.csv");

    save(
        &[
            record("test-0001", UnitStatus::Yes, ""),
            record("test-0002", UnitStatus::No, "Process exited with code 1"),
        ],
        &path,
        SaveMode::Overwrite,
    )
    .unwrap();

    let state = parse_existing(&path, &Catalog::default());
    assert_eq!(remove_for_units(&path, &state.failed).unwrap(), 1);

    // Re-running appends the fresh result in place of the removed one
    let rerun = record("test-0002", UnitStatus::Yes, "");
    assert_eq!(save(&[rerun], &path, SaveMode::Merge).unwrap(), 1);

    let after = parse_existing(&path, &Catalog::default());
    assert_eq!(after.completed.len(), 2);
    assert!(after.failed.is_empty());
}

#[test]
fn test_legacy_ledger_is_readable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.csv");
    std::fs::write(
        &path,
        "Test ID,Version,Package Manager,Features,With Cache,With Playwright Cache,\
         Duration (s),Success,Error\n\
         \"test-0001-iter0\",\"10.0.7\",\"npm\",\"a11y\",\"yes\",\"-\",\"20.50\",\"yes\",\"\"\n\
         \"test-0002-iter0\",\"10.0.7\",\"bun\",\"a11y+test\",\"no\",\"yes\",\"0\",\"no\",\
         \"Process exited with code 1\"\n",
    )
    .unwrap();

    let loaded = load_results(&path, &BTreeSet::new()).unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].duration_median, "20.50");
    assert_eq!(loaded[1].error, "Process exited with code 1");

    let state = parse_existing(&path, &Catalog::default());
    assert_eq!(state.failed_units.len(), 1);
    assert_eq!(state.failed_units[0].id, "test-0002");
    assert!(state.failed_units[0].secondary_cache_enabled);
}
