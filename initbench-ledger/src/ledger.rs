//! Ledger File Operations
//!
//! The ledger is rewritten as a whole on every change: the new content goes
//! to a temporary file in the same directory, which then replaces the ledger.
//! A crash mid-write leaves either the old or the new file, never a torn one.

use crate::record::{BenchmarkRecord, LEDGER_HEADERS};
use crate::row::{format_row, row_test_id, split_row};
use crate::LedgerError;
use initbench_core::{Catalog, PackageManager, TestUnit, strip_iteration_suffix};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// How `save` treats an existing ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Replace the file with header + the given records
    Overwrite,
    /// Keep existing header and rows, append records whose id is not present
    Merge,
    /// Overwrite, but carry over existing rows that do not parse as records
    /// and belong to no unit being written
    Rewrite,
}

/// What an existing ledger says about previous runs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResumeState {
    /// Unit ids with at least one row
    pub completed: BTreeSet<String>,
    /// Unit ids with a `no` or `partial` row
    pub failed: BTreeSet<String>,
    /// Failed units rebuilt from their rows, in ledger order
    pub failed_units: Vec<TestUnit>,
}

/// Non-blank lines of the ledger, or `None` if the file does not exist
fn read_lines(path: &Path) -> Result<Option<Vec<String>>, LedgerError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect(),
    ))
}

fn write_atomic(path: &Path, lines: &[String]) -> Result<(), LedgerError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    for line in lines {
        writeln!(tmp, "{}", line)?;
    }
    tmp.flush()?;
    tmp.persist(path)?;
    Ok(())
}

fn header_line() -> Result<String, LedgerError> {
    format_row(LEDGER_HEADERS)
}

/// Persist records to the ledger at `path`, returning how many rows were written.
///
/// Overwrite with no records leaves the file untouched. Merge is idempotent:
/// a record whose id (ignoring `-iterN`) already has a row is skipped.
pub fn save(
    records: &[BenchmarkRecord],
    path: &Path,
    mode: SaveMode,
) -> Result<usize, LedgerError> {
    let existing = match mode {
        SaveMode::Overwrite => None,
        SaveMode::Merge => read_lines(path)?,
        SaveMode::Rewrite => return rewrite(records, path),
    };

    let Some(existing) = existing else {
        if records.is_empty() {
            tracing::info!("No results to save");
            return Ok(0);
        }
        let mut lines = Vec::with_capacity(records.len() + 1);
        lines.push(header_line()?);
        for record in records {
            lines.push(format_row(record.to_fields())?);
        }
        write_atomic(path, &lines)?;
        tracing::debug!(path = %path.display(), rows = records.len(), "ledger overwritten");
        return Ok(records.len());
    };

    let mut lines = existing;
    if lines.is_empty() {
        lines.push(header_line()?);
    }

    let mut seen: BTreeSet<String> = lines
        .iter()
        .skip(1)
        .filter_map(|line| row_test_id(line))
        .map(|id| strip_iteration_suffix(&id).to_string())
        .collect();

    let mut appended = 0;
    for record in records {
        let id = strip_iteration_suffix(&record.test_id).to_string();
        if seen.insert(id) {
            lines.push(format_row(record.to_fields())?);
            appended += 1;
        }
    }

    if appended > 0 {
        write_atomic(path, &lines)?;
    }
    tracing::debug!(path = %path.display(), appended, "ledger merged");
    Ok(appended)
}

fn rewrite(records: &[BenchmarkRecord], path: &Path) -> Result<usize, LedgerError> {
    if records.is_empty() {
        tracing::info!("No results to save");
        return Ok(0);
    }
    let written: BTreeSet<&str> = records
        .iter()
        .map(|r| strip_iteration_suffix(&r.test_id))
        .collect();
    let unrecognized: Vec<String> = read_lines(path)?
        .unwrap_or_default()
        .into_iter()
        .skip(1)
        .filter(|line| is_unrecognized(line, &written))
        .collect();

    let mut lines = Vec::with_capacity(records.len() + unrecognized.len() + 1);
    lines.push(header_line()?);
    for record in records {
        lines.push(format_row(record.to_fields())?);
    }
    if !unrecognized.is_empty() {
        tracing::warn!(
            "Keeping {} unrecognized row(s) in {}",
            unrecognized.len(),
            path.display()
        );
    }
    lines.extend(unrecognized);
    write_atomic(path, &lines)?;
    tracing::debug!(path = %path.display(), rows = records.len(), "ledger rewritten");
    Ok(records.len())
}

/// A row `load_results` would skip, for a unit not in `written`
fn is_unrecognized(line: &str, written: &BTreeSet<&str>) -> bool {
    let parsed = split_row(line)
        .ok()
        .and_then(|fields| BenchmarkRecord::from_fields(&fields));
    if parsed.is_some() {
        return false;
    }
    row_test_id(line)
        .map(|id| !written.contains(strip_iteration_suffix(&id)))
        .unwrap_or(true)
}

fn column(headers: &[String], names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|name| h.trim() == *name))
}

/// Reconstruct completed and failed unit ids from the ledger.
///
/// Never fails: a missing file is an empty state, and an unreadable one is
/// reported and treated the same way.
pub fn parse_existing(path: &Path, catalog: &Catalog) -> ResumeState {
    match try_parse_existing(path, catalog) {
        Ok(state) => state,
        Err(e) => {
            tracing::warn!("Could not parse existing results: {}", e);
            ResumeState::default()
        }
    }
}

fn try_parse_existing(path: &Path, catalog: &Catalog) -> Result<ResumeState, LedgerError> {
    let mut state = ResumeState::default();
    let Some(lines) = read_lines(path)? else {
        return Ok(state);
    };
    if lines.len() <= 1 {
        return Ok(state);
    }

    let headers = split_row(&lines[0])?;
    let test_id_col = column(&headers, &["Test ID"]);
    let version_col = column(&headers, &["Version"]);
    let pm_col = column(&headers, &["Package Manager"]);
    let features_col = column(&headers, &["Features"]);
    let cache_col = column(&headers, &["With Cache"]);
    let secondary_col = column(&headers, &["With Secondary Cache", "With Playwright Cache"]);
    let success_col = column(&headers, &["Success"]);

    for (line_no, line) in lines.iter().enumerate().skip(1) {
        let values = match split_row(line) {
            Ok(values) if !values.is_empty() => values,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(line = line_no + 1, "Skipping malformed ledger row: {}", e);
                continue;
            }
        };
        let get = |col: Option<usize>| {
            col.and_then(|i| values.get(i))
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        let Some(test_id) = get(test_id_col) else {
            continue;
        };
        let base_id = strip_iteration_suffix(test_id).to_string();
        state.completed.insert(base_id.clone());

        let failed = get(success_col)
            .map(|s| matches!(s.to_lowercase().as_str(), "no" | "partial"))
            .unwrap_or(false);
        if !failed {
            continue;
        }
        state.failed.insert(base_id.clone());

        if state.failed_units.iter().any(|u| u.id == base_id) {
            continue;
        }
        let (Some(version), Some(pm), Some(features)) =
            (get(version_col), get(pm_col), get(features_col))
        else {
            continue;
        };
        let Some(feature_set) = catalog.feature_set(features) else {
            tracing::warn!(
                test_id = %base_id,
                "Skipping failed unit with unknown feature set '{}'",
                features
            );
            continue;
        };
        let package_manager: PackageManager = match pm.parse() {
            Ok(pm) => pm,
            Err(e) => {
                tracing::warn!(test_id = %base_id, "Skipping failed unit: {}", e);
                continue;
            }
        };

        let secondary_cache_enabled =
            feature_set.has_test_capability() && get(secondary_col) == Some("yes");
        state.failed_units.push(TestUnit {
            id: base_id,
            version: catalog.version_or_default(version),
            package_manager,
            feature_set: feature_set.clone(),
            cache_enabled: get(cache_col) == Some("yes"),
            secondary_cache_enabled,
        });
    }

    Ok(state)
}

/// Delete every row whose unit id is in `ids`, returning how many were removed.
///
/// A missing ledger is left missing.
pub fn remove_for_units(path: &Path, ids: &BTreeSet<String>) -> Result<usize, LedgerError> {
    let Some(lines) = read_lines(path)? else {
        return Ok(0);
    };
    let Some((header, rows)) = lines.split_first() else {
        return Ok(0);
    };

    let mut kept = vec![header.clone()];
    let mut removed = 0;
    for row in rows {
        let drop = row_test_id(row)
            .map(|id| ids.contains(strip_iteration_suffix(&id)))
            .unwrap_or(false);
        if drop {
            removed += 1;
        } else {
            kept.push(row.clone());
        }
    }

    if removed > 0 {
        write_atomic(path, &kept)?;
    }
    Ok(removed)
}

/// Parse ledger rows back into records, skipping units whose id is in `exclude`.
///
/// Rows that fit neither the full nor the legacy layout are reported and skipped.
pub fn load_results(
    path: &Path,
    exclude: &BTreeSet<String>,
) -> Result<Vec<BenchmarkRecord>, LedgerError> {
    let Some(lines) = read_lines(path)? else {
        return Ok(Vec::new());
    };

    let mut records = Vec::new();
    for (line_no, line) in lines.iter().enumerate().skip(1) {
        let fields = split_row(line)?;
        if fields.is_empty() {
            continue;
        }
        let Some(record) = BenchmarkRecord::from_fields(&fields) else {
            tracing::warn!(
                line = line_no + 1,
                columns = fields.len(),
                "Skipping ledger row with unrecognized layout"
            );
            continue;
        };
        if exclude.contains(strip_iteration_suffix(&record.test_id)) {
            continue;
        }
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{SecondaryStatus, UnitStatus};

    fn record(id: &str, status: UnitStatus) -> BenchmarkRecord {
        BenchmarkRecord {
            test_id: id.to_string(),
            version: "10.0.7".to_string(),
            package_manager: "npm".to_string(),
            features: "a11y".to_string(),
            with_cache: "yes".to_string(),
            with_secondary_cache: "-".to_string(),
            iterations: 1,
            success_count: u32::from(status == UnitStatus::Yes),
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
            command: "npm create storybook@10.0.7 -- --yes".to_string(),
        }
    }

    fn data_lines(path: &Path) -> usize {
        read_lines(path).unwrap().unwrap().len() - 1
    }

    #[test]
    fn test_merge_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");

        let a = record("test-0001", UnitStatus::Yes);
        assert_eq!(save(&[a.clone()], &path, SaveMode::Merge).unwrap(), 1);
        assert_eq!(save(&[a.clone()], &path, SaveMode::Merge).unwrap(), 0);
        assert_eq!(data_lines(&path), 1);
    }

    #[test]
    fn test_merge_appends_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");

        let existing = vec![
            record("test-0001", UnitStatus::Yes),
            record("test-0002", UnitStatus::No),
        ];
        save(&existing, &path, SaveMode::Overwrite).unwrap();

        let new = vec![
            record("test-0002", UnitStatus::Yes),
            record("test-0003", UnitStatus::Yes),
            record("test-0004", UnitStatus::Partial),
        ];
        assert_eq!(save(&new, &path, SaveMode::Merge).unwrap(), 2);
        assert_eq!(data_lines(&path), 4);

        // The pre-existing row for test-0002 is kept as it was
        let loaded = load_results(&path, &BTreeSet::new()).unwrap();
        assert_eq!(loaded[1].success, UnitStatus::No);
    }

    #[test]
    fn test_merge_keeps_foreign_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        fs::write(
            &path,
            "Test ID,Version,Package Manager,Features,With Cache,With Playwright Cache,\
             Duration (s),Success,Error\n\
             \"test-0001-iter0\",\"10.0.7\",\"npm\",\"a11y\",\"no\",\"-\",\"3.10\",\"yes\",\"\"\n",
        )
        .unwrap();

        save(
            &[record("test-0001", UnitStatus::Yes), record("test-0002", UnitStatus::Yes)],
            &path,
            SaveMode::Merge,
        )
        .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Test ID,Version"));
        assert!(lines[1].starts_with("\"test-0001-iter0\""));
        assert!(lines[2].starts_with("\"test-0002\""));
    }

    #[test]
    fn test_overwrite_with_nothing_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        assert_eq!(save(&[], &path, SaveMode::Overwrite).unwrap(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn test_rewrite_keeps_unrecognized_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        save(
            &[record("test-0001", UnitStatus::Yes), record("test-0003", UnitStatus::Yes)],
            &path,
            SaveMode::Overwrite,
        )
        .unwrap();
        let mut fields = record("test-0002", UnitStatus::Yes).to_fields();
        fields[13] = String::new();
        let odd = format_row(fields).unwrap();
        let mut content = fs::read_to_string(&path).unwrap();
        content.push_str(&odd);
        content.push('\n');
        fs::write(&path, content).unwrap();

        // Unparsable, yet counted as done on resume
        let loaded = load_results(&path, &BTreeSet::new()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(parse_existing(&path, &Catalog::default()).completed.contains("test-0002"));

        let mut results = loaded;
        results.truncate(1);
        results.push(record("test-0004", UnitStatus::Yes));
        assert_eq!(save(&results, &path, SaveMode::Rewrite).unwrap(), 2);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("\"test-0001\""));
        assert!(lines[2].starts_with("\"test-0004\""));
        assert_eq!(lines[3], odd);
    }

    #[test]
    fn test_rewrite_drops_unrecognized_row_of_written_unit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        fs::write(
            &path,
            "\"Test ID\",\"Version\"\n\"test-0001-iter0\",\"garbled\"\n\"test-0002\",\"garbled\"\n",
        )
        .unwrap();

        save(&[record("test-0001", UnitStatus::Yes)], &path, SaveMode::Rewrite).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains("test-0001-iter0"));
        assert!(content.contains("\"test-0002\",\"garbled\""));
    }

    #[test]
    fn test_remove_for_units() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        save(
            &[
                record("test-0001", UnitStatus::Yes),
                record("test-0002-iter0", UnitStatus::No),
                record("test-0003", UnitStatus::Yes),
            ],
            &path,
            SaveMode::Overwrite,
        )
        .unwrap();

        let ids: BTreeSet<String> = ["test-0002".to_string()].into();
        assert_eq!(remove_for_units(&path, &ids).unwrap(), 1);
        let loaded = load_results(&path, &BTreeSet::new()).unwrap();
        let ids: Vec<&str> = loaded.iter().map(|r| r.test_id.as_str()).collect();
        assert_eq!(ids, vec!["test-0001", "test-0003"]);
    }

    #[test]
    fn test_remove_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.csv");
        let ids: BTreeSet<String> = ["test-0001".to_string()].into();
        assert_eq!(remove_for_units(&path, &ids).unwrap(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn test_parse_existing_missing_or_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::default();
        assert_eq!(
            parse_existing(&dir.path().join("missing.csv"), &catalog),
            ResumeState::default()
        );

        let path = dir.path().join("garbage.csv");
        fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        assert_eq!(parse_existing(&path, &catalog), ResumeState::default());
    }

    #[test]
    fn test_parse_existing_collapses_iterations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        save(
            &[
                record("test-0007", UnitStatus::Yes),
                record("test-0007-iter0", UnitStatus::Yes),
                record("test-0007-iter1", UnitStatus::Yes),
            ],
            &path,
            SaveMode::Overwrite,
        )
        .unwrap();

        let state = parse_existing(&path, &Catalog::default());
        assert_eq!(state.completed, ["test-0007".to_string()].into());
        assert!(state.failed.is_empty());
    }

    #[test]
    fn test_parse_existing_rebuilds_failed_units() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let mut failed = record("test-0002", UnitStatus::Partial);
        failed.features = "a11y+test".to_string();
        failed.with_cache = "no".to_string();
        failed.with_secondary_cache = "yes".to_string();
        failed.version = "9.0.0".to_string();
        let mut unknown = record("test-0003", UnitStatus::No);
        unknown.features = "vitest-only".to_string();

        save(
            &[record("test-0001", UnitStatus::Yes), failed, unknown],
            &path,
            SaveMode::Overwrite,
        )
        .unwrap();

        let state = parse_existing(&path, &Catalog::default());
        assert_eq!(state.completed.len(), 3);
        assert_eq!(
            state.failed,
            ["test-0002".to_string(), "test-0003".to_string()].into()
        );
        assert_eq!(state.failed_units.len(), 1);

        let unit = &state.failed_units[0];
        assert_eq!(unit.id, "test-0002");
        assert_eq!(unit.version.command, "storybook@9.0.0");
        assert_eq!(unit.package_manager, PackageManager::Npm);
        assert!(!unit.cache_enabled);
        assert!(unit.secondary_cache_enabled);
    }

    #[test]
    fn test_load_results_excludes_and_skips_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        save(
            &[record("test-0001", UnitStatus::Yes), record("test-0002", UnitStatus::No)],
            &path,
            SaveMode::Overwrite,
        )
        .unwrap();
        let mut content = fs::read_to_string(&path).unwrap();
        content.push_str("\"test-0009\",\"short\"\n");
        fs::write(&path, content).unwrap();

        let exclude: BTreeSet<String> = ["test-0002".to_string()].into();
        let loaded = load_results(&path, &exclude).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].test_id, "test-0001");
    }
}
