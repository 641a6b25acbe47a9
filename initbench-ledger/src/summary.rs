//! Markdown Comparison Summary
//!
//! Compares versions against each other within each configuration
//! (package manager, features, cache settings), then across all
//! configurations. Only fully successful units with a nonzero mean count.

use crate::record::{BenchmarkRecord, UnitStatus};
use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct GroupKey {
    package_manager: String,
    features: String,
    with_cache: String,
    with_secondary_cache: String,
}

#[derive(Debug, Clone)]
struct Row {
    version: String,
    mean: f64,
    median: f64,
    min: f64,
    max: f64,
    std_dev: f64,
}

fn parse_or(value: &str, fallback: f64) -> f64 {
    match value.trim().parse::<f64>() {
        Ok(v) if v != 0.0 && v.is_finite() => v,
        _ => fallback,
    }
}

fn group_records(records: &[BenchmarkRecord]) -> BTreeMap<GroupKey, Vec<Row>> {
    let mut groups: BTreeMap<GroupKey, Vec<Row>> = BTreeMap::new();
    for record in records {
        if record.success != UnitStatus::Yes {
            continue;
        }
        let mean = record.mean_secs();
        if mean == 0.0 || !mean.is_finite() {
            continue;
        }
        let key = GroupKey {
            package_manager: record.package_manager.clone(),
            features: record.features.clone(),
            with_cache: record.with_cache.clone(),
            with_secondary_cache: record.with_secondary_cache.clone(),
        };
        groups.entry(key).or_default().push(Row {
            version: record.version.clone(),
            mean,
            median: parse_or(&record.duration_median, mean),
            min: parse_or(&record.duration_min, mean),
            max: parse_or(&record.duration_max, mean),
            std_dev: parse_or(&record.duration_std_dev, 0.0),
        });
    }
    groups
}

fn release_pattern() -> &'static Regex {
    static RELEASE_RE: OnceLock<Regex> = OnceLock::new();
    RELEASE_RE.get_or_init(|| Regex::new(r"^\d+\.\d+\.\d+$").expect("release pattern is valid"))
}

/// Baseline first (first plain `x.y.z` release), the rest sorted
fn order_versions(versions: &[String]) -> Vec<String> {
    let mut ordered: Vec<String> = Vec::new();
    let release = release_pattern();
    let baseline = versions.iter().find(|v| release.is_match(v));

    let mut rest: Vec<String> = versions
        .iter()
        .filter(|v| Some(*v) != baseline)
        .cloned()
        .collect();
    rest.sort();

    if let Some(baseline) = baseline {
        ordered.push(baseline.clone());
    }
    ordered.extend(rest);
    ordered
}

fn percentage_diff(base: f64, compare: f64) -> f64 {
    if base == 0.0 {
        return if compare == 0.0 { 0.0 } else { f64::INFINITY };
    }
    (compare - base) / base * 100.0
}

fn format_percentage(value: f64) -> String {
    let sign = if value >= 0.0 { "+" } else { "" };
    let marker = if value > 0.0 {
        "🔴"
    } else if value < 0.0 {
        "🟢"
    } else {
        "⚪"
    };
    format!("{} {}{:.2}%", marker, sign, value)
}

fn cache_label(key: &GroupKey) -> String {
    let cache = if key.with_cache == "yes" {
        "with cache"
    } else {
        "without cache"
    };
    match key.with_secondary_cache.as_str() {
        "yes" => format!("{}, with secondary cache", cache),
        "no" => format!("{}, without secondary cache", cache),
        _ => cache.to_string(),
    }
}

struct VersionAverage {
    version: String,
    avg_mean: f64,
    avg_median: f64,
    configurations: usize,
    tests: usize,
}

fn version_averages(groups: &BTreeMap<GroupKey, Vec<Row>>) -> Vec<VersionAverage> {
    struct Acc<'a> {
        count: usize,
        total_mean: f64,
        total_median: f64,
        configs: BTreeSet<&'a GroupKey>,
    }

    let mut by_version: BTreeMap<&str, Acc<'_>> = BTreeMap::new();
    for (key, rows) in groups {
        for row in rows {
            let acc = by_version.entry(row.version.as_str()).or_insert_with(|| Acc {
                count: 0,
                total_mean: 0.0,
                total_median: 0.0,
                configs: BTreeSet::new(),
            });
            acc.count += 1;
            acc.total_mean += row.mean;
            acc.total_median += row.median;
            acc.configs.insert(key);
        }
    }

    let mut averages: Vec<VersionAverage> = by_version
        .into_iter()
        .map(|(version, acc)| VersionAverage {
            version: version.to_string(),
            avg_mean: acc.total_mean / acc.count as f64,
            avg_median: acc.total_median / acc.count as f64,
            configurations: acc.configs.len(),
            tests: acc.count,
        })
        .collect();
    averages.sort_by(|a, b| a.avg_mean.total_cmp(&b.avg_mean));
    averages
}

/// Render the markdown comparison report for ledger records
pub fn generate_markdown_summary(
    records: &[BenchmarkRecord],
    generated_at: DateTime<Utc>,
) -> String {
    let groups = group_records(records);
    let mut out = String::new();

    writeln!(out, "# Init Performance Comparison Summary").ok();
    writeln!(out).ok();
    writeln!(
        out,
        "Generated on: {}",
        generated_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
    .ok();
    writeln!(out).ok();
    writeln!(out, "## Overview").ok();
    writeln!(out).ok();
    writeln!(
        out,
        "This report compares initialization performance across different versions."
    )
    .ok();
    writeln!(
        out,
        "Each section groups tests by configuration (package manager, features, cache settings)."
    )
    .ok();
    writeln!(out).ok();

    for (key, rows) in &groups {
        if rows.len() < 2 {
            continue;
        }

        let mut versions: Vec<String> = Vec::new();
        for row in rows {
            if !versions.contains(&row.version) {
                versions.push(row.version.clone());
            }
        }
        let ordered = order_versions(&versions);
        let Some(baseline) = ordered
            .first()
            .and_then(|v| rows.iter().find(|r| &r.version == v))
        else {
            continue;
        };

        writeln!(
            out,
            "### {} - {} ({})",
            key.package_manager,
            key.features,
            cache_label(key)
        )
        .ok();
        writeln!(out).ok();
        writeln!(
            out,
            "| Version | Mean (s) | Median (s) | Min (s) | Max (s) | StdDev (s) | vs Baseline |"
        )
        .ok();
        writeln!(
            out,
            "|---------|---------|------------|---------|---------|------------|-------------|"
        )
        .ok();
        writeln!(
            out,
            "| **{}** (baseline) | {:.2} | {:.2} | {:.2} | {:.2} | {:.2} | - |",
            baseline.version,
            baseline.mean,
            baseline.median,
            baseline.min,
            baseline.max,
            baseline.std_dev
        )
        .ok();

        for version in ordered.iter().skip(1) {
            let Some(row) = rows.iter().find(|r| &r.version == version) else {
                continue;
            };
            let diff = percentage_diff(baseline.mean, row.mean);
            writeln!(
                out,
                "| {} | {:.2} | {:.2} | {:.2} | {:.2} | {:.2} | {} |",
                row.version,
                row.mean,
                row.median,
                row.min,
                row.max,
                row.std_dev,
                format_percentage(diff)
            )
            .ok();
        }
        writeln!(out).ok();
    }

    writeln!(out, "## Summary Statistics").ok();
    writeln!(out).ok();
    writeln!(out, "### Overall Performance by Version").ok();
    writeln!(out).ok();
    writeln!(
        out,
        "| Version | Avg Mean (s) | Avg Median (s) | Configurations | Tests |"
    )
    .ok();
    writeln!(
        out,
        "|---------|--------------|----------------|---------------|-------|"
    )
    .ok();

    let averages = version_averages(&groups);
    for avg in &averages {
        writeln!(
            out,
            "| {} | {:.2} | {:.2} | {} | {} |",
            avg.version, avg.avg_mean, avg.avg_median, avg.configurations, avg.tests
        )
        .ok();
    }
    writeln!(out).ok();

    if averages.len() > 1 {
        let fastest = &averages[0];
        writeln!(out, "### Comparison vs Fastest Version ({})", fastest.version).ok();
        writeln!(out).ok();
        writeln!(out, "| Version | vs Fastest |").ok();
        writeln!(out, "|---------|------------|").ok();
        for avg in &averages {
            let diff = percentage_diff(fastest.avg_mean, avg.avg_mean);
            writeln!(out, "| {} | {} |", avg.version, format_percentage(diff)).ok();
        }
        writeln!(out).ok();
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SecondaryStatus;
    use chrono::TimeZone;

    fn record(
        version: &str,
        pm: &str,
        cache: &str,
        mean: &str,
        status: UnitStatus,
    ) -> BenchmarkRecord {
        BenchmarkRecord {
            test_id: format!("test-{}-{}", version, pm),
            version: version.to_string(),
            package_manager: pm.to_string(),
            features: "a11y".to_string(),
            with_cache: cache.to_string(),
            with_secondary_cache: "-".to_string(),
            iterations: 1,
            success_count: 1,
            duration_mean: mean.to_string(),
            duration_median: mean.to_string(),
            duration_min: mean.to_string(),
            duration_max: mean.to_string(),
            duration_std_dev: "0.00".to_string(),
            success: status,
            error: String::new(),
            secondary_status: SecondaryStatus::NotRun,
            secondary_pass_count: None,
            secondary_fail_count: None,
            command: String::new(),
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap()
    }

    #[test]
    fn test_order_versions_picks_release_baseline() {
        let versions = vec!["canary".to_string(), "10.0.7".to_string(), "beta".to_string()];
        assert_eq!(order_versions(&versions), vec!["10.0.7", "beta", "canary"]);

        let no_release = vec!["nightly".to_string(), "canary".to_string()];
        assert_eq!(order_versions(&no_release), vec!["canary", "nightly"]);

        let prerelease = vec!["10.1.0-beta.1".to_string(), "9.1.0".to_string()];
        assert_eq!(order_versions(&prerelease), vec!["9.1.0", "10.1.0-beta.1"]);
        assert!(!release_pattern().is_match("10.1.0-beta.1"));
    }

    #[test]
    fn test_format_percentage() {
        assert_eq!(format_percentage(12.5), "🔴 +12.50%");
        assert_eq!(format_percentage(-5.0), "🟢 -5.00%");
        assert_eq!(format_percentage(0.0), "⚪ +0.00%");
    }

    #[test]
    fn test_group_comparison_against_baseline() {
        let records = vec![
            record("canary", "npm", "yes", "12.00", UnitStatus::Yes),
            record("10.0.7", "npm", "yes", "10.00", UnitStatus::Yes),
        ];
        let md = generate_markdown_summary(&records, at());
        assert!(md.contains("Generated on: 2025-01-02T03:04:05.000Z"));
        assert!(md.contains("### npm - a11y (with cache)"));
        assert!(md.contains(
            "| **10.0.7** (baseline) | 10.00 | 10.00 | 10.00 | 10.00 | 0.00 | - |"
        ));
        assert!(md.contains("| canary | 12.00 | 12.00 | 12.00 | 12.00 | 0.00 | 🔴 +20.00% |"));
        assert!(md.contains("### Comparison vs Fastest Version (10.0.7)"));
    }

    #[test]
    fn test_failed_and_zero_rows_are_ignored() {
        let records = vec![
            record("10.0.7", "npm", "no", "10.00", UnitStatus::Yes),
            record("canary", "npm", "no", "8.00", UnitStatus::Partial),
            record("beta", "npm", "no", "0.00", UnitStatus::Yes),
        ];
        let md = generate_markdown_summary(&records, at());
        // Only one version left in the group, so no per-group table
        assert!(!md.contains("### npm - a11y"));
        assert!(md.contains("| 10.0.7 | 10.00 | 10.00 | 1 | 1 |"));
        assert!(!md.contains("Comparison vs Fastest"));
    }

    #[test]
    fn test_overall_averages_sorted_fastest_first() {
        let records = vec![
            record("10.0.7", "npm", "yes", "10.00", UnitStatus::Yes),
            record("10.0.7", "bun", "yes", "6.00", UnitStatus::Yes),
            record("canary", "npm", "yes", "4.00", UnitStatus::Yes),
        ];
        let md = generate_markdown_summary(&records, at());
        let canary = md.find("| canary | 4.00 | 4.00 | 1 | 1 |").unwrap();
        let release = md.find("| 10.0.7 | 8.00 | 8.00 | 2 | 2 |").unwrap();
        assert!(canary < release);
        assert!(md.contains("| 10.0.7 | 🔴 +100.00% |"));
    }
}
