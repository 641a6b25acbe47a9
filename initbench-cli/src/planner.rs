//! Benchmark Planner
//!
//! Expands the selected dimensions into test units and narrows them against
//! a previous ledger.
//!
//! Nesting order: version → package manager → feature set → cache →
//! secondary cache. Both cache dimensions run "disabled" first so cold runs
//! populate the caches the warm runs then use.

use initbench_core::{Catalog, PackageManager, TestUnit, unit_id};
use initbench_ledger::ResumeState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Cache states in run order
const CACHE_STATES: [bool; 2] = [false, true];

/// Which dimension values to expand; `None` means every known value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Version names
    pub versions: Option<Vec<String>>,
    /// Package managers
    pub package_managers: Option<Vec<PackageManager>>,
    /// Feature set names
    pub feature_sets: Option<Vec<String>>,
    /// Primary cache states
    pub cache: Option<Vec<bool>>,
    /// Secondary cache states (only for feature sets with the test capability)
    pub secondary_cache: Option<Vec<bool>>,
}

impl Selection {
    /// Every known value of every dimension
    pub fn all() -> Self {
        Self::default()
    }

    /// Whether any dimension is restricted
    pub fn is_restricted(&self) -> bool {
        self.versions.is_some()
            || self.package_managers.is_some()
            || self.feature_sets.is_some()
            || self.cache.is_some()
            || self.secondary_cache.is_some()
    }
}

fn selected<T: PartialEq>(filter: &Option<Vec<T>>, value: &T) -> bool {
    filter.as_ref().is_none_or(|values| values.contains(value))
}

/// Expand the selection into uniquely identified units in run order
pub fn expand(catalog: &Catalog, selection: &Selection) -> Vec<TestUnit> {
    let mut units = Vec::new();

    for version in &catalog.versions {
        if !selected(&selection.versions, &version.name) {
            continue;
        }
        for pm in &catalog.package_managers {
            if !selected(&selection.package_managers, pm) {
                continue;
            }
            for feature_set in &catalog.feature_sets {
                if !selected(&selection.feature_sets, &feature_set.name) {
                    continue;
                }
                for cache in CACHE_STATES {
                    if !selected(&selection.cache, &cache) {
                        continue;
                    }
                    let secondary_states: &[bool] = if feature_set.has_test_capability() {
                        &CACHE_STATES
                    } else {
                        &[false]
                    };
                    for &secondary in secondary_states {
                        if feature_set.has_test_capability()
                            && !selected(&selection.secondary_cache, &secondary)
                        {
                            continue;
                        }
                        units.push(TestUnit {
                            id: unit_id(units.len() + 1),
                            version: version.clone(),
                            package_manager: *pm,
                            feature_set: feature_set.clone(),
                            cache_enabled: cache,
                            secondary_cache_enabled: secondary,
                        });
                    }
                }
            }
        }
    }

    units
}

/// How an existing ledger narrows the expansion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ResumeMode {
    /// Skip units that already have a row
    #[default]
    Resume,
    /// Run only units whose row failed
    RerunFailed,
    /// Run failed units and units without a row
    RerunFailedAndResume,
    /// Discard the ledger and run everything
    StartOver,
}

impl ResumeMode {
    /// Whether previously recorded results are kept
    pub fn keeps_results(self) -> bool {
        !matches!(self, ResumeMode::StartOver)
    }

    /// Whether failed rows are rerun
    pub fn reruns_failed(self) -> bool {
        matches!(
            self,
            ResumeMode::RerunFailed | ResumeMode::RerunFailedAndResume
        )
    }
}

/// Units to run given what the ledger already holds
pub fn select_for_resume(
    units: &[TestUnit],
    state: &ResumeState,
    mode: ResumeMode,
) -> Vec<TestUnit> {
    units
        .iter()
        .filter(|unit| {
            let completed = state.completed.contains(&unit.id);
            let failed = state.failed.contains(&unit.id);
            match mode {
                ResumeMode::Resume => !completed,
                ResumeMode::RerunFailed => failed,
                ResumeMode::RerunFailedAndResume => failed || !completed,
                ResumeMode::StartOver => true,
            }
        })
        .cloned()
        .collect()
}

/// Execution plan for one run
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// Units to run, in order
    pub units: Vec<TestUnit>,
    /// Units of the full expansion that are not being run
    pub already_completed: usize,
    /// Size of the full expansion
    pub total_configs: usize,
}

impl ExecutionPlan {
    /// Plan that runs `units` out of an expansion of `total_configs`
    pub fn new(units: Vec<TestUnit>, total_configs: usize) -> Self {
        Self {
            already_completed: total_configs.saturating_sub(units.len()),
            total_configs,
            units,
        }
    }
}

/// A plan plus what must happen to the existing ledger before it runs
#[derive(Debug, Clone)]
pub struct ResolvedPlan {
    /// Units to run
    pub plan: ExecutionPlan,
    /// Unit ids whose existing rows this run replaces
    pub replaced: BTreeSet<String>,
    /// The existing ledger is discarded before running
    pub discard_ledger: bool,
}

impl ResolvedPlan {
    /// Ids of the units to run
    pub fn unit_ids(&self) -> BTreeSet<String> {
        self.plan.units.iter().map(|u| u.id.clone()).collect()
    }
}

/// Decide which units run.
///
/// `existing` is the state of a previous ledger, `None` when there is none.
/// With `failed_only` the units are the failed ones rebuilt from that ledger
/// and `units` is ignored. A ledger without completed ids is treated as
/// absent.
pub fn resolve(
    units: Vec<TestUnit>,
    existing: Option<&ResumeState>,
    mode: ResumeMode,
    failed_only: bool,
) -> ResolvedPlan {
    if failed_only {
        let failed = existing.map(|s| s.failed_units.clone()).unwrap_or_default();
        let total = failed.len();
        let replaced = failed.iter().map(|u| u.id.clone()).collect();
        return ResolvedPlan {
            plan: ExecutionPlan::new(failed, total),
            replaced,
            discard_ledger: false,
        };
    }

    let total = units.len();
    let Some(state) = existing.filter(|s| !s.completed.is_empty()) else {
        return ResolvedPlan {
            plan: ExecutionPlan::new(units, total),
            replaced: BTreeSet::new(),
            discard_ledger: false,
        };
    };

    if !mode.keeps_results() {
        return ResolvedPlan {
            plan: ExecutionPlan::new(units, total),
            replaced: BTreeSet::new(),
            discard_ledger: true,
        };
    }

    let selected = select_for_resume(&units, state, mode);
    let replaced = selected
        .iter()
        .filter(|u| state.completed.contains(&u.id))
        .map(|u| u.id.clone())
        .collect();
    ResolvedPlan {
        plan: ExecutionPlan::new(selected, total),
        replaced,
        discard_ledger: false,
    }
}
