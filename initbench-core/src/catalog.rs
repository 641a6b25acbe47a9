//! Known Dimension Values
//!
//! The catalog is the "all known values" universe for expansion and the
//! lookup source when failed units are rebuilt from ledger rows.

use crate::{FeatureSet, PackageManager, Version};
use serde::{Deserialize, Serialize};

/// Every version, package manager, and feature set the harness knows about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Package name of the scaffolding tool (e.g. `storybook`)
    pub package: String,
    /// Known tool versions, in run order
    pub versions: Vec<Version>,
    /// Known package managers, in run order
    pub package_managers: Vec<PackageManager>,
    /// Known feature sets, in run order
    pub feature_sets: Vec<FeatureSet>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            package: "storybook".to_string(),
            versions: default_versions(),
            package_managers: vec![
                PackageManager::Yarn,
                PackageManager::Yarn2,
                PackageManager::Npm,
                PackageManager::Bun,
            ],
            feature_sets: default_feature_sets(),
        }
    }
}

impl Catalog {
    /// Look up a feature set by name
    pub fn feature_set(&self, name: &str) -> Option<&FeatureSet> {
        self.feature_sets.iter().find(|fs| fs.name == name)
    }

    /// Look up a version by name
    pub fn version(&self, name: &str) -> Option<&Version> {
        self.versions.iter().find(|v| v.name == name)
    }

    /// Known version by name, or `<package>@<name>` for versions no longer configured
    pub fn version_or_default(&self, name: &str) -> Version {
        self.version(name)
            .cloned()
            .unwrap_or_else(|| Version::new(name, format!("{}@{}", self.package, name)))
    }
}

/// Versions benchmarked when none are configured
pub fn default_versions() -> Vec<Version> {
    vec![
        Version::new("10.0.7", "storybook@10.0.7"),
        Version::new("canary", "storybook@0.0.0-pr-32717-sha-47ba2989"),
    ]
}

/// Feature sets benchmarked when none are configured
pub fn default_feature_sets() -> Vec<FeatureSet> {
    fn features(name: &str, capabilities: &[&str]) -> FeatureSet {
        let flags = capabilities
            .iter()
            .flat_map(|c| ["--features".to_string(), c.to_string()]);
        FeatureSet::new(name, flags)
    }

    vec![
        features("a11y", &["a11y"]),
        features("a11y+test", &["a11y", "test"]),
        features("a11y+docs", &["a11y", "docs"]),
        features("a11y+test+docs", &["a11y", "test", "docs"]),
    ]
}
