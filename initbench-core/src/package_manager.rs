//! Package Manager Lookup Table
//!
//! Every package manager has its own idiomatic way to run a scaffolding
//! package, run the generated project's smoke test, and (for yarn berry)
//! prepare an isolated project before the first command. These forms are
//! fixed per manager and never inferred.

use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Contents of `.yarnrc.yml` written before switching a workspace to yarn berry.
pub const YARN_BERRY_RC: &str = "nodeLinker: node-modules\nenableImmutableInstalls: false\n";

/// Cache location variables redirected to the scratch directory on cold runs.
pub const COLD_CACHE_ENV_VARS: &[&str] = &[
    "npm_config_cache",
    "NPM_CONFIG_CACHE",
    "YARN_CACHE_FOLDER",
    "BUN_INSTALL_CACHE",
];

/// Supported package managers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    /// Yarn classic (1.x)
    Yarn,
    /// Yarn berry (2+), set up per workspace
    Yarn2,
    /// npm
    Npm,
    /// Bun
    Bun,
    /// pnpm
    Pnpm,
}

impl PackageManager {
    /// All managers in lookup-table order
    pub const ALL: [PackageManager; 5] = [
        PackageManager::Yarn,
        PackageManager::Yarn2,
        PackageManager::Npm,
        PackageManager::Bun,
        PackageManager::Pnpm,
    ];

    /// Name used in config files, flags, and ledger rows
    pub fn name(self) -> &'static str {
        match self {
            PackageManager::Yarn => "yarn",
            PackageManager::Yarn2 => "yarn2",
            PackageManager::Npm => "npm",
            PackageManager::Bun => "bun",
            PackageManager::Pnpm => "pnpm",
        }
    }

    /// Build the scaffolding invocation for `package_spec` (e.g. `storybook@10.0.7`).
    ///
    /// Flags are always `--yes --no-dev --package-manager=<name>` followed by
    /// the feature tokens in declared order.
    pub fn init_command(self, package_spec: &str, feature_flags: &[String]) -> String {
        let mut flags = vec![
            "--yes".to_string(),
            "--no-dev".to_string(),
            format!("--package-manager={}", self.name()),
        ];
        flags.extend(feature_flags.iter().cloned());
        let flags = flags.join(" ");

        match self {
            PackageManager::Bun => format!("bunx {} init {}", package_spec, flags),
            // yarn dlx understands versioned packages under berry
            PackageManager::Yarn2 => format!("yarn dlx {} init {}", package_spec, flags),
            // yarn classic has no reliable dlx, so it goes through npx
            PackageManager::Yarn => format!("npx {} init {}", package_spec, flags),
            PackageManager::Pnpm => format!("pnpm create {} {}", package_spec, flags),
            PackageManager::Npm => format!("npm create {} -- {}", package_spec, flags),
        }
    }

    /// Smoke-test invocation run inside an initialized workspace
    pub fn secondary_test_command(self) -> &'static str {
        match self {
            PackageManager::Npm => "npm run storybook -- --smoke-test",
            PackageManager::Yarn | PackageManager::Yarn2 => "yarn storybook -- --smoke-test",
            PackageManager::Bun => "bun run storybook -- --smoke-test",
            PackageManager::Pnpm => "pnpm storybook -- --smoke-test",
        }
    }

    /// Commands that must succeed in a fresh workspace before the timed invocation
    pub fn setup_commands(self) -> &'static [&'static str] {
        match self {
            PackageManager::Yarn2 => &[
                "yarn set version berry",
                "yarn install --mode=update-lockfile",
            ],
            _ => &[],
        }
    }

    /// Whether a one-time isolated setup step precedes each iteration
    pub fn requires_setup(self) -> bool {
        !self.setup_commands().is_empty()
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PackageManager {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PackageManager::ALL
            .into_iter()
            .find(|pm| pm.name() == s.trim())
            .ok_or_else(|| CoreError::UnknownPackageManager(s.to_string()))
    }
}

/// Environment overrides that point every manager's cache at `scratch`.
pub fn cold_cache_env(scratch: &Path) -> Vec<(String, String)> {
    let scratch = scratch.display().to_string();
    let mut env: Vec<(String, String)> = COLD_CACHE_ENV_VARS
        .iter()
        .map(|key| (key.to_string(), scratch.clone()))
        .collect();
    env.push(("YARN_ENABLE_GLOBAL_CACHE".to_string(), "false".to_string()));
    env
}
