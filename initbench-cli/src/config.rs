//! Configuration loading from initbench.toml
//!
//! initbench configuration can be specified in an `initbench.toml` file in the project root.
//! The configuration is automatically discovered by walking up from the current directory.
//! Every field has a default, so an empty file is a valid configuration.

use initbench_core::{
    Catalog, FeatureSet, PackageManager, Version, default_feature_sets, default_versions,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file searched for by `discover`
pub const CONFIG_FILE_NAME: &str = "initbench.toml";

/// Bounds on iterations per unit
pub const MIN_ITERATIONS: u32 = 1;
/// Bounds on iterations per unit
pub const MAX_ITERATIONS: u32 = 100;

/// initbench configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BenchConfig {
    /// Runner configuration
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Tool under test
    #[serde(default)]
    pub tool: ToolConfig,
    /// Dimension values
    #[serde(default)]
    pub matrix: MatrixConfig,
    /// Cache locations wiped before cold iterations
    #[serde(default)]
    pub caches: CacheConfig,
}

/// Runner configuration for benchmark execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Timed iterations per unit (1-100)
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    /// Run the smoke test after each successful invocation
    #[serde(default)]
    pub secondary_tests: bool,
    /// Ledger path
    #[serde(default = "default_results_file")]
    pub results_file: String,
    /// Directory holding per-iteration workspaces
    #[serde(default = "default_runs_dir")]
    pub runs_dir: String,
    /// Fixture project copied into each workspace
    #[serde(default = "default_fixture_dir")]
    pub fixture_dir: String,
    /// Grace window between SIGTERM and SIGKILL on shutdown (e.g., "2s")
    #[serde(default = "default_kill_grace")]
    pub kill_grace: String,
    /// Extra environment variables for every spawned command
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            secondary_tests: false,
            results_file: default_results_file(),
            runs_dir: default_runs_dir(),
            fixture_dir: default_fixture_dir(),
            kill_grace: default_kill_grace(),
            env: BTreeMap::new(),
        }
    }
}

fn default_iterations() -> u32 {
    1
}
fn default_results_file() -> String {
    "benchmark-results.csv".to_string()
}
fn default_runs_dir() -> String {
    "benchmark-runs".to_string()
}
fn default_fixture_dir() -> String {
    "fixture".to_string()
}
fn default_kill_grace() -> String {
    "2s".to_string()
}

/// Tool under test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Package name, used to rebuild launch specs of unconfigured versions
    #[serde(default = "default_package")]
    pub package: String,
    /// Versions to benchmark
    #[serde(default = "default_versions")]
    pub versions: Vec<Version>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            package: default_package(),
            versions: default_versions(),
        }
    }
}

fn default_package() -> String {
    "storybook".to_string()
}

/// Dimension values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixConfig {
    /// Package managers to benchmark
    #[serde(default = "default_package_managers")]
    pub package_managers: Vec<PackageManager>,
    /// Feature sets to benchmark
    #[serde(default = "default_feature_sets")]
    pub feature_sets: Vec<FeatureSet>,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            package_managers: default_package_managers(),
            feature_sets: default_feature_sets(),
        }
    }
}

fn default_package_managers() -> Vec<PackageManager> {
    Catalog::default().package_managers
}

/// Cache directories per package manager, `~` expanded at use
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// npm cache directories
    #[serde(default = "default_npm_caches")]
    pub npm: Vec<String>,
    /// yarn classic cache directories
    #[serde(default = "default_yarn_caches")]
    pub yarn: Vec<String>,
    /// yarn berry cache directories
    #[serde(default = "default_yarn_caches")]
    pub yarn2: Vec<String>,
    /// bun cache directories
    #[serde(default = "default_bun_caches")]
    pub bun: Vec<String>,
    /// pnpm cache directories
    #[serde(default)]
    pub pnpm: Vec<String>,
    /// Browser cache used by the smoke test
    #[serde(default = "default_secondary_caches")]
    pub secondary: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            npm: default_npm_caches(),
            yarn: default_yarn_caches(),
            yarn2: default_yarn_caches(),
            bun: default_bun_caches(),
            pnpm: Vec::new(),
            secondary: default_secondary_caches(),
        }
    }
}

fn default_npm_caches() -> Vec<String> {
    vec!["~/.npm/_npx".to_string(), "~/.npm/_cacache".to_string()]
}
fn default_yarn_caches() -> Vec<String> {
    vec!["~/.yarn/cache".to_string(), "~/.yarn/berry/cache".to_string()]
}
fn default_bun_caches() -> Vec<String> {
    vec!["~/.bun/install/cache".to_string()]
}
fn default_secondary_caches() -> Vec<String> {
    if cfg!(target_os = "macos") {
        vec!["~/Library/Caches/ms-playwright".to_string()]
    } else {
        vec!["~/.cache/ms-playwright".to_string()]
    }
}

/// Expand a leading `~` to `$HOME`
pub fn expand_home(path: &str) -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    match (path, home) {
        ("~", Some(home)) => home,
        (p, Some(home)) if p.starts_with("~/") => home.join(&p[2..]),
        (p, _) => PathBuf::from(p),
    }
}

impl CacheConfig {
    /// Cache directories for a package manager
    pub fn paths_for(&self, pm: PackageManager) -> Vec<PathBuf> {
        let raw = match pm {
            PackageManager::Npm => &self.npm,
            PackageManager::Yarn => &self.yarn,
            PackageManager::Yarn2 => &self.yarn2,
            PackageManager::Bun => &self.bun,
            PackageManager::Pnpm => &self.pnpm,
        };
        raw.iter().map(|p| expand_home(p)).collect()
    }

    /// Secondary (browser) cache directories
    pub fn secondary_paths(&self) -> Vec<PathBuf> {
        self.secondary.iter().map(|p| expand_home(p)).collect()
    }
}

impl BenchConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Try to discover and load configuration by walking up from current directory
    pub fn discover() -> Option<Self> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return match Self::load(&config_path) {
                    Ok(config) => {
                        tracing::debug!(path = %config_path.display(), "loaded configuration");
                        Some(config)
                    }
                    Err(e) => {
                        tracing::warn!("Ignoring {}: {}", config_path.display(), e);
                        None
                    }
                };
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Reject values the runner cannot honor
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(MIN_ITERATIONS..=MAX_ITERATIONS).contains(&self.runner.iterations) {
            anyhow::bail!(
                "iterations must be between {} and {}, got {}",
                MIN_ITERATIONS,
                MAX_ITERATIONS,
                self.runner.iterations
            );
        }
        Self::parse_duration(&self.runner.kill_grace)?;
        for fs in &self.matrix.feature_sets {
            if fs.name.trim().is_empty() {
                anyhow::bail!("feature set names must not be empty");
            }
        }
        Ok(())
    }

    /// All known dimension values
    pub fn catalog(&self) -> Catalog {
        Catalog {
            package: self.tool.package.clone(),
            versions: self.tool.versions.clone(),
            package_managers: self.matrix.package_managers.clone(),
            feature_sets: self.matrix.feature_sets.clone(),
        }
    }

    /// Grace window between SIGTERM and SIGKILL
    pub fn kill_grace(&self) -> anyhow::Result<Duration> {
        Ok(Duration::from_nanos(Self::parse_duration(
            &self.runner.kill_grace,
        )?))
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# initbench Configuration

[runner]
# Timed iterations per configuration (1-100)
iterations = 1
# Run the smoke test after each successful init
secondary_tests = false
# Result ledger (CSV)
results_file = "benchmark-results.csv"
# Per-iteration workspaces are created here
runs_dir = "benchmark-runs"
# Fixture project copied into every workspace
fixture_dir = "fixture"
# Grace window between SIGTERM and SIGKILL on shutdown
kill_grace = "2s"

# Extra environment for every spawned command (uncomment to enable)
# [runner.env]
# NODE_OPTIONS = "--max-old-space-size=4096"

[tool]
package = "storybook"

[[tool.versions]]
name = "10.0.7"
command = "storybook@10.0.7"

[[tool.versions]]
name = "canary"
command = "storybook@0.0.0-pr-32717-sha-47ba2989"

[matrix]
# yarn, yarn2, npm, bun, pnpm
package_managers = ["yarn", "yarn2", "npm", "bun"]

[[matrix.feature_sets]]
name = "a11y"
flags = ["--features", "a11y"]

[[matrix.feature_sets]]
name = "a11y+test"
flags = ["--features", "a11y", "--features", "test"]

[[matrix.feature_sets]]
name = "a11y+docs"
flags = ["--features", "a11y", "--features", "docs"]

[[matrix.feature_sets]]
name = "a11y+test+docs"
flags = ["--features", "a11y", "--features", "test", "--features", "docs"]

[caches]
npm = ["~/.npm/_npx", "~/.npm/_cacache"]
yarn = ["~/.yarn/cache", "~/.yarn/berry/cache"]
yarn2 = ["~/.yarn/cache", "~/.yarn/berry/cache"]
bun = ["~/.bun/install/cache"]
pnpm = []
# Browser cache used by the smoke test (macOS: ~/Library/Caches/ms-playwright)
secondary = ["~/.cache/ms-playwright"]
"#
        .to_string()
    }

    /// Parse duration string (e.g., "2s", "500ms", "1m") to nanoseconds
    pub fn parse_duration(s: &str) -> anyhow::Result<u64> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow::anyhow!("Empty duration string"));
        }

        // Find where the number ends and unit begins
        let (num_part, unit_part) = s
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| s.split_at(i))
            .unwrap_or((s, "s"));

        let value: f64 = num_part
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid duration number: {}", num_part))?;
        if value < 0.0 || !value.is_finite() {
            return Err(anyhow::anyhow!("Invalid duration: {}", s));
        }

        let multiplier: u64 = match unit_part.to_lowercase().as_str() {
            "ms" => 1_000_000,
            "s" | "" => 1_000_000_000,
            "m" | "min" => 60_000_000_000,
            _ => return Err(anyhow::anyhow!("Unknown duration unit: {}", unit_part)),
        };

        Ok((value * multiplier as f64) as u64)
    }
}
