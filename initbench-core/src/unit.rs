//! Test Units and Iteration Outcomes

use crate::PackageManager;
use serde::{Deserialize, Serialize};

/// Flag token that marks a feature set as producing a testable project
pub const TEST_CAPABILITY: &str = "test";

/// A version of the scaffolding tool under test
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    /// Display name (e.g. `10.0.7`, `canary`)
    pub name: String,
    /// Package spec handed to the launcher (e.g. `storybook@10.0.7`)
    pub command: String,
}

impl Version {
    /// Create a version from its display name and package spec
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }
}

/// A named, ordered list of feature flag tokens
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureSet {
    /// Display name (e.g. `a11y+test`)
    pub name: String,
    /// Tokens appended to the invocation in declared order
    pub flags: Vec<String>,
}

impl FeatureSet {
    /// Create a feature set from its name and flag tokens
    pub fn new<I, S>(name: impl Into<String>, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            flags: flags.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the generated project can run the secondary smoke test
    pub fn has_test_capability(&self) -> bool {
        self.flags.iter().any(|f| f == TEST_CAPABILITY)
    }
}

/// One point of the configuration cross-product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestUnit {
    /// Positional identifier (`test-0001`, ...)
    pub id: String,
    /// Tool version
    pub version: Version,
    /// Package manager driving the invocation
    pub package_manager: PackageManager,
    /// Feature flags passed to the invocation
    pub feature_set: FeatureSet,
    /// Primary (package manager) cache kept warm
    pub cache_enabled: bool,
    /// Secondary (browser) cache kept warm; always false without the test capability
    pub secondary_cache_enabled: bool,
}

impl TestUnit {
    /// Workspace key for iteration `iteration` of this unit
    pub fn workspace_key(&self, iteration: u32) -> String {
        format!("{}-iter{}", self.id, iteration)
    }

    /// Full command line of the timed invocation
    pub fn init_command(&self) -> String {
        self.package_manager
            .init_command(&self.version.command, &self.feature_set.flags)
    }

    /// Whether the secondary cache dimension applies to this unit
    pub fn has_secondary_cache_dimension(&self) -> bool {
        self.feature_set.has_test_capability()
    }
}

/// Result of the optional smoke test after a successful invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondaryTestOutcome {
    /// Smoke test exited 0
    pub success: bool,
    /// Duration in seconds
    pub duration_secs: f64,
    /// Failure description
    pub error: Option<String>,
}

/// Result of one timed attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationOutcome {
    /// Invocation exited 0
    pub success: bool,
    /// Wall-clock duration in seconds (0 when setup failed)
    pub duration_secs: f64,
    /// Failure description
    pub error: Option<String>,
    /// Smoke test result, when one ran
    pub secondary: Option<SecondaryTestOutcome>,
}

impl IterationOutcome {
    /// Successful iteration
    pub fn succeeded(duration_secs: f64) -> Self {
        Self {
            success: true,
            duration_secs,
            error: None,
            secondary: None,
        }
    }

    /// Failed iteration with an error description
    pub fn failed(duration_secs: f64, error: impl Into<String>) -> Self {
        Self {
            success: false,
            duration_secs,
            error: Some(error.into()),
            secondary: None,
        }
    }

    /// Attach a smoke test result
    pub fn with_secondary(mut self, secondary: SecondaryTestOutcome) -> Self {
        self.secondary = Some(secondary);
        self
    }
}

/// Identifier assigned to the `position`-th unit (1-based) of an expansion
pub fn unit_id(position: usize) -> String {
    format!("test-{:04}", position)
}

/// Strip a trailing `-iter<N>` from a ledger test id.
///
/// Older ledgers stored one row per iteration; all of them map back to the
/// same unit id.
pub fn strip_iteration_suffix(id: &str) -> &str {
    if let Some(pos) = id.rfind("-iter") {
        let digits = &id[pos + "-iter".len()..];
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return &id[..pos];
        }
    }
    id
}
