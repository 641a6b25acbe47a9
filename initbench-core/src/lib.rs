#![warn(missing_docs)]
//! initbench Core - Domain Model
//!
//! This crate provides the vocabulary shared by every other initbench crate:
//! - `TestUnit`: one point of the version × package manager × feature set × cache matrix
//! - `PackageManager`: the fixed launcher / smoke-test / setup lookup table
//! - `Catalog`: every globally known dimension value
//! - `IterationOutcome`: the ephemeral result of one timed attempt
//! - `Timer`: wall-clock measurement from spawn to exit

mod catalog;
mod measure;
mod package_manager;
mod unit;

pub use catalog::{Catalog, default_feature_sets, default_versions};
pub use measure::Timer;
pub use package_manager::{COLD_CACHE_ENV_VARS, PackageManager, YARN_BERRY_RC, cold_cache_env};
pub use unit::{
    FeatureSet, IterationOutcome, SecondaryTestOutcome, TEST_CAPABILITY, TestUnit, Version,
    strip_iteration_suffix, unit_id,
};

use thiserror::Error;

/// Errors raised while interpreting domain values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A package manager name outside the lookup table
    #[error("Unknown package manager: {0}")]
    UnknownPackageManager(String),
}
