#![warn(missing_docs)]
//! initbench Statistics
//!
//! Folds the successful durations of a test unit's iterations into the five
//! figures persisted in the ledger: mean, median, min, max, and population
//! standard deviation.

mod summary;

pub use summary::{Statistics, compute_statistics};
