//! Summary Statistics
//!
//! Only successful iteration durations are aggregated. Values are stored as
//! fixed two-decimal strings because that is how they are persisted and
//! reported; an empty input is the literal `"0"` everywhere.

use serde::{Deserialize, Serialize};

/// Aggregated duration statistics for one test unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    /// Arithmetic mean
    pub mean: String,
    /// Middle value, or average of the two middle values
    pub median: String,
    /// Smallest duration
    pub min: String,
    /// Largest duration
    pub max: String,
    /// Population standard deviation
    pub std_dev: String,
    /// Number of durations aggregated
    pub count: usize,
}

impl Statistics {
    /// All fields `"0"`, count 0
    pub fn zero() -> Self {
        Self {
            mean: "0".to_string(),
            median: "0".to_string(),
            min: "0".to_string(),
            max: "0".to_string(),
            std_dev: "0".to_string(),
            count: 0,
        }
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::zero()
    }
}

fn fixed(value: f64) -> String {
    format!("{:.2}", value)
}

/// Compute summary statistics over durations in seconds
pub fn compute_statistics(durations: &[f64]) -> Statistics {
    if durations.is_empty() {
        return Statistics::zero();
    }

    let mut sorted = durations.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    let mean = sorted.iter().sum::<f64>() / n as f64;

    let median = if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    };

    // Population variance: the iterations are the whole population of interest
    let variance = sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;

    Statistics {
        mean: fixed(mean),
        median: fixed(median),
        min: fixed(sorted[0]),
        max: fixed(sorted[n - 1]),
        std_dev: fixed(variance.sqrt()),
        count: n,
    }
}
