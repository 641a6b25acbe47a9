//! Wall-Clock Timing
//!
//! Iterations are measured from just before spawn to just after exit. The
//! invocations under test run for seconds, so a monotonic `Instant` is all the
//! precision needed.

use std::time::{Duration, Instant};

/// Timer for measuring one external invocation
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer
    #[inline]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed time since start
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Elapsed time since start, in fractional seconds
    #[inline]
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}
