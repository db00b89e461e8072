use std::time::Duration;

use tokio::time::Instant;

/// Advisory snapshot of one quota scope as observed by this process.
///
/// The authoritative counter lives in the store; these fields only feed
/// response headers and diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BucketState {
    pub capacity: u64,
    pub space: u64,
    pub reset_at: Instant,
}

impl BucketState {
    pub fn new(capacity: u64, space: u64, reset_at: Instant) -> Self {
        Self {
            capacity,
            space: space.min(capacity),
            reset_at,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.space == 0
    }

    pub fn reset_after(&self) -> Duration {
        self.reset_at.saturating_duration_since(Instant::now())
    }

    /// Whole seconds until the window resets, rounded up.
    pub fn reset_secs(&self) -> u64 {
        ceil_secs(self.reset_after())
    }
}

pub(crate) fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
