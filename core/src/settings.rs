//! Engine tuning knobs.

use std::time::Duration;

/// Default confirmation window for the head of line.
pub const DEFAULT_CONFIRMATION_WINDOW: Duration = Duration::from_secs(300);

/// Default retention window for recently skipped entries.
pub const DEFAULT_SKIP_RETENTION: Duration = Duration::from_secs(30 * 60);

/// Default number of re-plans after a stale-state conflict.
pub const DEFAULT_MAX_CONFLICT_RETRIES: usize = 3;

/// Default per-venue broadcast buffer.
pub const DEFAULT_CHANGE_FEED_CAPACITY: usize = 256;

/// Settings shared by the engine and its consumers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    /// How long the head of line may wait before consumers offer
    /// "get back in line" / "cancel"
    pub confirmation_window: Duration,
    /// How far back `recently_skipped` looks
    pub skip_retention: Duration,
    /// Re-plans after a [`StoreError::Conflict`](crate::StoreError::Conflict)
    pub max_conflict_retries: usize,
    /// Pause between re-plans
    pub conflict_backoff: Duration,
    /// Broadcast buffer per venue topic
    pub change_feed_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            confirmation_window: DEFAULT_CONFIRMATION_WINDOW,
            skip_retention: DEFAULT_SKIP_RETENTION,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
            conflict_backoff: Duration::from_millis(10),
            change_feed_capacity: DEFAULT_CHANGE_FEED_CAPACITY,
        }
    }
}

impl EngineSettings {
    /// `skip_retention` as a chrono duration, saturating on overflow.
    #[must_use]
    pub fn skip_retention_window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.skip_retention).unwrap_or(chrono::Duration::MAX)
    }
}
