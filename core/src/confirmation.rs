//! Head-of-line confirmation countdown.
//!
//! When an entry becomes head of line, the operator has a window to confirm
//! that the singer is present. The countdown is derived on each consumer from
//! the moment that consumer first saw the entry at the head; nothing is stored
//! and the engine never acts on expiry. Consumers only change which actions
//! they offer:
//!
//! | Head status | Actions |
//! |---|---|
//! | pending | confirm (`promote`), skip |
//! | timed out | get back in line (`reinstate`), cancel (`skip`) |
//!
//! Two consumers that start observing at different instants may show
//! different remaining times, but agree on the head's identity.

use crate::plan::QueueCommand;
use crate::settings::DEFAULT_CONFIRMATION_WINDOW;
use crate::types::EntryId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long the head of line may wait for confirmation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfirmationWindow(Duration);

impl ConfirmationWindow {
    /// Creates a window of `duration`.
    #[must_use]
    pub const fn new(duration: Duration) -> Self {
        Self(duration)
    }

    /// Creates a window of `secs` seconds.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    /// The window length.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.0
    }
}

impl Default for ConfirmationWindow {
    fn default() -> Self {
        Self(DEFAULT_CONFIRMATION_WINDOW)
    }
}

/// Where the head of line stands in its countdown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum HeadStatus {
    /// Nobody is waiting
    Empty,
    /// Inside the window
    Pending {
        /// Head entry
        entry_id: EntryId,
        /// Time left
        remaining: Duration,
    },
    /// Window elapsed
    TimedOut {
        /// Head entry
        entry_id: EntryId,
        /// Time past the window
        overdue: Duration,
    },
}

impl HeadStatus {
    /// The head entry, if any.
    #[must_use]
    pub const fn entry_id(&self) -> Option<EntryId> {
        match self {
            Self::Empty => None,
            Self::Pending { entry_id, .. } | Self::TimedOut { entry_id, .. } => Some(*entry_id),
        }
    }

    /// Returns `true` once the window has elapsed.
    #[must_use]
    pub const fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    /// Actions a consumer offers for the head.
    #[must_use]
    pub const fn actions(&self) -> &'static [HeadAction] {
        match self {
            Self::Empty => &[],
            Self::Pending { .. } => &[HeadAction::Confirm, HeadAction::Skip],
            Self::TimedOut { .. } => &[HeadAction::Reinstate, HeadAction::Cancel],
        }
    }
}

/// Operator choice for the head of line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadAction {
    /// Singer is present
    Confirm,
    /// Singer is not coming (inside the window)
    Skip,
    /// Send the head to the back of the line
    Reinstate,
    /// Singer is not coming (after the window)
    Cancel,
}

impl HeadAction {
    /// The engine command this action issues for `entry_id`.
    #[must_use]
    pub const fn command(self, entry_id: EntryId) -> QueueCommand {
        match self {
            Self::Confirm => QueueCommand::Promote { entry_id },
            Self::Skip | Self::Cancel => QueueCommand::Skip { entry_id },
            Self::Reinstate => QueueCommand::Reinstate { entry_id },
        }
    }
}

/// One consumer's view of when the current head was first seen.
#[derive(Clone, Debug)]
pub struct ConfirmationTracker {
    window: ConfirmationWindow,
    observed: Option<(EntryId, DateTime<Utc>)>,
}

impl ConfirmationTracker {
    /// Creates a tracker that has not seen any head yet.
    #[must_use]
    pub const fn new(window: ConfirmationWindow) -> Self {
        Self {
            window,
            observed: None,
        }
    }

    /// Records the current head.
    ///
    /// The observation time is kept while the same entry stays at the head
    /// and restarts when a different entry (or none) takes its place.
    pub fn observe(&mut self, head: Option<EntryId>, now: DateTime<Utc>) -> HeadStatus {
        self.observed = match (self.observed, head) {
            (Some((seen, since)), Some(current)) if seen == current => Some((seen, since)),
            (_, Some(current)) => {
                tracing::debug!(entry_id = %current, "New head of line");
                Some((current, now))
            }
            (_, None) => None,
        };
        self.status(now)
    }

    /// Countdown state at `now` for the last observed head.
    #[must_use]
    pub fn status(&self, now: DateTime<Utc>) -> HeadStatus {
        let Some((entry_id, since)) = self.observed else {
            return HeadStatus::Empty;
        };

        // A clock that stepped backwards counts as no time elapsed
        let elapsed = (now - since).to_std().unwrap_or(Duration::ZERO);
        let window = self.window.duration();

        if elapsed >= window {
            HeadStatus::TimedOut {
                entry_id,
                overdue: elapsed - window,
            }
        } else {
            HeadStatus::Pending {
                entry_id,
                remaining: window - elapsed,
            }
        }
    }

    /// When the current head was first observed.
    #[must_use]
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        self.observed.map(|(_, since)| since)
    }

    /// Forgets the current head.
    pub fn reset(&mut self) {
        self.observed = None;
    }
}

impl Default for ConfirmationTracker {
    fn default() -> Self {
        Self::new(ConfirmationWindow::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 21, 0, 0).single().unwrap_or_default()
    }

    fn secs(n: i64) -> chrono::Duration {
        chrono::Duration::seconds(n)
    }

    #[test]
    fn test_same_head_keeps_observation_time() {
        let mut tracker = ConfirmationTracker::default();
        let head = EntryId::new();

        tracker.observe(Some(head), t0());
        let status = tracker.observe(Some(head), t0() + secs(120));

        assert_eq!(tracker.observed_at(), Some(t0()));
        assert_eq!(
            status,
            HeadStatus::Pending {
                entry_id: head,
                remaining: Duration::from_secs(180),
            }
        );
    }

    #[test]
    fn test_new_head_restarts_window() {
        let mut tracker = ConfirmationTracker::default();
        let first = EntryId::new();
        let second = EntryId::new();

        tracker.observe(Some(first), t0());
        let status = tracker.observe(Some(second), t0() + secs(400));

        assert_eq!(tracker.observed_at(), Some(t0() + secs(400)));
        assert!(!status.is_timed_out());
        assert_eq!(status.entry_id(), Some(second));
    }

    #[test]
    fn test_window_boundary_times_out() {
        let mut tracker = ConfirmationTracker::new(ConfirmationWindow::from_secs(300));
        let head = EntryId::new();
        tracker.observe(Some(head), t0());

        assert!(!tracker.status(t0() + secs(299)).is_timed_out());
        assert_eq!(
            tracker.status(t0() + secs(301)),
            HeadStatus::TimedOut {
                entry_id: head,
                overdue: Duration::from_secs(1),
            }
        );
    }

    #[test]
    fn test_empty_line_clears_tracker() {
        let mut tracker = ConfirmationTracker::default();
        tracker.observe(Some(EntryId::new()), t0());

        assert_eq!(tracker.observe(None, t0() + secs(10)), HeadStatus::Empty);
        assert!(tracker.observed_at().is_none());
    }

    #[test]
    fn test_actions_follow_status() {
        let entry_id = EntryId::new();
        let pending = HeadStatus::Pending {
            entry_id,
            remaining: Duration::from_secs(1),
        };
        let timed_out = HeadStatus::TimedOut {
            entry_id,
            overdue: Duration::ZERO,
        };

        assert_eq!(pending.actions(), &[HeadAction::Confirm, HeadAction::Skip]);
        assert_eq!(timed_out.actions(), &[HeadAction::Reinstate, HeadAction::Cancel]);
        assert!(HeadStatus::Empty.actions().is_empty());

        assert_eq!(
            HeadAction::Confirm.command(entry_id),
            QueueCommand::Promote { entry_id }
        );
        assert_eq!(
            HeadAction::Cancel.command(entry_id),
            QueueCommand::Skip { entry_id }
        );
        assert_eq!(
            HeadAction::Reinstate.command(entry_id),
            QueueCommand::Reinstate { entry_id }
        );
    }

    #[test]
    fn test_consumers_agree_once_both_past_window() {
        let head = EntryId::new();
        let mut early = ConfirmationTracker::default();
        let mut late = ConfirmationTracker::default();

        early.observe(Some(head), t0());
        late.observe(Some(head), t0() + secs(60));

        let at = t0() + secs(200);
        assert_eq!(early.status(at).entry_id(), late.status(at).entry_id());

        let after = t0() + secs(400);
        assert!(early.status(after).is_timed_out());
        assert!(late.status(after).is_timed_out());
    }
}
