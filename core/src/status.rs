//! Entry status and the transitions between statuses.
//!
//! ```text
//!  submit      promote        start             complete
//! ───────> waiting ───────> up_next ───────> now_singing ───────> completed
//!           │   ▲              │
//!      skip │   │ reinstate    │ skip
//!           ▼   │              │
//!          skipped <───────────┘
//!
//! waiting ── reinstate ──> waiting   (timed-out head moves to the tail)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a queue entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// In the line, waiting to be called up
    Waiting,
    /// Confirmed as the next performer
    UpNext,
    /// Currently performing
    NowSinging,
    /// Performance finished
    Completed,
    /// Removed from the line by an operator (recoverable)
    Skipped,
}

impl EntryStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Waiting,
        Self::UpNext,
        Self::NowSinging,
        Self::Completed,
        Self::Skipped,
    ];

    /// Statuses that take part in ordering.
    pub const ACTIVE: [Self; 3] = [Self::Waiting, Self::UpNext, Self::NowSinging];

    /// Returns `true` for `waiting`, `up_next` and `now_singing`.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Waiting | Self::UpNext | Self::NowSinging)
    }

    /// Returns `true` if the entry has left the queue (`completed` or `skipped`).
    #[must_use]
    pub const fn is_finished(self) -> bool {
        !self.is_active()
    }

    /// Whether an operator may move an entry from `self` to `target`.
    ///
    /// `waiting → waiting` is the "get back in line" move of a timed-out head.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Waiting, Self::UpNext | Self::Skipped | Self::Waiting)
                | (Self::UpNext, Self::NowSinging | Self::Skipped)
                | (Self::NowSinging, Self::Completed)
                | (Self::Skipped, Self::Waiting)
        )
    }

    /// Database/string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::UpNext => "up_next",
            Self::NowSinging => "now_singing",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown entry status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for EntryStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "up_next" => Ok(Self::UpNext),
            "now_singing" => Ok(Self::NowSinging),
            "completed" => Ok(Self::Completed),
            "skipped" => Ok(Self::Skipped),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_active_set() {
        assert!(EntryStatus::Waiting.is_active());
        assert!(EntryStatus::UpNext.is_active());
        assert!(EntryStatus::NowSinging.is_active());
        assert!(EntryStatus::Completed.is_finished());
        assert!(EntryStatus::Skipped.is_finished());
    }

    #[test]
    fn test_permitted_transitions() {
        use EntryStatus::{Completed, NowSinging, Skipped, UpNext, Waiting};

        let permitted = [
            (Waiting, UpNext),
            (Waiting, Skipped),
            (Waiting, Waiting),
            (UpNext, NowSinging),
            (UpNext, Skipped),
            (NowSinging, Completed),
            (Skipped, Waiting),
        ];

        for from in EntryStatus::ALL {
            for to in EntryStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    permitted.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_now_singing_cannot_be_skipped() {
        assert!(!EntryStatus::NowSinging.can_transition_to(EntryStatus::Skipped));
    }

    #[test]
    fn test_string_round_trip() {
        for status in EntryStatus::ALL {
            assert_eq!(status.as_str().parse::<EntryStatus>().unwrap(), status);
        }
        assert!("pending".parse::<EntryStatus>().is_err());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&EntryStatus::NowSinging).unwrap();
        assert_eq!(json, r#""now_singing""#);
    }
}
