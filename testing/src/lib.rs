//! # Encore Testing
//!
//! Testing utilities for the Encore queue engine.
//!
//! This crate provides:
//! - [`InMemoryQueueStore`]: a [`QueueStore`](encore_core::store::QueueStore) with fault injection
//! - [`FixedClock`] and [`ManualClock`]: deterministic time
//! - [`PlanTest`]: Given-When-Then harness for the command planner
//! - [`TestQueue`] and entry fixtures
//! - proptest strategies for operator commands
//!
//! ## Example
//!
//! ```ignore
//! use encore_testing::TestQueue;
//!
//! #[tokio::test]
//! async fn test_first_singer_goes_up() {
//!     let queue = TestQueue::new();
//!     let entry = queue.submit("Valerie").await;
//!
//!     queue.engine.promote(entry.id).await.unwrap();
//!
//!     let up_next = queue.engine.get_up_next(queue.venue_id).await.unwrap();
//!     assert_eq!(up_next.map(|e| e.id), Some(entry.id));
//! }
//! ```

pub mod fixtures;
pub mod plan_test;
pub mod store;

use chrono::{DateTime, Utc};
use encore_core::environment::Clock;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;

    /// Unix time of [`test_clock`]: 2025-01-01 00:00:00 UTC.
    pub const TEST_EPOCH_SECS: i64 = 1_735_689_600;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use encore_testing::mocks::FixedClock;
    /// use encore_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::from_timestamp(TEST_EPOCH_SECS, 0).unwrap_or_default())
    }

    /// Clock that only moves when told to.
    ///
    /// Clones share the same time, so a test can hold one clone while the
    /// engine holds another.
    ///
    /// # Example
    ///
    /// ```
    /// use encore_testing::mocks::ManualClock;
    /// use encore_core::environment::Clock;
    /// use chrono::Utc;
    /// use std::time::Duration;
    ///
    /// let start = Utc::now();
    /// let clock = ManualClock::new(start);
    /// clock.advance(Duration::from_secs(60));
    /// assert_eq!(clock.now(), start + chrono::Duration::seconds(60));
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock stopped at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Moves the clock forward by `by`.
        pub fn advance(&self, by: Duration) {
            let by = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time = time.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC);
        }

        /// Sets the clock to `time`.
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = time;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use encore_core::plan::QueueCommand;
    use encore_core::position::Direction;
    use encore_core::types::EntryId;
    use proptest::prelude::*;
    use proptest::sample::Index;

    /// An operator command aimed at one of `ids`, chosen by index.
    ///
    /// Commands are frequently invalid for the target's current status;
    /// the point is to check that invariants survive whatever is accepted.
    pub fn command_strategy(ids: Vec<EntryId>) -> impl Strategy<Value = QueueCommand> {
        let pick = move |index: &Index| ids[index.index(ids.len())];
        let two = pick.clone();
        let one = pick;

        prop_oneof![
            any::<Index>().prop_map({
                let p = one.clone();
                move |i| QueueCommand::Promote { entry_id: p(&i) }
            }),
            any::<Index>().prop_map({
                let p = one.clone();
                move |i| QueueCommand::Start { entry_id: p(&i) }
            }),
            any::<Index>().prop_map({
                let p = one.clone();
                move |i| QueueCommand::Complete { entry_id: p(&i) }
            }),
            any::<Index>().prop_map({
                let p = one.clone();
                move |i| QueueCommand::Skip { entry_id: p(&i) }
            }),
            any::<Index>().prop_map({
                let p = one.clone();
                move |i| QueueCommand::Reinstate { entry_id: p(&i) }
            }),
            (any::<Index>(), any::<Index>()).prop_map(move |(a, b)| QueueCommand::Swap {
                a: two(&a),
                b: two(&b),
            }),
            (any::<Index>(), any::<bool>()).prop_map(move |(i, up)| QueueCommand::Move {
                entry_id: one(&i),
                direction: if up { Direction::Up } else { Direction::Down },
            }),
        ]
    }
}

/// Installs a `tracing` subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs it.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "encore=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use fixtures::{TestQueue, entry_fixture, request_fixture};
pub use mocks::{FixedClock, ManualClock, test_clock};
pub use plan_test::PlanTest;
pub use store::InMemoryQueueStore;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new(test_clock().now());
        let other = clock.clone();
        clock.advance(Duration::from_secs(90));
        assert_eq!(other.now(), test_clock().now() + chrono::Duration::seconds(90));
    }
}
