//! Given-When-Then harness for the command planner.
//!
//! This module provides a fluent API for testing [`plan`] and [`apply_plan`]
//! together without a store.

#![allow(clippy::module_name_repetitions)] // PlanTest is the natural name

use chrono::{DateTime, Utc};
use encore_core::environment::Clock;
use encore_core::error::QueueError;
use encore_core::plan::{EntryChange, PlanInput, QueueCommand, apply_plan, plan};
use encore_core::types::QueueEntry;

/// Type alias for plan assertion functions
type PlanAssertion = Box<dyn FnOnce(&[EntryChange])>;

/// Type alias for row assertion functions
type RowsAssertion = Box<dyn FnOnce(&[QueueEntry])>;

/// Type alias for error assertion functions
type ErrorAssertion = Box<dyn FnOnce(&QueueError)>;

/// Fluent API for testing the planner with Given-When-Then syntax
///
/// # Example
///
/// ```ignore
/// use encore_testing::{PlanTest, entry_fixture};
///
/// PlanTest::new()
///     .given_entries(vec![first.clone(), second.clone()])
///     .when(QueueCommand::Swap { a: first.id, b: second.id })
///     .then_rows(|rows| {
///         assert_eq!(rows[0].position, 2);
///     })
///     .run();
/// ```
pub struct PlanTest {
    entries: Vec<QueueEntry>,
    command: Option<QueueCommand>,
    now: DateTime<Utc>,
    plan_assertions: Vec<PlanAssertion>,
    rows_assertions: Vec<RowsAssertion>,
    error_assertions: Vec<ErrorAssertion>,
}

impl PlanTest {
    /// Create a new planner test at [`test_clock`](crate::test_clock) time
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            command: None,
            now: crate::test_clock().now(),
            plan_assertions: Vec::new(),
            rows_assertions: Vec::new(),
            error_assertions: Vec::new(),
        }
    }

    /// Set the venue's rows (Given); active and finished rows may be mixed
    #[must_use]
    pub fn given_entries(mut self, entries: Vec<QueueEntry>) -> Self {
        self.entries = entries;
        self
    }

    /// Set the planning instant
    #[must_use]
    pub const fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Set the command to plan (When)
    #[must_use]
    pub const fn when(mut self, command: QueueCommand) -> Self {
        self.command = Some(command);
        self
    }

    /// Add an assertion about the planned changes (Then)
    #[must_use]
    pub fn then_plan<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[EntryChange]) + 'static,
    {
        self.plan_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the rows the plan updates, after applying it (Then)
    #[must_use]
    pub fn then_rows<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[QueueEntry]) + 'static,
    {
        self.rows_assertions.push(Box::new(assertion));
        self
    }

    /// Expect the command to be rejected (Then)
    #[must_use]
    pub fn then_error<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&QueueError) + 'static,
    {
        self.error_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if no command is set, if the outcome (accepted or rejected)
    /// is not the expected one, or if any assertion fails.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let command = self.command.expect("Command must be set with when()");
        let venue_id = self
            .entries
            .first()
            .map(|e| e.venue_id)
            .unwrap_or_default();

        let (active, inactive): (Vec<QueueEntry>, Vec<QueueEntry>) =
            self.entries.iter().cloned().partition(QueueEntry::is_active);

        match plan(command, PlanInput::new(&active, &inactive), self.now) {
            Ok(planned) => {
                assert!(
                    self.error_assertions.is_empty(),
                    "expected {command:?} to be rejected, got plan {planned:?}"
                );
                for assertion in self.plan_assertions {
                    assertion(&planned);
                }

                let updated = apply_plan(venue_id, &self.entries, &planned)
                    .expect("a fresh plan should apply to the rows it was planned on");
                for assertion in self.rows_assertions {
                    assertion(&updated);
                }
            }
            Err(err) => {
                if self.error_assertions.is_empty() {
                    panic!("expected {command:?} to be accepted, got {err}");
                }
                for assertion in self.error_assertions {
                    assertion(&err);
                }
            }
        }
    }
}

impl Default for PlanTest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry_fixture;
    use encore_core::status::EntryStatus;
    use encore_core::types::VenueId;

    #[test]
    fn test_harness_applies_plan() {
        let venue = VenueId::new();
        let entry = entry_fixture(venue, EntryStatus::UpNext, 1);
        let id = entry.id;

        PlanTest::new()
            .given_entries(vec![entry])
            .when(QueueCommand::Start { entry_id: id })
            .then_plan(|plan| assert_eq!(plan.len(), 1))
            .then_rows(|rows| assert_eq!(rows[0].status, EntryStatus::NowSinging))
            .run();
    }

    #[test]
    fn test_harness_reports_rejection() {
        let venue = VenueId::new();
        let entry = entry_fixture(venue, EntryStatus::Completed, 1);
        let id = entry.id;

        PlanTest::new()
            .given_entries(vec![entry])
            .when(QueueCommand::Skip { entry_id: id })
            .then_error(|err| assert!(matches!(err, QueueError::InvalidTransition { .. })))
            .run();
    }
}
