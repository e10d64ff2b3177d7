//! `PostgreSQL` queue store for Encore.
//!
//! This crate provides a production-ready PostgreSQL-based implementation of
//! the `QueueStore` trait from `encore-core`, plus a LISTEN/NOTIFY relay so
//! several server processes sharing one database fan out changes to all of
//! their consumers:
//!
//! - Every write is one transaction, with the venue's state row locked `FOR UPDATE`
//! - Single `up_next`/`now_singing` enforced by partial unique indexes
//! - Distinct active positions enforced by a deferred exclusion constraint
//! - Every write transaction issues `pg_notify` on [`CHANGE_CHANNEL`]
//!
//! # Example
//!
//! ```ignore
//! use encore_postgres::{PgChangeRelay, PostgresQueueStore};
//!
//! async fn example(feed: encore_core::ChangeFeed) -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresQueueStore::connect("postgres://localhost/encore", 10).await?;
//!     store.migrate().await?;
//!     let relay = PgChangeRelay::spawn(store.pool(), feed).await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod relay;
mod store;

pub use relay::PgChangeRelay;
pub use store::PostgresQueueStore;

/// NOTIFY channel carrying the id of the venue whose queue changed.
pub const CHANGE_CHANNEL: &str = "encore_queue_changed";
