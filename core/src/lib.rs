//! # Encore Core
//!
//! The live performance queue engine for venues.
//!
//! A venue's queue is an ordered line of singers that several consumers watch at
//! once: the host console, the public TV display and each singer's own view. This
//! crate owns the rules that keep that line consistent:
//!
//! - **Entry state machine**: `waiting → up_next → now_singing → completed`, with
//!   `skipped` and undo ([`status`])
//! - **Planning**: commands are validated against a snapshot and turned into
//!   expectation-checked row changes ([`plan`])
//! - **Positions**: tail assignment and pairwise exchange ([`position`])
//! - **Confirmation window**: per-consumer head-of-line countdown ([`confirmation`])
//! - **Fan-out**: per-venue "queue changed" topics ([`fanout`])
//! - **Engine**: the operation surface over a [`store::QueueStore`] ([`engine`])
//! - **Follower**: background snapshot reconciliation ([`follower`])
//! - **Consumers**: capability-scoped host, display and singer views ([`consumer`])
//!
//! ## Data Flow
//!
//! ```text
//! ┌────────────┐   command    ┌──────────────┐  plan   ┌──────────────┐
//! │  Consumer  ├─────────────>│ QueueEngine  ├────────>│  QueueStore  │
//! └─────▲──────┘              └──────┬───────┘  apply  └──────────────┘
//!       │ re-fetch snapshot          │ publish(venue)
//!       │                     ┌──────▼───────┐
//!       └─────────────────────┤  ChangeFeed  │  (one topic per venue)
//!                             └──────────────┘
//! ```
//!
//! Notifications carry no delta. Every consumer discards its snapshot and pulls a
//! fresh one, so consumers that attached at different moments never need to
//! reconcile partial updates.
//!
//! ## Example
//!
//! ```ignore
//! use encore_core::{EngineSettings, QueueEngine, SongRequest};
//! use encore_core::environment::SystemClock;
//! use encore_core::fanout::ChangeFeed;
//!
//! let engine = QueueEngine::new(store, ChangeFeed::default(), Arc::new(SystemClock), EngineSettings::default());
//! let entry = engine.submit(SongRequest::new(venue, singer, "Valerie", "Amy Winehouse")).await?;
//! engine.promote(entry.id).await?;
//! engine.start(entry.id).await?;
//! ```

pub mod confirmation;
pub mod consumer;
pub mod engine;
pub mod environment;
pub mod error;
pub mod fanout;
pub mod follower;
pub mod plan;
pub mod position;
pub mod settings;
pub mod status;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use confirmation::{ConfirmationTracker, ConfirmationWindow, HeadAction, HeadStatus};
pub use consumer::{DisplayView, HostConsole, QueueReader, SingerView};
pub use engine::QueueEngine;
pub use error::{QueueError, StoreError};
pub use fanout::{ChangeFeed, QueueChanged};
pub use follower::SnapshotFollower;
pub use plan::QueueCommand;
pub use position::Direction;
pub use settings::EngineSettings;
pub use status::EntryStatus;
pub use types::{
    EntryId, QueueEntry, QueueSnapshot, RequesterId, SongRequest, VenueId, VenueQueueState,
};
