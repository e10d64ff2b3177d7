//! Host console endpoints: lifecycle commands, reordering and pause control.
//!
//! ```text
//! POST /api/venues/:venue_id/entries/:entry_id/:action   promote | start | complete |
//!                                                        skip | reinstate | move-up | move-down
//! POST /api/venues/:venue_id/swap                        {"a": …, "b": …}
//! POST /api/venues/:venue_id/pause/toggle
//! PUT  /api/venues/:venue_id/pause                       {"paused": true}
//! ```

use crate::error::AppError;
use crate::middleware::CorrelationId;
use crate::state::AppState;
use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    routing::{post, put},
};
use encore_core::error::QueueError;
use encore_core::plan::QueueCommand;
use encore_core::position::Direction;
use encore_core::types::{EntryId, QueueEntry, VenueId, VenueQueueState};
use serde::Deserialize;

/// Single-entry operator action, as it appears in the URL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryAction {
    /// waiting → up_next
    Promote,
    /// up_next → now_singing
    Start,
    /// now_singing → completed
    Complete,
    /// → skipped
    Skip,
    /// Back in line at the tail
    Reinstate,
    /// Swap with the entry ahead
    MoveUp,
    /// Swap with the entry behind
    MoveDown,
}

impl EntryAction {
    const fn command(self, entry_id: EntryId) -> QueueCommand {
        match self {
            Self::Promote => QueueCommand::Promote { entry_id },
            Self::Start => QueueCommand::Start { entry_id },
            Self::Complete => QueueCommand::Complete { entry_id },
            Self::Skip => QueueCommand::Skip { entry_id },
            Self::Reinstate => QueueCommand::Reinstate { entry_id },
            Self::MoveUp => QueueCommand::Move {
                entry_id,
                direction: Direction::Up,
            },
            Self::MoveDown => QueueCommand::Move {
                entry_id,
                direction: Direction::Down,
            },
        }
    }
}

/// Body of `POST /swap`.
#[derive(Debug, Deserialize)]
pub struct SwapBody {
    /// First entry
    pub a: EntryId,
    /// Second entry
    pub b: EntryId,
}

/// Body of `PUT /pause`.
#[derive(Debug, Deserialize)]
pub struct PauseBody {
    /// Desired pause flag
    pub paused: bool,
}

/// Routes for the host console.
pub fn operator_router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/venues/:venue_id/entries/:entry_id/:action",
            post(entry_command),
        )
        .route("/api/venues/:venue_id/swap", post(swap))
        .route("/api/venues/:venue_id/pause/toggle", post(toggle_pause))
        .route("/api/venues/:venue_id/pause", put(set_paused))
}

/// Rejects entries that live at another venue as not found.
async fn require_at_venue(
    state: &AppState,
    venue_id: VenueId,
    entry_id: EntryId,
) -> Result<(), AppError> {
    match state
        .engine
        .store()
        .entry(entry_id)
        .await
        .map_err(QueueError::from)?
    {
        Some(entry) if entry.venue_id == venue_id => Ok(()),
        _ => Err(AppError::not_found("Entry", entry_id)),
    }
}

async fn run(
    state: &AppState,
    correlation_id: CorrelationId,
    command: QueueCommand,
) -> Result<Json<Vec<QueueEntry>>, AppError> {
    match state.engine.execute(command).await {
        Ok(updated) => Ok(Json(updated)),
        Err(e) => {
            tracing::info!(%correlation_id, ?command, error = %e, "Operator command rejected");
            Err(e.into())
        }
    }
}

async fn entry_command(
    State(state): State<AppState>,
    Extension(correlation_id): Extension<CorrelationId>,
    Path((venue_id, entry_id, action)): Path<(VenueId, EntryId, EntryAction)>,
) -> Result<Json<Vec<QueueEntry>>, AppError> {
    require_at_venue(&state, venue_id, entry_id).await?;
    run(&state, correlation_id, action.command(entry_id)).await
}

async fn swap(
    State(state): State<AppState>,
    Extension(correlation_id): Extension<CorrelationId>,
    Path(venue_id): Path<VenueId>,
    Json(body): Json<SwapBody>,
) -> Result<Json<Vec<QueueEntry>>, AppError> {
    require_at_venue(&state, venue_id, body.a).await?;
    require_at_venue(&state, venue_id, body.b).await?;
    run(&state, correlation_id, QueueCommand::Swap { a: body.a, b: body.b }).await
}

async fn toggle_pause(
    State(state): State<AppState>,
    Path(venue_id): Path<VenueId>,
) -> Result<Json<VenueQueueState>, AppError> {
    let paused = state.engine.toggle_pause(venue_id).await?;
    Ok(Json(VenueQueueState { venue_id, paused }))
}

async fn set_paused(
    State(state): State<AppState>,
    Path(venue_id): Path<VenueId>,
    Json(body): Json<PauseBody>,
) -> Result<Json<VenueQueueState>, AppError> {
    let paused = state.engine.set_paused(venue_id, body.paused).await?;
    Ok(Json(VenueQueueState { venue_id, paused }))
}
