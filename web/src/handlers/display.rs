//! Read endpoints for the stage display and any other read-only screen.
//!
//! ```text
//! GET /api/venues/:venue_id/queue                     full snapshot
//! GET /api/venues/:venue_id/now-singing
//! GET /api/venues/:venue_id/up-next
//! GET /api/venues/:venue_id/waiting                   ordered by position
//! GET /api/venues/:venue_id/recently-skipped?minutes=30
//! ```

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use encore_core::types::{QueueEntry, QueueSnapshot, VenueId};
use serde::Deserialize;
use std::time::Duration;

/// Longest look-back `GET /recently-skipped` accepts: one day.
pub const MAX_LOOKBACK_MINUTES: u64 = 24 * 60;

/// Query of `GET /recently-skipped`.
#[derive(Debug, Default, Deserialize)]
pub struct SkippedQuery {
    /// Look-back in minutes; the engine's skip retention when absent
    pub minutes: Option<u64>,
}

/// Routes for read-only consumers.
pub fn display_router() -> Router<AppState> {
    Router::new()
        .route("/api/venues/:venue_id/queue", get(queue))
        .route("/api/venues/:venue_id/now-singing", get(now_singing))
        .route("/api/venues/:venue_id/up-next", get(up_next))
        .route("/api/venues/:venue_id/waiting", get(waiting))
        .route("/api/venues/:venue_id/recently-skipped", get(recently_skipped))
}

async fn queue(
    State(state): State<AppState>,
    Path(venue_id): Path<VenueId>,
) -> Result<Json<QueueSnapshot>, AppError> {
    Ok(Json(state.engine.snapshot(venue_id).await?))
}

async fn now_singing(
    State(state): State<AppState>,
    Path(venue_id): Path<VenueId>,
) -> Result<Json<Option<QueueEntry>>, AppError> {
    Ok(Json(state.engine.get_now_singing(venue_id).await?))
}

async fn up_next(
    State(state): State<AppState>,
    Path(venue_id): Path<VenueId>,
) -> Result<Json<Option<QueueEntry>>, AppError> {
    Ok(Json(state.engine.get_up_next(venue_id).await?))
}

async fn waiting(
    State(state): State<AppState>,
    Path(venue_id): Path<VenueId>,
) -> Result<Json<Vec<QueueEntry>>, AppError> {
    Ok(Json(state.engine.get_waiting(venue_id).await?))
}

async fn recently_skipped(
    State(state): State<AppState>,
    Path(venue_id): Path<VenueId>,
    Query(query): Query<SkippedQuery>,
) -> Result<Json<Vec<QueueEntry>>, AppError> {
    let window = match query.minutes {
        None => state.engine.settings().skip_retention,
        Some(minutes) if minutes <= MAX_LOOKBACK_MINUTES => Duration::from_secs(minutes * 60),
        Some(minutes) => {
            return Err(AppError::validation(format!(
                "minutes must be at most {MAX_LOOKBACK_MINUTES}, got {minutes}"
            )));
        }
    };
    Ok(Json(
        state.engine.get_recently_skipped(venue_id, window).await?,
    ))
}
