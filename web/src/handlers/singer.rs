//! Singer endpoints: submit a song and follow your own requests.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use encore_core::consumer::{RequestStatus, SingerView};
use encore_core::types::{QueueEntry, RequesterId, VenueId};
use serde::Deserialize;

/// Body of `POST /requests`.
#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    /// Submitting singer
    pub requester_id: RequesterId,
    /// Song title, 1..=200 characters after trimming
    pub song_title: String,
    /// Artist, up to 200 characters
    #[serde(default)]
    pub artist: String,
}

/// Routes for singers.
pub fn singer_router() -> Router<AppState> {
    Router::new()
        .route("/api/venues/:venue_id/requests", post(submit))
        .route(
            "/api/venues/:venue_id/requests/:requester_id",
            get(my_requests),
        )
}

async fn submit(
    State(state): State<AppState>,
    Path(venue_id): Path<VenueId>,
    Json(body): Json<SubmitBody>,
) -> Result<(StatusCode, Json<QueueEntry>), AppError> {
    let view = SingerView::new(state.engine, venue_id, body.requester_id);
    let entry = view.submit(body.song_title, body.artist).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn my_requests(
    State(state): State<AppState>,
    Path((venue_id, requester_id)): Path<(VenueId, RequesterId)>,
) -> Result<Json<Vec<RequestStatus>>, AppError> {
    let view = SingerView::new(state.engine, venue_id, requester_id);
    Ok(Json(view.my_requests().await?))
}
