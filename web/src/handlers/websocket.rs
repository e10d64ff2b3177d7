//! WebSocket change notifications.
//!
//! Clients never receive queue contents over the socket, only a signal that
//! the venue changed. They re-fetch `GET /queue` on every message.
//!
//! ```text
//! Client            WebSocket Handler          ChangeFeed
//!   │                      │                       │
//!   ├─ Connect ───────────>│                       │
//!   │                      ├─ subscribe(venue) ───>│
//!   │<─ queue_changed ─────┤  (once, immediately)  │
//!   │                      │<── QueueChanged ──────┤
//!   │<─ queue_changed ─────┤                       │
//! ```
//!
//! **Server → Client:**
//! ```json
//! { "type": "queue_changed", "venue_id": "…" }
//! ```

use crate::state::AppState;
use axum::{
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use encore_core::fanout::ChangeFeed;
use encore_core::types::VenueId;
use futures::{SinkExt, stream::StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Messages sent to WebSocket clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// The venue's queue changed; re-fetch
    QueueChanged {
        /// Venue that changed
        venue_id: VenueId,
    },
}

/// Upgrade to a WebSocket that streams change signals for one venue.
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn handle(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(venue_id): Path<VenueId>,
) -> Response {
    info!(%venue_id, "WebSocket connection requested");
    let feed = state.engine.feed().clone();
    ws.on_upgrade(move |socket| handle_socket(socket, feed, venue_id))
}

/// Runs until either side goes away.
///
/// A lagged subscription still produces a single `queue_changed`, which is all
/// a re-fetching client needs.
async fn handle_socket(socket: WebSocket, feed: ChangeFeed, venue_id: VenueId) {
    let (mut sender, mut receiver) = socket.split();

    let mut changes = feed.subscribe(venue_id).await;
    metrics::gauge!("encore.ws.connections").increment(1.0);

    let message = match serde_json::to_string(&WsMessage::QueueChanged { venue_id }) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "Failed to serialize change message");
            return;
        }
    };

    let mut send_task = tokio::spawn(async move {
        if sender.send(Message::Text(message.clone())).await.is_err() {
            return;
        }
        loop {
            match changes.recv().await {
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!(%venue_id, skipped, "WebSocket subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
            if sender.send(Message::Text(message.clone())).await.is_err() {
                // Client disconnected
                break;
            }
        }
        debug!("WebSocket send task terminated");
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                info!("Client requested close");
                break;
            }
            // Other client messages carry no meaning here
        }
        debug!("WebSocket receive task terminated");
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    metrics::gauge!("encore.ws.connections").decrement(1.0);
    info!(%venue_id, "WebSocket connection closed");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_message_shape() {
        let venue_id = VenueId::from_uuid(Uuid::nil());
        let json = serde_json::to_string(&WsMessage::QueueChanged { venue_id }).unwrap();
        assert_eq!(
            json,
            r#"{"type":"queue_changed","venue_id":"00000000-0000-0000-0000-000000000000"}"#
        );
    }
}
