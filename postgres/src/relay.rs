//! Cross-process change notifications over `LISTEN`/`NOTIFY`.
//!
//! Every write transaction in [`PostgresQueueStore`](crate::PostgresQueueStore)
//! issues `pg_notify` on [`CHANGE_CHANNEL`] with the venue id as payload. The
//! relay listens on that channel and republishes each venue on the local
//! [`ChangeFeed`], so followers attached to any process see writes made by any
//! other.

use crate::CHANGE_CHANNEL;
use encore_core::error::StoreError;
use encore_core::fanout::ChangeFeed;
use encore_core::types::VenueId;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Forwards database notifications onto a [`ChangeFeed`].
pub struct PgChangeRelay;

impl PgChangeRelay {
    /// Start listening and spawn the relay task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the initial `LISTEN` fails.
    pub async fn spawn(pool: &PgPool, feed: ChangeFeed) -> Result<JoinHandle<()>, StoreError> {
        let mut listener = PgListener::connect_with(pool)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to connect listener: {e}")))?;
        listener
            .listen(CHANGE_CHANNEL)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to listen: {e}")))?;

        tracing::info!(channel = CHANGE_CHANNEL, "Change relay listening");
        Ok(tokio::spawn(relay(listener, feed)))
    }
}

async fn relay(mut listener: PgListener, feed: ChangeFeed) {
    loop {
        // recv() reconnects and re-issues LISTEN after a dropped connection
        let notification = match listener.recv().await {
            Ok(notification) => notification,
            Err(e) => {
                tracing::warn!(error = %e, "Change relay receive failed");
                metrics::counter!("encore.relay.errors").increment(1);
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }
        };

        match notification.payload().parse::<Uuid>() {
            Ok(id) => {
                let receivers = feed.publish(VenueId::from_uuid(id)).await;
                metrics::counter!("encore.relay.forwarded").increment(1);
                tracing::trace!(venue_id = %id, receivers, "Relayed change");
            }
            Err(e) => {
                tracing::warn!(
                    payload = notification.payload(),
                    error = %e,
                    "Ignoring malformed change payload"
                );
            }
        }
    }
}
