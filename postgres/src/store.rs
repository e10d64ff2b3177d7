//! [`QueueStore`] backed by `PostgreSQL`.

use crate::CHANGE_CHANNEL;
use chrono::{DateTime, Utc};
use encore_core::error::StoreError;
use encore_core::plan::{self, EntryChange};
use encore_core::status::EntryStatus;
use encore_core::store::{QueueStore, StoreFuture};
use encore_core::types::{
    EntryId, QueueEntry, RequesterId, SongRequest, VenueId, VenueQueueState,
};
use sqlx::postgres::{PgConnection, PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

const ENTRY_COLUMNS: &str =
    "id, venue_id, requester_id, song_title, artist, status, position, requested_at, completed_at";

const ACTIVE: &str = "('waiting', 'up_next', 'now_singing')";

/// `PostgreSQL` queue store.
///
/// # Example
///
/// ```no_run
/// use encore_postgres::PostgresQueueStore;
/// use sqlx::PgPool;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = PgPool::connect("postgresql://localhost/encore").await?;
/// let store = PostgresQueueStore::new(pool);
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct PostgresQueueStore {
    /// `PostgreSQL` connection pool.
    pool: PgPool,
}

impl PostgresQueueStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` with at most `max_connections` pooled connections.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection cannot be established.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if migrations fail.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Maps constraint violations to [`StoreError::Conflict`], everything else to
/// [`StoreError::Database`].
fn map_error(venue_id: VenueId, err: sqlx::Error) -> StoreError {
    if let Some(db) = err.as_database_error() {
        let code = db.code();
        // unique_violation, exclusion_violation
        if matches!(code.as_deref(), Some("23505" | "23P01")) {
            metrics::counter!("encore.store.constraint_conflicts").increment(1);
            return StoreError::Conflict {
                venue_id,
                reason: db.message().to_string(),
            };
        }
    }
    StoreError::Database(err.to_string())
}

fn database(err: sqlx::Error) -> StoreError {
    StoreError::Database(err.to_string())
}

fn entry_from_row(row: &PgRow) -> Result<QueueEntry, StoreError> {
    let status: String = row.try_get("status").map_err(database)?;
    let status = status
        .parse::<EntryStatus>()
        .map_err(|e| StoreError::Database(e.to_string()))?;

    Ok(QueueEntry {
        id: EntryId::from_uuid(row.try_get("id").map_err(database)?),
        venue_id: VenueId::from_uuid(row.try_get("venue_id").map_err(database)?),
        requester_id: RequesterId::from_uuid(row.try_get("requester_id").map_err(database)?),
        song_title: row.try_get("song_title").map_err(database)?,
        artist: row.try_get("artist").map_err(database)?,
        status,
        position: row.try_get("position").map_err(database)?,
        requested_at: row.try_get("requested_at").map_err(database)?,
        completed_at: row.try_get("completed_at").map_err(database)?,
    })
}

fn entries_from_rows(rows: &[PgRow]) -> Result<Vec<QueueEntry>, StoreError> {
    rows.iter().map(entry_from_row).collect()
}

/// Ensures the venue row exists and locks it for the rest of the transaction.
///
/// Every write locks this row first, which serializes writes per venue.
async fn lock_venue(conn: &mut PgConnection, venue_id: VenueId) -> Result<bool, StoreError> {
    sqlx::query("INSERT INTO venue_queue_state (venue_id) VALUES ($1) ON CONFLICT DO NOTHING")
        .bind(venue_id.as_uuid())
        .execute(&mut *conn)
        .await
        .map_err(database)?;

    sqlx::query_scalar::<_, bool>(
        "SELECT paused FROM venue_queue_state WHERE venue_id = $1 FOR UPDATE",
    )
    .bind(venue_id.as_uuid())
    .fetch_one(&mut *conn)
    .await
    .map_err(database)
}

async fn notify(conn: &mut PgConnection, venue_id: VenueId) -> Result<(), StoreError> {
    sqlx::query("SELECT pg_notify($1, $2)")
        .bind(CHANGE_CHANNEL)
        .bind(venue_id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(database)?;
    Ok(())
}

impl QueueStore for PostgresQueueStore {
    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(database)?;
            Ok(())
        })
    }

    fn ensure_venue(&self, venue_id: VenueId) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO venue_queue_state (venue_id) VALUES ($1) ON CONFLICT DO NOTHING",
            )
            .bind(venue_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(database)?;
            Ok(())
        })
    }

    fn venue_state(&self, venue_id: VenueId) -> StoreFuture<'_, VenueQueueState> {
        Box::pin(async move {
            let paused = sqlx::query_scalar::<_, bool>(
                "SELECT paused FROM venue_queue_state WHERE venue_id = $1",
            )
            .bind(venue_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(database)?;

            Ok(VenueQueueState {
                venue_id,
                paused: paused.unwrap_or(false),
            })
        })
    }

    fn toggle_paused(&self, venue_id: VenueId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(database)?;

            let paused = sqlx::query_scalar::<_, bool>(
                r"
                INSERT INTO venue_queue_state (venue_id, paused) VALUES ($1, TRUE)
                ON CONFLICT (venue_id) DO UPDATE
                    SET paused = NOT venue_queue_state.paused, updated_at = now()
                RETURNING paused
                ",
            )
            .bind(venue_id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .map_err(database)?;

            notify(&mut tx, venue_id).await?;
            tx.commit().await.map_err(database)?;

            tracing::debug!(%venue_id, paused, "Pause flag flipped");
            Ok(paused)
        })
    }

    fn set_paused(&self, venue_id: VenueId, paused: bool) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(database)?;

            let paused = sqlx::query_scalar::<_, bool>(
                r"
                INSERT INTO venue_queue_state (venue_id, paused) VALUES ($1, $2)
                ON CONFLICT (venue_id) DO UPDATE SET paused = $2, updated_at = now()
                RETURNING paused
                ",
            )
            .bind(venue_id.as_uuid())
            .bind(paused)
            .fetch_one(&mut *tx)
            .await
            .map_err(database)?;

            notify(&mut tx, venue_id).await?;
            tx.commit().await.map_err(database)?;
            Ok(paused)
        })
    }

    fn insert_waiting(
        &self,
        request: SongRequest,
        requested_at: DateTime<Utc>,
    ) -> StoreFuture<'_, QueueEntry> {
        Box::pin(async move {
            let venue_id = request.venue_id;
            let mut tx = self.pool.begin().await.map_err(database)?;

            if lock_venue(&mut tx, venue_id).await? {
                let _ = tx.rollback().await; // Ignore rollback errors
                return Err(StoreError::VenuePaused(venue_id));
            }

            let tail = sqlx::query_scalar::<_, i64>(&format!(
                "SELECT COALESCE(MAX(position), 0) + 1 FROM queue_entries \
                 WHERE venue_id = $1 AND status IN {ACTIVE}"
            ))
            .bind(venue_id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .map_err(database)?;

            let entry = QueueEntry::submitted(request, tail, requested_at);
            sqlx::query(
                r"
                INSERT INTO queue_entries (
                    id, venue_id, requester_id, song_title, artist,
                    status, position, requested_at, completed_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NULL)
                ",
            )
            .bind(entry.id.as_uuid())
            .bind(entry.venue_id.as_uuid())
            .bind(entry.requester_id.as_uuid())
            .bind(&entry.song_title)
            .bind(&entry.artist)
            .bind(entry.status.as_str())
            .bind(entry.position)
            .bind(entry.requested_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_error(venue_id, e))?;

            notify(&mut tx, venue_id).await?;
            tx.commit().await.map_err(|e| map_error(venue_id, e))?;

            tracing::debug!(%venue_id, entry_id = %entry.id, position = tail, "Entry inserted");
            Ok(entry)
        })
    }

    fn entry(&self, entry_id: EntryId) -> StoreFuture<'_, Option<QueueEntry>> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "SELECT {ENTRY_COLUMNS} FROM queue_entries WHERE id = $1"
            ))
            .bind(entry_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(database)?;

            row.as_ref().map(entry_from_row).transpose()
        })
    }

    fn active_entries(&self, venue_id: VenueId) -> StoreFuture<'_, Vec<QueueEntry>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {ENTRY_COLUMNS} FROM queue_entries \
                 WHERE venue_id = $1 AND status IN {ACTIVE} ORDER BY position"
            ))
            .bind(venue_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(database)?;

            entries_from_rows(&rows)
        })
    }

    fn skipped_since(
        &self,
        venue_id: VenueId,
        since: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<QueueEntry>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {ENTRY_COLUMNS} FROM queue_entries \
                 WHERE venue_id = $1 AND status = 'skipped' AND completed_at >= $2 \
                 ORDER BY completed_at DESC"
            ))
            .bind(venue_id.as_uuid())
            .bind(since)
            .fetch_all(&self.pool)
            .await
            .map_err(database)?;

            entries_from_rows(&rows)
        })
    }

    fn entries_for_requester(
        &self,
        venue_id: VenueId,
        requester_id: RequesterId,
    ) -> StoreFuture<'_, Vec<QueueEntry>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {ENTRY_COLUMNS} FROM queue_entries \
                 WHERE venue_id = $1 AND requester_id = $2 \
                 ORDER BY requested_at, position"
            ))
            .bind(venue_id.as_uuid())
            .bind(requester_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(database)?;

            entries_from_rows(&rows)
        })
    }

    fn apply(
        &self,
        venue_id: VenueId,
        changes: Vec<EntryChange>,
    ) -> StoreFuture<'_, Vec<QueueEntry>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(database)?;
            lock_venue(&mut tx, venue_id).await?;

            // Every active row plus whatever the plan names, all locked
            let named: Vec<Uuid> = changes.iter().map(|c| *c.entry_id.as_uuid()).collect();
            let rows = sqlx::query(&format!(
                "SELECT {ENTRY_COLUMNS} FROM queue_entries \
                 WHERE venue_id = $1 AND (status IN {ACTIVE} OR id = ANY($2)) \
                 FOR UPDATE"
            ))
            .bind(venue_id.as_uuid())
            .bind(&named)
            .fetch_all(&mut *tx)
            .await
            .map_err(database)?;
            let rows = entries_from_rows(&rows)?;

            let updated = match plan::apply_plan(venue_id, &rows, &changes) {
                Ok(updated) => updated,
                Err(err) => {
                    let _ = tx.rollback().await; // Ignore rollback errors
                    return Err(err);
                }
            };

            for entry in &updated {
                sqlx::query(
                    r"
                    UPDATE queue_entries
                    SET status = $2, position = $3, completed_at = $4
                    WHERE id = $1
                    ",
                )
                .bind(entry.id.as_uuid())
                .bind(entry.status.as_str())
                .bind(entry.position)
                .bind(entry.completed_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_error(venue_id, e))?;
            }

            notify(&mut tx, venue_id).await?;
            // Deferred position constraint is checked here
            tx.commit().await.map_err(|e| map_error(venue_id, e))?;

            tracing::debug!(%venue_id, changed = updated.len(), "Plan applied");
            Ok(updated)
        })
    }
}
