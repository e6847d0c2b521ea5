//! # Sync State Operations
//!
//! Persistence for the per-resource-kind sync-state records that drive the
//! stale-while-revalidate coordinators: freshness gates, pagination cursors
//! and last-error bookkeeping.
//!
//! The write path is exposed in two forms: a pool-level method for
//! standalone status flips, and an executor-generic function the sync layer
//! composes into the same transaction as the data it describes.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite};

use crate::local_db::{LocalDatabase, Result};
use crate::shared::models::{ResourceKind, SyncState, SyncStatus};

impl LocalDatabase {
    /// Load the sync state for a resource kind, if one exists
    pub async fn get_sync_state(&self, kind: ResourceKind) -> Result<Option<SyncState>> {
        let row = sqlx::query(
            "SELECT key, status, last_synced_at, next_sync_after, error, cursor, total_records
             FROM sync_state WHERE key = ?",
        )
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_sync_state(kind, &row)?)),
            None => Ok(None),
        }
    }

    /// Persist a sync state outside any wider transaction
    pub async fn put_sync_state(&self, state: &SyncState) -> Result<()> {
        write_sync_state(&self.pool, state).await
    }
}

/// Write a sync-state row on any executor.
///
/// The sync layer calls this inside the transaction that also writes the
/// records the state describes.
pub(crate) async fn write_sync_state<'e, E>(executor: E, state: &SyncState) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT OR REPLACE INTO sync_state
            (key, status, last_synced_at, next_sync_after, error, cursor, total_records)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(state.kind.as_str())
    .bind(state.status.as_str())
    .bind(state.last_synced_at.map(|t| t.to_rfc3339()))
    .bind(state.next_sync_after.map(|t| t.to_rfc3339()))
    .bind(state.error.as_deref())
    .bind(state.cursor.as_deref())
    .bind(state.total_records)
    .execute(executor)
    .await?;
    Ok(())
}

fn row_to_sync_state(kind: ResourceKind, row: &SqliteRow) -> Result<SyncState> {
    let status: String = row.try_get("status")?;
    Ok(SyncState {
        kind,
        status: SyncStatus::parse(&status),
        last_synced_at: parse_optional_ts(row.try_get("last_synced_at")?)?,
        next_sync_after: parse_optional_ts(row.try_get("next_sync_after")?)?,
        error: row.try_get("error")?,
        cursor: row.try_get("cursor")?,
        total_records: row.try_get("total_records")?,
    })
}

/// Parse a stored RFC 3339 timestamp column
pub(crate) fn parse_optional_ts(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    match value {
        None => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(&s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| sqlx::Error::Protocol(format!("invalid stored timestamp '{}': {}", s, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_missing_state_is_none() {
        let db = LocalDatabase::open_in_memory().await.unwrap();
        let state = db.get_sync_state(ResourceKind::Profile).await.unwrap();
        assert!(state.is_none());
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let db = LocalDatabase::open_in_memory().await.unwrap();
        let now = Utc::now();
        let state = SyncState {
            kind: ResourceKind::Trips,
            status: SyncStatus::Idle,
            last_synced_at: Some(now),
            next_sync_after: Some(now + Duration::seconds(300)),
            error: None,
            cursor: Some("page-7".to_string()),
            total_records: Some(142),
        };
        db.put_sync_state(&state).await.unwrap();

        let loaded = db.get_sync_state(ResourceKind::Trips).await.unwrap().unwrap();
        assert_eq!(loaded.status, SyncStatus::Idle);
        assert_eq!(loaded.cursor.as_deref(), Some("page-7"));
        assert_eq!(loaded.total_records, Some(142));
        // rfc3339 keeps sub-second precision
        assert_eq!(loaded.last_synced_at, Some(now));
    }

    #[tokio::test]
    async fn test_replace_overwrites_error_fields() {
        let db = LocalDatabase::open_in_memory().await.unwrap();
        let mut state = SyncState::new(ResourceKind::Rewards);
        state.status = SyncStatus::Error;
        state.error = Some("HTTP_503: unavailable".to_string());
        db.put_sync_state(&state).await.unwrap();

        state.status = SyncStatus::Idle;
        state.error = None;
        db.put_sync_state(&state).await.unwrap();

        let loaded = db.get_sync_state(ResourceKind::Rewards).await.unwrap().unwrap();
        assert_eq!(loaded.status, SyncStatus::Idle);
        assert!(loaded.error.is_none());
    }
}
