//! # Local Database Module
//!
//! Local SQLite store for offline-first trip tracking. Holds the four record
//! kinds the engine mirrors from the provider - user profile, rewards
//! profile, subscriptions and trips - plus one sync-state row per kind.
//!
//! ## Key Components
//!
//! - `LocalDatabase`: connection pool, schema creation and version
//!   bookkeeping
//! - `trips.rs`: trip storage, idempotent upsert, backfill selection
//! - `profile.rs`: profile / rewards / subscription operations
//! - `sync_state.rs`: sync-state lifecycle records
//!
//! ## Consistency
//!
//! Every coordinator write that touches a data table together with its
//! sync-state row goes through one sqlx transaction, so a reader never
//! observes a fresh `sync_state` row pointing at stale or absent data. The
//! transactional variants take a `&mut SqliteConnection` and are composed by
//! the sync layer.

pub mod profile;
pub mod sync_state;
pub mod trips;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Result as SqlxResult, SqlitePool};
use std::path::Path;

/// Result type for local database operations
pub type Result<T> = SqlxResult<T>;

/// Version stamped into `schema_migrations` by `init_schema`. Bump together
/// with an `ALTER`-style migration when `schema.sql` changes shape.
pub const SCHEMA_VERSION: i32 = 1;

/// Local database connection manager
#[derive(Debug)]
pub struct LocalDatabase {
    pool: SqlitePool,
}

impl LocalDatabase {
    /// Open or create the local database at the platform data directory.
    ///
    /// Uses WAL mode for better concurrency and performance.
    pub async fn new() -> Result<Self> {
        let db_path = Self::default_db_path();
        if let Some(parent) = Path::new(&db_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(&format!("sqlite:{}?mode=rwc", db_path)).await
    }

    /// Open an in-memory database, used by tests.
    ///
    /// Restricted to one connection: each in-memory SQLite connection is its
    /// own database.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Open a database at an explicit connection URL
    pub async fn open(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url).await?;

        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous=NORMAL").execute(&pool).await?;
        sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await?;
        sqlx::query("PRAGMA temp_store=MEMORY").execute(&pool).await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Platform-specific path for the local database file
    fn default_db_path() -> String {
        let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
        path.push("velosync");
        path.push("local.db");
        path.to_string_lossy().to_string()
    }

    /// Initialize database schema and record the schema version
    async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("schema.sql"))
            .execute(&self.pool)
            .await?;
        self.run_migrations().await?;
        Ok(())
    }

    /// Stamp any schema versions newer than the stored one.
    ///
    /// `schema.sql` is idempotent `CREATE IF NOT EXISTS`, so version 1 has
    /// no separate migration body; later versions would run theirs here
    /// before being stamped.
    async fn run_migrations(&self) -> Result<()> {
        let applied: (i32,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;

        for version in (applied.0 + 1)..=SCHEMA_VERSION {
            sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
                .bind(version)
                .bind(chrono::Utc::now().to_rfc3339())
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    /// Get connection pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get database statistics
    pub async fn stats(&self) -> Result<DatabaseStats> {
        let trip_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM trips")
            .fetch_one(&self.pool)
            .await?;

        let pending_details: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM trips WHERE details_fetched = 0")
                .fetch_one(&self.pool)
                .await?;

        let subscription_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM subscriptions")
            .fetch_one(&self.pool)
            .await?;

        let has_profile: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_profile")
            .fetch_one(&self.pool)
            .await?;

        Ok(DatabaseStats {
            trip_count: trip_count.0 as u64,
            pending_details: pending_details.0 as u64,
            subscription_count: subscription_count.0 as u64,
            has_profile: has_profile.0 > 0,
        })
    }

    /// Wipe all local data, including sync state.
    ///
    /// This is the only deletion path for trips and sync-state rows.
    pub async fn wipe(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "trips",
            "subscriptions",
            "rewards_profile",
            "user_profile",
            "sync_state",
        ] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    /// Total number of trips stored locally
    pub trip_count: u64,
    /// Trips still waiting for detail backfill
    pub pending_details: u64,
    /// Number of subscriptions stored locally
    pub subscription_count: u64,
    /// Whether a user profile has been synced
    pub has_profile: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{
        BikeType, ResourceKind, SyncState, SyncStatus, Trip, UserProfile,
    };
    use chrono::{TimeZone, Utc};

    fn sample_trip(id: &str) -> Trip {
        Trip {
            id: id.to_string(),
            user_id: "rider-1".to_string(),
            started_at: Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap(),
            ended_at: Utc.with_ymd_and_hms(2025, 6, 1, 8, 20, 0).unwrap(),
            start_station_id: None,
            end_station_id: None,
            start_station_name: None,
            end_station_name: None,
            start_lat: 40.73,
            start_lng: -73.99,
            end_lat: 40.74,
            end_lng: -73.98,
            bike_type: BikeType::Classic,
            distance_meters: None,
            polyline: None,
            has_actual_coordinates: false,
            details_fetched: false,
            details_fetched_at: None,
            details_fetch_error: None,
            details_fetch_attempts: 0,
        }
    }

    #[tokio::test]
    async fn test_database_creation() {
        let db = LocalDatabase::open_in_memory().await;
        assert!(db.is_ok());
    }

    #[tokio::test]
    async fn test_empty_stats() {
        let db = LocalDatabase::open_in_memory().await.unwrap();
        let stats = db.stats().await.unwrap();
        assert_eq!(stats.trip_count, 0);
        assert_eq!(stats.pending_details, 0);
        assert_eq!(stats.subscription_count, 0);
        assert!(!stats.has_profile);
    }

    #[tokio::test]
    async fn test_schema_version_stamped_on_create() {
        let db = LocalDatabase::open_in_memory().await.unwrap();
        let version: (i32,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(version.0, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_reopen_keeps_data_and_does_not_restamp_versions() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("local.db").display());

        {
            let db = LocalDatabase::open(&url).await.unwrap();
            db.upsert_trips(&[sample_trip("t1")]).await.unwrap();
        }

        let db = LocalDatabase::open(&url).await.unwrap();
        assert_eq!(db.count_trips("rider-1").await.unwrap(), 1);

        let stamps: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM schema_migrations")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(stamps.0, SCHEMA_VERSION as i64);
    }

    #[tokio::test]
    async fn test_wipe_deletes_every_record_kind() {
        let db = LocalDatabase::open_in_memory().await.unwrap();

        db.upsert_trips(&[sample_trip("t1"), sample_trip("t2")])
            .await
            .unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        profile::write_profile(
            &mut conn,
            &UserProfile {
                id: "rider-1".to_string(),
                name: "Ada".to_string(),
                email: None,
                member_since: None,
            },
        )
        .await
        .unwrap();
        drop(conn);
        let mut state = SyncState::new(ResourceKind::Trips);
        state.status = SyncStatus::Idle;
        state.cursor = Some("page-3".to_string());
        db.put_sync_state(&state).await.unwrap();

        db.wipe().await.unwrap();

        let stats = db.stats().await.unwrap();
        assert_eq!(stats.trip_count, 0);
        assert!(!stats.has_profile);
        assert!(db.get_profile().await.unwrap().is_none());
        // sync state goes too; the next sync starts from scratch
        assert!(db
            .get_sync_state(ResourceKind::Trips)
            .await
            .unwrap()
            .is_none());
    }
}
