//! # Local Trip Operations
//!
//! CRUD operations for trips in the local SQLite database. Trips are created
//! by the incremental trip sync, enriched in place by the detail backfill
//! job, and only ever deleted by a full wipe.
//!
//! The upsert is idempotent by trip id: re-ingesting an id overwrites the
//! factual columns with the latest provider values but never touches the
//! sync-derived columns (`details_*`, `polyline`, `distance_meters`,
//! `has_actual_coordinates`) that the backfill job owns.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::local_db::sync_state::parse_optional_ts;
use crate::local_db::{LocalDatabase, Result};
use crate::shared::models::{BikeType, Trip};

/// Enrichment produced by one successful detail fetch.
///
/// `None` fields leave the existing column value in place.
#[derive(Debug, Clone, Default)]
pub struct TripDetailUpdate {
    pub start_station_name: Option<String>,
    pub end_station_name: Option<String>,
    pub start_lat: Option<f64>,
    pub start_lng: Option<f64>,
    pub end_lat: Option<f64>,
    pub end_lng: Option<f64>,
    pub polyline: Option<String>,
    pub distance_meters: Option<f64>,
    pub has_actual_coordinates: bool,
}

impl TripDetailUpdate {
    /// Whether this update satisfies the trip invariant: a real encoded path
    /// or both coordinate pairs from a real source.
    pub fn satisfies_invariant(&self) -> bool {
        self.polyline.as_deref().is_some_and(|p| !p.is_empty())
            || (self.start_lat.is_some()
                && self.start_lng.is_some()
                && self.end_lat.is_some()
                && self.end_lng.is_some())
    }
}

impl LocalDatabase {
    /// Bulk-upsert trips inside a fresh transaction
    pub async fn upsert_trips(&self, trips: &[Trip]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        upsert_trips(&mut *tx, trips).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Load a single trip by id
    pub async fn get_trip(&self, trip_id: &str) -> Result<Option<Trip>> {
        let row = sqlx::query(TRIP_SELECT_BY_ID)
            .bind(trip_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(row_to_trip(&row)?)),
            None => Ok(None),
        }
    }

    /// Count all trips recorded for a rider
    pub async fn count_trips(&self, user_id: &str) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM trips WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    /// Trips for a rider whose start time falls inside `[from, to]`
    pub async fn trips_in_range(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Trip>> {
        let rows = sqlx::query(&format!(
            "{} WHERE user_id = ? AND started_at >= ? AND started_at <= ? ORDER BY started_at ASC",
            TRIP_SELECT
        ))
        .bind(user_id)
        .bind(from.to_rfc3339())
        .bind(to.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_trip).collect()
    }

    /// Trips still eligible for the detail backfill job: details not yet
    /// fetched and no polyline or degenerate coordinates. Newest first, so
    /// recent rides gain playback geometry before ancient history.
    pub async fn trips_missing_details(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Trip>> {
        let limit_clause = limit.map(|l| format!("LIMIT {}", l)).unwrap_or_default();
        let query = format!(
            "{} WHERE user_id = ?
               AND details_fetched = 0
               AND (polyline IS NULL OR polyline = ''
                    OR (start_lat = 0 AND start_lng = 0)
                    OR (end_lat = 0 AND end_lng = 0))
             ORDER BY started_at DESC
             {}",
            TRIP_SELECT, limit_clause
        );

        let rows = sqlx::query(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_trip).collect()
    }

    /// Apply a successful detail fetch: enrichment plus `details_fetched`
    /// bookkeeping, clearing any previous fetch error.
    pub async fn apply_trip_details(
        &self,
        trip_id: &str,
        update: &TripDetailUpdate,
        fetched_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE trips SET
                start_station_name = COALESCE(?, start_station_name),
                end_station_name = COALESCE(?, end_station_name),
                start_lat = COALESCE(?, start_lat),
                start_lng = COALESCE(?, start_lng),
                end_lat = COALESCE(?, end_lat),
                end_lng = COALESCE(?, end_lng),
                polyline = COALESCE(?, polyline),
                distance_meters = COALESCE(?, distance_meters),
                has_actual_coordinates = ?,
                details_fetched = 1,
                details_fetched_at = ?,
                details_fetch_error = NULL
             WHERE id = ?",
        )
        .bind(update.start_station_name.as_deref())
        .bind(update.end_station_name.as_deref())
        .bind(update.start_lat)
        .bind(update.start_lng)
        .bind(update.end_lat)
        .bind(update.end_lng)
        .bind(update.polyline.as_deref())
        .bind(update.distance_meters)
        .bind(update.has_actual_coordinates)
        .bind(fetched_at.to_rfc3339())
        .bind(trip_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a failed detail fetch, leaving the trip eligible for retry
    pub async fn record_detail_failure(&self, trip_id: &str, code: &str) -> Result<()> {
        sqlx::query(
            "UPDATE trips SET
                details_fetch_attempts = details_fetch_attempts + 1,
                details_fetch_error = ?
             WHERE id = ?",
        )
        .bind(code)
        .bind(trip_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

const TRIP_COLUMNS: &str = "id, user_id, started_at, ended_at,
    start_station_id, end_station_id, start_station_name, end_station_name,
    start_lat, start_lng, end_lat, end_lng, bike_type,
    distance_meters, polyline, has_actual_coordinates,
    details_fetched, details_fetched_at, details_fetch_error, details_fetch_attempts";

const TRIP_SELECT: &str = "SELECT id, user_id, started_at, ended_at,
    start_station_id, end_station_id, start_station_name, end_station_name,
    start_lat, start_lng, end_lat, end_lng, bike_type,
    distance_meters, polyline, has_actual_coordinates,
    details_fetched, details_fetched_at, details_fetch_error, details_fetch_attempts
 FROM trips";

const TRIP_SELECT_BY_ID: &str = "SELECT id, user_id, started_at, ended_at,
    start_station_id, end_station_id, start_station_name, end_station_name,
    start_lat, start_lng, end_lat, end_lng, bike_type,
    distance_meters, polyline, has_actual_coordinates,
    details_fetched, details_fetched_at, details_fetch_error, details_fetch_attempts
 FROM trips WHERE id = ?";

/// Bulk-upsert trips on an open connection or transaction. Factual columns
/// follow the incoming record; sync-derived columns are untouched on
/// conflict. Station names coalesce because list pages never carry them
/// and a re-ingest must not erase backfilled ones.
pub(crate) async fn upsert_trips(conn: &mut SqliteConnection, trips: &[Trip]) -> Result<()> {
    for trip in trips {
        sqlx::query(&format!(
            "INSERT INTO trips ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                started_at = excluded.started_at,
                ended_at = excluded.ended_at,
                start_station_id = excluded.start_station_id,
                end_station_id = excluded.end_station_id,
                start_station_name = COALESCE(excluded.start_station_name, trips.start_station_name),
                end_station_name = COALESCE(excluded.end_station_name, trips.end_station_name),
                start_lat = excluded.start_lat,
                start_lng = excluded.start_lng,
                end_lat = excluded.end_lat,
                end_lng = excluded.end_lng,
                bike_type = excluded.bike_type",
            TRIP_COLUMNS
        ))
        .bind(&trip.id)
        .bind(&trip.user_id)
        .bind(trip.started_at.to_rfc3339())
        .bind(trip.ended_at.to_rfc3339())
        .bind(trip.start_station_id.as_deref())
        .bind(trip.end_station_id.as_deref())
        .bind(trip.start_station_name.as_deref())
        .bind(trip.end_station_name.as_deref())
        .bind(trip.start_lat)
        .bind(trip.start_lng)
        .bind(trip.end_lat)
        .bind(trip.end_lng)
        .bind(trip.bike_type.as_str())
        .bind(trip.distance_meters)
        .bind(trip.polyline.as_deref())
        .bind(trip.has_actual_coordinates)
        .bind(trip.details_fetched)
        .bind(trip.details_fetched_at.map(|t| t.to_rfc3339()))
        .bind(trip.details_fetch_error.as_deref())
        .bind(trip.details_fetch_attempts)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

fn row_to_trip(row: &SqliteRow) -> Result<Trip> {
    let started_at: String = row.try_get("started_at")?;
    let ended_at: String = row.try_get("ended_at")?;
    let bike_type: String = row.try_get("bike_type")?;

    Ok(Trip {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        started_at: parse_required_ts(&started_at)?,
        ended_at: parse_required_ts(&ended_at)?,
        start_station_id: row.try_get("start_station_id")?,
        end_station_id: row.try_get("end_station_id")?,
        start_station_name: row.try_get("start_station_name")?,
        end_station_name: row.try_get("end_station_name")?,
        start_lat: row.try_get("start_lat")?,
        start_lng: row.try_get("start_lng")?,
        end_lat: row.try_get("end_lat")?,
        end_lng: row.try_get("end_lng")?,
        bike_type: BikeType::parse(&bike_type),
        distance_meters: row.try_get("distance_meters")?,
        polyline: row.try_get("polyline")?,
        has_actual_coordinates: row.try_get("has_actual_coordinates")?,
        details_fetched: row.try_get("details_fetched")?,
        details_fetched_at: parse_optional_ts(row.try_get("details_fetched_at")?)?,
        details_fetch_error: row.try_get("details_fetch_error")?,
        details_fetch_attempts: row.try_get("details_fetch_attempts")?,
    })
}

fn parse_required_ts(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Protocol(format!("invalid stored timestamp '{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_trip(id: &str) -> Trip {
        Trip {
            id: id.to_string(),
            user_id: "rider-1".to_string(),
            started_at: Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap(),
            ended_at: Utc.with_ymd_and_hms(2025, 6, 1, 8, 20, 0).unwrap(),
            start_station_id: Some("st-1".to_string()),
            end_station_id: Some("st-2".to_string()),
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
    async fn test_upsert_is_idempotent_and_preserves_sync_derived_fields() {
        let db = LocalDatabase::open_in_memory().await.unwrap();
        db.upsert_trips(&[make_trip("t1")]).await.unwrap();

        // Backfill enriches the trip
        let update = TripDetailUpdate {
            start_station_name: Some("8 Ave & W 31 St".to_string()),
            polyline: Some("_p~iF~ps|U_ulLnnqC".to_string()),
            distance_meters: Some(2500.0),
            has_actual_coordinates: true,
            ..Default::default()
        };
        db.apply_trip_details("t1", &update, Utc::now()).await.unwrap();

        // Re-ingest the same id with changed factual fields
        let mut newer = make_trip("t1");
        newer.bike_type = BikeType::Electric;
        newer.end_station_id = Some("st-9".to_string());
        db.upsert_trips(&[newer]).await.unwrap();

        let loaded = db.get_trip("t1").await.unwrap().unwrap();
        assert_eq!(db.count_trips("rider-1").await.unwrap(), 1);
        // latest factual values
        assert_eq!(loaded.bike_type, BikeType::Electric);
        assert_eq!(loaded.end_station_id.as_deref(), Some("st-9"));
        // sync-derived values untouched
        assert!(loaded.details_fetched);
        assert_eq!(loaded.polyline.as_deref(), Some("_p~iF~ps|U_ulLnnqC"));
        assert_eq!(loaded.distance_meters, Some(2500.0));
        assert!(loaded.has_actual_coordinates);
    }

    #[tokio::test]
    async fn test_missing_details_selection() {
        let db = LocalDatabase::open_in_memory().await.unwrap();

        let pending = make_trip("t1");
        let mut done = make_trip("t2");
        done.details_fetched = true;
        done.polyline = Some("abc".to_string());
        let mut degenerate = make_trip("t3");
        degenerate.polyline = Some("abc".to_string());
        degenerate.end_lat = 0.0;
        degenerate.end_lng = 0.0;

        db.upsert_trips(&[pending, done, degenerate]).await.unwrap();

        let mut ids: Vec<String> = db
            .trips_missing_details("rider-1", None)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["t1".to_string(), "t3".to_string()]);

        let capped = db.trips_missing_details("rider-1", Some(1)).await.unwrap();
        assert_eq!(capped.len(), 1);
    }

    #[tokio::test]
    async fn test_record_detail_failure_keeps_trip_eligible() {
        let db = LocalDatabase::open_in_memory().await.unwrap();
        db.upsert_trips(&[make_trip("t1")]).await.unwrap();

        db.record_detail_failure("t1", "RATE_LIMITED").await.unwrap();
        db.record_detail_failure("t1", "HTTP_503").await.unwrap();

        let loaded = db.get_trip("t1").await.unwrap().unwrap();
        assert!(!loaded.details_fetched);
        assert_eq!(loaded.details_fetch_attempts, 2);
        assert_eq!(loaded.details_fetch_error.as_deref(), Some("HTTP_503"));
        assert!(loaded.needs_details());
    }

    #[tokio::test]
    async fn test_trips_in_range() {
        let db = LocalDatabase::open_in_memory().await.unwrap();
        let mut early = make_trip("t1");
        early.started_at = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let late = make_trip("t2");
        db.upsert_trips(&[early, late]).await.unwrap();

        let found = db
            .trips_in_range(
                "rider-1",
                Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "t2");
    }

    #[test]
    fn test_detail_update_invariant() {
        let mut update = TripDetailUpdate::default();
        assert!(!update.satisfies_invariant());

        update.polyline = Some("_p~iF".to_string());
        assert!(update.satisfies_invariant());

        let coords_only = TripDetailUpdate {
            start_lat: Some(40.7),
            start_lng: Some(-74.0),
            end_lat: Some(40.8),
            end_lng: Some(-73.9),
            ..Default::default()
        };
        assert!(coords_only.satisfies_invariant());
    }
}
