//! Common test utilities and helpers
//!
//! Shared fixtures for the integration tests: in-memory database engines
//! pointed at a mock provider, trip factories and provider JSON builders.
#![allow(dead_code)]

use std::sync::{Arc, Once};

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use velosync::local_db::LocalDatabase;
use velosync::shared::{BikeType, SyncConfig, Trip};
use velosync::sync::SyncEngine;

/// Rider id used by every fixture
pub const USER_ID: &str = "rider-1";

/// Bearer token the mock provider expects
pub const TOKEN: &str = "test-token";

/// Configuration pointed at a mock provider
pub fn test_config(base_url: &str) -> SyncConfig {
    SyncConfig::builder()
        .base_url(base_url)
        .access_token(TOKEN)
        .user_id(USER_ID)
        .request_timeout_secs(5)
        .build()
        .expect("valid test config")
}

/// Install the test log subscriber once; `RUST_LOG` controls verbosity
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Engine over a fresh in-memory database, pointed at a mock provider
pub async fn engine_with(base_url: &str) -> SyncEngine {
    init_tracing();
    let db = Arc::new(
        LocalDatabase::open_in_memory()
            .await
            .expect("in-memory database"),
    );
    SyncEngine::new(test_config(base_url), db).expect("engine")
}

/// A trip without geometry, eligible for detail backfill
pub fn make_trip(id: &str) -> Trip {
    Trip {
        id: id.to_string(),
        user_id: USER_ID.to_string(),
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

/// Provider JSON for one trip in a trip-list page
pub fn trip_json(id: &str) -> Value {
    json!({
        "id": id,
        "startedAt": "2025-06-01T08:00:00Z",
        "endedAt": "2025-06-01T08:20:00Z",
        "startStationId": "st-1",
        "endStationId": "st-2",
        "startLat": 40.73,
        "startLng": -73.99,
        "endLat": 40.74,
        "endLng": -73.98,
        "bikeType": "classic"
    })
}

/// Provider JSON for a successful profile response
pub fn profile_json() -> Value {
    json!({
        "success": true,
        "user": {
            "id": USER_ID,
            "name": "Ada Rider",
            "email": "ada@example.com"
        }
    })
}

/// Provider JSON for a successful trip-detail response
pub fn trip_detail_json(polyline: &str, miles: f64) -> Value {
    json!({
        "success": true,
        "trip": {
            "startStationName": "8 Ave & W 31 St",
            "endStationName": "Broadway & W 58 St",
            "startLat": 40.7505,
            "startLng": -73.9965,
            "endLat": 40.7668,
            "endLng": -73.9817,
            "mapImageUrl": format!(
                "https://maps.example.com/static?size=600x400&polyline={}&zoom=13",
                urlencode(polyline)
            ),
            "distance": { "value": miles, "unit": "miles" }
        }
    })
}

/// Minimal percent-encoding for polyline characters in a URL query value
fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
