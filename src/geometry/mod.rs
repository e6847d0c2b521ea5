//! # Geometry Cache
//!
//! Turns a trip's encoded polyline into time-addressable positions for
//! playback. Decoding is memoized under a byte-budgeted strict-LRU policy so
//! scrubbing a timeline never re-decodes on every frame, and a long session
//! over a large trip history stays within a fixed memory footprint.
//!
//! The cache is an explicit long-lived instance: the composition root that
//! owns the engine creates one and hands out references. There is no global.
//!
//! Timestamps are interpolated linearly across `[started_at, ended_at]` - a
//! constant-speed assumption, not a GPS-accurate timeline.

pub mod polyline;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::shared::models::Trip;
use polyline::{decode_polyline, haversine_meters};

/// Default byte budget: 10 MB
pub const DEFAULT_CACHE_BUDGET_BYTES: usize = 10 * 1024 * 1024;

/// Fixed per-entry overhead added to the sized arrays
const ENTRY_FIXED_OVERHEAD: usize = 64;

/// A trip's decoded geometry, derived from its polyline and start/end times.
///
/// Never persisted; lives only in the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTrip {
    pub trip_id: String,
    /// `(lat, lng)` pairs in ride order
    pub coordinates: Vec<(f64, f64)>,
    /// One timestamp per coordinate, epoch milliseconds, evenly spaced
    pub timestamps: Vec<i64>,
    /// Great-circle distance from the start through each coordinate, meters
    pub cumulative_distances: Vec<f64>,
    /// Total route distance in meters
    pub total_distance: f64,
    /// Average speed over the trip, meters per second
    pub avg_speed: f64,
}

impl DecodedTrip {
    /// Approximate in-memory footprint used for budget accounting
    fn approx_bytes(&self) -> usize {
        self.coordinates.len() * 16
            + self.timestamps.len() * 8
            + self.cumulative_distances.len() * 8
            + ENTRY_FIXED_OVERHEAD
    }
}

/// An interpolated position along a decoded trip
#[derive(Debug, Clone, PartialEq)]
pub struct TripPosition {
    /// `(lat, lng)` at the queried time
    pub position: (f64, f64),
    /// Fraction of the route completed, `0.0..=1.0`
    pub progress: f64,
    /// Distance covered so far, meters
    pub distance: f64,
    /// Instantaneous speed on the bracketing segment, meters per second
    pub speed_mps: f64,
}

/// Cache diagnostics
#[derive(Debug, Clone)]
pub struct GeometryCacheStats {
    pub entries: usize,
    pub approx_bytes: usize,
    pub budget_bytes: usize,
}

struct CacheEntry {
    decoded: Arc<DecodedTrip>,
    /// Hash of the source polyline; a changed polyline supersedes the entry
    fingerprint: u64,
    bytes: usize,
}

struct CacheInner {
    entries: LruCache<String, CacheEntry>,
    bytes: usize,
}

/// Byte-budgeted LRU cache of decoded trip geometry
pub struct GeometryCache {
    inner: Mutex<CacheInner>,
    budget_bytes: usize,
}

impl Default for GeometryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_BUDGET_BYTES)
    }
}

impl GeometryCache {
    /// Create a cache with the given byte budget
    pub fn new(budget_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: LruCache::unbounded(),
                bytes: 0,
            }),
            budget_bytes,
        }
    }

    /// Decode a trip's geometry, memoized.
    ///
    /// A hit refreshes the entry's recency. A changed polyline under the same
    /// trip id is a miss that replaces the stale entry. Returns `None` when
    /// the trip has no usable polyline or it fails to decode.
    pub fn decode(&self, trip: &Trip) -> Option<Arc<DecodedTrip>> {
        let encoded = trip.polyline.as_deref().filter(|p| !p.is_empty())?;
        let fingerprint = fingerprint(encoded);

        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.get(&trip.id) {
            if entry.fingerprint == fingerprint {
                tracing::debug!(trip_id = %trip.id, "geometry cache hit");
                return Some(Arc::clone(&entry.decoded));
            }
        }

        let decoded = Arc::new(decode_trip(trip, encoded)?);
        let bytes = decoded.approx_bytes();

        if let Some(old) = inner.entries.pop(&trip.id) {
            inner.bytes -= old.bytes;
        }
        inner.entries.put(
            trip.id.clone(),
            CacheEntry {
                decoded: Arc::clone(&decoded),
                fingerprint,
                bytes,
            },
        );
        inner.bytes += bytes;

        // Evict least-recently-used entries until we fit the budget. The
        // entry just inserted is the most recent, so it survives unless it
        // alone exceeds the budget.
        while inner.bytes > self.budget_bytes && inner.entries.len() > 1 {
            if let Some((evicted_id, evicted)) = inner.entries.pop_lru() {
                inner.bytes -= evicted.bytes;
                tracing::debug!(trip_id = %evicted_id, bytes = evicted.bytes, "geometry cache eviction");
            }
        }

        Some(decoded)
    }

    /// Cache diagnostics
    pub fn stats(&self) -> GeometryCacheStats {
        let inner = self.inner.lock();
        GeometryCacheStats {
            entries: inner.entries.len(),
            approx_bytes: inner.bytes,
            budget_bytes: self.budget_bytes,
        }
    }
}

/// Where was the rider at `timestamp_ms`?
///
/// The query time is clamped into the decoded trip's time range. At or past
/// the end, returns the final point with `progress = 1` and zero speed.
pub fn position_at(decoded: &DecodedTrip, timestamp_ms: i64) -> Option<TripPosition> {
    let timestamps = &decoded.timestamps;
    if timestamps.is_empty() {
        return None;
    }

    let first = timestamps[0];
    let last = timestamps[timestamps.len() - 1];
    let t = timestamp_ms.clamp(first, last);

    if t >= last {
        let idx = decoded.coordinates.len() - 1;
        return Some(TripPosition {
            position: decoded.coordinates[idx],
            progress: 1.0,
            distance: decoded.total_distance,
            speed_mps: 0.0,
        });
    }

    // last index whose timestamp is <= t
    let idx = timestamps.partition_point(|&ts| ts <= t) - 1;
    let next = idx + 1;

    let dt = (timestamps[next] - timestamps[idx]) as f64;
    let frac = if dt > 0.0 {
        (t - timestamps[idx]) as f64 / dt
    } else {
        0.0
    };

    let (lat0, lng0) = decoded.coordinates[idx];
    let (lat1, lng1) = decoded.coordinates[next];
    let position = (lat0 + (lat1 - lat0) * frac, lng0 + (lng1 - lng0) * frac);

    let d0 = decoded.cumulative_distances[idx];
    let d1 = decoded.cumulative_distances[next];
    let distance = d0 + (d1 - d0) * frac;

    let speed_mps = if dt > 0.0 { (d1 - d0) / (dt / 1000.0) } else { 0.0 };

    let progress = if decoded.total_distance > 0.0 {
        distance / decoded.total_distance
    } else {
        0.0
    };

    Some(TripPosition {
        position,
        progress,
        distance,
        speed_mps,
    })
}

fn decode_trip(trip: &Trip, encoded: &str) -> Option<DecodedTrip> {
    let coordinates = decode_polyline(encoded)?;
    if coordinates.is_empty() {
        return None;
    }

    let mut cumulative_distances = Vec::with_capacity(coordinates.len());
    let mut total = 0.0;
    cumulative_distances.push(0.0);
    for window in coordinates.windows(2) {
        total += haversine_meters(window[0], window[1]);
        cumulative_distances.push(total);
    }

    let start_ms = trip.started_at.timestamp_millis();
    let end_ms = trip.ended_at.timestamp_millis();
    let n = coordinates.len();
    let timestamps: Vec<i64> = if n == 1 {
        vec![start_ms]
    } else {
        let span = (end_ms - start_ms).max(0) as f64;
        (0..n)
            .map(|i| start_ms + (span * i as f64 / (n - 1) as f64) as i64)
            .collect()
    };

    let duration_secs = trip.duration_seconds() as f64;
    let avg_speed = if duration_secs > 0.0 { total / duration_secs } else { 0.0 };

    Some(DecodedTrip {
        trip_id: trip.id.clone(),
        coordinates,
        timestamps,
        cumulative_distances,
        total_distance: total,
        avg_speed,
    })
}

fn fingerprint(polyline: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    polyline.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::BikeType;
    use chrono::{TimeZone, Utc};

    fn trip_with_polyline(id: &str, polyline: &str) -> Trip {
        Trip {
            id: id.to_string(),
            user_id: "rider-1".to_string(),
            started_at: Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap(),
            ended_at: Utc.with_ymd_and_hms(2025, 6, 1, 8, 20, 0).unwrap(),
            start_station_id: None,
            end_station_id: None,
            start_station_name: None,
            end_station_name: None,
            start_lat: 38.5,
            start_lng: -120.2,
            end_lat: 43.252,
            end_lng: -126.453,
            bike_type: BikeType::Classic,
            distance_meters: None,
            polyline: Some(polyline.to_string()),
            has_actual_coordinates: true,
            details_fetched: true,
            details_fetched_at: None,
            details_fetch_error: None,
            details_fetch_attempts: 0,
        }
    }

    const REFERENCE: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";

    #[test]
    fn test_decode_produces_monotonic_timeline() {
        let cache = GeometryCache::default();
        let decoded = cache.decode(&trip_with_polyline("t1", REFERENCE)).unwrap();

        assert_eq!(decoded.coordinates.len(), 3);
        assert_eq!(decoded.timestamps.len(), 3);
        assert_eq!(decoded.cumulative_distances.len(), 3);
        assert!(decoded.timestamps.windows(2).all(|w| w[0] < w[1]));
        assert!(decoded
            .cumulative_distances
            .windows(2)
            .all(|w| w[0] <= w[1]));
        assert_eq!(
            decoded.timestamps[0],
            Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap().timestamp_millis()
        );
        assert_eq!(
            *decoded.timestamps.last().unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 1, 8, 20, 0).unwrap().timestamp_millis()
        );
        assert!(decoded.total_distance > 0.0);
        assert!((decoded.avg_speed - decoded.total_distance / 1200.0).abs() < 1e-9);
    }

    #[test]
    fn test_decode_requires_polyline() {
        let cache = GeometryCache::default();
        let mut trip = trip_with_polyline("t1", REFERENCE);
        trip.polyline = None;
        assert!(cache.decode(&trip).is_none());
        trip.polyline = Some(String::new());
        assert!(cache.decode(&trip).is_none());
    }

    #[test]
    fn test_cache_hit_returns_same_decoded_value() {
        let cache = GeometryCache::default();
        let trip = trip_with_polyline("t1", REFERENCE);
        let first = cache.decode(&trip).unwrap();
        let second = cache.decode(&trip).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats().entries, 1);
    }

    #[test]
    fn test_changed_polyline_supersedes_entry() {
        let cache = GeometryCache::default();
        let trip = trip_with_polyline("t1", REFERENCE);
        let first = cache.decode(&trip).unwrap();

        let shorter = trip_with_polyline("t1", "_p~iF~ps|U_ulLnnqC");
        let second = cache.decode(&shorter).unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.coordinates.len(), 2);
        // still one entry for the id, byte accounting replaced not added
        assert_eq!(cache.stats().entries, 1);
    }

    #[test]
    fn test_lru_eviction_under_byte_budget() {
        // Each reference entry is 3 * 32 + 64 = 160 bytes; budget fits two
        let cache = GeometryCache::new(320);
        cache.decode(&trip_with_polyline("t1", REFERENCE)).unwrap();
        cache.decode(&trip_with_polyline("t2", REFERENCE)).unwrap();
        assert_eq!(cache.stats().entries, 2);

        // t1 is now least recently used; inserting t3 evicts it
        cache.decode(&trip_with_polyline("t3", REFERENCE)).unwrap();
        let stats = cache.stats();
        assert_eq!(stats.entries, 2);
        assert!(stats.approx_bytes <= 320);

        // Accessing t2 protects it from the next eviction
        cache.decode(&trip_with_polyline("t2", REFERENCE)).unwrap();
        cache.decode(&trip_with_polyline("t4", REFERENCE)).unwrap();
        let decoded_ids: Vec<String> = {
            // t3 must be the one evicted
            let t2 = cache.decode(&trip_with_polyline("t2", REFERENCE)).unwrap();
            let t4 = cache.decode(&trip_with_polyline("t4", REFERENCE)).unwrap();
            vec![t2.trip_id.clone(), t4.trip_id.clone()]
        };
        assert_eq!(decoded_ids, vec!["t2".to_string(), "t4".to_string()]);
        assert_eq!(cache.stats().entries, 2);
    }

    #[test]
    fn test_position_at_clamps_before_start() {
        let cache = GeometryCache::default();
        let trip = trip_with_polyline("t1", REFERENCE);
        let decoded = cache.decode(&trip).unwrap();

        let start = decoded.timestamps[0];
        let before = position_at(&decoded, start - 60_000).unwrap();
        let at_start = position_at(&decoded, start).unwrap();
        assert_eq!(before, at_start);
        assert_eq!(at_start.distance, 0.0);
        assert_eq!(at_start.progress, 0.0);
    }

    #[test]
    fn test_position_at_end_and_past_end() {
        let cache = GeometryCache::default();
        let trip = trip_with_polyline("t1", REFERENCE);
        let decoded = cache.decode(&trip).unwrap();

        let last = *decoded.timestamps.last().unwrap();
        for ts in [last, last + 3_600_000] {
            let pos = position_at(&decoded, ts).unwrap();
            assert_eq!(pos.progress, 1.0);
            assert_eq!(pos.speed_mps, 0.0);
            assert_eq!(pos.position, *decoded.coordinates.last().unwrap());
            assert_eq!(pos.distance, decoded.total_distance);
        }
    }

    #[test]
    fn test_position_at_midpoint_interpolates() {
        let cache = GeometryCache::default();
        // Two-point polyline: midpoint in time is midpoint in space
        let trip = trip_with_polyline("t1", "_p~iF~ps|U_ulLnnqC");
        let decoded = cache.decode(&trip).unwrap();

        let mid_ts = (decoded.timestamps[0] + decoded.timestamps[1]) / 2;
        let pos = position_at(&decoded, mid_ts).unwrap();

        let expected_lat = (decoded.coordinates[0].0 + decoded.coordinates[1].0) / 2.0;
        let expected_lng = (decoded.coordinates[0].1 + decoded.coordinates[1].1) / 2.0;
        assert!((pos.position.0 - expected_lat).abs() < 1e-6);
        assert!((pos.position.1 - expected_lng).abs() < 1e-6);
        assert!((pos.progress - 0.5).abs() < 1e-3);
        assert!(pos.speed_mps > 0.0);
    }
}
