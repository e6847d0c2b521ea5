//! Encoded polyline decoding and great-circle distance.
//!
//! Implements the standard 1e-5 precision encoded-polyline algorithm used by
//! the provider's map URLs: each coordinate delta is zigzag-encoded, split
//! into 5-bit chunks and offset by 63.

/// Mean Earth radius in meters
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Decode an encoded polyline into `(lat, lng)` pairs.
///
/// Returns `None` when the string is malformed (truncated varint or
/// out-of-range coordinate).
pub fn decode_polyline(encoded: &str) -> Option<Vec<(f64, f64)>> {
    let bytes = encoded.as_bytes();
    let mut coordinates = Vec::new();
    let mut index = 0;
    let mut lat = 0i64;
    let mut lng = 0i64;

    while index < bytes.len() {
        let (dlat, next) = decode_value(bytes, index)?;
        let (dlng, after) = decode_value(bytes, next)?;
        index = after;

        lat += dlat;
        lng += dlng;

        let lat_deg = lat as f64 * 1e-5;
        let lng_deg = lng as f64 * 1e-5;
        if !(-90.0..=90.0).contains(&lat_deg) || !(-180.0..=180.0).contains(&lng_deg) {
            return None;
        }
        coordinates.push((lat_deg, lng_deg));
    }

    Some(coordinates)
}

/// Decode one zigzag varint starting at `index`, returning the value and the
/// index just past it
fn decode_value(bytes: &[u8], mut index: usize) -> Option<(i64, usize)> {
    let mut result = 0i64;
    let mut shift = 0u32;

    loop {
        let byte = (*bytes.get(index)? as i64) - 63;
        if !(0..=63).contains(&byte) {
            return None;
        }
        index += 1;
        result |= (byte & 0x1f) << shift;
        shift += 5;
        if byte < 0x20 {
            break;
        }
        // 12 chunks cover any in-range coordinate delta
        if shift > 60 {
            return None;
        }
    }

    let value = if result & 1 != 0 {
        !(result >> 1)
    } else {
        result >> 1
    };
    Some((value, index))
}

/// Great-circle distance between two `(lat, lng)` points, in meters
pub fn haversine_meters(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lng1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lng2) = (b.0.to_radians(), b.1.to_radians());

    let dlat = lat2 - lat1;
    let dlng = lng2 - lng1;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}
