//! Provider wire types
//!
//! JSON shapes of the bikeshare provider API. Responses arrive as
//! `{success, ...}` envelopes with camelCase fields; the per-trip detail
//! endpoint nests the ride geometry inside a map-image URL's `polyline`
//! query parameter and reports distance as `{value, unit}`.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::shared::models::{BikeType, RewardsProfile, Subscription, Trip, UserProfile};

/// Meters per statute mile
const METERS_PER_MILE: f64 = 1609.344;

/// Optional error body attached to a non-2xx response
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub error: Option<String>,
    #[allow(dead_code)]
    pub code: Option<String>,
}

/// `GET /api/profile` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub success: bool,
    pub user: Option<UserDto>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub member_since: Option<DateTime<Utc>>,
}

impl UserDto {
    pub fn into_profile(self) -> UserProfile {
        UserProfile {
            id: self.id,
            name: self.name,
            email: self.email,
            member_since: self.member_since,
        }
    }
}

/// `GET /api/rewards` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardsResponse {
    pub success: bool,
    pub profile: Option<RewardsDto>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardsDto {
    pub points: i64,
    #[serde(default)]
    pub lifetime_points: i64,
    pub level: Option<String>,
}

impl RewardsDto {
    pub fn into_rewards(self, user_id: &str) -> RewardsProfile {
        RewardsProfile {
            user_id: user_id.to_string(),
            points: self.points,
            lifetime_points: self.lifetime_points,
            level: self.level,
        }
    }
}

/// `GET /api/subscriptions` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionsResponse {
    pub success: bool,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionDto>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionDto {
    pub id: String,
    pub plan_name: String,
    #[serde(default)]
    pub active: bool,
    pub renews_at: Option<DateTime<Utc>>,
}

impl SubscriptionDto {
    pub fn into_subscription(self, user_id: &str) -> Subscription {
        Subscription {
            id: self.id,
            user_id: user_id.to_string(),
            plan_name: self.plan_name,
            active: self.active,
            renews_at: self.renews_at,
        }
    }
}

/// One page of `GET /api/trips`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripPageResponse {
    pub success: bool,
    #[serde(default)]
    pub trips: Vec<TripDto>,
    #[serde(default)]
    pub has_more: bool,
    pub next_cursor: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripDto {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub start_station_id: Option<String>,
    pub end_station_id: Option<String>,
    pub start_station_name: Option<String>,
    pub end_station_name: Option<String>,
    #[serde(default)]
    pub start_lat: f64,
    #[serde(default)]
    pub start_lng: f64,
    #[serde(default)]
    pub end_lat: f64,
    #[serde(default)]
    pub end_lng: f64,
    pub bike_type: Option<String>,
}

impl TripDto {
    /// Build a domain trip with pristine sync-derived fields.
    ///
    /// The upsert layer is responsible for not clobbering sync-derived
    /// columns that an earlier backfill run already populated.
    pub fn into_trip(self, user_id: &str) -> Trip {
        Trip {
            id: self.id,
            user_id: user_id.to_string(),
            started_at: self.started_at,
            ended_at: self.ended_at,
            start_station_id: self.start_station_id,
            end_station_id: self.end_station_id,
            start_station_name: self.start_station_name,
            end_station_name: self.end_station_name,
            start_lat: self.start_lat,
            start_lng: self.start_lng,
            end_lat: self.end_lat,
            end_lng: self.end_lng,
            bike_type: self.bike_type.as_deref().map_or(BikeType::Classic, BikeType::parse),
            distance_meters: None,
            polyline: None,
            has_actual_coordinates: false,
            details_fetched: false,
            details_fetched_at: None,
            details_fetch_error: None,
            details_fetch_attempts: 0,
        }
    }
}

/// `GET /api/trips/{id}` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripDetailResponse {
    pub success: bool,
    pub trip: Option<TripDetailDto>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripDetailDto {
    pub start_station_name: Option<String>,
    pub end_station_name: Option<String>,
    pub start_lat: Option<f64>,
    pub start_lng: Option<f64>,
    pub end_lat: Option<f64>,
    pub end_lng: Option<f64>,
    /// Static map URL whose `polyline` query parameter carries the encoded path
    pub map_image_url: Option<String>,
    pub distance: Option<DistanceDto>,
}

#[derive(Debug, Deserialize)]
pub struct DistanceDto {
    pub value: f64,
    pub unit: String,
}

impl DistanceDto {
    /// Convert the provider's distance to meters
    pub fn to_meters(&self) -> f64 {
        match self.unit.as_str() {
            "miles" | "mi" => self.value * METERS_PER_MILE,
            "km" => self.value * 1000.0,
            _ => self.value,
        }
    }
}

impl TripDetailDto {
    /// Extract the encoded path from the map-image URL's `polyline` parameter
    pub fn polyline(&self) -> Option<String> {
        let raw = self.map_image_url.as_deref()?;
        let url = reqwest::Url::parse(raw).ok()?;
        url.query_pairs()
            .find(|(key, _)| key == "polyline")
            .map(|(_, value)| value.into_owned())
            .filter(|p| !p.is_empty())
    }
}
