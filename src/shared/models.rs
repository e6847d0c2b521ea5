//! Domain Models
//!
//! Record types held in the local store: the rider's profile, rewards
//! profile, subscriptions and trips, plus the per-resource-kind sync state
//! that drives the stale-while-revalidate coordinators.
//!
//! Trips carry two classes of fields: immutable facts reported by the trip
//! list endpoint, and mutable sync-derived fields owned by the detail
//! backfill job. Re-ingesting a trip overwrites facts but never the
//! sync-derived fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The four resource kinds tracked by the local store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Profile,
    Rewards,
    Subscriptions,
    Trips,
}

impl ResourceKind {
    /// Stable key used for the `sync_state` row
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Profile => "profile",
            Self::Rewards => "rewards",
            Self::Subscriptions => "subscriptions",
            Self::Trips => "trips",
        }
    }
}

/// Lifecycle status of a sync-state record.
///
/// `Syncing` is transient: the coordinator call that set it clears it to
/// `Idle` or `Error` before returning. A `Syncing` row surviving a crash is
/// resumable, not authoritative - freshness decisions only ever consult
/// `next_sync_after`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Error => "error",
        }
    }

    /// Parse a stored status string, defaulting unknown values to `Idle`
    pub fn parse(s: &str) -> Self {
        match s {
            "syncing" => Self::Syncing,
            "error" => Self::Error,
            _ => Self::Idle,
        }
    }
}

/// One sync-state record per resource kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// Resource kind this record tracks
    pub kind: ResourceKind,
    /// Status of the most recent sync attempt
    pub status: SyncStatus,
    /// Completion time of the last successful sync
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Freshness gate: syncs before this instant are served from cache
    pub next_sync_after: Option<DateTime<Utc>>,
    /// Message of the last failure, cleared on success
    pub error: Option<String>,
    /// Pagination resume point (trips only)
    pub cursor: Option<String>,
    /// Count of local records for this kind after the last sync
    pub total_records: Option<i64>,
}

impl SyncState {
    /// Initial state for a kind that has never synced
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            status: SyncStatus::Idle,
            last_synced_at: None,
            next_sync_after: None,
            error: None,
            cursor: None,
            total_records: None,
        }
    }

    /// Whether the freshness gate is still closed at `now`
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.next_sync_after.is_some_and(|next| now < next)
    }
}

/// Bike type of a trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BikeType {
    Classic,
    Electric,
}

impl BikeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::Electric => "electric",
        }
    }

    /// Parse a provider bike-type string, defaulting to `Classic`
    pub fn parse(s: &str) -> Self {
        match s {
            "electric" | "ebike" => Self::Electric,
            _ => Self::Classic,
        }
    }
}

/// A single recorded trip.
///
/// Invariant: `details_fetched = true` implies a non-empty `polyline` or
/// both coordinate pairs populated from a real source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    // Immutable facts from the trip list endpoint
    pub id: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub start_station_id: Option<String>,
    pub end_station_id: Option<String>,
    pub start_station_name: Option<String>,
    pub end_station_name: Option<String>,
    pub start_lat: f64,
    pub start_lng: f64,
    pub end_lat: f64,
    pub end_lng: f64,
    pub bike_type: BikeType,

    // Mutable sync-derived fields owned by the detail backfill job
    pub distance_meters: Option<f64>,
    pub polyline: Option<String>,
    pub has_actual_coordinates: bool,
    pub details_fetched: bool,
    pub details_fetched_at: Option<DateTime<Utc>>,
    pub details_fetch_error: Option<String>,
    pub details_fetch_attempts: i64,
}

impl Trip {
    /// Trip duration in whole seconds (zero when the clock went backwards)
    pub fn duration_seconds(&self) -> i64 {
        (self.ended_at - self.started_at).num_seconds().max(0)
    }

    /// Whether either endpoint sits at the (0, 0) placeholder
    pub fn has_degenerate_coordinates(&self) -> bool {
        (self.start_lat == 0.0 && self.start_lng == 0.0)
            || (self.end_lat == 0.0 && self.end_lng == 0.0)
    }

    /// Whether the detail backfill job should still pick this trip up
    pub fn needs_details(&self) -> bool {
        !self.details_fetched
            && (self
                .polyline
                .as_deref()
                .map_or(true, |p| p.is_empty())
                || self.has_degenerate_coordinates())
    }
}

/// The rider's profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub member_since: Option<DateTime<Utc>>,
}

/// Bike Angel rewards profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardsProfile {
    pub user_id: String,
    /// Current point balance
    pub points: i64,
    /// Points earned over the account lifetime
    pub lifetime_points: i64,
    /// Current angel level, when the provider reports one
    pub level: Option<String>,
}

/// A provider subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub plan_name: String,
    pub active: bool,
    pub renews_at: Option<DateTime<Utc>>,
}
