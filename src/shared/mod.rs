//! Shared Module
//!
//! Types shared across the engine: domain records, the error taxonomy and
//! configuration. Everything here is serializable and platform-agnostic.

/// Domain record types
pub mod models;

/// Error taxonomy
pub mod error;

/// Engine configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use config::{ConfigError, SyncConfig, SyncConfigBuilder};
pub use error::{FetchError, FetchErrorKind, SyncError};
pub use models::{
    BikeType, ResourceKind, RewardsProfile, Subscription, SyncState, SyncStatus, Trip,
    UserProfile,
};
