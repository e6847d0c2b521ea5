//! Sync engine configuration
//!
//! Provides configuration types for the engine: provider endpoint and
//! credentials, per-kind freshness TTLs, backfill pacing and the geometry
//! cache budget. All fields have defaults so a TOML file only needs to name
//! what it overrides.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::models::ResourceKind;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Provider API base URL, e.g. `https://api.example-bikeshare.com`
    pub base_url: String,
    /// Bearer token for provider API calls
    pub access_token: String,
    /// Rider whose data this store mirrors
    pub user_id: String,
    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,

    /// Profile freshness window (changes rarely)
    pub profile_ttl_secs: i64,
    /// Subscriptions freshness window (changes rarely)
    pub subscriptions_ttl_secs: i64,
    /// Rewards freshness window (points move often, keep it short)
    pub rewards_ttl_secs: i64,
    /// Retry window written after a failed resource sync
    pub error_retry_secs: i64,

    /// Hard bound on pages per trip-sync call
    pub max_trip_pages: u32,
    /// Base inter-batch delay for the detail backfill job, milliseconds
    pub backfill_rate_limit_ms: u64,
    /// Trips fetched concurrently per backfill batch
    pub backfill_batch_size: usize,
    /// Ceiling for the adaptive backoff, milliseconds
    pub backfill_max_backoff_ms: u64,
    /// Consecutive rate-limited batches before the job circuit-breaks
    pub backfill_circuit_break_after: u32,

    /// Geometry cache byte budget
    pub cache_budget_bytes: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            access_token: String::new(),
            user_id: String::new(),
            request_timeout_secs: 30,
            profile_ttl_secs: 3600,
            subscriptions_ttl_secs: 3600,
            rewards_ttl_secs: 300,
            error_retry_secs: 60,
            max_trip_pages: 100,
            backfill_rate_limit_ms: 500,
            backfill_batch_size: 1,
            backfill_max_backoff_ms: 10_000,
            backfill_circuit_break_after: 3,
            cache_budget_bytes: 10 * 1024 * 1024,
        }
    }
}

impl SyncConfig {
    /// Create a new SyncConfigBuilder
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Parse a configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.is_empty() {
            return Err(ConfigError::MissingValue("base_url"));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidUrl(self.base_url.clone()));
        }
        if self.user_id.is_empty() {
            return Err(ConfigError::MissingValue("user_id"));
        }
        if self.max_trip_pages == 0 {
            return Err(ConfigError::MissingValue("max_trip_pages"));
        }
        Ok(())
    }

    /// Freshness TTL for a coordinator-owned resource kind, in seconds.
    ///
    /// Trips are cursor-driven and have no TTL gate; asking for one is a
    /// caller error surfaced by the coordinator, so this returns zero.
    pub fn ttl_secs(&self, kind: ResourceKind) -> i64 {
        match kind {
            ResourceKind::Profile => self.profile_ttl_secs,
            ResourceKind::Subscriptions => self.subscriptions_ttl_secs,
            ResourceKind::Rewards => self.rewards_ttl_secs,
            ResourceKind::Trips => 0,
        }
    }
}

/// Builder for SyncConfig
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    /// Set the provider base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    /// Set the bearer token
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.config.access_token = token.into();
        self
    }

    /// Set the rider id
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.config.user_id = user_id.into();
        self
    }

    /// Set the per-request timeout in seconds
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    /// Override a resource TTL
    pub fn ttl_secs(mut self, kind: ResourceKind, secs: i64) -> Self {
        match kind {
            ResourceKind::Profile => self.config.profile_ttl_secs = secs,
            ResourceKind::Subscriptions => self.config.subscriptions_ttl_secs = secs,
            ResourceKind::Rewards => self.config.rewards_ttl_secs = secs,
            ResourceKind::Trips => {}
        }
        self
    }

    /// Set the geometry cache byte budget
    pub fn cache_budget_bytes(mut self, bytes: usize) -> Self {
        self.config.cache_budget_bytes = bytes;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<SyncConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("parse error: {0}")]
    Parse(String),
}
