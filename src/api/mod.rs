//! Provider API Client
//!
//! Thin typed wrapper over the bikeshare provider's HTTP endpoints. All
//! failures leave this module already classified as a [`FetchError`]; callers
//! decide policy (retry windows, circuit breaking) from the typed kind alone.

pub mod types;

use std::time::Duration;

use crate::shared::config::SyncConfig;
use crate::shared::error::{FetchError, FetchErrorKind};
use crate::shared::models::{RewardsProfile, Subscription, Trip, UserProfile};

use types::{
    ErrorBody, ProfileResponse, RewardsResponse, SubscriptionsResponse, TripDetailDto,
    TripDetailResponse, TripPageResponse,
};

/// Result type alias for fetch operations
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// One page of the rider's trip history, mapped into domain trips
#[derive(Debug)]
pub struct TripPage {
    pub trips: Vec<Trip>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

/// HTTP client for the provider API
#[derive(Debug, Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
    user_id: String,
}

impl ProviderClient {
    /// Build a client from the engine configuration
    pub fn new(config: &SyncConfig) -> FetchResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| {
                FetchError::new(FetchErrorKind::Unknown, format!("client build failed: {}", e))
            })?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            user_id: config.user_id.clone(),
        })
    }

    /// Fetch the rider's profile
    pub async fn fetch_profile(&self) -> FetchResult<UserProfile> {
        let response: ProfileResponse = self.get_json("/api/profile", &[]).await?;
        if !response.success {
            return Err(envelope_error(response.error));
        }
        response
            .user
            .map(|u| u.into_profile())
            .ok_or_else(|| FetchError::malformed("profile response missing user"))
    }

    /// Fetch the rider's Bike Angel rewards profile
    pub async fn fetch_rewards(&self) -> FetchResult<RewardsProfile> {
        let response: RewardsResponse = self.get_json("/api/rewards", &[]).await?;
        if !response.success {
            return Err(envelope_error(response.error));
        }
        response
            .profile
            .map(|p| p.into_rewards(&self.user_id))
            .ok_or_else(|| FetchError::malformed("rewards response missing profile"))
    }

    /// Fetch the rider's subscriptions
    pub async fn fetch_subscriptions(&self) -> FetchResult<Vec<Subscription>> {
        let response: SubscriptionsResponse = self.get_json("/api/subscriptions", &[]).await?;
        if !response.success {
            return Err(envelope_error(response.error));
        }
        Ok(response
            .subscriptions
            .into_iter()
            .map(|s| s.into_subscription(&self.user_id))
            .collect())
    }

    /// Fetch one page of trip history, resuming from `cursor` when given
    pub async fn fetch_trip_page(&self, cursor: Option<&str>) -> FetchResult<TripPage> {
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor));
        }
        let response: TripPageResponse = self.get_json("/api/trips", &query).await?;
        if !response.success {
            return Err(envelope_error(response.error));
        }
        Ok(TripPage {
            trips: response
                .trips
                .into_iter()
                .map(|t| t.into_trip(&self.user_id))
                .collect(),
            has_more: response.has_more,
            next_cursor: response.next_cursor,
        })
    }

    /// Fetch the detail record (geometry, stations, distance) for one trip
    pub async fn fetch_trip_detail(&self, trip_id: &str) -> FetchResult<TripDetailDto> {
        let path = format!("/api/trips/{}", trip_id);
        let response: TripDetailResponse = self.get_json(&path, &[]).await?;
        if !response.success {
            return Err(envelope_error(response.error));
        }
        response
            .trip
            .ok_or_else(|| FetchError::malformed("trip detail response missing trip"))
    }

    /// Perform an authenticated GET and decode the JSON body.
    ///
    /// Non-2xx statuses are classified from the status code alone; the
    /// response body only contributes the diagnostic message.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> FetchResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await
            .map_err(FetchError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .unwrap_or_else(|| {
                    if body.is_empty() {
                        status.to_string()
                    } else {
                        body
                    }
                });
            return Err(FetchError::new(
                FetchErrorKind::from_status(status.as_u16()),
                message,
            ));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| FetchError::malformed(format!("invalid response body: {}", e)))
    }
}

/// Error for a 200 envelope that reports `success = false`
fn envelope_error(message: Option<String>) -> FetchError {
    FetchError::new(
        FetchErrorKind::Unknown,
        message.unwrap_or_else(|| "provider reported failure".to_string()),
    )
}
