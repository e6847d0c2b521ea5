//! # Resource Sync Coordinator
//!
//! Stale-while-revalidate sync for the single-record resource kinds:
//! profile, rewards and subscriptions. Each kind owns a TTL policy and a
//! sync-state record; the freshness gate means a call inside the TTL window
//! performs no network traffic at all.
//!
//! The record write and its sync-state write land in one transaction, so a
//! reader never observes a fresh `next_sync_after` pointing at stale or
//! absent data.

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use crate::local_db::{profile as profile_db, sync_state};
use crate::shared::error::Result;
use crate::shared::models::{ResourceKind, SyncState, SyncStatus};
use crate::sync::{cancellable, CancelToken, SyncEngine};

impl SyncEngine {
    /// Sync one coordinator-owned resource kind.
    ///
    /// Returns without a network call when the kind is still fresh and
    /// `force` is not set. On failure the sync state records the error with
    /// a short retry window and the error propagates to the caller.
    pub async fn sync_resource(
        &self,
        kind: ResourceKind,
        force: bool,
        cancel: &CancelToken,
    ) -> Result<()> {
        if kind == ResourceKind::Trips {
            return Err(crate::shared::error::SyncError::UnsupportedResource(
                kind.as_str(),
            ));
        }

        let now = Utc::now();
        let prior = self.db().get_sync_state(kind).await?;

        if !force {
            if let Some(state) = &prior {
                if state.is_fresh(now) {
                    debug!(kind = kind.as_str(), "resource still fresh, serving cached");
                    return Ok(());
                }
            }
        }

        // Soft mutex: mark syncing, preserving the prior success timestamp.
        // A stale 'syncing' row from a crashed run is overwritten here, not
        // treated as a lock.
        let mut state = prior.unwrap_or_else(|| SyncState::new(kind));
        state.status = SyncStatus::Syncing;
        self.db().put_sync_state(&state).await?;

        match self.fetch_and_store(kind, cancel).await {
            Ok(total_records) => {
                info!(kind = kind.as_str(), total_records, "resource synced");
                Ok(())
            }
            Err(err) => {
                warn!(kind = kind.as_str(), error = %err, "resource sync failed");
                state.status = SyncStatus::Error;
                state.error = Some(err.to_string());
                state.next_sync_after =
                    Some(Utc::now() + Duration::seconds(self.config().error_retry_secs));
                self.db().put_sync_state(&state).await?;
                Err(err)
            }
        }
    }

    /// Fetch one kind and commit record + idle sync state atomically.
    ///
    /// The fetch completes before the transaction opens; the transaction
    /// never spans a suspension point other than its own writes.
    async fn fetch_and_store(&self, kind: ResourceKind, cancel: &CancelToken) -> Result<i64> {
        let fetched = match kind {
            ResourceKind::Profile => {
                Fetched::Profile(cancellable(cancel, self.client().fetch_profile()).await?)
            }
            ResourceKind::Rewards => {
                Fetched::Rewards(cancellable(cancel, self.client().fetch_rewards()).await?)
            }
            ResourceKind::Subscriptions => Fetched::Subscriptions(
                cancellable(cancel, self.client().fetch_subscriptions()).await?,
            ),
            ResourceKind::Trips => unreachable!("trips are synced by sync_trips"),
        };

        let mut tx = self.db().pool().begin().await?;
        let total_records = match &fetched {
            Fetched::Profile(profile) => {
                profile_db::write_profile(&mut tx, profile).await?;
                1
            }
            Fetched::Rewards(rewards) => {
                profile_db::write_rewards(&mut tx, rewards).await?;
                1
            }
            Fetched::Subscriptions(subscriptions) => {
                profile_db::replace_subscriptions(
                    &mut tx,
                    &self.config().user_id,
                    subscriptions,
                )
                .await?;
                subscriptions.len() as i64
            }
        };

        let now = Utc::now();
        let idle = SyncState {
            kind,
            status: SyncStatus::Idle,
            last_synced_at: Some(now),
            next_sync_after: Some(now + Duration::seconds(self.config().ttl_secs(kind))),
            error: None,
            cursor: None,
            total_records: Some(total_records),
        };
        sync_state::write_sync_state(&mut *tx, &idle).await?;
        tx.commit().await?;

        Ok(total_records)
    }
}

/// Decoded payload of one resource fetch
enum Fetched {
    Profile(crate::shared::models::UserProfile),
    Rewards(crate::shared::models::RewardsProfile),
    Subscriptions(Vec<crate::shared::models::Subscription>),
}
