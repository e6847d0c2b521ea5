//! # Incremental Trip Sync
//!
//! Cursor-paginated sync of the rider's full trip history. Each page is
//! upserted and its advanced cursor committed in the same transaction before
//! the next page is requested, so a crashed or cancelled run resumes exactly
//! where it stopped. A hard page bound keeps a misbehaving provider from
//! driving unbounded work; hitting it surfaces `has_more = true` so the
//! caller can resume.

use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::local_db::{sync_state, trips as trips_db};
use crate::shared::error::Result;
use crate::shared::models::{ResourceKind, SyncState, SyncStatus};
use crate::sync::{cancellable, CancelToken, SyncEngine, TripProgressFn, TripSyncOutcome, TripSyncProgress};

impl SyncEngine {
    /// Pull the rider's trip history, resuming from any stored cursor.
    ///
    /// The progress observer fires once per ingested page and cannot affect
    /// control flow.
    pub async fn sync_trips(
        &self,
        progress: Option<TripProgressFn<'_>>,
        cancel: &CancelToken,
    ) -> Result<TripSyncOutcome> {
        let kind = ResourceKind::Trips;
        let prior = self.db().get_sync_state(kind).await?;
        let mut cursor = prior.as_ref().and_then(|s| s.cursor.clone());

        let mut state = prior.unwrap_or_else(|| SyncState::new(kind));
        state.status = SyncStatus::Syncing;
        state.error = None;
        self.db().put_sync_state(&state).await?;

        let mut total_synced: u64 = 0;
        let mut page: u32 = 0;
        let mut has_more = true;

        while has_more && page < self.config().max_trip_pages {
            let fetched = cancellable(cancel, self.client().fetch_trip_page(cursor.as_deref()))
                .await;
            let trip_page = match fetched {
                Ok(p) => p,
                Err(err) => {
                    // Pagination errors are never swallowed: record and
                    // propagate, keeping the cursor for resumption.
                    warn!(page = page + 1, error = %err, "trip page fetch failed");
                    state.status = SyncStatus::Error;
                    state.error = Some(err.to_string());
                    state.cursor = cursor;
                    state.next_sync_after =
                        Some(Utc::now() + Duration::seconds(self.config().error_retry_secs));
                    self.db().put_sync_state(&state).await?;
                    return Err(err);
                }
            };

            page += 1;
            total_synced += trip_page.trips.len() as u64;
            has_more = trip_page.has_more;
            cursor = trip_page.next_cursor;

            // Page upsert and cursor advance in one transaction: the next
            // page is never requested before this one is durable.
            let mut tx = self.db().pool().begin().await?;
            trips_db::upsert_trips(&mut tx, &trip_page.trips).await?;
            state.cursor = cursor.clone();
            sync_state::write_sync_state(&mut *tx, &state).await?;
            tx.commit().await?;

            info!(page, trips = trip_page.trips.len(), has_more, "trip page ingested");
            if let Some(observer) = progress {
                observer(TripSyncProgress {
                    page,
                    total_synced,
                });
            }
        }

        if has_more {
            warn!(
                pages = page,
                "trip sync page bound reached with more history pending"
            );
        }

        let now = Utc::now();
        let total_records = self.db().count_trips(&self.config().user_id).await?;
        let finished = SyncState {
            kind,
            status: SyncStatus::Idle,
            last_synced_at: Some(now),
            next_sync_after: None,
            error: None,
            cursor: if has_more { cursor } else { None },
            total_records: Some(total_records),
        };
        self.db().put_sync_state(&finished).await?;

        info!(total_synced, total_records, has_more, "trip sync finished");
        Ok(TripSyncOutcome {
            total_synced,
            has_more,
        })
    }
}
