//! # Detail Backfill Job
//!
//! Many trips arrive from the incremental sync without precise geometry;
//! this job backfills it lazily. Trips are processed in small concurrent
//! batches with a pacing sleep between batches. Rate limiting is detected
//! from the typed fetch error, doubles the backoff (capped) and, after three
//! consecutive rate-limited batches, circuit-breaks the run: a deliberate
//! stop with partial counts, not an error. Remaining trips stay pending for
//! a later run.

use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::local_db::trips::TripDetailUpdate;
use crate::shared::error::{FetchError, Result, SyncError};
use crate::shared::models::Trip;
use crate::sync::{
    BackfillOptions, BackfillOutcome, BackfillProgress, BackfillProgressFn, CancelToken,
    SyncEngine,
};

impl SyncEngine {
    /// Backfill geometry and station details for trips still missing them.
    ///
    /// Idempotent: only trips whose details were never fetched are selected;
    /// earlier successes are untouched. The progress observer fires once per
    /// batch and cannot affect control flow.
    pub async fn sync_trip_details(
        &self,
        options: BackfillOptions,
        progress: Option<BackfillProgressFn<'_>>,
        cancel: &CancelToken,
    ) -> Result<BackfillOutcome> {
        let pending = self
            .db()
            .trips_missing_details(&self.config().user_id, options.max_trips)
            .await?;
        let total = pending.len();
        if total == 0 {
            debug!("no trips need detail backfill");
            return Ok(BackfillOutcome {
                fetched: 0,
                failed: 0,
                skipped: 0,
            });
        }

        let batch_size = options.batch_size.max(1);
        let base_backoff = Duration::from_millis(options.rate_limit_ms);
        let max_backoff = Duration::from_millis(self.config().backfill_max_backoff_ms);
        let circuit_break_after = self.config().backfill_circuit_break_after;

        let mut backoff = base_backoff;
        let mut consecutive_rate_limits: u32 = 0;
        let mut fetched = 0usize;
        let mut failed = 0usize;
        let mut attempted = 0usize;

        info!(total, batch_size, "detail backfill starting");

        let batches: Vec<&[Trip]> = pending.chunks(batch_size).collect();
        let batch_count = batches.len();

        for (batch_index, batch) in batches.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            // Concurrent within the batch; each result is already recorded
            // against its trip when the join completes.
            let results = join_all(batch.iter().map(|trip| self.backfill_one(trip))).await;

            let mut rate_limited_batch = false;
            for result in results {
                match result? {
                    Ok(()) => fetched += 1,
                    Err(err) => {
                        failed += 1;
                        if err.kind.is_rate_limited() {
                            rate_limited_batch = true;
                        }
                    }
                }
            }
            attempted += batch.len();

            if let Some(observer) = progress {
                observer(BackfillProgress {
                    processed: attempted,
                    total,
                    fetched,
                    failed,
                });
            }

            if rate_limited_batch {
                consecutive_rate_limits += 1;
                if consecutive_rate_limits >= circuit_break_after {
                    info!(
                        consecutive_rate_limits,
                        attempted, "detail backfill circuit-broke on sustained rate limiting"
                    );
                    break;
                }
                backoff = (backoff * 2).min(max_backoff);
                warn!(backoff_ms = backoff.as_millis() as u64, "batch rate-limited, backing off");
            } else {
                consecutive_rate_limits = 0;
                backoff = base_backoff;
            }

            // Pace the next batch; never sleep after the last one.
            if batch_index + 1 < batch_count {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                    _ = sleep(backoff) => {}
                }
            }
        }

        let outcome = BackfillOutcome {
            fetched,
            failed,
            skipped: total - attempted,
        };
        info!(?outcome, "detail backfill finished");
        Ok(outcome)
    }

    /// Fetch and apply details for one trip.
    ///
    /// The outer `Result` is a local-store failure, fatal to the job. The
    /// inner one is the per-trip fetch outcome, already recorded on the
    /// trip row either way.
    async fn backfill_one(&self, trip: &Trip) -> Result<std::result::Result<(), FetchError>> {
        let detail = match self.client().fetch_trip_detail(&trip.id).await {
            Ok(detail) => detail,
            Err(err) => {
                debug!(trip_id = %trip.id, code = %err.kind.code(), "trip detail fetch failed");
                self.db()
                    .record_detail_failure(&trip.id, &err.kind.code())
                    .await?;
                return Ok(Err(err));
            }
        };

        let update = TripDetailUpdate {
            start_station_name: detail.start_station_name.clone(),
            end_station_name: detail.end_station_name.clone(),
            start_lat: detail.start_lat,
            start_lng: detail.start_lng,
            end_lat: detail.end_lat,
            end_lng: detail.end_lng,
            polyline: detail.polyline(),
            distance_meters: detail.distance.as_ref().map(|d| d.to_meters()),
            has_actual_coordinates: detail.start_lat.is_some()
                && detail.start_lng.is_some()
                && detail.end_lat.is_some()
                && detail.end_lng.is_some(),
        };

        // A detail payload carrying neither a path nor real coordinates
        // cannot mark the trip fetched without breaking the trip invariant.
        if !update.satisfies_invariant() {
            let err = FetchError::malformed("trip detail carries no geometry");
            self.db()
                .record_detail_failure(&trip.id, &err.kind.code())
                .await?;
            return Ok(Err(err));
        }

        self.db()
            .apply_trip_details(&trip.id, &update, Utc::now())
            .await?;
        debug!(trip_id = %trip.id, "trip details applied");
        Ok(Ok(()))
    }
}
