//! # Sync Module
//!
//! The engine keeping the local store consistent with the provider under
//! unreliable, rate-limited network conditions:
//!
//! - `resource.rs` - stale-while-revalidate coordinator for profile,
//!   rewards and subscriptions
//! - `trips.rs` - cursor-paginated incremental trip history sync
//! - `details.rs` - rate-limit-aware detail backfill with adaptive backoff
//!   and circuit breaking
//!
//! All operations take a [`CancelToken`]; cancellation is checked before
//! every network call and raced against the backfill sleep. None of the
//! operations cancel an already in-flight write - state on disk is always
//! consistent when a call returns [`SyncError::Cancelled`].

pub mod details;
pub mod resource;
pub mod trips;

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use crate::api::ProviderClient;
use crate::local_db::LocalDatabase;
use crate::shared::config::SyncConfig;
use crate::shared::error::{FetchError, Result, SyncError};

/// Cooperative cancellation handle.
///
/// Cloning shares the same token; cancelling any clone cancels them all.
#[derive(Debug, Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// Create a token in the not-cancelled state
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Request cancellation
    pub fn cancel(&self) {
        let _ = self.sender.send(true);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolve once cancellation is requested
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        loop {
            if *receiver.borrow() {
                return;
            }
            if receiver.changed().await.is_err() {
                // Sender kept alive by self; unreachable in practice
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Race a fetch against cancellation
pub(crate) async fn cancellable<T, F>(cancel: &CancelToken, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, FetchError>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        result = fut => result.map_err(SyncError::from),
    }
}

/// Per-page progress report from the incremental trip sync
#[derive(Debug, Clone, Copy)]
pub struct TripSyncProgress {
    /// 1-based page number just ingested
    pub page: u32,
    /// Trips ingested so far in this call
    pub total_synced: u64,
}

/// Outcome of one incremental trip sync call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripSyncOutcome {
    pub total_synced: u64,
    /// True when the provider reports more pages (or the page bound was hit)
    pub has_more: bool,
}

/// Per-batch progress report from the detail backfill job
#[derive(Debug, Clone, Copy)]
pub struct BackfillProgress {
    /// Trips attempted so far
    pub processed: usize,
    /// Trips selected for this run
    pub total: usize,
    pub fetched: usize,
    pub failed: usize,
}

/// Outcome of one detail backfill run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillOutcome {
    /// Trips whose details were fetched and applied
    pub fetched: usize,
    /// Trips whose fetch failed and was recorded for retry
    pub failed: usize,
    /// Selected trips never attempted because the job circuit-broke
    pub skipped: usize,
}

/// Tuning for one detail backfill run
#[derive(Debug, Clone, Copy)]
pub struct BackfillOptions {
    /// Base inter-batch delay, milliseconds
    pub rate_limit_ms: u64,
    /// Trips fetched concurrently per batch
    pub batch_size: usize,
    /// Cap on trips selected for this run
    pub max_trips: Option<usize>,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            rate_limit_ms: 500,
            batch_size: 1,
            max_trips: None,
        }
    }
}

impl BackfillOptions {
    /// Defaults taken from the engine configuration
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            rate_limit_ms: config.backfill_rate_limit_ms,
            batch_size: config.backfill_batch_size,
            max_trips: None,
        }
    }
}

/// Observer for trip sync progress; fire-and-forget, never awaited
pub type TripProgressFn<'a> = &'a (dyn Fn(TripSyncProgress) + Send + Sync);

/// Observer for backfill progress; fire-and-forget, never awaited
pub type BackfillProgressFn<'a> = &'a (dyn Fn(BackfillProgress) + Send + Sync);

/// The sync engine: owns the provider client and the local store handle.
///
/// One instance per application; the owner also holds the
/// [`crate::geometry::GeometryCache`] and passes both wherever needed.
pub struct SyncEngine {
    db: Arc<LocalDatabase>,
    client: ProviderClient,
    config: SyncConfig,
}

impl SyncEngine {
    /// Build an engine over an opened local database
    pub fn new(config: SyncConfig, db: Arc<LocalDatabase>) -> Result<Self> {
        let client = ProviderClient::new(&config)?;
        Ok(Self { db, client, config })
    }

    /// The local store this engine writes into
    pub fn db(&self) -> &Arc<LocalDatabase> {
        &self.db
    }

    /// The engine configuration
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub(crate) fn client(&self) -> &ProviderClient {
        &self.client
    }
}
