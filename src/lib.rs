//! VeloSync - local-first bikeshare trip sync engine
//!
//! VeloSync keeps a local SQLite mirror of a rider's bikeshare account -
//! profile, Bike Angel rewards, subscriptions and full trip history -
//! consistent with the provider's API under unreliable, rate-limited
//! network conditions, and serves time-addressable playback positions from
//! decoded trip geometry.
//!
//! # Module Structure
//!
//! - **`shared`** - domain models, error taxonomy, configuration
//! - **`api`** - typed provider HTTP client with classified fetch errors
//! - **`local_db`** - the SQLite store: trips, profile records, sync state
//! - **`sync`** - the engine: stale-while-revalidate resource sync,
//!   cursor-paginated trip sync, rate-limit-aware detail backfill
//! - **`geometry`** - byte-budgeted LRU cache of decoded trip polylines
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use velosync::local_db::LocalDatabase;
//! use velosync::shared::{ResourceKind, SyncConfig};
//! use velosync::sync::{BackfillOptions, CancelToken, SyncEngine};
//!
//! # async fn example() -> velosync::shared::error::Result<()> {
//! let config = SyncConfig::builder()
//!     .base_url("https://api.example-bikeshare.com")
//!     .access_token("token")
//!     .user_id("rider-1")
//!     .build()
//!     .expect("valid config");
//!
//! let db = Arc::new(LocalDatabase::new().await?);
//! let engine = SyncEngine::new(config, Arc::clone(&db))?;
//! let cancel = CancelToken::new();
//!
//! engine.sync_resource(ResourceKind::Profile, false, &cancel).await?;
//! let outcome = engine.sync_trips(None, &cancel).await?;
//! if outcome.has_more {
//!     // resume later; the cursor is persisted
//! }
//! engine
//!     .sync_trip_details(BackfillOptions::default(), None, &cancel)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod geometry;
pub mod local_db;
pub mod shared;
pub mod sync;

pub use geometry::{position_at, DecodedTrip, GeometryCache, TripPosition};
pub use local_db::LocalDatabase;
pub use shared::{ResourceKind, SyncConfig, SyncError, Trip};
pub use sync::{BackfillOptions, BackfillOutcome, CancelToken, SyncEngine, TripSyncOutcome};
