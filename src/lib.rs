//! # Workout Sync
//!
//! Cache-first, cursor-paginated sync of workout records between a remote
//! paginated API, a durable on-device cache and a scrolling UI.
//!
//! This library provides:
//! - A sync engine with independent initial/refresh/load-more operations
//! - Deduplicating, order-preserving merge of remote pages
//! - Pagination cursors that survive process restarts
//! - SQLite and in-memory cache stores, and an HTTP remote source
//! - Pure summaries over the synced records
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use workoutsync::{HttpRemoteSource, HttpSourceConfig, SqliteStore, SyncConfig, SyncEngine};
//!
//! # async fn run() -> workoutsync::Result<()> {
//! let remote = HttpRemoteSource::new(HttpSourceConfig::new("https://api.example.com"), "api-key")?;
//! let store = SqliteStore::open("workouts.db")?;
//! let engine = SyncEngine::with_store(Arc::new(remote), Arc::new(store), SyncConfig::default())?;
//!
//! let mut events = engine.subscribe();
//! engine.load_initial().await?;
//! println!("{} workouts", engine.current_records().len());
//!
//! if engine.has_more_older() {
//!     engine.load_more().await?;
//! }
//! # let _ = events.try_recv();
//! # Ok(())
//! # }
//! ```

// Unified error handling
pub mod error;
pub use error::{Result, SyncError};

// Records, pages, cursors
pub mod types;
pub use types::{
    CACHE_FORMAT_VERSION, CachedPaginationInfo, OperationKind, OperationPhase, PageResult,
    PaginationState, Record, SyncOutcome,
};

// Ordered, deduplicated collection and merge
pub mod collection;
pub use collection::{CanonicalCollection, MergeDirection, MergeReport};

// Engine configuration
pub mod config;
pub use config::SyncConfig;

// Key/value cache contract and record cache adapter
pub mod cache;
pub use cache::{KeyValueStore, MemoryStore, RecordCache};

// SQLite key/value store
pub mod persistence;
pub use persistence::SqliteStore;

// Remote paginated API contract
pub mod remote;
pub use remote::RemoteSource;

// HTTP remote source
pub mod http;
pub use http::{HttpRemoteSource, HttpSourceConfig};

// Consumer events
pub mod events;
pub use events::SyncEvent;

// Sync engine
pub mod engine;
pub use engine::SyncEngine;

// Aggregation over records
pub mod stats;

/// Initialize logging for Android
#[cfg(target_os = "android")]
pub fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("workoutsync"),
    );
}

/// Initialize logging. Other platforms install their own `log` backend.
#[cfg(not(target_os = "android"))]
pub fn init_logging() {
    // No-op on non-Android platforms
}
