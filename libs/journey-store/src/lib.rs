//! Persistence for learning journeys.
//!
//! A journey (one user learning one language) lives either in flat JSON
//! documents or in an embedded SQLite database, chosen per journey by
//! `server_settings.json`. [`JourneyStore`] is the entry point: it loads,
//! mutates and saves a journey, keeps daily snapshots current, de-duplicates
//! retried increments by nonce, and computes progress against past snapshots.

pub mod atomic;
pub mod backend;
pub mod clock;
pub mod config;
pub mod error;
pub mod flatfile;
pub mod migration;
pub mod nonce;
pub mod progress;
pub mod snapshot;
pub mod sqlite;
pub mod store;

pub use atomic::{AtomicFile, FileLock, WriteOutcome};
pub use backend::{
    open_backend, read_backend_kind, write_backend_kind, BackendKind, SnapshotSlot, StatsBackend,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{SizeGuard, StoreConfig};
pub use error::{Result, StoreError};
pub use flatfile::{DailyDocument, DailyKind, FlatFileStore};
pub use migration::{
    discover_journeys, migrate_all, migrate_user, MigrationFailure, MigrationOptions,
    MigrationReport, MigrationSummary,
};
pub use nonce::{FileNonceLedger, MemoryNonceLedger, NonceLedger};
pub use progress::ProgressCalculator;
pub use snapshot::SnapshotManager;
pub use sqlite::RelationalStore;
pub use store::{BulkOutcome, IncrementItem, IncrementOutcome, JourneyStore};
