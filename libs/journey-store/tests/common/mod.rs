//! Shared setup for journey-store integration tests.
//!
//! Every test gets its own scratch data root, a movable clock and an
//! in-memory nonce ledger.

#![allow(dead_code)]

pub mod fixtures;

use std::sync::Arc;

use chrono::NaiveDate;
use tempfile::TempDir;
use uuid::Uuid;

use journey_store::{
    write_backend_kind, BackendKind, FixedClock, FlatFileStore, JourneyStore, MemoryNonceLedger,
    StoreConfig,
};

pub const USER: &str = "learner-1";
pub const LANGUAGE: &str = "es";

/// Scratch data root plus injected clock and ledger.
pub struct TestContext {
    pub dir: TempDir,
    pub config: StoreConfig,
    pub clock: Arc<FixedClock>,
    pub ledger: Arc<MemoryNonceLedger>,
}

impl TestContext {
    /// New context with the clock pinned to `today`.
    pub fn new(today: NaiveDate) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = StoreConfig::new(dir.path());
        Self {
            dir,
            config,
            clock: Arc::new(FixedClock::new(today)),
            ledger: Arc::new(MemoryNonceLedger::new()),
        }
    }

    /// Open the default journey on the given backend.
    pub fn store(&self, kind: BackendKind) -> JourneyStore {
        self.store_for(USER, LANGUAGE, kind)
    }

    pub fn store_for(&self, user: &str, language: &str, kind: BackendKind) -> JourneyStore {
        write_backend_kind(&self.config, user, language, kind)
            .expect("Failed to write backend selection");
        JourneyStore::open(&self.config, user, language)
            .expect("Failed to open journey store")
            .with_clock(self.clock.clone())
            .with_ledger(self.ledger.clone())
    }

    pub fn flat(&self) -> FlatFileStore {
        FlatFileStore::open(&self.config, USER, LANGUAGE)
    }

    pub fn advance_days(&self, days: i64) {
        self.clock.advance_days(days);
    }
}

/// Fresh nonce, as a client would generate per request.
pub fn nonce() -> String {
    Uuid::new_v4().to_string()
}

/// Both backends, for tests that must hold on either.
pub fn backends() -> [BackendKind; 2] {
    [BackendKind::Sqlite, BackendKind::FlatFile]
}
