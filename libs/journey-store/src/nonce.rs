//! Ledger of increment nonces already applied, per user and study day.
//!
//! Clients retry increments with the same nonce; a nonce seen before on the
//! same day is reported as a duplicate and not applied again.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use chrono::NaiveDate;
use journey_core::parse_iso_date;

use crate::atomic::AtomicFile;
use crate::config::{path_component, SizeGuard, StoreConfig};
use crate::error::Result;

/// Directory under the data root holding file ledgers.
pub const NONCE_DIR: &str = "nonces";

pub trait NonceLedger: Send + Sync {
    fn contains(&self, user: &str, day: NaiveDate, nonce: &str) -> Result<bool>;

    fn record(&self, user: &str, day: NaiveDate, nonce: &str) -> Result<()>;
}

/// Process-local ledger.
#[derive(Debug, Default)]
pub struct MemoryNonceLedger {
    seen: Mutex<HashSet<(String, NaiveDate, String)>>,
}

impl MemoryNonceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_seen<T>(&self, f: impl FnOnce(&mut HashSet<(String, NaiveDate, String)>) -> T) -> T {
        let mut guard = match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

impl NonceLedger for MemoryNonceLedger {
    fn contains(&self, user: &str, day: NaiveDate, nonce: &str) -> Result<bool> {
        let key = (user.to_string(), day, nonce.to_string());
        Ok(self.with_seen(|seen| seen.contains(&key)))
    }

    fn record(&self, user: &str, day: NaiveDate, nonce: &str) -> Result<()> {
        let key = (user.to_string(), day, nonce.to_string());
        self.with_seen(|seen| seen.insert(key));
        Ok(())
    }
}

/// Ledger persisted as `<root>/nonces/<user>/<date>.json`, a sorted array of
/// nonce strings.
#[derive(Debug, Clone)]
pub struct FileNonceLedger {
    root: PathBuf,
    lock_timeout: Duration,
}

impl FileNonceLedger {
    pub fn new(root: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        Self {
            root: root.into(),
            lock_timeout,
        }
    }

    /// Ledger stored under a store configuration's data root.
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.data_root.join(NONCE_DIR), config.lock_timeout)
    }

    fn user_dir(&self, user: &str) -> PathBuf {
        self.root.join(path_component(user))
    }

    fn file(&self, user: &str, day: NaiveDate) -> AtomicFile {
        let path = self
            .user_dir(user)
            .join(format!("{}.json", day.format("%Y-%m-%d")));
        AtomicFile::new(path, self.lock_timeout, SizeGuard::disabled())
    }

    fn load(&self, user: &str, day: NaiveDate) -> Result<BTreeSet<String>> {
        Ok(self.file(user, day).try_read_json()?.unwrap_or_default())
    }

    /// Drop ledger days before `keep_from` for one user.
    pub fn prune(&self, user: &str, keep_from: NaiveDate) -> Result<usize> {
        let read_dir = match fs::read_dir(self.user_dir(user)) {
            Ok(rd) => rd,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };
        let mut removed = 0;
        for entry in read_dir {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(date) = name.strip_suffix(".json").and_then(|d| parse_iso_date(d).ok()) else {
                continue;
            };
            if date < keep_from {
                self.file(user, date).remove()?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl NonceLedger for FileNonceLedger {
    fn contains(&self, user: &str, day: NaiveDate, nonce: &str) -> Result<bool> {
        Ok(self.load(user, day)?.contains(nonce))
    }

    fn record(&self, user: &str, day: NaiveDate, nonce: &str) -> Result<()> {
        let mut nonces = self.load(user, day)?;
        if nonces.insert(nonce.to_string()) {
            self.file(user, day).write_json(&nonces)?;
        }
        Ok(())
    }
}
