//! Backend abstraction and per-journey backend selection.

use std::path::Path;

use chrono::NaiveDate;
use journey_core::{DailySnapshot, JourneyStats};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::atomic::{AtomicFile, WriteOutcome};
use crate::config::{SizeGuard, StoreConfig};
use crate::error::Result;
use crate::flatfile::FlatFileStore;
use crate::sqlite::RelationalStore;

/// File holding the backend-selection flag.
pub const SETTINGS_FILE: &str = "server_settings.json";

/// Which persistence backend a journey uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    #[default]
    #[serde(rename = "sqlite")]
    Sqlite,
    #[serde(rename = "flatfile")]
    FlatFile,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::FlatFile => "flatfile",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "sqlite" => Some(Self::Sqlite),
            "flatfile" => Some(Self::FlatFile),
            _ => None,
        }
    }
}

/// How a snapshot write treats an existing snapshot for the same date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSlot {
    /// Today's running snapshot: overwrite.
    Current,
    /// A past day filled in after the fact: first write wins.
    Yesterday,
}

/// Storage for one user + language.
pub trait StatsBackend {
    fn kind(&self) -> BackendKind;

    /// All current word records.
    fn load_stats(&self) -> Result<JourneyStats>;

    /// Replace all word records.
    fn save_stats(&self, stats: &JourneyStats) -> Result<WriteOutcome>;

    fn get_snapshot(&self, date: NaiveDate) -> Result<Option<DailySnapshot>>;

    /// Write a snapshot. `stats` is the point-in-time state it was computed
    /// from. Returns false when an existing or archived snapshot was kept.
    fn put_snapshot(
        &self,
        snapshot: &DailySnapshot,
        slot: SnapshotSlot,
        stats: &JourneyStats,
    ) -> Result<bool>;

    /// Dates with a snapshot, ascending.
    fn snapshot_dates(&self) -> Result<Vec<NaiveDate>>;

    /// Most recent snapshot strictly before `date`.
    fn latest_snapshot_before(&self, date: NaiveDate) -> Result<Option<DailySnapshot>> {
        let prior = self
            .snapshot_dates()?
            .into_iter()
            .filter(|d| *d < date)
            .max();
        match prior {
            Some(d) => self.get_snapshot(d),
            None => Ok(None),
        }
    }

    /// Snapshots with `from <= date <= to`, ascending.
    fn snapshots_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DailySnapshot>> {
        let mut snapshots = Vec::new();
        for date in self.snapshot_dates()? {
            if date >= from && date <= to {
                if let Some(snapshot) = self.get_snapshot(date)? {
                    snapshots.push(snapshot);
                }
            }
        }
        Ok(snapshots)
    }

    /// Compress snapshots dated before `before`. Backends without an
    /// archived form keep them as they are.
    fn archive_before(&self, _before: NaiveDate) -> Result<usize> {
        Ok(0)
    }

    /// Delete snapshots dated before `keep_from`.
    fn prune_before(&self, _keep_from: NaiveDate) -> Result<usize> {
        Ok(0)
    }
}

fn settings_file(dir: &Path, config: &StoreConfig) -> AtomicFile {
    AtomicFile::new(dir.join(SETTINGS_FILE), config.lock_timeout, SizeGuard::disabled())
}

/// Read the selection flag. Absent or unparseable settings select SQLite.
pub fn read_backend_kind(config: &StoreConfig, user: &str, language: &str) -> BackendKind {
    let dir = config.journey_dir(user, language);
    settings_file(&dir, config)
        .read_json::<Value>()
        .and_then(|v| {
            v.get("storage_backend")
                .and_then(Value::as_str)
                .and_then(BackendKind::from_name)
        })
        .unwrap_or_default()
}

/// Write the selection flag, keeping any other settings in the file.
pub fn write_backend_kind(
    config: &StoreConfig,
    user: &str,
    language: &str,
    kind: BackendKind,
) -> Result<()> {
    let dir = config.journey_dir(user, language);
    let file = settings_file(&dir, config);
    let mut settings = match file.read_json::<Value>() {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    settings.insert(
        "storage_backend".to_string(),
        Value::String(kind.as_str().to_string()),
    );
    file.write_json(&Value::Object(settings))?;
    Ok(())
}

/// Open the backend selected for a journey.
pub fn open_backend(
    config: &StoreConfig,
    user: &str,
    language: &str,
) -> Result<Box<dyn StatsBackend>> {
    match read_backend_kind(config, user, language) {
        BackendKind::FlatFile => Ok(Box::new(FlatFileStore::open(config, user, language))),
        BackendKind::Sqlite => Ok(Box::new(RelationalStore::open(config, user, language)?)),
    }
}
