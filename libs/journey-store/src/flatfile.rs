//! JSON-document backend.
//!
//! Layout under a journey directory:
//!
//! ```text
//! stats.json                      all word records
//! daily/<date>_current.json       point-in-time copy written while <date> is today
//! daily/<date>_yesterday.json     written on the following day if <date> had none
//! daily/<date>_<kind>.json.gz     archived (read-only) form of either
//! ```
//!
//! Word records are rendered one compact line per key so the documents stay
//! diffable by hand.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use journey_core::schema::normalize_stats_map;
use journey_core::{parse_iso_date, DailySnapshot, JourneyStats, WordStatsRecord, DOCUMENT_VERSION};
use serde_json::Value;

use crate::atomic::{AtomicFile, WriteOutcome};
use crate::backend::{BackendKind, SnapshotSlot, StatsBackend};
use crate::config::{SizeGuard, StoreConfig};
use crate::error::{Result, StoreError};

pub const STATS_FILE: &str = "stats.json";
pub const DAILY_DIR: &str = "daily";

/// Which daily document for a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DailyKind {
    Current,
    Yesterday,
}

impl DailyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Yesterday => "yesterday",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "current" => Some(Self::Current),
            "yesterday" => Some(Self::Yesterday),
            _ => None,
        }
    }
}

impl From<SnapshotSlot> for DailyKind {
    fn from(slot: SnapshotSlot) -> Self {
        match slot {
            SnapshotSlot::Current => Self::Current,
            SnapshotSlot::Yesterday => Self::Yesterday,
        }
    }
}

/// A daily document file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyEntry {
    pub date: NaiveDate,
    pub kind: DailyKind,
    pub compressed: bool,
    pub path: PathBuf,
}

/// Aggregate plus the point-in-time records it was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyDocument {
    pub date: NaiveDate,
    pub kind: DailyKind,
    pub snapshot: DailySnapshot,
    pub stats: BTreeMap<String, WordStatsRecord>,
    read_only: bool,
}

impl DailyDocument {
    pub fn new(
        kind: DailyKind,
        snapshot: DailySnapshot,
        stats: BTreeMap<String, WordStatsRecord>,
    ) -> Self {
        Self {
            date: snapshot.date,
            kind,
            snapshot,
            stats,
            read_only: false,
        }
    }

    /// Loaded from an archived (compressed) file.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }
}

/// Flat-file store for one user + language.
#[derive(Debug, Clone)]
pub struct FlatFileStore {
    dir: PathBuf,
    user: String,
    language: String,
    lock_timeout: Duration,
    size_guard: SizeGuard,
}

impl FlatFileStore {
    pub fn open(config: &StoreConfig, user: &str, language: &str) -> Self {
        Self {
            dir: config.journey_dir(user, language),
            user: user.to_string(),
            language: language.to_string(),
            lock_timeout: config.lock_timeout,
            size_guard: config.size_guard,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stats_path(&self) -> PathBuf {
        self.dir.join(STATS_FILE)
    }

    pub fn daily_dir(&self) -> PathBuf {
        self.dir.join(DAILY_DIR)
    }

    pub fn daily_path(&self, date: NaiveDate, kind: DailyKind, compressed: bool) -> PathBuf {
        let ext = if compressed { "json.gz" } else { "json" };
        self.daily_dir().join(format!(
            "{}_{}.{}",
            date.format("%Y-%m-%d"),
            kind.as_str(),
            ext
        ))
    }

    fn file(&self, path: PathBuf) -> AtomicFile {
        AtomicFile::new(path, self.lock_timeout, self.size_guard)
    }

    /// Load the main document. Empty stats when missing or unrecoverable.
    pub fn read_stats(&self) -> JourneyStats {
        self.try_read_stats().unwrap_or_else(|err| {
            tracing::warn!(path = %self.stats_path().display(), error = %err, "stats not readable");
            JourneyStats::new(self.user.clone(), self.language.clone())
        })
    }

    /// Load the main document for an update.
    ///
    /// Missing or corrupt-beyond-backup documents load as empty; an I/O
    /// failure or lock timeout is an error, so nothing is saved over stats
    /// that could not be read.
    pub fn try_read_stats(&self) -> Result<JourneyStats> {
        let words = self
            .file(self.stats_path())
            .try_read_with(parse_stats_document)?
            .unwrap_or_default();
        Ok(JourneyStats::new(self.user.clone(), self.language.clone()).with_words(words))
    }

    pub fn write_stats(&self, stats: &JourneyStats) -> Result<WriteOutcome> {
        let header = [("version", Value::from(DOCUMENT_VERSION))];
        let rendered = render_document(&header, stats.words());
        self.file(self.stats_path()).write(rendered.as_bytes())
    }

    /// Load one daily document. Archived documents come back read-only.
    pub fn load_daily(&self, date: NaiveDate, kind: DailyKind) -> Option<DailyDocument> {
        if let Some(doc) = self
            .file(self.daily_path(date, kind, false))
            .read_with(parse_daily_document)
        {
            return Some(doc);
        }
        self.file(self.daily_path(date, kind, true))
            .read_with(|bytes| parse_daily_document(&gunzip(bytes)?))
            .map(|mut doc| {
                doc.read_only = true;
                doc
            })
    }

    /// Save a daily document. Refuses (returns false) for read-only or
    /// already archived documents and on I/O failure.
    pub fn save_daily(&self, doc: &DailyDocument) -> bool {
        match self.write_daily(doc) {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(date = %doc.date, kind = doc.kind.as_str(), error = %err, "daily document not saved");
                false
            }
        }
    }

    fn write_daily(&self, doc: &DailyDocument) -> Result<WriteOutcome> {
        let archived = self.daily_path(doc.date, doc.kind, true);
        if doc.read_only || archived.exists() {
            return Err(StoreError::ReadOnly(archived));
        }
        let header = [
            ("version", Value::from(DOCUMENT_VERSION)),
            ("date", Value::from(doc.date.format("%Y-%m-%d").to_string())),
            ("kind", Value::from(doc.kind.as_str())),
            ("snapshot", serde_json::to_value(&doc.snapshot)?),
        ];
        let rendered = render_document(&header, &doc.stats);
        self.file(self.daily_path(doc.date, doc.kind, false))
            .write(rendered.as_bytes())
    }

    /// Every daily document on disk, sorted by date then kind.
    pub fn daily_entries(&self) -> Result<Vec<DailyEntry>> {
        let dir = self.daily_dir();
        let read_dir = match fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some((date, kind, compressed)) = parse_daily_file_name(&name) {
                entries.push(DailyEntry {
                    date,
                    kind,
                    compressed,
                    path: entry.path(),
                });
            }
        }
        entries.sort_by(|a, b| (a.date, a.kind, a.compressed).cmp(&(b.date, b.kind, b.compressed)));
        Ok(entries)
    }

    /// Point-in-time document for a date, preferring `current` over
    /// `yesterday` and the plain form over the archived one.
    pub fn best_daily(&self, date: NaiveDate) -> Option<DailyDocument> {
        self.load_daily(date, DailyKind::Current)
            .or_else(|| self.load_daily(date, DailyKind::Yesterday))
    }

    fn has_daily(&self, date: NaiveDate) -> bool {
        [DailyKind::Current, DailyKind::Yesterday].iter().any(|kind| {
            self.daily_path(date, *kind, false).exists() || self.daily_path(date, *kind, true).exists()
        })
    }

    /// Compress plain daily documents dated before `before`.
    ///
    /// The plain file is removed once its `.gz` sibling is durable. Returns
    /// the number of documents archived.
    pub fn archive_snapshots(&self, before: NaiveDate) -> Result<usize> {
        let mut archived = 0;
        for entry in self.daily_entries()? {
            if entry.compressed || entry.date >= before {
                continue;
            }
            let plain = self.file(entry.path.clone());
            let Some(bytes) = plain.read_bytes()? else {
                continue;
            };
            let target = self.daily_path(entry.date, entry.kind, true);
            AtomicFile::new(target, self.lock_timeout, SizeGuard::disabled()).write(&gzip(&bytes)?)?;
            plain.remove()?;
            archived += 1;
        }
        if archived > 0 {
            tracing::info!(dir = %self.dir.display(), archived, "archived daily documents");
        }
        Ok(archived)
    }

    /// Delete daily documents dated before `keep_from`. Returns the count removed.
    pub fn prune_snapshots(&self, keep_from: NaiveDate) -> Result<usize> {
        let mut removed = 0;
        for entry in self.daily_entries()? {
            if entry.date < keep_from {
                self.file(entry.path).remove()?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl StatsBackend for FlatFileStore {
    fn kind(&self) -> BackendKind {
        BackendKind::FlatFile
    }

    fn load_stats(&self) -> Result<JourneyStats> {
        self.try_read_stats()
    }

    fn save_stats(&self, stats: &JourneyStats) -> Result<WriteOutcome> {
        self.write_stats(stats)
    }

    fn get_snapshot(&self, date: NaiveDate) -> Result<Option<DailySnapshot>> {
        Ok(self.best_daily(date).map(|doc| doc.snapshot))
    }

    fn put_snapshot(
        &self,
        snapshot: &DailySnapshot,
        slot: SnapshotSlot,
        stats: &JourneyStats,
    ) -> Result<bool> {
        if slot == SnapshotSlot::Yesterday && self.has_daily(snapshot.date) {
            return Ok(false);
        }
        let doc = DailyDocument::new(slot.into(), snapshot.clone(), stats.words().clone());
        match self.write_daily(&doc) {
            Ok(_) => Ok(true),
            Err(StoreError::ReadOnly(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn snapshot_dates(&self) -> Result<Vec<NaiveDate>> {
        let mut dates: Vec<NaiveDate> = self.daily_entries()?.into_iter().map(|e| e.date).collect();
        dates.dedup();
        Ok(dates)
    }

    fn archive_before(&self, before: NaiveDate) -> Result<usize> {
        self.archive_snapshots(before)
    }

    fn prune_before(&self, keep_from: NaiveDate) -> Result<usize> {
        self.prune_snapshots(keep_from)
    }
}

/// Render a document: header fields first, then `stats` with one compact
/// line per word-key.
pub fn render_document(header: &[(&str, Value)], stats: &BTreeMap<String, WordStatsRecord>) -> String {
    let mut out = String::from("{\n");
    for (key, value) in header {
        out.push_str(&format!("  {}: {},\n", Value::from(*key), value));
    }
    if stats.is_empty() {
        out.push_str("  \"stats\": {}\n}\n");
        return out;
    }
    out.push_str("  \"stats\": {\n");
    let last = stats.len() - 1;
    for (i, (key, record)) in stats.iter().enumerate() {
        // Serializing a record cannot fail: every key is a string.
        let line = serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string());
        out.push_str(&format!("    {}: {}", Value::from(key.as_str()), line));
        out.push_str(if i == last { "\n" } else { ",\n" });
    }
    out.push_str("  }\n}\n");
    out
}

fn parse_document(bytes: &[u8]) -> Result<Value> {
    let value: Value = serde_json::from_slice(bytes)?;
    if !value.is_object() {
        return Err(StoreError::InvalidData("document is not an object".to_string()));
    }
    if let Some(version) = value.get("version").and_then(Value::as_u64) {
        if version > u64::from(DOCUMENT_VERSION) {
            tracing::warn!(version, "document written by a newer version; reading leniently");
        }
    }
    Ok(value)
}

/// Parse `stats.json` into normalized records.
pub fn parse_stats_document(bytes: &[u8]) -> Result<BTreeMap<String, WordStatsRecord>> {
    let value = parse_document(bytes)?;
    Ok(value.get("stats").map(normalize_stats_map).unwrap_or_default())
}

fn parse_daily_document(bytes: &[u8]) -> Result<DailyDocument> {
    let value = parse_document(bytes)?;
    let date = value
        .get("date")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::InvalidData("daily document without date".to_string()))
        .and_then(|s| parse_iso_date(s).map_err(Into::into))?;
    let kind = value
        .get("kind")
        .and_then(Value::as_str)
        .and_then(DailyKind::from_name)
        .unwrap_or(DailyKind::Current);
    let stats = value.get("stats").map(normalize_stats_map).unwrap_or_default();
    let snapshot = match value.get("snapshot") {
        Some(raw) => {
            let mut snapshot: DailySnapshot = serde_json::from_value(raw.clone())?;
            snapshot.date = date;
            snapshot
        }
        // Older documents carried only the records.
        None => DailySnapshot::from_aggregate(
            date,
            journey_core::JourneyAggregate::from_records(stats.values()),
            None,
        ),
    };
    Ok(DailyDocument {
        date,
        kind,
        snapshot,
        stats,
        read_only: false,
    })
}

/// `2024-05-01_current.json` → (date, kind, compressed)
pub fn parse_daily_file_name(name: &str) -> Option<(NaiveDate, DailyKind, bool)> {
    let (stem, compressed) = match name.strip_suffix(".json.gz") {
        Some(stem) => (stem, true),
        None => (name.strip_suffix(".json")?, false),
    };
    let (date, kind) = stem.split_once('_')?;
    Some((parse_iso_date(date).ok()?, DailyKind::from_name(kind)?, compressed))
}

fn gzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

fn gunzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
