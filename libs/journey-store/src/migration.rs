//! One-shot conversion of flat-file journeys into SQLite.
//!
//! Snapshot aggregates are not copied; each day is recomputed from the
//! point-in-time records its document carries, and `newlyExposedWords` is
//! chained through the recomputed series.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use chrono::NaiveDate;
use journey_core::{DailySnapshot, JourneyAggregate};
use serde::Serialize;

use crate::backend::{write_backend_kind, BackendKind, SnapshotSlot};
use crate::config::{decode_path_component, StoreConfig};
use crate::error::{Result, StoreError};
use crate::flatfile::{FlatFileStore, DAILY_DIR, STATS_FILE};
use crate::nonce::NONCE_DIR;
use crate::sqlite::RelationalStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationOptions {
    /// Replace an existing `stats.db`.
    pub force: bool,
    /// Compute everything, write nothing.
    pub dry_run: bool,
    /// Point the journey's settings at SQLite once the database is written.
    pub switch_backend: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub user: String,
    pub language: String,
    pub words: usize,
    pub snapshots: usize,
    /// Daily documents that could not be read.
    pub skipped_documents: usize,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationFailure {
    pub user: String,
    pub language: String,
    pub error: String,
}

/// Outcome of migrating every journey under a data root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationSummary {
    pub migrated: Vec<MigrationReport>,
    pub failed: Vec<MigrationFailure>,
}

/// Migrate one user + language.
pub fn migrate_user(
    config: &StoreConfig,
    user: &str,
    language: &str,
    options: MigrationOptions,
) -> Result<MigrationReport> {
    let flat = FlatFileStore::open(config, user, language);
    let db_path = RelationalStore::db_path(config, user, language);
    if db_path.exists() && !options.force {
        return Err(StoreError::TargetExists(db_path));
    }

    // An unreadable source fails the migration rather than producing an
    // empty database.
    let stats = flat.try_read_stats()?;
    let (snapshots, skipped_documents) = recompute_snapshots(&flat)?;
    let report = MigrationReport {
        user: user.to_string(),
        language: language.to_string(),
        words: stats.len(),
        snapshots: snapshots.len(),
        skipped_documents,
        dry_run: options.dry_run,
    };

    if options.dry_run {
        tracing::info!(user, language, words = report.words, snapshots = report.snapshots, "dry run");
        return Ok(report);
    }

    remove_database(&db_path)?;
    let written = (|| -> Result<()> {
        let store = RelationalStore::open(config, user, language)?;
        store.replace_all(stats.words())?;
        for snapshot in &snapshots {
            store.upsert_snapshot(snapshot, SnapshotSlot::Current)?;
        }
        Ok(())
    })();
    if let Err(err) = written {
        // Leave no half-written database behind so a retry needs no force.
        let _ = remove_database(&db_path);
        return Err(err);
    }

    if options.switch_backend {
        write_backend_kind(config, user, language, BackendKind::Sqlite)?;
    }

    tracing::info!(
        user,
        language,
        words = report.words,
        snapshots = report.snapshots,
        skipped = report.skipped_documents,
        "migrated journey to sqlite"
    );
    Ok(report)
}

/// Recompute one snapshot per retained date, oldest first.
fn recompute_snapshots(flat: &FlatFileStore) -> Result<(Vec<DailySnapshot>, usize)> {
    let mut per_date: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for entry in flat.daily_entries()? {
        *per_date.entry(entry.date).or_default() += 1;
    }

    let mut snapshots: Vec<DailySnapshot> = Vec::with_capacity(per_date.len());
    let mut skipped = 0;
    for (date, documents) in per_date {
        let Some(doc) = flat.best_daily(date) else {
            tracing::warn!(%date, documents, "no readable daily document");
            skipped += documents;
            continue;
        };
        let aggregate = JourneyAggregate::from_records(doc.stats.values());
        let snapshot = DailySnapshot::from_aggregate(date, aggregate, snapshots.last());
        snapshots.push(snapshot);
    }
    Ok((snapshots, skipped))
}

fn remove_database(db_path: &Path) -> Result<()> {
    let mut sidecars = vec![db_path.to_path_buf()];
    for suffix in ["-journal", "-wal", "-shm"] {
        let mut name = db_path.as_os_str().to_os_string();
        name.push(suffix);
        sidecars.push(name.into());
    }
    for path in sidecars {
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// Every `<user>/<language>` under the data root holding flat-file data.
pub fn discover_journeys(data_root: &Path) -> Result<Vec<(String, String)>> {
    let mut journeys = Vec::new();
    for user_entry in read_dirs(data_root)? {
        let user_name = user_entry.file_name().to_string_lossy().to_string();
        if user_name == NONCE_DIR {
            continue;
        }
        let Some(user) = decode_path_component(&user_name) else {
            continue;
        };
        for lang_entry in read_dirs(&user_entry.path())? {
            let path = lang_entry.path();
            if !path.join(STATS_FILE).exists() && !path.join(DAILY_DIR).is_dir() {
                continue;
            }
            let lang_name = lang_entry.file_name().to_string_lossy().to_string();
            if let Some(language) = decode_path_component(&lang_name) {
                journeys.push((user.clone(), language));
            }
        }
    }
    journeys.sort();
    Ok(journeys)
}

fn read_dirs(dir: &Path) -> Result<Vec<fs::DirEntry>> {
    let read_dir = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    let mut dirs = Vec::new();
    for entry in read_dir {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry);
        }
    }
    Ok(dirs)
}

/// Migrate every journey under the configured data root. A failing journey
/// is reported and does not stop the others.
pub fn migrate_all(config: &StoreConfig, options: MigrationOptions) -> Result<MigrationSummary> {
    let mut summary = MigrationSummary::default();
    for (user, language) in discover_journeys(&config.data_root)? {
        match migrate_user(config, &user, &language, options) {
            Ok(report) => summary.migrated.push(report),
            Err(err) => {
                tracing::warn!(%user, %language, error = %err, "migration failed");
                summary.failed.push(MigrationFailure {
                    user,
                    language,
                    error: err.to_string(),
                });
            }
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{read_backend_kind, StatsBackend};
    use journey_core::{DirectActivity, JourneyStats};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn seed(config: &StoreConfig, user: &str) -> JourneyStats {
        let flat = FlatFileStore::open(config, user, "fi");
        let mut stats = JourneyStats::new(user, "fi");
        stats.increment("a", DirectActivity::Speaking.into(), true, 1);
        flat.write_stats(&stats).unwrap();
        stats
    }

    #[test]
    fn discovers_escaped_identifiers() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::new(dir.path());
        seed(&config, "a@b.c");
        seed(&config, "plain");
        fs::create_dir_all(dir.path().join("empty").join("fi")).unwrap();
        assert_eq!(
            discover_journeys(dir.path()).unwrap(),
            vec![
                ("a@b.c".to_string(), "fi".to_string()),
                ("plain".to_string(), "fi".to_string())
            ]
        );
    }

    #[test]
    fn refuses_existing_target_without_force() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::new(dir.path());
        seed(&config, "u");
        migrate_user(&config, "u", "fi", MigrationOptions::default()).unwrap();
        let again = migrate_user(&config, "u", "fi", MigrationOptions::default());
        assert!(matches!(again, Err(StoreError::TargetExists(_))));

        let forced = MigrationOptions {
            force: true,
            ..Default::default()
        };
        assert_eq!(migrate_user(&config, "u", "fi", forced).unwrap().words, 1);
    }

    #[test]
    fn switch_backend_flips_settings() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::new(dir.path());
        let stats = seed(&config, "u");
        write_backend_kind(&config, "u", "fi", BackendKind::FlatFile).unwrap();

        let options = MigrationOptions {
            switch_backend: true,
            ..Default::default()
        };
        migrate_user(&config, "u", "fi", options).unwrap();
        assert_eq!(read_backend_kind(&config, "u", "fi"), BackendKind::Sqlite);
        let sqlite = RelationalStore::open(&config, "u", "fi").unwrap();
        assert_eq!(sqlite.load_stats().unwrap(), stats);
    }

    #[test]
    fn migrate_all_reports_each_journey() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::new(dir.path());
        seed(&config, "one");
        seed(&config, "two");
        RelationalStore::open(&config, "two", "fi").unwrap();

        let summary = migrate_all(&config, MigrationOptions::default()).unwrap();
        assert_eq!(summary.migrated.len(), 1);
        assert_eq!(summary.migrated[0].user, "one");
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].user, "two");
    }
}
