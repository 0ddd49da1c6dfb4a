//! Relational storage for one user + language.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use journey_core::{
    parse_iso_date, Activity, ActivityCounters, ActivityKind, ActivityTotals, Category,
    DailySnapshot, JourneyStats, PracticeHistory, WordStatsRecord,
};
use rusqlite::{params, Connection, OptionalExtension};

use super::schema::{INIT_SCHEMA_INFO, SCHEMA, SCHEMA_VERSION};
use crate::atomic::WriteOutcome;
use crate::backend::{BackendKind, SnapshotSlot, StatsBackend};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};

/// Database file name inside a journey directory.
pub const DB_FILE: &str = "stats.db";

const SNAPSHOT_COLUMNS: &str = "date, exposed_words_count, words_known_count, total_questions_answered, newly_exposed_words, activity_totals_json";

/// Raw `daily_snapshots` row before date / JSON parsing.
type SnapshotRow = (String, i64, i64, i64, i64, String);

/// SQLite implementation of [`StatsBackend`].
pub struct RelationalStore {
    conn: Connection,
    user: String,
    language: String,
}

impl RelationalStore {
    /// Open the journey database, creating it if necessary.
    pub fn open(config: &StoreConfig, user: &str, language: &str) -> Result<Self> {
        let dir = config.journey_dir(user, language);
        fs::create_dir_all(&dir)?;
        Self::open_path(dir.join(DB_FILE), config.lock_timeout, user, language)
    }

    /// Open a database at an explicit path.
    pub fn open_path<P: AsRef<Path>>(
        path: P,
        busy_timeout: Duration,
        user: &str,
        language: &str,
    ) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        Self::with_connection(conn, user, language)
    }

    /// Open in-memory database (for testing).
    pub fn open_in_memory(user: &str, language: &str) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, user, language)
    }

    fn with_connection(conn: Connection, user: &str, language: &str) -> Result<Self> {
        let store = Self {
            conn,
            user: user.to_string(),
            language: language.to_string(),
        };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(SCHEMA)?;
        self.conn.execute_batch(INIT_SCHEMA_INFO)?;

        let found = self.schema_version()?;
        if found > SCHEMA_VERSION {
            return Err(StoreError::SchemaVersion {
                found,
                supported: SCHEMA_VERSION,
            });
        }
        Ok(())
    }

    /// Version recorded in `schema_info`.
    pub fn schema_version(&self) -> Result<i64> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM schema_info WHERE key = 'version'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| StoreError::InvalidData(format!("schema version '{value}'"))),
            None => Ok(SCHEMA_VERSION),
        }
    }

    /// Path of the database for a journey.
    pub fn db_path(config: &StoreConfig, user: &str, language: &str) -> PathBuf {
        config.journey_dir(user, language).join(DB_FILE)
    }

    /// Every record, with activity rows re-expanded over the full activity set.
    pub fn get_all_stats(&self) -> Result<BTreeMap<String, WordStatsRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT word_key, exposed, marked_as_known, last_seen, last_correct_answer, last_incorrect_answer FROM word_stats",
        )?;
        let mut words = stmt
            .query_map([], |row| {
                let record = WordStatsRecord {
                    exposed: row.get::<_, i64>(1)? != 0,
                    marked_as_known: row.get::<_, Option<i64>>(2)?.map(|v| v != 0),
                    practice_history: PracticeHistory {
                        last_seen: row.get(3)?,
                        last_correct_answer: row.get(4)?,
                        last_incorrect_answer: row.get(5)?,
                    },
                    ..Default::default()
                };
                Ok((row.get::<_, String>(0)?, record))
            })?
            .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT word_key, category, activity, correct, incorrect FROM word_activity_stats",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for (key, category, activity, correct, incorrect) in rows {
            let Some(activity) = Activity::parse(&category, &activity) else {
                tracing::debug!(%category, %activity, "dropping unknown activity row");
                continue;
            };
            if let Some(record) = words.get_mut(&key) {
                *record.counters_mut(activity) =
                    ActivityCounters::new(from_sql_count(correct), from_sql_count(incorrect));
            }
        }
        Ok(words)
    }

    /// Replace every record in one transaction.
    pub fn replace_all(&self, words: &BTreeMap<String, WordStatsRecord>) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM word_activity_stats", [])?;
        tx.execute("DELETE FROM word_stats", [])?;

        {
            let mut insert_word = tx.prepare(
                "INSERT INTO word_stats (word_key, exposed, marked_as_known, last_seen, last_correct_answer, last_incorrect_answer)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            let mut insert_activity = tx.prepare(
                "INSERT INTO word_activity_stats (word_key, category, activity, correct, incorrect)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;

            for (key, record) in words {
                let history = &record.practice_history;
                insert_word.execute(params![
                    key,
                    record.exposed as i64,
                    record.marked_as_known.map(i64::from),
                    history.last_seen,
                    history.last_correct_answer,
                    history.last_incorrect_answer,
                ])?;

                let direct = record
                    .direct_practice
                    .iter()
                    .map(|(a, c)| (Category::DirectPractice, a.as_str(), c));
                let contextual = record
                    .contextual_exposure
                    .iter()
                    .map(|(a, c)| (Category::ContextualExposure, a.as_str(), c));
                for (category, activity, counters) in direct.chain(contextual) {
                    if counters.is_zero() {
                        continue;
                    }
                    insert_activity.execute(params![
                        key,
                        category.as_str(),
                        activity,
                        to_sql_count(counters.correct),
                        to_sql_count(counters.incorrect),
                    ])?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Write one snapshot in its own transaction.
    ///
    /// `Yesterday` keeps an existing row; returns whether a row was written.
    pub fn upsert_snapshot(&self, snapshot: &DailySnapshot, slot: SnapshotSlot) -> Result<bool> {
        let verb = match slot {
            SnapshotSlot::Current => "INSERT OR REPLACE",
            SnapshotSlot::Yesterday => "INSERT OR IGNORE",
        };
        let sql = format!(
            "{verb} INTO daily_snapshots ({SNAPSHOT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
        );
        let totals = serde_json::to_string(&snapshot.activity_totals)?;

        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            &sql,
            params![
                snapshot.date.format("%Y-%m-%d").to_string(),
                to_sql_count(snapshot.exposed_words_count),
                to_sql_count(snapshot.words_known_count),
                to_sql_count(snapshot.total_questions_answered),
                to_sql_count(snapshot.newly_exposed_words),
                totals,
            ],
        )?;
        tx.commit()?;
        Ok(changed > 0)
    }

    fn query_snapshots(&self, where_clause: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<DailySnapshot>> {
        let sql = format!("SELECT {SNAPSHOT_COLUMNS} FROM daily_snapshots {where_clause}");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(args, |row| -> rusqlite::Result<SnapshotRow> {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(row_to_snapshot).collect()
    }
}

fn row_to_snapshot(row: SnapshotRow) -> Result<DailySnapshot> {
    let (date, exposed, known, questions, newly, totals) = row;
    let activity_totals = serde_json::from_str::<ActivityTotals>(&totals).unwrap_or_else(|err| {
        tracing::warn!(%date, error = %err, "unreadable activity totals; using zeros");
        ActivityTotals::default()
    });
    Ok(DailySnapshot {
        date: parse_iso_date(&date)?,
        exposed_words_count: from_sql_count(exposed),
        words_known_count: from_sql_count(known),
        total_questions_answered: from_sql_count(questions),
        newly_exposed_words: from_sql_count(newly),
        activity_totals,
    })
}

fn to_sql_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn date_param(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

impl StatsBackend for RelationalStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn load_stats(&self) -> Result<JourneyStats> {
        Ok(JourneyStats::new(self.user.clone(), self.language.clone())
            .with_words(self.get_all_stats()?))
    }

    fn save_stats(&self, stats: &JourneyStats) -> Result<WriteOutcome> {
        self.replace_all(stats.words())?;
        Ok(WriteOutcome::Written)
    }

    fn get_snapshot(&self, date: NaiveDate) -> Result<Option<DailySnapshot>> {
        let date = date_param(date);
        Ok(self.query_snapshots("WHERE date = ?1", &[&date])?.into_iter().next())
    }

    fn put_snapshot(
        &self,
        snapshot: &DailySnapshot,
        slot: SnapshotSlot,
        _stats: &JourneyStats,
    ) -> Result<bool> {
        self.upsert_snapshot(snapshot, slot)
    }

    fn snapshot_dates(&self) -> Result<Vec<NaiveDate>> {
        let mut stmt = self
            .conn
            .prepare("SELECT date FROM daily_snapshots ORDER BY date")?;
        let raw = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        raw.iter()
            .map(|d| parse_iso_date(d).map_err(Into::into))
            .collect()
    }

    fn latest_snapshot_before(&self, date: NaiveDate) -> Result<Option<DailySnapshot>> {
        let date = date_param(date);
        Ok(self
            .query_snapshots("WHERE date < ?1 ORDER BY date DESC LIMIT 1", &[&date])?
            .into_iter()
            .next())
    }

    fn snapshots_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DailySnapshot>> {
        let (from, to) = (date_param(from), date_param(to));
        self.query_snapshots("WHERE date >= ?1 AND date <= ?2 ORDER BY date", &[&from, &to])
    }

    fn prune_before(&self, keep_from: NaiveDate) -> Result<usize> {
        let count = self.conn.execute(
            "DELETE FROM daily_snapshots WHERE date < ?1",
            params![date_param(keep_from)],
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use journey_core::{ContextualActivity, DirectActivity};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, d).unwrap()
    }

    fn sample_stats() -> JourneyStats {
        let mut stats = JourneyStats::new("u1", "ja");
        stats.increment("neko", DirectActivity::MultipleChoice.into(), true, 1_000);
        stats.increment("neko", DirectActivity::Typing.into(), false, 500);
        stats.increment("inu", ContextualActivity::AudioStory.into(), true, 2_000);
        stats.set_marked_as_known("inu", true);
        stats.set_marked_as_known("tori", false);
        stats
    }

    #[test]
    fn round_trip_preserves_records() {
        let store = RelationalStore::open_in_memory("u1", "ja").unwrap();
        let stats = sample_stats();
        store.save_stats(&stats).unwrap();
        assert_eq!(store.load_stats().unwrap(), stats);
    }

    #[test]
    fn only_non_zero_counters_are_stored() {
        let store = RelationalStore::open_in_memory("u1", "ja").unwrap();
        store.save_stats(&sample_stats()).unwrap();
        let rows: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM word_activity_stats", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 3);
    }

    #[test]
    fn replace_removes_missing_words() {
        let store = RelationalStore::open_in_memory("u1", "ja").unwrap();
        store.save_stats(&sample_stats()).unwrap();

        let mut smaller = JourneyStats::new("u1", "ja");
        smaller.increment("neko", DirectActivity::Listening.into(), true, 9);
        store.save_stats(&smaller).unwrap();

        let loaded = store.load_stats().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded, smaller);
    }

    #[test]
    fn unknown_activity_rows_are_ignored() {
        let store = RelationalStore::open_in_memory("u1", "ja").unwrap();
        store.save_stats(&sample_stats()).unwrap();
        store
            .conn
            .execute(
                "INSERT INTO word_activity_stats VALUES ('neko', 'directPractice', 'telepathy', 4, 4)",
                [],
            )
            .unwrap();
        assert_eq!(store.load_stats().unwrap(), sample_stats());
    }

    #[test]
    fn yesterday_slot_keeps_first_write() {
        let store = RelationalStore::open_in_memory("u1", "ja").unwrap();
        let stats = sample_stats();
        let first = DailySnapshot::from_aggregate(day(3), stats.aggregate(), None);
        assert!(store.put_snapshot(&first, SnapshotSlot::Yesterday, &stats).unwrap());

        let mut second = first.clone();
        second.total_questions_answered = 42;
        assert!(!store.put_snapshot(&second, SnapshotSlot::Yesterday, &stats).unwrap());
        assert_eq!(store.get_snapshot(day(3)).unwrap(), Some(first));

        assert!(store.put_snapshot(&second, SnapshotSlot::Current, &stats).unwrap());
        assert_eq!(store.get_snapshot(day(3)).unwrap(), Some(second));
    }

    #[test]
    fn snapshot_range_queries() {
        let store = RelationalStore::open_in_memory("u1", "ja").unwrap();
        let stats = sample_stats();
        for d in [2, 5, 9] {
            let snapshot = DailySnapshot::from_aggregate(day(d), stats.aggregate(), None);
            store.put_snapshot(&snapshot, SnapshotSlot::Current, &stats).unwrap();
        }
        assert_eq!(store.snapshot_dates().unwrap(), vec![day(2), day(5), day(9)]);
        assert_eq!(store.latest_snapshot_before(day(9)).unwrap().unwrap().date, day(5));
        assert_eq!(store.latest_snapshot_before(day(2)).unwrap(), None);
        let between: Vec<NaiveDate> = store
            .snapshots_between(day(3), day(9))
            .unwrap()
            .iter()
            .map(|s| s.date)
            .collect();
        assert_eq!(between, vec![day(5), day(9)]);

        assert_eq!(store.prune_before(day(5)).unwrap(), 1);
        assert_eq!(store.snapshot_dates().unwrap(), vec![day(5), day(9)]);
        assert_eq!(store.archive_before(day(9)).unwrap(), 0);
    }

    #[test]
    fn newer_schema_is_refused() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::new(dir.path());
        {
            let store = RelationalStore::open(&config, "u1", "ja").unwrap();
            store
                .conn
                .execute("UPDATE schema_info SET value = '2' WHERE key = 'version'", [])
                .unwrap();
        }
        let result = RelationalStore::open(&config, "u1", "ja");
        assert!(matches!(
            result,
            Err(StoreError::SchemaVersion { found: 2, supported: 1 })
        ));
    }

    #[test]
    fn file_database_persists_between_opens() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::new(dir.path());
        let stats = sample_stats();
        RelationalStore::open(&config, "u1", "ja")
            .unwrap()
            .save_stats(&stats)
            .unwrap();
        assert!(RelationalStore::db_path(&config, "u1", "ja").exists());
        let reopened = RelationalStore::open(&config, "u1", "ja").unwrap();
        assert_eq!(reopened.load_stats().unwrap(), stats);
    }
}
