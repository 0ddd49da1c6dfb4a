//! Per-journey facade used by the service layer.
//!
//! Every operation loads the journey, applies its change and saves it again;
//! nothing is cached between calls.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Duration;
use journey_core::{
    merge_stats, Activity, JourneyStats, MergeResult, MonthlyProgress, ProgressDelta,
    WordStatsRecord,
};

use crate::backend::{open_backend, BackendKind, StatsBackend};
use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::nonce::{FileNonceLedger, NonceLedger};
use crate::progress::ProgressCalculator;
use crate::snapshot::SnapshotManager;

/// Result of an increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncrementOutcome {
    /// Applied and saved; carries the updated record.
    Applied(WordStatsRecord),
    /// The nonce was already used today; carries the unchanged record.
    Duplicate(WordStatsRecord),
}

impl IncrementOutcome {
    pub fn record(&self) -> &WordStatsRecord {
        match self {
            Self::Applied(record) | Self::Duplicate(record) => record,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

/// One event of a bulk increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncrementItem {
    pub key: String,
    pub activity: Activity,
    pub correct: bool,
    pub timestamp_ms: i64,
}

impl IncrementItem {
    pub fn new(key: impl Into<String>, activity: Activity, correct: bool, timestamp_ms: i64) -> Self {
        Self {
            key: key.into(),
            activity,
            correct,
            timestamp_ms,
        }
    }

    /// Build from wire strings. `None` for an unknown category / activity.
    pub fn parse(
        key: impl Into<String>,
        category: &str,
        activity: &str,
        correct: bool,
        timestamp_ms: i64,
    ) -> Option<Self> {
        Activity::parse(category, activity).map(|a| Self::new(key, a, correct, timestamp_ms))
    }
}

/// Result of a bulk increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkOutcome {
    Applied(usize),
    Duplicate,
}

pub struct JourneyStore {
    user: String,
    language: String,
    backend: Box<dyn StatsBackend>,
    clock: Arc<dyn Clock>,
    ledger: Arc<dyn NonceLedger>,
}

impl JourneyStore {
    /// Open the journey with the backend its settings select, the wall
    /// clock, and a file ledger under the data root.
    pub fn open(config: &StoreConfig, user: &str, language: &str) -> Result<Self> {
        let backend = open_backend(config, user, language)?;
        Ok(Self::with_backend(
            backend,
            user,
            language,
            Arc::new(SystemClock::new(config.daily_reset_hour)),
            Arc::new(FileNonceLedger::from_config(config)),
        ))
    }

    pub fn with_backend(
        backend: Box<dyn StatsBackend>,
        user: &str,
        language: &str,
        clock: Arc<dyn Clock>,
        ledger: Arc<dyn NonceLedger>,
    ) -> Self {
        Self {
            user: user.to_string(),
            language: language.to_string(),
            backend,
            clock,
            ledger,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn NonceLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Current stats; empty when the backend cannot be read.
    pub fn load(&self) -> JourneyStats {
        match self.backend.load_stats() {
            Ok(stats) => stats,
            Err(err) => {
                tracing::warn!(user = %self.user, language = %self.language, error = %err, "load failed; using empty stats");
                JourneyStats::new(self.user.clone(), self.language.clone())
            }
        }
    }

    /// Stats a mutation starts from. Unlike [`Self::load`], a backend
    /// failure is reported so nothing is saved over a journey that could
    /// not be read.
    fn load_for_update(&self) -> Result<JourneyStats> {
        self.backend.load_stats().map_err(|err| {
            tracing::warn!(user = %self.user, language = %self.language, error = %err, "load failed; refusing to update");
            self.save_failed()
        })
    }

    /// Persist `stats`. A write refused by the size guard still reports true.
    pub fn save(&self, stats: &JourneyStats) -> bool {
        match self.backend.save_stats(stats) {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(user = %self.user, language = %self.language, error = %err, "save failed");
                false
            }
        }
    }

    /// Save and keep daily snapshots current.
    ///
    /// Snapshots for yesterday and today are first filled in from the
    /// persisted (pre-change) state, then `stats` is saved and today's
    /// snapshot is recomputed from it. Snapshot failures are logged and do
    /// not fail the save.
    pub fn save_with_daily_update(&self, stats: &JourneyStats) -> bool {
        let today = self.clock.today();
        let snapshots = SnapshotManager::new(self.backend.as_ref());
        if let Err(err) = snapshots.ensure_daily_snapshots(today) {
            tracing::warn!(user = %self.user, error = %err, "could not ensure daily snapshots");
        }

        if !self.save(stats) {
            return false;
        }

        if !stats.is_empty() {
            if let Err(err) = snapshots.save_snapshot_from_current(today, stats) {
                tracing::warn!(user = %self.user, date = %today, error = %err, "could not update today's snapshot");
            }
        }
        true
    }

    pub fn get_word_stats(&self, key: &str) -> WordStatsRecord {
        self.load().get_word_stats(key)
    }

    pub fn set_word_stats(&self, key: &str, record: WordStatsRecord) -> bool {
        let Ok(mut stats) = self.load_for_update() else {
            return false;
        };
        stats.set_word_stats(key, record);
        self.save_with_daily_update(&stats)
    }

    pub fn set_marked_as_known(&self, key: &str, known: bool) -> bool {
        let Ok(mut stats) = self.load_for_update() else {
            return false;
        };
        stats.set_marked_as_known(key, known);
        self.save_with_daily_update(&stats)
    }

    /// Apply one practice event.
    ///
    /// With a nonce, a retry of an event already applied today changes
    /// nothing and returns [`IncrementOutcome::Duplicate`]. The nonce is
    /// recorded only once the save has succeeded.
    pub fn increment_word_stat(
        &self,
        key: &str,
        activity: Activity,
        correct: bool,
        timestamp_ms: i64,
        nonce: Option<&str>,
    ) -> Result<IncrementOutcome> {
        if self.is_duplicate(nonce)? {
            return Ok(IncrementOutcome::Duplicate(self.get_word_stats(key)));
        }

        let mut stats = self.load_for_update()?;
        let record = stats.increment(key, activity, correct, timestamp_ms);
        self.commit(&stats, nonce)?;
        Ok(IncrementOutcome::Applied(record))
    }

    /// [`Self::increment_word_stat`] from wire strings. An unknown
    /// category / activity pair is ignored and returns `None`.
    pub fn increment_word_stat_raw(
        &self,
        key: &str,
        category: &str,
        activity: &str,
        correct: bool,
        timestamp_ms: i64,
        nonce: Option<&str>,
    ) -> Result<Option<IncrementOutcome>> {
        match Activity::parse(category, activity) {
            Some(activity) => self
                .increment_word_stat(key, activity, correct, timestamp_ms, nonce)
                .map(Some),
            None => {
                tracing::debug!(%category, %activity, "ignoring increment for unknown activity");
                Ok(None)
            }
        }
    }

    /// Apply a batch of events with one load, one save and one nonce.
    pub fn increment_bulk(&self, items: &[IncrementItem], nonce: Option<&str>) -> Result<BulkOutcome> {
        if self.is_duplicate(nonce)? {
            return Ok(BulkOutcome::Duplicate);
        }
        if items.is_empty() {
            return Ok(BulkOutcome::Applied(0));
        }

        let mut stats = self.load_for_update()?;
        for item in items {
            stats.increment(&item.key, item.activity, item.correct, item.timestamp_ms);
        }
        self.commit(&stats, nonce)?;
        Ok(BulkOutcome::Applied(items.len()))
    }

    fn is_duplicate(&self, nonce: Option<&str>) -> Result<bool> {
        match nonce {
            Some(nonce) => self.ledger.contains(&self.user, self.clock.today(), nonce),
            None => Ok(false),
        }
    }

    fn commit(&self, stats: &JourneyStats, nonce: Option<&str>) -> Result<()> {
        if !self.save_with_daily_update(stats) {
            return Err(self.save_failed());
        }
        if let Some(nonce) = nonce {
            if let Err(err) = self.ledger.record(&self.user, self.clock.today(), nonce) {
                tracing::warn!(user = %self.user, error = %err, "increment saved but nonce not recorded");
            }
        }
        Ok(())
    }

    fn save_failed(&self) -> StoreError {
        StoreError::SaveFailed {
            user: self.user.clone(),
            language: self.language.clone(),
        }
    }

    pub fn daily_progress(&self) -> Result<ProgressDelta> {
        ProgressCalculator::new(self.backend.as_ref()).daily(self.clock.today())
    }

    pub fn weekly_progress(&self) -> Result<ProgressDelta> {
        ProgressCalculator::new(self.backend.as_ref()).weekly(self.clock.today())
    }

    pub fn monthly_progress(&self) -> Result<MonthlyProgress> {
        ProgressCalculator::new(self.backend.as_ref()).monthly(self.clock.today())
    }

    /// Merge a dataset collected offline into this journey and save it.
    pub fn merge_local_stats(&self, local: &BTreeMap<String, WordStatsRecord>) -> Result<MergeResult> {
        let result = merge_stats(&self.load_for_update()?, local);
        if !self.save_with_daily_update(&result.merged) {
            return Err(self.save_failed());
        }
        tracing::info!(
            user = %self.user,
            language = %self.language,
            added = result.counts.added_words,
            updated = result.counts.updated_words,
            "merged local stats"
        );
        Ok(result)
    }

    pub fn ensure_daily_snapshots(&self) -> Result<()> {
        SnapshotManager::new(self.backend.as_ref()).ensure_daily_snapshots(self.clock.today())
    }

    /// Archive snapshots more than `older_than_days` days old.
    pub fn archive_snapshots(&self, older_than_days: u32) -> Result<usize> {
        let before = self.clock.today() - Duration::days(i64::from(older_than_days));
        self.backend.archive_before(before)
    }

    /// Delete snapshots more than `retain_days` days old.
    pub fn prune_snapshots(&self, retain_days: u32) -> Result<usize> {
        let keep_from = self.clock.today() - Duration::days(i64::from(retain_days));
        self.backend.prune_before(keep_from)
    }
}
