//! Daily snapshot upkeep over any backend.

use chrono::{Duration, NaiveDate};
use journey_core::{DailySnapshot, JourneyStats};

use crate::backend::{SnapshotSlot, StatsBackend};
use crate::error::Result;

pub struct SnapshotManager<'a> {
    backend: &'a dyn StatsBackend,
}

impl<'a> SnapshotManager<'a> {
    pub fn new(backend: &'a dyn StatsBackend) -> Self {
        Self { backend }
    }

    /// Make sure `today` and the day before both have a snapshot.
    ///
    /// Runs against the persisted state and does nothing once today's
    /// snapshot exists: from then on the persisted state already holds
    /// today's changes and no longer describes yesterday. An existing
    /// snapshot for yesterday is never replaced. A journey without records
    /// gets no snapshots, so the first day a user practises is the earliest
    /// possible baseline.
    pub fn ensure_daily_snapshots(&self, today: NaiveDate) -> Result<()> {
        if self.backend.get_snapshot(today)?.is_some() {
            return Ok(());
        }
        let stats = self.backend.load_stats()?;
        if stats.is_empty() {
            return Ok(());
        }

        let yesterday = today - Duration::days(1);
        if self.backend.get_snapshot(yesterday)?.is_none() {
            let prior = self.backend.latest_snapshot_before(yesterday)?;
            let snapshot = DailySnapshot::from_aggregate(yesterday, stats.aggregate(), prior.as_ref());
            if self.backend.put_snapshot(&snapshot, SnapshotSlot::Yesterday, &stats)? {
                tracing::debug!(date = %yesterday, user = %stats.user, "wrote catch-up snapshot");
            }
        }

        self.save_snapshot_from_current(today, &stats)?;
        Ok(())
    }

    /// Aggregate `stats` into `date`'s snapshot, replacing any existing one.
    pub fn save_snapshot_from_current(
        &self,
        date: NaiveDate,
        stats: &JourneyStats,
    ) -> Result<DailySnapshot> {
        let prior = self.backend.latest_snapshot_before(date)?;
        let snapshot = DailySnapshot::from_aggregate(date, stats.aggregate(), prior.as_ref());
        let written = self
            .backend
            .put_snapshot(&snapshot, SnapshotSlot::Current, stats)?;
        tracing::debug!(date = %date, written, "saved snapshot");
        Ok(snapshot)
    }

    /// Snapshot at `target`, else the first one within `max_days` after it.
    pub fn find_best_baseline(
        &self,
        target: NaiveDate,
        max_days: u32,
    ) -> Result<Option<DailySnapshot>> {
        journey_core::find_best_baseline(target, max_days, |date| self.backend.get_snapshot(date))
    }
}
