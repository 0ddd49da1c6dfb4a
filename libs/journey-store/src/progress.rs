//! Day / week / month progress for one journey.

use chrono::{Duration, NaiveDate};
use journey_core::{
    compute_delta, daily_series, JourneyAggregate, MonthlyProgress, ProgressDelta, ProgressPeriod,
};

use crate::backend::StatsBackend;
use crate::error::Result;
use crate::snapshot::SnapshotManager;

/// Rows in the monthly trailing series.
pub const MONTHLY_SERIES_DAYS: u32 = 30;

pub struct ProgressCalculator<'a> {
    backend: &'a dyn StatsBackend,
}

impl<'a> ProgressCalculator<'a> {
    pub fn new(backend: &'a dyn StatsBackend) -> Self {
        Self { backend }
    }

    pub fn daily(&self, today: NaiveDate) -> Result<ProgressDelta> {
        self.delta(ProgressPeriod::Daily, today)
    }

    pub fn weekly(&self, today: NaiveDate) -> Result<ProgressDelta> {
        self.delta(ProgressPeriod::Weekly, today)
    }

    pub fn monthly(&self, today: NaiveDate) -> Result<MonthlyProgress> {
        let delta = self.delta(ProgressPeriod::Monthly, today)?;
        let from = today - Duration::days(i64::from(MONTHLY_SERIES_DAYS) - 1);
        let snapshots = self.backend.snapshots_between(from, today)?;
        Ok(MonthlyProgress {
            delta,
            daily: daily_series(today, MONTHLY_SERIES_DAYS, &snapshots),
        })
    }

    fn delta(&self, period: ProgressPeriod, today: NaiveDate) -> Result<ProgressDelta> {
        let current = self.current_aggregate()?;
        let (days_back, window) = period.baseline_window();
        let baseline = SnapshotManager::new(self.backend)
            .find_best_baseline(today - Duration::days(days_back), window)?;
        Ok(compute_delta(period, &current, baseline.as_ref()))
    }

    fn current_aggregate(&self) -> Result<JourneyAggregate> {
        Ok(self.backend.load_stats()?.aggregate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SnapshotSlot;
    use crate::sqlite::RelationalStore;
    use journey_core::{CountDelta, DailySnapshot, DirectActivity, JourneyStats};
    use pretty_assertions::assert_eq;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, d).unwrap()
    }

    #[test]
    fn never_practised_user_has_zero_progress() {
        let store = RelationalStore::open_in_memory("u", "pt").unwrap();
        let calculator = ProgressCalculator::new(&store);
        let daily = calculator.daily(day(15)).unwrap();
        assert_eq!(daily.exposed, CountDelta::default());
        assert_eq!(daily.questions_answered, 0);
        assert_eq!(daily.baseline_date, None);

        let monthly = calculator.monthly(day(15)).unwrap();
        assert_eq!(monthly.daily.len(), 30);
        assert!(monthly.daily.iter().all(|row| row.exposed_words_count == 0));
    }

    #[test]
    fn daily_uses_only_yesterday() {
        let store = RelationalStore::open_in_memory("u", "pt").unwrap();
        let mut stats = JourneyStats::new("u", "pt");
        stats.increment("a", DirectActivity::Translation.into(), true, 1);
        let old = DailySnapshot::from_aggregate(day(12), stats.aggregate(), None);
        store.put_snapshot(&old, SnapshotSlot::Current, &stats).unwrap();

        stats.increment("b", DirectActivity::Translation.into(), true, 2);
        store.save_stats(&stats).unwrap();

        // Day 13 has no snapshot; daily never searches further.
        let daily = ProgressCalculator::new(&store).daily(day(14)).unwrap();
        assert_eq!(daily.exposed, CountDelta { new: 2, total: 2 });
        assert_eq!(daily.baseline_date, None);
    }

    #[test]
    fn monthly_series_ends_today() {
        let store = RelationalStore::open_in_memory("u", "pt").unwrap();
        let mut stats = JourneyStats::new("u", "pt");
        stats.increment("a", DirectActivity::Flashcard.into(), false, 1);
        store.save_stats(&stats).unwrap();
        let snapshot = DailySnapshot::from_aggregate(day(30), stats.aggregate(), None);
        store.put_snapshot(&snapshot, SnapshotSlot::Current, &stats).unwrap();

        let monthly = ProgressCalculator::new(&store).monthly(day(30)).unwrap();
        assert_eq!(monthly.daily.first().unwrap().date, day(1));
        assert_eq!(monthly.daily.last().unwrap().exposed_words_count, 1);
        assert_eq!(monthly.delta.period, ProgressPeriod::Monthly);
    }
}
