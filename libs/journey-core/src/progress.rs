//! Progress deltas against historical baselines.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::aggregate::{DailySnapshot, JourneyAggregate};
use crate::error::{CoreError, Result};
use crate::types::{ActivityCounters, ActivityMap, ContextualActivity, DirectActivity};

/// Period a delta was computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl ProgressPeriod {
    /// Days back from today to the target baseline, and the forward search
    /// window used when that exact day has no snapshot.
    pub fn baseline_window(&self) -> (i64, u32) {
        match self {
            Self::Daily => (1, 0),
            Self::Weekly => (7, 7),
            Self::Monthly => (30, 30),
        }
    }
}

/// Gained / current count pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountDelta {
    pub new: u64,
    pub total: u64,
}

/// Current state minus a baseline, clamped non-negative everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressDelta {
    pub period: ProgressPeriod,
    pub baseline_date: Option<NaiveDate>,
    pub exposed: CountDelta,
    pub words_known: CountDelta,
    pub questions_answered: u64,
    pub direct_practice: ActivityMap<DirectActivity>,
    pub contextual_exposure: ActivityMap<ContextualActivity>,
}

/// One row of the trailing daily series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRow {
    pub date: NaiveDate,
    pub exposed_words_count: u64,
    pub words_known_count: u64,
    pub total_questions_answered: u64,
    pub newly_exposed_words: u64,
}

impl DailyRow {
    fn zero(date: NaiveDate) -> Self {
        Self {
            date,
            exposed_words_count: 0,
            words_known_count: 0,
            total_questions_answered: 0,
            newly_exposed_words: 0,
        }
    }
}

impl From<&DailySnapshot> for DailyRow {
    fn from(snapshot: &DailySnapshot) -> Self {
        Self {
            date: snapshot.date,
            exposed_words_count: snapshot.exposed_words_count,
            words_known_count: snapshot.words_known_count,
            total_questions_answered: snapshot.total_questions_answered,
            newly_exposed_words: snapshot.newly_exposed_words,
        }
    }
}

/// Monthly delta plus the trailing daily series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyProgress {
    #[serde(flatten)]
    pub delta: ProgressDelta,
    pub daily: Vec<DailyRow>,
}

/// Compute `current − baseline` with every counter clamped at zero.
///
/// A missing baseline is treated as all zeros.
pub fn compute_delta(
    period: ProgressPeriod,
    current: &JourneyAggregate,
    baseline: Option<&DailySnapshot>,
) -> ProgressDelta {
    let base = baseline.map(DailySnapshot::aggregate).unwrap_or_default();
    let clamp = |now: ActivityCounters, then: ActivityCounters| ActivityCounters {
        correct: now.correct.saturating_sub(then.correct),
        incorrect: now.incorrect.saturating_sub(then.incorrect),
    };

    ProgressDelta {
        period,
        baseline_date: baseline.map(|b| b.date),
        exposed: CountDelta {
            new: current
                .exposed_words_count
                .saturating_sub(base.exposed_words_count),
            total: current.exposed_words_count,
        },
        words_known: CountDelta {
            new: current.words_known_count.saturating_sub(base.words_known_count),
            total: current.words_known_count,
        },
        questions_answered: current
            .total_questions_answered
            .saturating_sub(base.total_questions_answered),
        direct_practice: current
            .activity_totals
            .direct_practice
            .combine(&base.activity_totals.direct_practice, clamp),
        contextual_exposure: current
            .activity_totals
            .contextual_exposure
            .combine(&base.activity_totals.contextual_exposure, clamp),
    }
}

/// Find the snapshot to use as "before" for `target`.
///
/// Exact match first, then forward only (`target + 1 ..= target + max_days`),
/// returning the first hit. Earlier dates are never considered, so a user who
/// skipped days gets a later, more conservative baseline rather than an
/// invented earlier one.
pub fn find_best_baseline<T, E>(
    target: NaiveDate,
    max_days: u32,
    mut lookup: impl FnMut(NaiveDate) -> std::result::Result<Option<T>, E>,
) -> std::result::Result<Option<T>, E> {
    for offset in 0..=i64::from(max_days) {
        let date = target + Duration::days(offset);
        if let Some(found) = lookup(date)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// Trailing series of `days` rows ending at `end` (oldest first).
///
/// Days without a snapshot render as all-zero rows.
pub fn daily_series(end: NaiveDate, days: u32, snapshots: &[DailySnapshot]) -> Vec<DailyRow> {
    let by_date: BTreeMap<NaiveDate, &DailySnapshot> =
        snapshots.iter().map(|s| (s.date, s)).collect();

    (0..i64::from(days))
        .rev()
        .map(|back| end - Duration::days(back))
        .map(|date| {
            by_date
                .get(&date)
                .map(|s| DailyRow::from(*s))
                .unwrap_or_else(|| DailyRow::zero(date))
        })
        .collect()
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_iso_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| CoreError::InvalidDate(s.to_string()))
}
