//! Daily aggregates over a set of word records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::{ActivityMap, ContextualActivity, DirectActivity, WordStatsRecord};

/// Summed counters by category and activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivityTotals {
    pub direct_practice: ActivityMap<DirectActivity>,
    pub contextual_exposure: ActivityMap<ContextualActivity>,
}

impl ActivityTotals {
    pub fn add_record(&mut self, record: &WordStatsRecord) {
        self.direct_practice.add(&record.direct_practice);
        self.contextual_exposure.add(&record.contextual_exposure);
    }
}

/// Aggregate over all current records of a journey.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyAggregate {
    pub exposed_words_count: u64,
    pub words_known_count: u64,
    pub total_questions_answered: u64,
    pub activity_totals: ActivityTotals,
}

impl JourneyAggregate {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a WordStatsRecord>) -> Self {
        let mut aggregate = Self::default();
        for record in records {
            if record.exposed {
                aggregate.exposed_words_count += 1;
            }
            if record.is_known() {
                aggregate.words_known_count += 1;
            }
            aggregate.total_questions_answered = aggregate
                .total_questions_answered
                .saturating_add(record.questions_answered());
            aggregate.activity_totals.add_record(record);
        }
        aggregate
    }
}

/// Aggregate for one calendar day, used as a progress baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySnapshot {
    pub date: NaiveDate,
    pub exposed_words_count: u64,
    pub words_known_count: u64,
    pub total_questions_answered: u64,
    /// Exposed words gained since the most recent earlier snapshot.
    pub newly_exposed_words: u64,
    #[serde(default)]
    pub activity_totals: ActivityTotals,
}

impl DailySnapshot {
    /// Build a snapshot for `date` from an aggregate.
    ///
    /// `prior` is the most recent snapshot strictly before `date`; without one
    /// every exposed word counts as newly exposed.
    pub fn from_aggregate(
        date: NaiveDate,
        aggregate: JourneyAggregate,
        prior: Option<&DailySnapshot>,
    ) -> Self {
        let prior_exposed = prior.map(|p| p.exposed_words_count).unwrap_or(0);
        Self {
            date,
            exposed_words_count: aggregate.exposed_words_count,
            words_known_count: aggregate.words_known_count,
            total_questions_answered: aggregate.total_questions_answered,
            newly_exposed_words: aggregate.exposed_words_count.saturating_sub(prior_exposed),
            activity_totals: aggregate.activity_totals,
        }
    }

    /// All-zero snapshot.
    pub fn zero(date: NaiveDate) -> Self {
        Self::from_aggregate(date, JourneyAggregate::default(), None)
    }

    pub fn aggregate(&self) -> JourneyAggregate {
        JourneyAggregate {
            exposed_words_count: self.exposed_words_count,
            words_known_count: self.words_known_count,
            total_questions_answered: self.total_questions_answered,
            activity_totals: self.activity_totals.clone(),
        }
    }
}
