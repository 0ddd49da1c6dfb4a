//! Max-based merge used when an offline dataset attaches to a server account.
//!
//! Counters take the max of both sides, never the sum, so two datasets that
//! overlap are not double counted.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::types::{ActivityCounters, JourneyStats, PracticeHistory, WordStatsRecord};

/// Counts describing what a merge changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeCounts {
    pub server_words: usize,
    pub local_words: usize,
    /// Words present only in the local dataset.
    pub added_words: usize,
    /// Server words whose record changed.
    pub updated_words: usize,
    pub total_words: usize,
}

/// Merged stats plus counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeResult {
    pub merged: JourneyStats,
    pub counts: MergeCounts,
}

/// Merge two records.
///
/// Counters: max. Timestamps: max with absent treated as −∞. Booleans: OR.
pub fn merge_records(server: &WordStatsRecord, local: &WordStatsRecord) -> WordStatsRecord {
    let max_counters = |a: ActivityCounters, b: ActivityCounters| ActivityCounters {
        correct: a.correct.max(b.correct),
        incorrect: a.incorrect.max(b.incorrect),
    };

    WordStatsRecord {
        exposed: server.exposed || local.exposed,
        marked_as_known: match (server.marked_as_known, local.marked_as_known) {
            (Some(a), Some(b)) => Some(a || b),
            (a, b) => a.or(b),
        },
        direct_practice: server
            .direct_practice
            .combine(&local.direct_practice, max_counters),
        contextual_exposure: server
            .contextual_exposure
            .combine(&local.contextual_exposure, max_counters),
        practice_history: PracticeHistory {
            last_seen: server
                .practice_history
                .last_seen
                .max(local.practice_history.last_seen),
            last_correct_answer: server
                .practice_history
                .last_correct_answer
                .max(local.practice_history.last_correct_answer),
            last_incorrect_answer: server
                .practice_history
                .last_incorrect_answer
                .max(local.practice_history.last_incorrect_answer),
        },
    }
}

/// Merge a local dataset into the server's stats.
///
/// The result keeps the server's user and language and holds the union of
/// both key sets.
pub fn merge_stats(
    server: &JourneyStats,
    local: &BTreeMap<String, WordStatsRecord>,
) -> MergeResult {
    let mut words = server.words().clone();
    let mut counts = MergeCounts {
        server_words: server.len(),
        local_words: local.len(),
        ..Default::default()
    };

    for (key, local_record) in local {
        match words.get_mut(key) {
            Some(existing) => {
                let merged = merge_records(existing, local_record);
                if merged != *existing {
                    counts.updated_words += 1;
                    *existing = merged;
                }
            }
            None => {
                counts.added_words += 1;
                words.insert(key.clone(), merge_records(&WordStatsRecord::default(), local_record));
            }
        }
    }

    counts.total_words = words.len();
    MergeResult {
        merged: JourneyStats::new(server.user.clone(), server.language.clone()).with_words(words),
        counts,
    }
}
