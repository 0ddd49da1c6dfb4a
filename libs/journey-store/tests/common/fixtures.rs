//! Fixture factories.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::json;

use journey_core::{normalize, DirectActivity, JourneyStats, WordStatsRecord};

/// A date in the fixture month.
pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
}

/// Record as a client might upload it, including keys this build ignores.
pub fn uploaded_record() -> WordStatsRecord {
    normalize(&json!({
        "exposed": true,
        "markedAsKnown": true,
        "directPractice": {
            "multipleChoice": {"correct": 4, "incorrect": 2},
            "typing": {"correct": 1.9},
            "hologram": {"correct": 100}
        },
        "contextualExposure": {"reading": {"correct": 3}},
        "practiceHistory": {"lastSeen": 1_700_000_000_000i64, "lastCorrectAnswer": 1_699_999_000_000i64},
        "legacyField": "dropped"
    }))
}

/// Journey with `words` exposed words, each answered once correctly.
pub fn journey_with_words(user: &str, language: &str, words: usize) -> JourneyStats {
    let mut stats = JourneyStats::new(user, language);
    for i in 0..words {
        stats.increment(
            &format!("word-{i:05}"),
            DirectActivity::MultipleChoice.into(),
            true,
            1_700_000_000_000 + i as i64,
        );
    }
    stats
}

/// Local (offline) dataset keyed by word.
pub fn local_dataset(entries: &[(&str, serde_json::Value)]) -> BTreeMap<String, WordStatsRecord> {
    entries
        .iter()
        .map(|(key, raw)| (key.to_string(), normalize(raw)))
        .collect()
}
