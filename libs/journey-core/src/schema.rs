//! Canonical record shape and the total normalizer.
//!
//! Everything that reaches a [`WordStatsRecord`] from outside the type system
//! (service calls, files on disk, merge operands) passes through
//! [`normalize`]. It never fails: the worst case is a zero-valued record.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::types::{
    ActivityCounters, ActivityKind, ActivityMap, PracticeHistory, WordStatsRecord,
};

/// Current on-disk document version.
pub const DOCUMENT_VERSION: u32 = 1;

/// Normalize a loosely-typed record.
///
/// - every enumerated activity key is present, unknown keys are dropped
/// - negative counters clamp to 0, fractional counters are floored,
///   non-numeric counters become 0
/// - malformed or negative timestamps are dropped
///
/// `normalize(normalize(x)) == normalize(x)` for every input.
pub fn normalize(raw: &Value) -> WordStatsRecord {
    let Some(obj) = raw.as_object() else {
        return WordStatsRecord::default();
    };

    WordStatsRecord {
        exposed: matches!(obj.get("exposed"), Some(Value::Bool(true))),
        marked_as_known: obj.get("markedAsKnown").and_then(Value::as_bool),
        direct_practice: obj
            .get("directPractice")
            .map(normalize_activity_map)
            .unwrap_or_default(),
        contextual_exposure: obj
            .get("contextualExposure")
            .map(normalize_activity_map)
            .unwrap_or_default(),
        practice_history: obj
            .get("practiceHistory")
            .and_then(Value::as_object)
            .map(normalize_history)
            .unwrap_or_default(),
    }
}

/// Normalize a `{activity: {correct, incorrect}}` mapping.
pub fn normalize_activity_map<A: ActivityKind>(raw: &Value) -> ActivityMap<A> {
    let mut map = ActivityMap::default();
    if let Some(obj) = raw.as_object() {
        for activity in A::ALL {
            if let Some(counters) = obj.get(activity.as_str()).and_then(Value::as_object) {
                map.set(*activity, normalize_counters(counters));
            }
        }
    }
    map
}

/// Normalize a mapping of word-key to raw record.
///
/// Accepts either the bare mapping or a document wrapping it under `stats`.
/// Anything else yields an empty map.
pub fn normalize_stats_map(raw: &Value) -> BTreeMap<String, WordStatsRecord> {
    let inner = match raw.get("stats") {
        Some(stats) if stats.is_object() => stats,
        _ => raw,
    };
    inner
        .as_object()
        .map(|obj| {
            obj.iter()
                .map(|(key, value)| (key.clone(), normalize(value)))
                .collect()
        })
        .unwrap_or_default()
}

/// Re-apply the normalizer's invariants to an already-typed record.
pub(crate) fn renormalize(record: &WordStatsRecord) -> WordStatsRecord {
    let history = record.practice_history;
    WordStatsRecord {
        exposed: record.exposed,
        marked_as_known: record.marked_as_known,
        direct_practice: ActivityMap::default().combine(&record.direct_practice, |_, c| c),
        contextual_exposure: ActivityMap::default().combine(&record.contextual_exposure, |_, c| c),
        practice_history: PracticeHistory {
            last_seen: history.last_seen.filter(|ts| *ts >= 0),
            last_correct_answer: history.last_correct_answer.filter(|ts| *ts >= 0),
            last_incorrect_answer: history.last_incorrect_answer.filter(|ts| *ts >= 0),
        },
    }
}

fn normalize_counters(obj: &Map<String, Value>) -> ActivityCounters {
    ActivityCounters {
        correct: obj.get("correct").map(counter_value).unwrap_or(0),
        incorrect: obj.get("incorrect").map(counter_value).unwrap_or(0),
    }
}

fn normalize_history(obj: &Map<String, Value>) -> PracticeHistory {
    PracticeHistory {
        last_seen: obj.get("lastSeen").and_then(timestamp_value),
        last_correct_answer: obj.get("lastCorrectAnswer").and_then(timestamp_value),
        last_incorrect_answer: obj.get("lastIncorrectAnswer").and_then(timestamp_value),
    }
}

fn counter_value(value: &Value) -> u64 {
    let Value::Number(n) = value else {
        return 0;
    };
    if let Some(v) = n.as_u64() {
        return v;
    }
    if n.as_i64().is_some() {
        // Only negative integers fail as_u64.
        return 0;
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f > 0.0 => f.floor() as u64,
        _ => 0,
    }
}

fn timestamp_value(value: &Value) -> Option<i64> {
    let Value::Number(n) = value else {
        return None;
    };
    if let Some(v) = n.as_i64() {
        return (v >= 0).then_some(v);
    }
    if n.as_u64().is_some() {
        // Beyond i64 range.
        return None;
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f >= 0.0 && f < i64::MAX as f64 => Some(f.floor() as i64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContextualActivity, DirectActivity};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn roundtrip(record: &WordStatsRecord) -> WordStatsRecord {
        normalize(&serde_json::to_value(record).unwrap())
    }

    #[test]
    fn non_object_yields_zero_record() {
        for raw in [json!(null), json!(3), json!("word"), json!([1, 2])] {
            assert_eq!(normalize(&raw), WordStatsRecord::default());
        }
    }

    #[test]
    fn fills_every_activity_key() {
        let record = normalize(&json!({"exposed": true}));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["directPractice"].as_object().unwrap().len(), 10);
        assert_eq!(value["contextualExposure"].as_object().unwrap().len(), 3);
    }

    #[test]
    fn drops_unknown_keys() {
        let record = normalize(&json!({
            "exposed": true,
            "color": "blue",
            "directPractice": {"multipleChoice": {"correct": 2, "bonus": 9}, "dance": {"correct": 4}},
        }));
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("color").is_none());
        assert!(value["directPractice"].get("dance").is_none());
        assert_eq!(record.direct_practice.get(DirectActivity::MultipleChoice).correct, 2);
    }

    #[test]
    fn clamps_negative_and_fractional_counters() {
        let record = normalize(&json!({
            "directPractice": {
                "typing": {"correct": -4, "incorrect": 2.7},
                "listening": {"correct": "many", "incorrect": null}
            },
            "contextualExposure": {"video": {"correct": 1e3}}
        }));
        assert_eq!(record.direct_practice.get(DirectActivity::Typing), ActivityCounters::new(0, 2));
        assert_eq!(record.direct_practice.get(DirectActivity::Listening), ActivityCounters::default());
        assert_eq!(record.contextual_exposure.get(ContextualActivity::Video).correct, 1000);
    }

    #[test]
    fn drops_malformed_timestamps() {
        let record = normalize(&json!({
            "practiceHistory": {
                "lastSeen": "yesterday",
                "lastCorrectAnswer": -10,
                "lastIncorrectAnswer": 1_700_000_000_123.9_f64
            }
        }));
        assert_eq!(record.practice_history.last_seen, None);
        assert_eq!(record.practice_history.last_correct_answer, None);
        assert_eq!(record.practice_history.last_incorrect_answer, Some(1_700_000_000_123));
    }

    #[test]
    fn boolean_fields_require_real_booleans() {
        let record = normalize(&json!({"exposed": "true", "markedAsKnown": 1}));
        assert!(!record.exposed);
        assert_eq!(record.marked_as_known, None);

        let record = normalize(&json!({"exposed": true, "markedAsKnown": false}));
        assert!(record.exposed);
        assert_eq!(record.marked_as_known, Some(false));
    }

    #[test]
    fn normalize_is_idempotent() {
        let inputs = [
            json!({}),
            json!({"exposed": true, "markedAsKnown": true}),
            json!({
                "exposed": 1,
                "directPractice": {"spelling": {"correct": 3.5, "incorrect": -1}},
                "contextualExposure": {"reading": {"correct": 2}, "podcast": {}},
                "practiceHistory": {"lastSeen": 12, "lastCorrectAnswer": "x"}
            }),
            json!([{"exposed": true}]),
        ];
        for raw in inputs {
            let once = normalize(&raw);
            assert_eq!(roundtrip(&once), once);
        }
    }

    #[test]
    fn deserialize_routes_through_normalize() {
        let record: WordStatsRecord =
            serde_json::from_str(r#"{"exposed":true,"directPractice":{"matching":{"correct":-2}},"extra":1}"#)
                .unwrap();
        assert!(record.exposed);
        assert_eq!(record.direct_practice.get(DirectActivity::Matching).correct, 0);
    }

    #[test]
    fn stats_map_accepts_wrapped_and_bare_documents() {
        let bare = json!({"a": {"exposed": true}, "b": 5});
        let wrapped = json!({"version": 1, "stats": {"a": {"exposed": true}, "b": 5}});
        assert_eq!(normalize_stats_map(&bare), normalize_stats_map(&wrapped));
        assert_eq!(normalize_stats_map(&bare).len(), 2);
        assert!(normalize_stats_map(&json!("nope")).is_empty());
    }

    #[test]
    fn renormalize_drops_negative_timestamps() {
        let mut record = WordStatsRecord::default();
        record.practice_history.last_seen = Some(-1);
        record.practice_history.last_correct_answer = Some(4);
        let repaired = renormalize(&record);
        assert_eq!(repaired.practice_history.last_seen, None);
        assert_eq!(repaired.practice_history.last_correct_answer, Some(4));
    }
}
