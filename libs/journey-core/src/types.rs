//! Core types for learning-progress tracking.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::aggregate::JourneyAggregate;
use crate::error::{CoreError, Result};
use crate::schema;

/// A closed set of activities that can be counted per word.
pub trait ActivityKind: Copy + Ord + fmt::Debug + 'static {
    /// Every member, in serialization order.
    const ALL: &'static [Self];

    /// Wire name (camelCase).
    fn as_str(self) -> &'static str;

    /// Parse from wire name.
    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|a| a.as_str() == name)
    }
}

/// Activities whose correctness counts toward proficiency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DirectActivity {
    MultipleChoice,
    Typing,
    Listening,
    Speaking,
    Flashcard,
    Matching,
    Spelling,
    Translation,
    ClozeDeletion,
    WordOrdering,
}

impl ActivityKind for DirectActivity {
    const ALL: &'static [Self] = &[
        Self::MultipleChoice,
        Self::Typing,
        Self::Listening,
        Self::Speaking,
        Self::Flashcard,
        Self::Matching,
        Self::Spelling,
        Self::Translation,
        Self::ClozeDeletion,
        Self::WordOrdering,
    ];

    fn as_str(self) -> &'static str {
        match self {
            Self::MultipleChoice => "multipleChoice",
            Self::Typing => "typing",
            Self::Listening => "listening",
            Self::Speaking => "speaking",
            Self::Flashcard => "flashcard",
            Self::Matching => "matching",
            Self::Spelling => "spelling",
            Self::Translation => "translation",
            Self::ClozeDeletion => "clozeDeletion",
            Self::WordOrdering => "wordOrdering",
        }
    }
}

/// Activities that expose a word without counting toward proficiency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContextualActivity {
    Reading,
    AudioStory,
    Video,
}

impl ActivityKind for ContextualActivity {
    const ALL: &'static [Self] = &[Self::Reading, Self::AudioStory, Self::Video];

    fn as_str(self) -> &'static str {
        match self {
            Self::Reading => "reading",
            Self::AudioStory => "audioStory",
            Self::Video => "video",
        }
    }
}

/// Counter category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    DirectPractice,
    ContextualExposure,
}

impl Category {
    pub const ALL: [Category; 2] = [Self::DirectPractice, Self::ContextualExposure];

    /// Get the category name as stored on disk.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectPractice => "directPractice",
            Self::ContextualExposure => "contextualExposure",
        }
    }

    /// Parse from string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "directPractice" => Some(Self::DirectPractice),
            "contextualExposure" => Some(Self::ContextualExposure),
            _ => None,
        }
    }
}

/// One activity within its category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Activity {
    Direct(DirectActivity),
    Contextual(ContextualActivity),
}

impl Activity {
    pub fn category(&self) -> Category {
        match self {
            Self::Direct(_) => Category::DirectPractice,
            Self::Contextual(_) => Category::ContextualExposure,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct(a) => a.as_str(),
            Self::Contextual(a) => a.as_str(),
        }
    }

    /// Lenient parse of a (category, activity) pair from wire strings.
    pub fn parse(category: &str, activity: &str) -> Option<Self> {
        Self::try_parse(category, activity).ok()
    }

    /// Strict parse reporting which half of the pair was not recognised.
    pub fn try_parse(category: &str, activity: &str) -> Result<Self> {
        let parsed = match Category::from_name(category) {
            Some(Category::DirectPractice) => DirectActivity::from_name(activity).map(Self::Direct),
            Some(Category::ContextualExposure) => {
                ContextualActivity::from_name(activity).map(Self::Contextual)
            }
            None => return Err(CoreError::UnknownCategory(category.to_string())),
        };
        parsed.ok_or_else(|| CoreError::UnknownActivity {
            category: category.to_string(),
            activity: activity.to_string(),
        })
    }
}

impl From<DirectActivity> for Activity {
    fn from(activity: DirectActivity) -> Self {
        Self::Direct(activity)
    }
}

impl From<ContextualActivity> for Activity {
    fn from(activity: ContextualActivity) -> Self {
        Self::Contextual(activity)
    }
}

/// Correct / incorrect counters for one activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActivityCounters {
    pub correct: u64,
    pub incorrect: u64,
}

impl ActivityCounters {
    pub fn new(correct: u64, incorrect: u64) -> Self {
        Self { correct, incorrect }
    }

    pub fn answered(&self) -> u64 {
        self.correct.saturating_add(self.incorrect)
    }

    pub fn is_zero(&self) -> bool {
        self.correct == 0 && self.incorrect == 0
    }
}

/// Counters keyed by every member of an activity enumeration.
///
/// Always holds an entry for each member, so serialized output lists the
/// full activity set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityMap<A: ActivityKind> {
    counters: BTreeMap<A, ActivityCounters>,
}

impl<A: ActivityKind> Default for ActivityMap<A> {
    fn default() -> Self {
        Self {
            counters: A::ALL
                .iter()
                .map(|a| (*a, ActivityCounters::default()))
                .collect(),
        }
    }
}

impl<A: ActivityKind> ActivityMap<A> {
    pub fn get(&self, activity: A) -> ActivityCounters {
        self.counters.get(&activity).copied().unwrap_or_default()
    }

    pub fn get_mut(&mut self, activity: A) -> &mut ActivityCounters {
        self.counters.entry(activity).or_default()
    }

    pub fn set(&mut self, activity: A, counters: ActivityCounters) {
        self.counters.insert(activity, counters);
    }

    pub fn iter(&self) -> impl Iterator<Item = (A, ActivityCounters)> + '_ {
        self.counters.iter().map(|(a, c)| (*a, *c))
    }

    /// Sum of all counters.
    pub fn total(&self) -> ActivityCounters {
        self.counters
            .values()
            .fold(ActivityCounters::default(), |acc, c| ActivityCounters {
                correct: acc.correct.saturating_add(c.correct),
                incorrect: acc.incorrect.saturating_add(c.incorrect),
            })
    }

    /// Combine two maps entry by entry.
    pub fn combine(
        &self,
        other: &Self,
        f: impl Fn(ActivityCounters, ActivityCounters) -> ActivityCounters,
    ) -> Self {
        Self {
            counters: A::ALL
                .iter()
                .map(|a| (*a, f(self.get(*a), other.get(*a))))
                .collect(),
        }
    }

    pub fn add(&mut self, other: &Self) {
        *self = self.combine(other, |a, b| ActivityCounters {
            correct: a.correct.saturating_add(b.correct),
            incorrect: a.incorrect.saturating_add(b.incorrect),
        });
    }
}

impl<A: ActivityKind> Serialize for ActivityMap<A> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.counters.iter().map(|(a, c)| (a.as_str(), c)))
    }
}

impl<'de, A: ActivityKind> Deserialize<'de> for ActivityMap<A> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(schema::normalize_activity_map(&value))
    }
}

/// Timestamps (epoch milliseconds) of the most recent practice events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeHistory {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_correct_answer: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_incorrect_answer: Option<i64>,
}

/// Practice counters for one word-key.
///
/// Deserialization goes through [`schema::normalize`], so unknown keys are
/// dropped and malformed values are repaired instead of rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WordStatsRecord {
    pub exposed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marked_as_known: Option<bool>,
    pub direct_practice: ActivityMap<DirectActivity>,
    pub contextual_exposure: ActivityMap<ContextualActivity>,
    pub practice_history: PracticeHistory,
}

impl<'de> Deserialize<'de> for WordStatsRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(schema::normalize(&value))
    }
}

impl WordStatsRecord {
    pub fn counters(&self, activity: Activity) -> ActivityCounters {
        match activity {
            Activity::Direct(a) => self.direct_practice.get(a),
            Activity::Contextual(a) => self.contextual_exposure.get(a),
        }
    }

    pub fn counters_mut(&mut self, activity: Activity) -> &mut ActivityCounters {
        match activity {
            Activity::Direct(a) => self.direct_practice.get_mut(a),
            Activity::Contextual(a) => self.contextual_exposure.get_mut(a),
        }
    }

    pub fn is_known(&self) -> bool {
        self.marked_as_known == Some(true)
    }

    /// Questions answered through direct practice.
    pub fn questions_answered(&self) -> u64 {
        self.direct_practice.total().answered()
    }

    /// Apply one practice event.
    ///
    /// `last_seen` (and the matching last-answer timestamp for direct
    /// practice) is set to `timestamp_ms` even when it is older than the
    /// stored value. A negative timestamp is malformed and leaves the
    /// stored timestamps alone; the counters still move.
    pub fn record_answer(&mut self, activity: Activity, correct: bool, timestamp_ms: i64) {
        self.exposed = true;
        let counters = self.counters_mut(activity);
        if correct {
            counters.correct = counters.correct.saturating_add(1);
        } else {
            counters.incorrect = counters.incorrect.saturating_add(1);
        }

        if timestamp_ms < 0 {
            return;
        }
        let timestamp = Some(timestamp_ms);
        self.practice_history.last_seen = timestamp;
        if let Activity::Direct(_) = activity {
            if correct {
                self.practice_history.last_correct_answer = timestamp;
            } else {
                self.practice_history.last_incorrect_answer = timestamp;
            }
        }
    }
}

/// All word records for one user + language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JourneyStats {
    pub user: String,
    pub language: String,
    #[serde(rename = "stats")]
    words: BTreeMap<String, WordStatsRecord>,
}

impl JourneyStats {
    /// Create empty stats for a user + language.
    pub fn new(user: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            language: language.into(),
            words: BTreeMap::new(),
        }
    }

    pub fn with_words(mut self, words: BTreeMap<String, WordStatsRecord>) -> Self {
        self.words = words;
        self
    }

    pub fn words(&self) -> &BTreeMap<String, WordStatsRecord> {
        &self.words
    }

    pub fn into_words(self) -> BTreeMap<String, WordStatsRecord> {
        self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Record for a key, or a zero record when the key was never written.
    pub fn get_word_stats(&self, key: &str) -> WordStatsRecord {
        self.words.get(key).cloned().unwrap_or_default()
    }

    /// Replace a record. The record is normalized on the way in.
    pub fn set_word_stats(&mut self, key: impl Into<String>, record: WordStatsRecord) {
        self.words.insert(key.into(), schema::renormalize(&record));
    }

    /// Apply one practice event, creating the record on first write.
    pub fn increment(
        &mut self,
        key: &str,
        activity: Activity,
        correct: bool,
        timestamp_ms: i64,
    ) -> WordStatsRecord {
        let record = self.words.entry(key.to_string()).or_default();
        record.record_answer(activity, correct, timestamp_ms);
        record.clone()
    }

    pub fn set_marked_as_known(&mut self, key: &str, known: bool) -> WordStatsRecord {
        let record = self.words.entry(key.to_string()).or_default();
        record.marked_as_known = Some(known);
        record.clone()
    }

    /// Aggregate counters over every record.
    pub fn aggregate(&self) -> JourneyAggregate {
        JourneyAggregate::from_records(self.words.values())
    }
}
