//! Core learning-progress library shared by the store backends and the
//! migration tool.
//!
//! Provides:
//! - Closed word-stats record type with a total normalizer
//! - Journey stats (all records for one user + language)
//! - Daily aggregates and snapshot types
//! - Progress delta math and forward-only baseline search
//! - Max-based merge for offline-to-online sync

pub mod aggregate;
pub mod error;
pub mod merge;
pub mod progress;
pub mod schema;
pub mod types;

pub use aggregate::{ActivityTotals, DailySnapshot, JourneyAggregate};
pub use error::{CoreError, Result};
pub use merge::{merge_records, merge_stats, MergeCounts, MergeResult};
pub use progress::{
    compute_delta, daily_series, find_best_baseline, parse_iso_date, CountDelta, DailyRow,
    MonthlyProgress, ProgressDelta, ProgressPeriod,
};
pub use schema::{normalize, normalize_stats_map, DOCUMENT_VERSION};
pub use types::{
    Activity, ActivityCounters, ActivityKind, ActivityMap, Category, ContextualActivity,
    DirectActivity, JourneyStats, PracticeHistory, WordStatsRecord,
};
