//! SQLite schema definitions.

/// Schema version this build reads and writes.
pub const SCHEMA_VERSION: i64 = 1;

/// Complete schema for one journey database.
pub const SCHEMA: &str = r#"
-- One row per word-key
CREATE TABLE IF NOT EXISTS word_stats (
    word_key TEXT PRIMARY KEY,
    exposed INTEGER NOT NULL DEFAULT 0,
    marked_as_known INTEGER,
    last_seen INTEGER,
    last_correct_answer INTEGER,
    last_incorrect_answer INTEGER
);

-- Non-zero counters only; missing rows read back as zero
CREATE TABLE IF NOT EXISTS word_activity_stats (
    word_key TEXT NOT NULL REFERENCES word_stats(word_key) ON DELETE CASCADE,
    category TEXT NOT NULL,
    activity TEXT NOT NULL,
    correct INTEGER NOT NULL DEFAULT 0,
    incorrect INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (word_key, category, activity)
);

-- Daily aggregates
CREATE TABLE IF NOT EXISTS daily_snapshots (
    date TEXT PRIMARY KEY,
    exposed_words_count INTEGER NOT NULL DEFAULT 0,
    words_known_count INTEGER NOT NULL DEFAULT 0,
    total_questions_answered INTEGER NOT NULL DEFAULT 0,
    newly_exposed_words INTEGER NOT NULL DEFAULT 0,
    activity_totals_json TEXT NOT NULL DEFAULT '{}'
);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_info (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Record the schema version on a fresh database.
pub const INIT_SCHEMA_INFO: &str = r#"
INSERT OR IGNORE INTO schema_info (key, value) VALUES ('version', '1');
"#;
