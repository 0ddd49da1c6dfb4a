//! Flat-file to SQLite migration.

mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;

use common::fixtures::{self, day};
use common::{TestContext, LANGUAGE, USER};
use journey_core::{Activity, DailySnapshot, DirectActivity, JourneyStats};
use journey_store::atomic::backup_path;
use journey_store::{
    migrate_all, migrate_user, read_backend_kind, BackendKind, DailyDocument, DailyKind, FileLock,
    MigrationOptions, RelationalStore, StatsBackend, StoreError,
};

/// Three days of practice on the flat-file backend, the first archived.
fn seeded(ctx: &TestContext) -> JourneyStats {
    let store = ctx.store(BackendKind::FlatFile);
    let mc: Activity = DirectActivity::MultipleChoice.into();
    store.increment_word_stat("a", mc, true, 1, None).unwrap();
    ctx.advance_days(1);
    store.increment_word_stat("b", mc, true, 2, None).unwrap();
    ctx.advance_days(1);
    store.increment_word_stat("c", mc, false, 3, None).unwrap();
    assert_eq!(store.archive_snapshots(1).unwrap(), 1);
    store.load()
}

#[test]
fn migration_copies_records_and_recomputes_snapshots() {
    let ctx = TestContext::new(day(1));
    let stats = seeded(&ctx);

    // A stored aggregate that disagrees with its own records.
    let flat = ctx.flat();
    let doc = flat.load_daily(day(2), DailyKind::Current).unwrap();
    let mut bogus = doc.snapshot.clone();
    bogus.exposed_words_count = 999;
    assert!(flat.save_daily(&DailyDocument::new(DailyKind::Current, bogus, doc.stats.clone())));

    let report = migrate_user(&ctx.config, USER, LANGUAGE, MigrationOptions::default()).unwrap();
    assert_eq!(report.words, 3);
    assert_eq!(report.snapshots, 3);
    assert_eq!(report.skipped_documents, 0);
    assert!(!report.dry_run);

    let sqlite = RelationalStore::open(&ctx.config, USER, LANGUAGE).unwrap();
    assert_eq!(sqlite.load_stats().unwrap().words(), stats.words());
    let exposed: Vec<(u64, u64)> = sqlite
        .snapshots_between(day(1), day(3))
        .unwrap()
        .iter()
        .map(|s| (s.exposed_words_count, s.newly_exposed_words))
        .collect();
    assert_eq!(exposed, vec![(1, 1), (2, 1), (3, 1)]);

    // Backend selection is untouched without switch_backend.
    assert_eq!(read_backend_kind(&ctx.config, USER, LANGUAGE), BackendKind::FlatFile);
}

#[test]
fn migration_prefers_current_documents() {
    let ctx = TestContext::new(day(1));
    seeded(&ctx);
    let flat = ctx.flat();

    // Day 5 has both kinds; the current one is authoritative.
    let mut early = JourneyStats::new(USER, LANGUAGE);
    early.increment("a", DirectActivity::Typing.into(), true, 1);
    let mut late = early.clone();
    late.increment("z", DirectActivity::Typing.into(), true, 2);
    let snapshot = |stats: &JourneyStats| DailySnapshot::from_aggregate(day(5), stats.aggregate(), None);
    assert!(flat.save_daily(&DailyDocument::new(
        DailyKind::Yesterday,
        snapshot(&early),
        early.words().clone()
    )));
    assert!(flat.save_daily(&DailyDocument::new(
        DailyKind::Current,
        snapshot(&late),
        late.words().clone()
    )));

    migrate_user(&ctx.config, USER, LANGUAGE, MigrationOptions::default()).unwrap();
    let sqlite = RelationalStore::open(&ctx.config, USER, LANGUAGE).unwrap();
    assert_eq!(sqlite.get_snapshot(day(5)).unwrap().unwrap().exposed_words_count, 2);
}

#[test]
fn unreadable_documents_are_skipped() {
    let ctx = TestContext::new(day(1));
    seeded(&ctx);
    let flat = ctx.flat();
    let path = flat.daily_path(day(3), DailyKind::Current, false);
    std::fs::write(&path, "garbage").unwrap();
    std::fs::write(backup_path(&path), "garbage").unwrap();

    let report = migrate_user(&ctx.config, USER, LANGUAGE, MigrationOptions::default()).unwrap();
    assert_eq!(report.snapshots, 2);
    assert_eq!(report.skipped_documents, 1);
}

#[test]
fn unreadable_source_fails_without_touching_the_target() {
    let mut ctx = TestContext::new(day(1));
    ctx.config = ctx.config.clone().with_lock_timeout(Duration::from_millis(50));
    let store = ctx.store(BackendKind::FlatFile);
    assert!(store.save(&fixtures::journey_with_words(USER, LANGUAGE, 40)));
    let options = MigrationOptions {
        switch_backend: true,
        ..Default::default()
    };

    let stats_path = ctx.flat().stats_path();
    {
        let _held = FileLock::acquire(&stats_path, true, Duration::from_millis(50)).unwrap();
        let result = migrate_user(&ctx.config, USER, LANGUAGE, options);
        assert!(matches!(result, Err(StoreError::LockTimeout(_))));
    }
    assert!(!RelationalStore::db_path(&ctx.config, USER, LANGUAGE).exists());
    assert_eq!(read_backend_kind(&ctx.config, USER, LANGUAGE), BackendKind::FlatFile);

    // Once the source is readable again the migration goes through.
    let report = migrate_user(&ctx.config, USER, LANGUAGE, options).unwrap();
    assert_eq!(report.words, 40);
    assert_eq!(read_backend_kind(&ctx.config, USER, LANGUAGE), BackendKind::Sqlite);
}

#[test]
fn dry_run_writes_nothing() {
    let ctx = TestContext::new(day(1));
    seeded(&ctx);
    let options = MigrationOptions {
        dry_run: true,
        switch_backend: true,
        ..Default::default()
    };
    let report = migrate_user(&ctx.config, USER, LANGUAGE, options).unwrap();
    assert!(report.dry_run);
    assert_eq!(report.words, 3);
    assert!(!RelationalStore::db_path(&ctx.config, USER, LANGUAGE).exists());
    assert_eq!(read_backend_kind(&ctx.config, USER, LANGUAGE), BackendKind::FlatFile);
}

#[test]
fn existing_database_needs_force() {
    let ctx = TestContext::new(day(1));
    seeded(&ctx);
    let sqlite_store = ctx.store(BackendKind::Sqlite);
    sqlite_store.save(&fixtures::journey_with_words(USER, LANGUAGE, 7));

    let refused = migrate_user(&ctx.config, USER, LANGUAGE, MigrationOptions::default());
    assert!(matches!(refused, Err(StoreError::TargetExists(_))));

    let options = MigrationOptions {
        force: true,
        switch_backend: true,
        ..Default::default()
    };
    let report = migrate_user(&ctx.config, USER, LANGUAGE, options).unwrap();
    assert_eq!(report.words, 3);

    let store = ctx.store(read_backend_kind(&ctx.config, USER, LANGUAGE));
    assert_eq!(store.backend_kind(), BackendKind::Sqlite);
    assert_eq!(store.load().len(), 3);
}

#[test]
fn migrate_all_walks_every_journey() {
    let ctx = TestContext::new(day(1));
    seeded(&ctx);
    let other = ctx.store_for("second user", "de", BackendKind::FlatFile);
    other
        .increment_word_stat("x", DirectActivity::Matching.into(), true, 1, Some("n-1"))
        .unwrap();

    let summary = migrate_all(&ctx.config, MigrationOptions::default()).unwrap();
    assert!(summary.failed.is_empty());
    let mut journeys: Vec<(String, String, usize)> = summary
        .migrated
        .iter()
        .map(|r| (r.user.clone(), r.language.clone(), r.words))
        .collect();
    journeys.sort();
    assert_eq!(
        journeys,
        vec![
            (USER.to_string(), LANGUAGE.to_string(), 3),
            ("second user".to_string(), "de".to_string(), 1)
        ]
    );
}
