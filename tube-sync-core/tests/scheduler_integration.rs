use std::fs;
use std::path::Path;

use tempfile::{tempdir, TempDir};
use tube_sync_core::contract::{MockTransport, RemoteRef};
use tube_sync_core::error::{AuthError, LedgerError, SchedulerError, TransferError};
use tube_sync_core::ledger::TrackingLedger;
use tube_sync_core::metadata::MetadataResolver;
use tube_sync_core::scheduler::{pending_candidates, RunOutcome, SchedulerConfig, UploadScheduler};

mod common;
use common::{asset, dataset, locale, FixedClock, MemoryStore};

fn watch(id: &str) -> RemoteRef {
    RemoteRef(format!("https://www.youtube.com/watch?v={id}"))
}

/// Remote reference derived from the asset directory name.
fn echo_transport() -> MockTransport {
    let mut transport = MockTransport::new();
    transport.expect_transfer().returning(|path, _| {
        let key = path.parent().and_then(Path::file_name).unwrap();
        Ok(watch(&format!("v{}", key.to_string_lossy())))
    });
    transport
}

fn config(dir: &TempDir, daily_quota: Option<u32>) -> SchedulerConfig {
    SchedulerConfig {
        asset_root: dir.path().join("assets"),
        daily_quota,
    }
}

fn three_items(dir: &TempDir) -> MemoryStore {
    for key in ["1", "2", "3"] {
        asset(&dir.path().join("assets"), key, "clip.mp4", b"video");
    }
    MemoryStore::with(vec![dataset(
        "fr",
        &["id", "title"],
        &[&["1", "Un"], &["2", "Deux"], &["3", "Trois"]],
    )])
}

#[tokio::test]
async fn uploads_candidate_records_it_and_writes_back() {
    let dir = tempdir().unwrap();
    asset(&dir.path().join("assets"), "42", "demo.mp4", b"video");
    let store = MemoryStore::with(vec![dataset(
        "fr",
        &["id", "title_fr", "description_short_fr"],
        &[&["42", "Vélo électrique", "<b>Rapide</b> et fiable"]],
    )]);

    let mut transport = MockTransport::new();
    transport
        .expect_transfer()
        .withf(|path, meta| {
            path.ends_with("42/demo.mp4")
                && meta.title == "Vélo électrique"
                && meta.description
                    == "https://shop.example/fr/page_html/products/produit-42.html\n\nRapide et fiable"
        })
        .times(1)
        .returning(|_, _| Ok(watch("abc")));

    let clock = FixedClock::on(2026, 10, 16);
    let scheduler = UploadScheduler::new(
        transport,
        store.clone(),
        clock,
        MetadataResolver::default(),
        config(&dir, Some(10)),
    );
    let ledger_path = dir.path().join("upload_tracking.json");
    let mut ledger = TrackingLedger::open(&ledger_path).unwrap();

    let report = scheduler.run(&mut ledger, &[locale("fr")]).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Done);
    assert_eq!(report.uploaded(), 1);
    assert_eq!(report.quota_used_today, 1);
    assert_eq!(report.locales[0].uploaded[0].remote_ref, watch("abc"));

    let reopened = TrackingLedger::open(&ledger_path).unwrap();
    let record = reopened.get("fr", "42").unwrap();
    assert_eq!(record.remote_ref, watch("abc"));
    assert_eq!(record.date, clock.today());
    assert_eq!(
        store.dataset("fr").remote_ref("42"),
        Some("https://www.youtube.com/watch?v=abc")
    );
}

#[tokio::test]
async fn stops_at_daily_quota_leaving_rest_untouched() {
    let dir = tempdir().unwrap();
    let store = three_items(&dir);
    let mut transport = MockTransport::new();
    transport.expect_transfer().times(2).returning(|_, _| Ok(watch("q")));

    let scheduler = UploadScheduler::new(
        transport,
        store.clone(),
        FixedClock::on(2026, 10, 16),
        MetadataResolver::default(),
        config(&dir, Some(2)),
    );
    let mut ledger = TrackingLedger::open(dir.path().join("l.json")).unwrap();
    let report = scheduler.run(&mut ledger, &[locale("fr")]).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::QuotaExhausted);
    assert_eq!(ledger.len(), 2);
    assert!(ledger.has_record("fr", "1"));
    assert!(ledger.has_record("fr", "2"));
    assert!(!ledger.has_record("fr", "3"));
    assert_eq!(store.dataset("fr").remote_ref("3"), None);
}

#[tokio::test]
async fn second_run_uploads_nothing_new() {
    let dir = tempdir().unwrap();
    let store = three_items(&dir);
    let clock = FixedClock::on(2026, 10, 16);
    let ledger_path = dir.path().join("l.json");

    let first = UploadScheduler::new(
        echo_transport(),
        store.clone(),
        clock,
        MetadataResolver::default(),
        config(&dir, None),
    );
    let mut ledger = TrackingLedger::open(&ledger_path).unwrap();
    assert_eq!(first.run(&mut ledger, &[locale("fr")]).await.unwrap().uploaded(), 3);

    let mut idle = MockTransport::new();
    idle.expect_transfer().never();
    let second = UploadScheduler::new(idle, store.clone(), clock, MetadataResolver::default(), config(&dir, None));
    let mut ledger = TrackingLedger::open(&ledger_path).unwrap();
    let report = second.run(&mut ledger, &[locale("fr")]).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Done);
    assert_eq!(report.uploaded(), 0);
    assert_eq!(ledger.len(), 3);
    assert_eq!(
        pending_candidates(&store, &[locale("fr")], &dir.path().join("assets"), &ledger),
        0
    );
}

#[tokio::test]
async fn quota_carries_across_runs_on_the_same_day_only() {
    let dir = tempdir().unwrap();
    let store = three_items(&dir);
    let ledger_path = dir.path().join("l.json");
    let day1 = FixedClock::on(2026, 10, 16);
    let day2 = FixedClock::on(2026, 10, 17);

    let morning = UploadScheduler::new(
        echo_transport(),
        store.clone(),
        day1,
        MetadataResolver::default(),
        config(&dir, Some(1)),
    );
    let mut ledger = TrackingLedger::open(&ledger_path).unwrap();
    let report = morning.run(&mut ledger, &[locale("fr")]).await.unwrap();
    assert_eq!(report.outcome, RunOutcome::QuotaExhausted);
    assert_eq!(report.uploaded(), 1);

    let mut idle = MockTransport::new();
    idle.expect_transfer().never();
    let evening = UploadScheduler::new(idle, store.clone(), day1, MetadataResolver::default(), config(&dir, Some(1)));
    let mut ledger = TrackingLedger::open(&ledger_path).unwrap();
    let report = evening.run(&mut ledger, &[locale("fr")]).await.unwrap();
    assert_eq!(report.outcome, RunOutcome::QuotaExhausted);
    assert_eq!(report.uploaded(), 0);

    let tomorrow = UploadScheduler::new(
        echo_transport(),
        store.clone(),
        day2,
        MetadataResolver::default(),
        config(&dir, Some(1)),
    );
    let mut ledger = TrackingLedger::open(&ledger_path).unwrap();
    let report = tomorrow.run(&mut ledger, &[locale("fr")]).await.unwrap();
    assert_eq!(report.uploaded(), 1);
    assert!(ledger.has_record("fr", "2"));
    assert_eq!(ledger.quota_used(day1.today()), 1);
    assert_eq!(ledger.quota_used(day2.today()), 1);
}

#[tokio::test]
async fn failed_transfer_is_counted_and_run_continues() {
    let dir = tempdir().unwrap();
    let store = three_items(&dir);
    let mut transport = MockTransport::new();
    transport.expect_transfer().times(3).returning(|path, _| {
        if path.parent().unwrap().ends_with("2") {
            Err(TransferError::Fatal("status 400: invalid video".into()))
        } else {
            Ok(watch("ok"))
        }
    });

    let scheduler = UploadScheduler::new(
        transport,
        store.clone(),
        FixedClock::on(2026, 10, 16),
        MetadataResolver::default(),
        config(&dir, None),
    );
    let mut ledger = TrackingLedger::open(dir.path().join("l.json")).unwrap();
    let report = scheduler.run(&mut ledger, &[locale("fr")]).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Done);
    assert_eq!(report.errors(), 1);
    assert_eq!(report.uploaded(), 2);
    assert!(!ledger.has_record("fr", "2"));
    assert_eq!(store.dataset("fr").remote_ref("2"), None);
}

#[tokio::test]
async fn authentication_failure_aborts_the_run() {
    let dir = tempdir().unwrap();
    let store = three_items(&dir);
    let mut transport = MockTransport::new();
    transport
        .expect_transfer()
        .times(1)
        .returning(|_, _| Err(TransferError::Auth(AuthError::RefreshFailed("invalid_grant".into()))));

    let scheduler = UploadScheduler::new(
        transport,
        store,
        FixedClock::on(2026, 10, 16),
        MetadataResolver::default(),
        config(&dir, None),
    );
    let mut ledger = TrackingLedger::open(dir.path().join("l.json")).unwrap();
    let result = scheduler.run(&mut ledger, &[locale("fr"), locale("de")]).await;

    assert!(matches!(result, Err(SchedulerError::Auth(_))));
    assert!(ledger.is_empty());
}

#[tokio::test]
async fn record_is_flushed_before_dataset_write_back() {
    let dir = tempdir().unwrap();
    let store = three_items(&dir);
    let state = dir.path().join("state");
    let mut ledger = TrackingLedger::open(state.join("l.json")).unwrap();
    // Make every flush fail.
    fs::write(&state, "blocked").unwrap();

    let mut transport = MockTransport::new();
    transport.expect_transfer().times(1).returning(|_, _| Ok(watch("lost")));
    let scheduler = UploadScheduler::new(
        transport,
        store.clone(),
        FixedClock::on(2026, 10, 16),
        MetadataResolver::default(),
        config(&dir, None),
    );
    let result = scheduler.run(&mut ledger, &[locale("fr")]).await;

    assert!(matches!(
        result,
        Err(SchedulerError::Ledger(LedgerError::Persistence { .. }))
    ));
    assert_eq!(store.saves(), 0);
    assert_eq!(store.dataset("fr").remote_ref("1"), None);
}

#[tokio::test]
async fn unflushed_transfer_is_repeated_exactly_once_after_restart() {
    let dir = tempdir().unwrap();
    let store = three_items(&dir);
    let clock = FixedClock::on(2026, 10, 16);
    let state = dir.path().join("state");
    let ledger_path = state.join("l.json");

    // First process: item 1 reaches the remote side, its record never reaches disk.
    let mut ledger = TrackingLedger::open(&ledger_path).unwrap();
    fs::write(&state, "blocked").unwrap();
    let mut first = MockTransport::new();
    first
        .expect_transfer()
        .withf(|path, _| path.ends_with("1/clip.mp4"))
        .times(1)
        .returning(|_, _| Ok(watch("orphan")));
    let scheduler = UploadScheduler::new(first, store.clone(), clock, MetadataResolver::default(), config(&dir, None));
    assert!(scheduler.run(&mut ledger, &[locale("fr")]).await.is_err());
    drop(ledger);

    // Restart with what was persisted.
    fs::remove_file(&state).unwrap();
    let mut ledger = TrackingLedger::open(&ledger_path).unwrap();
    assert!(!ledger.has_record("fr", "1"));

    let mut second = MockTransport::new();
    second
        .expect_transfer()
        .withf(|path, _| path.ends_with("1/clip.mp4"))
        .times(1)
        .returning(|_, _| Ok(watch("v1")));
    second
        .expect_transfer()
        .withf(|path, _| !path.ends_with("1/clip.mp4"))
        .times(2)
        .returning(|_, _| Ok(watch("other")));
    let scheduler = UploadScheduler::new(second, store.clone(), clock, MetadataResolver::default(), config(&dir, None));
    let report = scheduler.run(&mut ledger, &[locale("fr")]).await.unwrap();

    assert_eq!(report.uploaded(), 3);
    assert_eq!(ledger.records_for("fr").filter(|r| r.item_key == "1").count(), 1);
    let reopened = TrackingLedger::open(&ledger_path).unwrap();
    assert_eq!(reopened.get("fr", "1").map(|r| r.remote_ref.clone()), Some(watch("v1")));
}

#[tokio::test]
async fn lost_write_back_is_restored_from_ledger() {
    let dir = tempdir().unwrap();
    let store = three_items(&dir);
    let clock = FixedClock::on(2026, 10, 16);
    let mut ledger = TrackingLedger::open(dir.path().join("l.json")).unwrap();
    ledger.record("fr", "1", watch("kept"), clock.0).unwrap();
    ledger.record("fr", "2", watch("also"), clock.0).unwrap();
    ledger.record("fr", "3", watch("third"), clock.0).unwrap();

    let mut idle = MockTransport::new();
    idle.expect_transfer().never();
    let scheduler = UploadScheduler::new(idle, store.clone(), clock, MetadataResolver::default(), config(&dir, None));
    let report = scheduler.run(&mut ledger, &[locale("fr")]).await.unwrap();

    assert_eq!(report.locales[0].reconciled, 3);
    assert_eq!(store.saves(), 1);
    let ds = store.dataset("fr");
    assert_eq!(ds.remote_ref("1"), Some("https://www.youtube.com/watch?v=kept"));
    assert_eq!(ds.remote_ref("3"), Some("https://www.youtube.com/watch?v=third"));
}

#[tokio::test]
async fn failed_write_back_keeps_the_ledger_record() {
    let dir = tempdir().unwrap();
    asset(&dir.path().join("assets"), "1", "clip.mp4", b"video");
    let store = MemoryStore::with(vec![dataset("fr", &["id", "title"], &[&["1", "Un"]])]).failing_saves();

    let scheduler = UploadScheduler::new(
        echo_transport(),
        store,
        FixedClock::on(2026, 10, 16),
        MetadataResolver::default(),
        config(&dir, None),
    );
    let mut ledger = TrackingLedger::open(dir.path().join("l.json")).unwrap();
    let report = scheduler.run(&mut ledger, &[locale("fr")]).await.unwrap();

    assert_eq!(report.uploaded(), 1);
    assert_eq!(report.writeback_failures(), 1);
    assert!(ledger.has_record("fr", "1"));
}

#[tokio::test]
async fn rows_without_title_are_skipped_without_a_record() {
    let dir = tempdir().unwrap();
    asset(&dir.path().join("assets"), "1", "clip.mp4", b"video");
    let store = MemoryStore::with(vec![dataset("fr", &["id", "title"], &[&["1", "nan"]])]);
    let mut idle = MockTransport::new();
    idle.expect_transfer().never();

    let scheduler = UploadScheduler::new(
        idle,
        store,
        FixedClock::on(2026, 10, 16),
        MetadataResolver::default(),
        config(&dir, None),
    );
    let mut ledger = TrackingLedger::open(dir.path().join("l.json")).unwrap();
    let report = scheduler.run(&mut ledger, &[locale("fr")]).await.unwrap();

    assert_eq!(report.skipped(), 1);
    assert!(ledger.is_empty());
}

#[tokio::test]
async fn unusable_dataset_is_reported_and_next_locale_runs() {
    let dir = tempdir().unwrap();
    asset(&dir.path().join("assets"), "1", "clip.mp4", b"video");
    let store = MemoryStore::with(vec![
        dataset("de", &["id", "title"], &[&["1", "Eins"]]),
        dataset("it", &["sku", "title"], &[&["1", "Uno"]]),
    ]);

    let scheduler = UploadScheduler::new(
        echo_transport(),
        store,
        FixedClock::on(2026, 10, 16),
        MetadataResolver::default(),
        config(&dir, None),
    );
    let mut ledger = TrackingLedger::open(dir.path().join("l.json")).unwrap();
    let report = scheduler
        .run(&mut ledger, &[locale("fr"), locale("it"), locale("de")])
        .await
        .unwrap();

    let codes: Vec<&str> = report.locales.iter().map(|l| l.locale.as_str()).collect();
    assert_eq!(codes, vec!["fr", "it", "de"]);
    assert!(report.locales[0].dataset_error.is_some());
    assert!(report.locales[1].dataset_error.is_some());
    assert_eq!(report.locales[2].uploaded.len(), 1);
    assert!(ledger.has_record("de", "1"));
}
