//! Queue passes driven by scripted navigators.

mod common;

use common::{init_tracing, reached_form_after, valid_order, write_order, ScriptedNavigator};
use orderloader::navigation::{DryRunNavigator, NavigationReport, NavigationState};
use orderloader::queue::Outcome;
use orderloader::{
    AutomationError, BackupManager, MetricsSession, OrderDocument, QueueProcessor, QueueStore,
};
use serde_json::json;
use std::fs;
use std::thread::sleep;
use std::time::Duration;

#[test]
fn test_successful_document_moves_to_completed() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let store = QueueStore::open(dir.path()).unwrap();
    write_order(store.pending_dir(), "order.json", &valid_order("PO-1"));
    let metrics_path = dir.path().join("metrics.json");

    let mut processor = QueueProcessor::new(store, ScriptedNavigator::succeeding())
        .with_metrics_path(&metrics_path);
    let summary = processor.process_pass().unwrap();

    let store = processor.store();
    assert!(!store.pending_dir().join("order.json").exists());
    assert!(store.completed_dir().join("order.json").exists());
    assert_eq!(summary.succeeded(), 1);
    assert_eq!(processor.navigator().calls, 1);

    let metrics = MetricsSession::load(&metrics_path).unwrap();
    assert_eq!(metrics.total_processed, 1);
    assert_eq!(metrics.success_count, 1);
    assert_eq!(metrics.failure_count, 0);
    assert!(metrics.end_time.is_some());
}

#[test]
fn test_invalid_items_stay_pending() {
    let dir = tempfile::tempdir().unwrap();
    let store = QueueStore::open(dir.path()).unwrap();
    let mut doc = valid_order("PO-2");
    doc["items"] = json!("W-1 x2");
    write_order(store.pending_dir(), "bad.json", &doc);

    let mut processor = QueueProcessor::new(store, ScriptedNavigator::succeeding());
    let summary = processor.process_pass().unwrap();

    match &summary.results[0].outcome {
        Outcome::Rejected(v) => assert_eq!(v.field, "items"),
        other => panic!("expected a rejection, got {other:?}"),
    }
    assert_eq!(processor.navigator().calls, 0);
    assert!(processor.store().pending_dir().join("bad.json").exists());
    assert_eq!(summary.metrics.failure_count, 1);
}

#[test]
fn test_same_name_in_a_later_pass_lands_as_numbered_copy() {
    let dir = tempfile::tempdir().unwrap();
    let store = QueueStore::open(dir.path()).unwrap();
    write_order(store.pending_dir(), "order.json", &valid_order("PO-3"));

    let mut processor = QueueProcessor::new(store, ScriptedNavigator::succeeding());
    processor.process_pass().unwrap();
    write_order(
        processor.store().pending_dir(),
        "order.json",
        &valid_order("PO-4"),
    );
    let summary = processor.process_pass().unwrap();

    let completed = processor.store().completed_dir();
    match &summary.results[0].outcome {
        Outcome::Completed { destination } => {
            assert_eq!(destination, &completed.join("order_1.json"))
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert_eq!(processor.navigator().calls, 2);
    let first = OrderDocument::load(&completed.join("order.json")).unwrap();
    let second = OrderDocument::load(&completed.join("order_1.json")).unwrap();
    assert_eq!(first.order_id.to_string(), "PO-3");
    assert_eq!(second.order_id.to_string(), "PO-4");
}

#[test]
fn test_numeric_tax_id_and_quoted_quantity_are_processed() {
    let dir = tempfile::tempdir().unwrap();
    let store = QueueStore::open(dir.path()).unwrap();
    let mut doc = valid_order("PO-5");
    doc["buyer"]["taxId"] = json!(900123456);
    doc["items"][0]["quantity"] = json!("2");
    write_order(store.pending_dir(), "order.json", &doc);

    let mut processor = QueueProcessor::new(store, ScriptedNavigator::succeeding());
    let summary = processor.process_pass().unwrap();

    assert_eq!(summary.succeeded(), 1);
    assert!(processor.store().completed_dir().join("order.json").exists());
}

#[test]
fn test_retries_counted_only_for_navigated_documents() {
    let dir = tempfile::tempdir().unwrap();
    let store = QueueStore::open(dir.path()).unwrap();
    write_order(store.pending_dir(), "a.json", &valid_order("PO-1"));
    sleep(Duration::from_millis(50));
    let mut bad = valid_order("PO-2");
    bad["items"] = json!("W-1 x2");
    write_order(store.pending_dir(), "b.json", &bad);
    sleep(Duration::from_millis(50));
    write_order(store.pending_dir(), "c.json", &valid_order("PO-3"));

    let mut navigator = ScriptedNavigator::with_script(vec![
        Ok(reached_form_after(2)),
        Err(AutomationError::NotFound("sales menu".to_string())),
    ]);
    navigator.error_retries = 3;
    let mut processor = QueueProcessor::new(store, navigator);
    let summary = processor.process_pass().unwrap();

    assert_eq!(processor.navigator().calls, 2);
    let per_file: Vec<_> = summary
        .metrics
        .per_file_durations
        .iter()
        .map(|f| (f.file.as_str(), f.success, f.retries))
        .collect();
    assert_eq!(
        per_file,
        vec![("a.json", true, 2), ("b.json", false, 0), ("c.json", false, 3)]
    );
    assert_eq!(summary.metrics.retry_count, 5);
}

#[test]
fn test_documents_processed_oldest_first() {
    let dir = tempfile::tempdir().unwrap();
    let store = QueueStore::open(dir.path()).unwrap();
    for (i, name) in ["c.json", "a.json", "b.json"].iter().enumerate() {
        write_order(store.pending_dir(), name, &valid_order(&format!("PO-{i}")));
        sleep(Duration::from_millis(50));
    }

    let mut processor = QueueProcessor::new(store, ScriptedNavigator::succeeding());
    let summary = processor.process_pass().unwrap();

    let order: Vec<_> = summary.results.iter().map(|r| r.item.file_name()).collect();
    assert_eq!(order, vec!["c.json", "a.json", "b.json"]);
}

#[test]
fn test_navigation_failure_keeps_document_and_continues() {
    let dir = tempfile::tempdir().unwrap();
    let store = QueueStore::open(dir.path()).unwrap();
    write_order(store.pending_dir(), "first.json", &valid_order("PO-1"));
    sleep(Duration::from_millis(50));
    write_order(store.pending_dir(), "second.json", &valid_order("PO-2"));

    let navigator = ScriptedNavigator::with_script(vec![Err(AutomationError::NotFound(
        "modules menu".to_string(),
    ))]);
    let mut processor = QueueProcessor::new(store, navigator);
    let summary = processor.process_pass().unwrap();

    assert_eq!(summary.succeeded(), 1);
    assert_eq!(summary.failed(), 1);
    let store = processor.store();
    assert!(store.pending_dir().join("first.json").exists());
    assert!(store.completed_dir().join("second.json").exists());
}

#[test]
fn test_incomplete_walk_is_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    let store = QueueStore::open(dir.path()).unwrap();
    write_order(store.pending_dir(), "order.json", &valid_order("PO-1"));

    let navigator = ScriptedNavigator::with_script(vec![Ok(NavigationReport {
        final_state: NavigationState::SalesOpen,
        unconfirmed: vec![NavigationState::SalesOpen],
        retries: 0,
    })]);
    let mut processor = QueueProcessor::new(store, navigator);
    let summary = processor.process_pass().unwrap();

    assert!(matches!(summary.results[0].outcome, Outcome::Failed(_)));
    assert!(processor.store().pending_dir().join("order.json").exists());
}

#[test]
fn test_fail_safe_stops_the_pass_after_writing_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let store = QueueStore::open(dir.path()).unwrap();
    write_order(store.pending_dir(), "first.json", &valid_order("PO-1"));
    sleep(Duration::from_millis(50));
    write_order(store.pending_dir(), "second.json", &valid_order("PO-2"));
    let metrics_path = dir.path().join("metrics.json");

    let navigator = ScriptedNavigator::with_script(vec![Err(AutomationError::FailSafe(
        "pointer in corner".to_string(),
    ))]);
    let mut processor = QueueProcessor::new(store, navigator).with_metrics_path(&metrics_path);
    let err = processor.process_pass().unwrap_err();

    assert!(matches!(err, AutomationError::FailSafe(_)));
    assert_eq!(processor.navigator().calls, 1);
    let store = processor.store();
    assert!(store.pending_dir().join("first.json").exists());
    assert!(store.pending_dir().join("second.json").exists());

    let metrics = MetricsSession::load(&metrics_path).unwrap();
    assert_eq!(metrics.failure_count, 1);
    assert_eq!(metrics.success_count, 0);
}

#[test]
fn test_fail_safe_survives_unwritable_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let store = QueueStore::open(dir.path()).unwrap();
    write_order(store.pending_dir(), "order.json", &valid_order("PO-1"));
    // A directory where the metrics file should go
    let metrics_path = dir.path().join("metrics.json");
    fs::create_dir(&metrics_path).unwrap();

    let navigator = ScriptedNavigator::with_script(vec![Err(AutomationError::FailSafe(
        "pointer in corner".to_string(),
    ))]);
    let mut processor = QueueProcessor::new(store, navigator).with_metrics_path(&metrics_path);
    let err = processor.process_pass().unwrap_err();

    assert!(matches!(err, AutomationError::FailSafe(_)), "got {err:?}");
    assert!(processor.store().pending_dir().join("order.json").exists());
}

#[test]
fn test_backup_taken_before_navigation() {
    let dir = tempfile::tempdir().unwrap();
    let store = QueueStore::open(dir.path()).unwrap();
    write_order(store.pending_dir(), "order.json", &valid_order("PO-1"));
    let backups = BackupManager::new(store.backups_dir(), true, 10);

    let mut processor =
        QueueProcessor::new(store, ScriptedNavigator::succeeding()).with_backups(backups.clone());
    processor.process_pass().unwrap();

    let list = backups.list().unwrap();
    assert_eq!(list.len(), 1);
    let name = list[0].file_name().unwrap().to_string_lossy().to_string();
    assert!(name.ends_with("_order.json.gz"), "unexpected backup name {name}");
}

#[test]
fn test_pass_prunes_oldest_backups() {
    let dir = tempfile::tempdir().unwrap();
    let store = QueueStore::open(dir.path()).unwrap();
    fs::create_dir_all(store.backups_dir()).unwrap();
    for i in 0..4 {
        let name = format!("20200101_000000_00{i}_old.json");
        fs::write(store.backups_dir().join(name), "{}").unwrap();
    }
    write_order(store.pending_dir(), "order.json", &valid_order("PO-1"));
    let backups = BackupManager::new(store.backups_dir(), false, 3);

    let mut processor =
        QueueProcessor::new(store, ScriptedNavigator::succeeding()).with_backups(backups.clone());
    processor.process_pass().unwrap();

    let names: Vec<_> = backups
        .list()
        .unwrap()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(names.len(), 3);
    assert_eq!(names[0], "20200101_000000_002_old.json");
    assert_eq!(names[1], "20200101_000000_003_old.json");
    assert!(names[2].ends_with("_order.json"), "unexpected backup {}", names[2]);
}

#[test]
fn test_dry_run_leaves_queue_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = QueueStore::open(dir.path()).unwrap();
    write_order(store.pending_dir(), "order.json", &valid_order("PO-1"));
    let backups = BackupManager::new(store.backups_dir(), false, 10);
    let metrics_path = dir.path().join("metrics.json");

    let mut processor = QueueProcessor::new(store, DryRunNavigator)
        .with_backups(backups.clone())
        .with_metrics_path(&metrics_path)
        .dry_run(true);
    let summary = processor.process_pass().unwrap();

    assert_eq!(summary.results[0].outcome, Outcome::Validated);
    assert!(processor.store().pending_dir().join("order.json").exists());
    assert!(backups.list().unwrap().is_empty());
    assert!(!metrics_path.exists());
}

#[test]
fn test_empty_queue_pass() {
    let dir = tempfile::tempdir().unwrap();
    let store = QueueStore::open(dir.path()).unwrap();
    let mut processor = QueueProcessor::new(store, ScriptedNavigator::succeeding());
    let summary = processor.process_pass().unwrap();
    assert!(summary.results.is_empty());
    assert_eq!(summary.metrics.total_processed, 0);
}
