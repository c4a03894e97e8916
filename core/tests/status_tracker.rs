//! Status tracker: fail-soft polling of the shared break-status file.

use presence_core::{
    cancel::CancelToken,
    clock::ManualClock,
    file_lock::FileLock,
    status::{DutyStatus, RefreshOutcome, StatusTable, StatusTracker},
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn tracker(dir: &Path, clock: Arc<ManualClock>) -> StatusTracker {
    StatusTracker::new(
        dir.join("break_tracker.json"),
        StatusTable::with_staff(["AS1", "AS2", "Manager1"]),
        Duration::from_millis(600),
        Duration::from_millis(50),
        clock,
    )
}

#[test]
fn only_tracked_names_are_applied() {
    let dir = tempfile::tempdir().expect("temp dir");
    let tracker = tracker(dir.path(), Arc::new(ManualClock::starting_now()));
    std::fs::write(tracker.path(), r#"{"AS1": 1, "AS2": 2, "Stranger": 1}"#).unwrap();

    assert_eq!(tracker.refresh_once(), RefreshOutcome::Applied(2));

    let table = tracker.table();
    assert_eq!(table.get("AS1"), DutyStatus::OnBreak);
    assert_eq!(table.get("AS2"), DutyStatus::OutOfShift);
    assert_eq!(table.get("Manager1"), DutyStatus::Normal);
    assert!(!table.snapshot().contains_key("Stranger"));
}

#[test]
fn missing_file_keeps_defaults() {
    let dir = tempfile::tempdir().expect("temp dir");
    let tracker = tracker(dir.path(), Arc::new(ManualClock::starting_now()));

    assert_eq!(tracker.refresh_once(), RefreshOutcome::Missing);
    assert!(tracker.table().snapshot().values().all(|s| *s == DutyStatus::Normal));
}

#[test]
fn malformed_file_keeps_previous_values() {
    let dir = tempfile::tempdir().expect("temp dir");
    let tracker = tracker(dir.path(), Arc::new(ManualClock::starting_now()));
    std::fs::write(tracker.path(), r#"{"AS1": 2}"#).unwrap();
    tracker.refresh_once();

    std::fs::write(tracker.path(), r#"{"AS1": "#).unwrap();
    assert_eq!(tracker.refresh_once(), RefreshOutcome::Unreadable);
    assert_eq!(tracker.table().get("AS1"), DutyStatus::OutOfShift);
}

#[test]
fn invalid_codes_are_skipped() {
    let dir = tempfile::tempdir().expect("temp dir");
    let tracker = tracker(dir.path(), Arc::new(ManualClock::starting_now()));
    std::fs::write(tracker.path(), r#"{"AS1": 7, "AS2": "break", "Manager1": 1}"#).unwrap();

    assert_eq!(tracker.refresh_once(), RefreshOutcome::Applied(1));
    assert_eq!(tracker.table().get("AS1"), DutyStatus::Normal);
    assert_eq!(tracker.table().get("Manager1"), DutyStatus::OnBreak);
}

#[test]
fn held_lock_skips_the_poll() {
    let dir = tempfile::tempdir().expect("temp dir");
    let tracker = tracker(dir.path(), Arc::new(ManualClock::starting_now()));
    std::fs::write(tracker.path(), r#"{"AS1": 1}"#).unwrap();

    {
        let _held = FileLock::for_file(tracker.path())
            .acquire(Duration::from_millis(50))
            .unwrap();
        assert_eq!(tracker.refresh_once(), RefreshOutcome::LockBusy);
        assert_eq!(tracker.table().get("AS1"), DutyStatus::Normal);
    }

    assert_eq!(tracker.refresh_once(), RefreshOutcome::Applied(1));
}

#[test]
fn spawned_tracker_picks_up_changes_and_stops() {
    let dir = tempfile::tempdir().expect("temp dir");
    let clock = Arc::new(ManualClock::starting_now());
    let tracker = tracker(dir.path(), clock.clone());
    let path = tracker.path().to_path_buf();
    let table = tracker.table();

    let cancel = CancelToken::new();
    let handle = tracker.spawn(cancel.clone()).expect("spawn tracker");

    std::fs::write(&path, r#"{"AS2": 1}"#).unwrap();
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while table.get("AS2") != DutyStatus::OnBreak && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    cancel.cancel();
    handle.join().expect("tracker thread");

    assert_eq!(table.get("AS2"), DutyStatus::OnBreak);
    assert!(clock.sleeps().iter().all(|d| *d == Duration::from_millis(600)));
}
