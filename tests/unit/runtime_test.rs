//! Tests for API response models

use crawld::core::{JobOutcome, JobTracker, LauncherStats, NewJob};
use crawld::infra::InMemoryQueueFactory;
use crawld::runtime::{daemon_status, health, list_jobs};

#[test]
fn test_health() {
    assert!(health().ok);
}

#[test]
fn test_listing_and_status_from_tracker() {
    let tracker = JobTracker::new(Box::new(InMemoryQueueFactory), 10).unwrap();
    let running = tracker.create(NewJob::new("mybot", "spider1")).unwrap();
    let pending = tracker.create(NewJob::new("mybot", "spider2")).unwrap();
    tracker.claim_next("mybot").unwrap();
    tracker.mark_running(&running, 1234).unwrap();

    let snapshot = tracker.snapshot();
    let listing = list_jobs(&snapshot, None, false);
    assert_eq!(listing.pending[0].id, pending);
    assert_eq!(listing.running[0].pid, Some(1234));
    assert_eq!(
        listing.running[0].log_url.as_deref(),
        Some(format!("/logs/mybot/spider1/{running}.log").as_str())
    );

    tracker.mark_finished(&running, JobOutcome::Failed { exit_code: 2 }).unwrap();
    let snapshot = tracker.snapshot();
    let stats = LauncherStats {
        slots: 4,
        ..LauncherStats::default()
    };
    let status = daemon_status(&snapshot, &stats);
    assert_eq!((status.pending, status.running, status.finished, status.slots), (1, 0, 1, 4));

    let json = serde_json::to_value(list_jobs(&snapshot, Some("mybot"), false)).unwrap();
    assert_eq!(json["finished"][0]["outcome"]["kind"], "failed");
    assert_eq!(json["finished"][0]["outcome"]["exit_code"], 2);
    assert!(json["pending"][0].get("pid").is_none());
}
