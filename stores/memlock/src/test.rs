use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use openlease::testing::FakeClock;
use openlease::LeaderElectionRecord;
use openlease::LockError;
use openlease::ResourceLock;

use crate::MemBackend;
use crate::MemLock;

fn record(holder: &str, lease_duration_seconds: u64, leader_transitions: u64) -> LeaderElectionRecord {
    let now = Utc::now();
    LeaderElectionRecord {
        holder_identity: holder.to_string(),
        lease_duration_seconds,
        acquire_time: now,
        renew_time: now,
        leader_transitions,
    }
}

#[tokio::test]
async fn test_get_before_create_is_not_found() {
    let backend = MemBackend::new("t");
    let a = MemLock::new(backend, "a");

    let err = a.get().await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_create_is_atomic() {
    let backend = MemBackend::new("t");
    let a = MemLock::new(backend.clone(), "a");
    let b = MemLock::new(backend, "b");

    a.create(&record("a", 15, 0)).await.unwrap();

    let err = b.create(&record("b", 15, 0)).await.unwrap_err();
    assert!(matches!(err, LockError::AlreadyExists));
}

#[tokio::test]
async fn test_update_is_compare_and_set() {
    let backend = MemBackend::new("t");
    let a = MemLock::new(backend.clone(), "a");
    let b = MemLock::new(backend, "b");

    a.create(&record("a", 15, 0)).await.unwrap();

    // b has never observed the stored revision.
    let err = b.update(&record("b", 15, 1)).await.unwrap_err();
    assert!(matches!(err, LockError::Conflict));

    // A read refreshes b's handle; the same update then lands.
    b.get().await.unwrap();
    b.update(&record("b", 15, 1)).await.unwrap();

    // a's handle is now the stale one.
    let err = a.update(&record("a", 15, 2)).await.unwrap_err();
    assert!(matches!(err, LockError::Conflict));
}

#[tokio::test]
async fn test_expire_abandoned_reaps_after_ttl() {
    let clock = Arc::new(FakeClock::new());
    let backend = MemBackend::with_clock("t", clock.clone());
    backend.set_expire_abandoned(true);
    let a = MemLock::new(backend.clone(), "a");

    a.create(&record("a", 2, 0)).await.unwrap();
    assert!(backend.stored_record().is_some());

    clock.advance(Duration::from_secs(3));
    let err = a.get().await.unwrap_err();
    assert!(err.is_not_found());

    // The key is free again.
    a.create(&record("a", 2, 0)).await.unwrap();
}

#[tokio::test]
async fn test_unreachable_backend_fails_every_operation() {
    let backend = MemBackend::new("t");
    let a = MemLock::new(backend.clone(), "a");
    a.create(&record("a", 15, 0)).await.unwrap();

    backend.set_unreachable(true);
    assert!(matches!(a.get().await.unwrap_err(), LockError::Backend(_)));
    assert!(matches!(a.update(&record("a", 15, 0)).await.unwrap_err(), LockError::Backend(_)));
    assert!(matches!(a.create(&record("a", 15, 0)).await.unwrap_err(), LockError::Backend(_)));

    backend.set_unreachable(false);
    a.get().await.unwrap();
}

#[tokio::test]
async fn test_reencode_changes_raw_but_not_the_record() {
    let backend = MemBackend::new("t");
    let a = MemLock::new(backend.clone(), "a");
    a.create(&record("a", 15, 0)).await.unwrap();

    let (before, raw_before) = a.get().await.unwrap();
    backend.reencode_stored();
    let (after, raw_after) = a.get().await.unwrap();

    assert_eq!(before, after);
    assert_ne!(raw_before, raw_after);

    // The rewrite moved the revision, but the read above refreshed the
    // handle, so a compare-and-set still lands.
    a.update(&record("a", 15, 0)).await.unwrap();
}

#[tokio::test]
async fn test_events_are_recorded_in_order() {
    let backend = MemBackend::new("t");
    let a = MemLock::new(backend.clone(), "a");
    let b = MemLock::new(backend.clone(), "b");

    a.record_event("became leader");
    b.record_event("stopped leading");

    assert_eq!(
        vec![
            ("a".to_string(), "became leader".to_string()),
            ("b".to_string(), "stopped leading".to_string()),
        ],
        backend.events()
    );
}
