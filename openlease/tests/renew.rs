use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use memlock::MemBackend;
use openlease::testing::CountingMetricsProvider;
use openlease::testing::FakeClock;

use crate::fixtures::init_test_tracing;
use crate::fixtures::wait_until;
use crate::fixtures::CallbackEvent;
use crate::fixtures::Candidate;

mod fixtures;

/// A leader that cannot reach the backend for a full renew deadline loses
/// leadership: the stop hook fires, the off metric is recorded and the run
/// returns.
#[tokio::test(start_paused = true)]
async fn test_renew_failure_ends_leadership() -> Result<()> {
    init_test_tracing();
    let provider = CountingMetricsProvider::install();
    let clock = Arc::new(FakeClock::new());
    let backend = MemBackend::with_clock("renew-failure", clock.clone());

    let a = Candidate::with_options(&backend, &clock, "a", false, "renew-failure");
    let handle = a.spawn_run();

    assert!(wait_until(Duration::from_secs(30), || a.log.started_count() == 1).await);

    tracing::info!("--- partition the backend and wait out the renew deadline");
    backend.set_unreachable(true);
    tokio::time::timeout(Duration::from_secs(120), handle).await??;

    let lifecycle: Vec<CallbackEvent> = a
        .log
        .events()
        .into_iter()
        .filter(|e| !matches!(e, CallbackEvent::NewLeader(_)))
        .collect();
    assert_eq!(vec![CallbackEvent::StartedLeading, CallbackEvent::StoppedLeading], lifecycle);

    // The lost lease is still attributed to this holder in the store.
    backend.set_unreachable(false);
    assert_eq!("a", backend.stored_record().unwrap().holder_identity);

    let counts = provider.counts("renew-failure");
    assert_eq!(1, counts.on);
    // Once at construction, once for the lost lease.
    assert_eq!(2, counts.off);

    assert!(backend.events().contains(&("a".to_string(), "stopped leading".to_string())));

    Ok(())
}

/// The health check stays green for a standby and for a leader that renews
/// in time, and goes red once a leader has been stale for longer than the
/// lease duration plus the tolerance.
#[tokio::test(start_paused = true)]
async fn test_health_reflects_renew_staleness() -> Result<()> {
    init_test_tracing();
    let clock = Arc::new(FakeClock::new());
    let backend = MemBackend::with_clock("health", clock.clone());

    let adaptor = openlease::HealthAdaptor::new(Duration::from_secs(10));
    assert!(adaptor.check().is_ok(), "an unbound adaptor is healthy");

    let a = Candidate::with_options(&backend, &clock, "a", false, "health");
    adaptor.set_leader_election(a.elector.clone());
    assert!(adaptor.check().is_ok(), "a candidate that never led is healthy");

    let handle = a.spawn_run();
    assert!(wait_until(Duration::from_secs(30), || a.log.started_count() == 1).await);
    assert!(adaptor.check().is_ok(), "a freshly renewed leader is healthy");

    tracing::info!("--- partition the backend; the run exits but the elector still believes it leads");
    backend.set_unreachable(true);
    tokio::time::timeout(Duration::from_secs(120), handle).await??;
    assert!(a.elector.is_leader());

    clock.advance(Duration::from_secs(20));
    assert!(adaptor.check().is_ok(), "still within lease_duration + tolerance");

    clock.advance(Duration::from_secs(6));
    let err = adaptor.check().unwrap_err();
    assert_eq!(
        openlease::HealthError::RenewStalled { name: "health".to_string() },
        err
    );

    Ok(())
}
