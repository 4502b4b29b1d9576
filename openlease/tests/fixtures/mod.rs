#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Once;
use std::time::Duration;

use memlock::MemBackend;
use memlock::MemLock;
use openlease::testing::FakeClock;
use openlease::CancellationToken;
use openlease::LeaderCallbacks;
use openlease::LeaderElectionConfig;
use openlease::LeaderElector;
use tokio::task::JoinHandle;

/// Initialize tracing output for a test binary, once.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// One callback invocation, in the order the candidate fired them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackEvent {
    StartedLeading,
    StoppedLeading,
    NewLeader(String),
}

/// Records every callback a candidate fires.
#[derive(Default)]
pub struct CallbackLog {
    events: Mutex<Vec<CallbackEvent>>,
}

impl CallbackLog {
    pub fn push(&self, event: CallbackEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<CallbackEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn started_count(&self) -> usize {
        self.events().iter().filter(|e| **e == CallbackEvent::StartedLeading).count()
    }

    pub fn stopped_count(&self) -> usize {
        self.events().iter().filter(|e| **e == CallbackEvent::StoppedLeading).count()
    }

    pub fn new_leaders(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                CallbackEvent::NewLeader(id) => Some(id),
                _ => None,
            })
            .collect()
    }
}

/// A candidate wired over a shared backend with a fake clock and a callback
/// log, using the core client timing defaults (15s/10s/2s).
pub struct Candidate {
    pub elector: Arc<LeaderElector>,
    pub log: Arc<CallbackLog>,
    pub shutdown: CancellationToken,
}

impl Candidate {
    pub fn new(backend: &Arc<MemBackend>, clock: &Arc<FakeClock>, identity: &str) -> Self {
        Self::with_options(backend, clock, identity, false, "test-election")
    }

    pub fn with_options(
        backend: &Arc<MemBackend>,
        clock: &Arc<FakeClock>,
        identity: &str,
        release_on_cancel: bool,
        name: &str,
    ) -> Self {
        let log = Arc::new(CallbackLog::default());

        let callbacks = {
            let started_log = log.clone();
            let stopped_log = log.clone();
            let observer_log = log.clone();
            LeaderCallbacks::new(
                move |token: CancellationToken| {
                    started_log.push(CallbackEvent::StartedLeading);
                    async move { token.cancelled().await }
                },
                move || stopped_log.push(CallbackEvent::StoppedLeading),
            )
            .with_on_new_leader(move |leader| {
                observer_log.push(CallbackEvent::NewLeader(leader.to_string()))
            })
        };

        let config = LeaderElectionConfig {
            lock: Arc::new(MemLock::new(backend.clone(), identity)),
            lease_duration: Duration::from_secs(15),
            renew_deadline: Duration::from_secs(10),
            retry_period: Duration::from_secs(2),
            callbacks,
            watch_dog: None,
            release_on_cancel,
            name: name.to_string(),
        };
        let elector = Arc::new(LeaderElector::new_with_clock(config, clock.clone()).unwrap());

        Self {
            elector,
            log,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn spawn_run(&self) -> JoinHandle<()> {
        let elector = self.elector.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move { elector.run(shutdown).await })
    }
}

/// Poll `cond` until it holds or the virtual deadline passes. Meant for
/// paused-time tests, where the sleeps auto-advance.
pub async fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = tokio::time::Instant::now();
    while !cond() {
        if start.elapsed() > deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    true
}
