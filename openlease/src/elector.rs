//! The leader election state machine.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::clock::SystemClock;
use crate::config::ConfigError;
use crate::config::LeaderElectionConfig;
use crate::config::JITTER_FACTOR;
use crate::health::HealthError;
use crate::metrics;
use crate::metrics::LeaderMetric;
use crate::record::LeaderElectionRecord;
use crate::resource_lock::LockError;

/// The record this candidate most recently read or wrote, the raw bytes it
/// was read as, and the local monotonic time at which it was installed.
///
/// The local installation time is the only clock trusted for expiry math on
/// this node; the timestamps inside the record come from another node's wall
/// clock.
#[derive(Default)]
struct Observed {
    record: Option<LeaderElectionRecord>,
    raw: Vec<u8>,
    time: Option<Instant>,
}

/// A leader election client.
///
/// Constructed from a validated [`LeaderElectionConfig`], it runs a single
/// [`run`](Self::run) and is not restartable: create a new elector to
/// campaign again.
pub struct LeaderElector {
    config: LeaderElectionConfig,

    observed: Mutex<Observed>,

    /// Last identity delivered to `on_new_leader`, to deduplicate
    /// notifications. Only the election task touches this.
    reported_leader: Mutex<String>,

    clock: Arc<dyn Clock>,

    metrics: Arc<dyn LeaderMetric>,
}

impl LeaderElector {
    /// Create an elector from a config, validating it first.
    pub fn new(config: LeaderElectionConfig) -> Result<Self, ConfigError> {
        Self::new_with_clock(config, Arc::new(SystemClock))
    }

    /// Create an elector with an explicit [`Clock`], so tests can advance
    /// time deterministically.
    pub fn new_with_clock(
        config: LeaderElectionConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let config = config.validate()?;

        let metrics = metrics::new_leader_metric();
        metrics.off(&config.name);

        Ok(Self {
            config,
            observed: Mutex::new(Observed::default()),
            reported_leader: Mutex::new(String::new()),
            clock,
            metrics,
        })
    }

    /// Start the leader election loop.
    ///
    /// Blocks until `shutdown` is cancelled or the lease is irretrievably
    /// lost. If this candidate ever started leading, `on_stopped_leading`
    /// has returned by the time `run` returns.
    pub async fn run(&self, shutdown: CancellationToken) {
        if !self.acquire(&shutdown).await {
            // Shutdown was signalled before leadership was ever acquired;
            // there is no matching `on_started_leading` to pair a stop with.
            return;
        }

        let lead_token = shutdown.child_token();
        let started = (self.config.callbacks.on_started_leading)(lead_token.clone());
        tokio::spawn(started);

        self.renew(&shutdown).await;
        lead_token.cancel();

        (self.config.callbacks.on_stopped_leading)();
    }

    /// The identity of the last observed leader, or the empty string if no
    /// leader has been observed yet. Informational only.
    pub fn get_leader(&self) -> String {
        let observed = self.observed.lock().unwrap();
        observed.record.as_ref().map(|r| r.holder_identity.clone()).unwrap_or_default()
    }

    /// Whether the last observed leader is this candidate.
    pub fn is_leader(&self) -> bool {
        self.get_leader() == self.config.lock.identity()
    }

    /// Health projection: fails if this candidate holds the lease but has
    /// not been able to renew it for more than
    /// `lease_duration + max_tolerable_expired_lease`.
    pub fn check(&self, max_tolerable_expired_lease: Duration) -> Result<(), HealthError> {
        if !self.is_leader() {
            // Not concerned with hot standbys.
            return Ok(());
        }

        let observed_time = self.observed.lock().unwrap().time;
        let stale = match observed_time {
            Some(observed_time) => self.clock.now().saturating_duration_since(observed_time),
            None => Duration::ZERO,
        };
        if stale > self.config.lease_duration + max_tolerable_expired_lease {
            return Err(HealthError::RenewStalled {
                name: self.config.name.clone(),
            });
        }

        Ok(())
    }

    /// Loop calling [`try_acquire_or_renew`](Self::try_acquire_or_renew) on
    /// a jittered `retry_period` schedule until it succeeds. Returns false
    /// if `shutdown` is signalled first.
    async fn acquire(&self, shutdown: &CancellationToken) -> bool {
        let desc = self.config.lock.describe();
        tracing::info!("attempting to acquire leader lease {}...", desc);

        loop {
            let succeeded = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return false,
                succeeded = self.try_acquire_or_renew() => succeeded,
            };
            self.maybe_report_transition();

            if succeeded {
                self.config.lock.record_event("became leader");
                self.metrics.on(&self.config.name);
                tracing::info!("successfully acquired lease {}", desc);
                return true;
            }
            tracing::info!("failed to acquire lease {}", desc);

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return false,
                _ = tokio::time::sleep(jittered(self.config.retry_period)) => {}
            }
        }
    }

    /// Loop renewing the lease on a fixed `retry_period` schedule. Each
    /// iteration polls [`try_acquire_or_renew`](Self::try_acquire_or_renew)
    /// within a `renew_deadline` window; the first window that elapses
    /// without a successful renewal ends leadership and the loop.
    async fn renew(&self, shutdown: &CancellationToken) {
        let desc = self.config.lock.describe();

        loop {
            let renewed = tokio::select! {
                biased;
                _ = shutdown.cancelled() => false,
                outcome = tokio::time::timeout(self.config.renew_deadline, async {
                    loop {
                        if self.try_acquire_or_renew().await {
                            return;
                        }
                        tokio::time::sleep(self.config.retry_period).await;
                    }
                }) => outcome.is_ok(),
            };
            self.maybe_report_transition();

            if !renewed {
                self.metrics.off(&self.config.name);
                tracing::info!("failed to renew lease {}", desc);
                break;
            }
            tracing::trace!("successfully renewed lease {}", desc);

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.retry_period) => {}
            }
        }

        self.config.lock.record_event("stopped leading");

        // If we still hold the lease, give it up.
        if self.config.release_on_cancel {
            self.release().await;
        }
    }

    /// Give the lease up if this candidate holds it, by writing a record
    /// with an empty holder and a one second TTL so the backend reaps it
    /// quickly. The transition count is preserved. Errors are logged and
    /// swallowed; a no-op when not leading.
    ///
    /// [`run`](Self::run) invokes this on the way out when
    /// `release_on_cancel` is set; it is public for manually driven
    /// campaigns.
    pub async fn release(&self) -> bool {
        if !self.is_leader() {
            return true;
        }
        let Some(observed) = self.observed_record() else {
            return true;
        };

        let now = self.clock.wall_now();
        let record = LeaderElectionRecord {
            holder_identity: String::new(),
            lease_duration_seconds: 1,
            acquire_time: now,
            renew_time: now,
            leader_transitions: observed.leader_transitions,
        };
        if let Err(err) = self.config.lock.update(&record).await {
            tracing::error!("failed to release lock: {}", err);
            return false;
        }

        self.set_observed_record(&record, None);
        true
    }

    /// One tick of the election protocol: acquire the lease if it is free or
    /// expired, renew it if this candidate already holds it. Returns true on
    /// success.
    ///
    /// [`run`](Self::run) drives this on its own schedule; it is public so a
    /// campaign can also be driven tick-by-tick.
    pub async fn try_acquire_or_renew(&self) -> bool {
        let now = self.clock.now();
        let wall_now = self.clock.wall_now();
        let mut candidate = LeaderElectionRecord {
            holder_identity: self.config.lock.identity(),
            lease_duration_seconds: self.config.lease_duration.as_secs(),
            acquire_time: wall_now,
            renew_time: wall_now,
            leader_transitions: 0,
        };

        // 1. Fast path: the holder updates optimistically, assuming the
        // record observed last time is still the current version.
        if self.is_leader() && self.is_lease_valid(now) {
            if let Some(observed) = self.observed_record() {
                candidate.acquire_time = observed.acquire_time;
                candidate.leader_transitions = observed.leader_transitions;
            }

            match self.config.lock.update(&candidate).await {
                Ok(()) => {
                    self.set_observed_record(&candidate, None);
                    return true;
                }
                Err(err) => {
                    tracing::error!(
                        "failed to update lock optimistically: {}, falling back to slow path",
                        err
                    );
                }
            }
        }

        // 2. Obtain or create the record.
        let (old, old_raw) = match self.config.lock.get().await {
            Ok(pair) => pair,
            Err(LockError::NotFound) => {
                if let Err(err) = self.config.lock.create(&candidate).await {
                    tracing::error!("error initially creating leader election record: {}", err);
                    return false;
                }
                self.set_observed_record(&candidate, None);
                return true;
            }
            Err(err) => {
                tracing::error!(
                    "error retrieving resource lock {}: {}",
                    self.config.lock.describe(),
                    err
                );
                return false;
            }
        };

        // 3. Record obtained. A raw-bytes difference means the stored value
        // changed since the last observation, even if it decodes to an equal
        // record; installing it resets the local observation time that all
        // expiry math runs on.
        {
            let mut observed = self.observed.lock().unwrap();
            if observed.raw != old_raw {
                observed.record = Some(old.clone());
                observed.raw = old_raw;
                observed.time = Some(self.clock.now());
            }
        }
        if !old.holder_identity.is_empty() && self.is_lease_valid(now) && !self.is_leader() {
            tracing::debug!("lock is held by {} and has not yet expired", old.holder_identity);
            return false;
        }

        // 4. The candidate record was built for a fresh acquisition; correct
        // it before updating. A self-renewal through this path keeps both
        // the acquire time and the transition count; a takeover bumps the
        // count.
        if self.is_leader() {
            candidate.acquire_time = old.acquire_time;
            candidate.leader_transitions = old.leader_transitions;
            self.metrics.slowpath_exercised(&self.config.name);
        } else {
            candidate.leader_transitions = old.leader_transitions + 1;
        }

        // 5. Update the lock itself.
        if let Err(err) = self.config.lock.update(&candidate).await {
            tracing::error!("failed to update lock: {}", err);
            return false;
        }
        self.set_observed_record(&candidate, None);
        true
    }

    /// Report a leader change to `on_new_leader`, at most once per observed
    /// identity. Dispatched on its own task so the election loop is never
    /// blocked by user code.
    fn maybe_report_transition(&self) {
        let leader = self.get_leader();

        let mut reported = self.reported_leader.lock().unwrap();
        if *reported == leader {
            return;
        }
        *reported = leader.clone();

        if let Some(on_new_leader) = self.config.callbacks.on_new_leader.clone() {
            tokio::spawn(async move { on_new_leader(&leader) });
        }
    }

    /// Whether the observed lease is still valid by this node's clock.
    fn is_lease_valid(&self, now: Instant) -> bool {
        let observed = self.observed.lock().unwrap();
        match (&observed.record, observed.time) {
            (Some(record), Some(time)) => {
                time + Duration::from_secs(record.lease_duration_seconds) > now
            }
            _ => false,
        }
    }

    fn observed_record(&self) -> Option<LeaderElectionRecord> {
        self.observed.lock().unwrap().record.clone()
    }

    /// Install a new observed record, stamping it with the current local
    /// time. The raw bytes are rewritten only when the record came from a
    /// read; locally built records keep the previously read bytes, so the
    /// next read-back is detected as a change.
    fn set_observed_record(&self, record: &LeaderElectionRecord, raw: Option<&[u8]>) {
        let mut observed = self.observed.lock().unwrap();
        observed.record = Some(record.clone());
        if let Some(raw) = raw {
            observed.raw = raw.to_vec();
        }
        observed.time = Some(self.clock.now());
    }
}

/// Run the election with the provided config, panicking if it fails to
/// validate. Binds the config's watchdog, then blocks like
/// [`LeaderElector::run`].
pub async fn run_or_die(config: LeaderElectionConfig, shutdown: CancellationToken) {
    let watch_dog = config.watch_dog.clone();

    let elector = match LeaderElector::new(config) {
        Ok(elector) => Arc::new(elector),
        Err(err) => panic!("invalid leader election config: {}", err),
    };
    if let Some(watch_dog) = watch_dog {
        watch_dog.set_leader_election(elector.clone());
    }

    elector.run(shutdown).await;
}

/// Draw the next acquire-phase sleep uniformly from
/// `[period, period * (1 + JITTER_FACTOR)]`.
fn jittered(period: Duration) -> Duration {
    period.mul_f64(1.0 + rand::rng().random_range(0.0..JITTER_FACTOR))
}
