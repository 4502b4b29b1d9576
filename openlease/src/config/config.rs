//! Leader election runtime configuration.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::config::error::ConfigError;
use crate::health::HealthAdaptor;
use crate::resource_lock::ResourceLock;

/// Jitter factor applied to the retry period in the acquire phase: the next
/// sleep is drawn uniformly from `[retry_period, retry_period * (1 + JITTER_FACTOR)]`.
pub const JITTER_FACTOR: f64 = 1.2;

/// Callbacks triggered during the lifecycle of a
/// [`LeaderElector`](crate::LeaderElector).
///
/// `on_started_leading` and `on_new_leader` are dispatched on their own
/// tasks so user code cannot stall the election loop. `on_stopped_leading`
/// runs on the election task itself, last, and has returned before
/// [`run`](crate::LeaderElector::run) returns.
#[derive(Clone)]
pub struct LeaderCallbacks {
    /// Called when this candidate starts leading. The token is cancelled
    /// when leadership is lost.
    pub on_started_leading: Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, ()> + Send + Sync>,

    /// Called when this candidate stops leading, after a matching
    /// `on_started_leading`.
    pub on_stopped_leading: Arc<dyn Fn() + Send + Sync>,

    /// Called when the observed leader identity differs from the previously
    /// observed one, including the first observed leader. Optional.
    pub on_new_leader: Option<Arc<dyn Fn(&str) + Send + Sync>>,
}

impl LeaderCallbacks {
    /// Build the two required callbacks from plain closures; an observer can
    /// be attached with [`with_on_new_leader`](Self::with_on_new_leader).
    pub fn new<S, Fut, T>(started: S, stopped: T) -> Self
    where
        S: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
        T: Fn() + Send + Sync + 'static,
    {
        Self {
            on_started_leading: Arc::new(move |token| -> BoxFuture<'static, ()> {
                Box::pin(started(token))
            }),
            on_stopped_leading: Arc::new(stopped),
            on_new_leader: None,
        }
    }

    /// Attach an observer for leader identity changes.
    pub fn with_on_new_leader<F>(mut self, observer: F) -> Self
    where F: Fn(&str) + Send + Sync + 'static {
        self.on_new_leader = Some(Arc::new(observer));
        self
    }
}

/// Runtime configuration for a [`LeaderElector`](crate::LeaderElector).
///
/// # Usage
///
/// Build a configuration, pass it to
/// [`LeaderElector::new`](crate::LeaderElector::new) (which validates it)
/// and drive [`run`](crate::LeaderElector::run):
///
/// ```ignore
/// let config = LeaderElectionConfig {
///     lock,
///     lease_duration: Duration::from_secs(15),
///     renew_deadline: Duration::from_secs(10),
///     retry_period: Duration::from_secs(2),
///     callbacks,
///     watch_dog: None,
///     release_on_cancel: true,
///     name: "my-election".to_string(),
/// };
/// let elector = LeaderElector::new(config)?;
/// elector.run(shutdown).await;
/// ```
///
/// # Timing constraints
///
/// `lease_duration > renew_deadline > retry_period * JITTER_FACTOR`, all
/// strictly positive. Violations are rejected by [`validate`](Self::validate)
/// before any loop starts.
#[derive(Clone)]
pub struct LeaderElectionConfig {
    // NOTE: manual Debug impl below, since `lock`, `callbacks`, and
    // `watch_dog` hold trait objects that don't implement Debug.
    /// The resource that will be used for locking.
    pub lock: Arc<dyn ResourceLock>,

    /// The duration that non-leader candidates will wait to force acquire
    /// leadership, measured from the local time of the last observed change
    /// to the record.
    ///
    /// A candidate must observe no change to the record for a full
    /// `lease_duration` before it can attempt a takeover, so this should be
    /// as short as clock-skew tolerance allows.
    pub lease_duration: Duration,

    /// The duration that the acting leader will keep retrying a refresh
    /// before giving up leadership.
    pub renew_deadline: Duration,

    /// The base interval between acquire-or-renew attempts. Jittered by
    /// [`JITTER_FACTOR`] in the acquire phase.
    pub retry_period: Duration,

    /// Lifecycle callbacks.
    pub callbacks: LeaderCallbacks,

    /// Optional health watchdog. [`run_or_die`](crate::run_or_die) binds the
    /// elector to it before running.
    pub watch_dog: Option<Arc<HealthAdaptor>>,

    /// Release the lock when the run token is cancelled. When set, all work
    /// guarded by the lease must have completed before cancelling, or two
    /// processes may act on the critical path simultaneously.
    pub release_on_cancel: bool,

    /// Name of this election, used in logs and metrics.
    pub name: String,
}

impl std::fmt::Debug for LeaderElectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaderElectionConfig")
            .field("lock", &self.lock.identity())
            .field("lease_duration", &self.lease_duration)
            .field("renew_deadline", &self.renew_deadline)
            .field("retry_period", &self.retry_period)
            .field("callbacks", &"<callbacks>")
            .field("watch_dog", &self.watch_dog.is_some())
            .field("release_on_cancel", &self.release_on_cancel)
            .field("name", &self.name)
            .finish()
    }
}

impl LeaderElectionConfig {
    /// Validate the state of this config.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.lease_duration <= self.renew_deadline {
            return Err(ConfigError::LeaseDurationTooShort {
                lease_duration: self.lease_duration,
                renew_deadline: self.renew_deadline,
            });
        }

        if self.renew_deadline <= self.retry_period.mul_f64(JITTER_FACTOR) {
            return Err(ConfigError::RenewDeadlineTooShort {
                renew_deadline: self.renew_deadline,
                retry_period: self.retry_period,
            });
        }

        if self.lease_duration.is_zero() {
            return Err(ConfigError::DurationMustBePositive { field: "lease_duration" });
        }
        if self.renew_deadline.is_zero() {
            return Err(ConfigError::DurationMustBePositive { field: "renew_deadline" });
        }
        if self.retry_period.is_zero() {
            return Err(ConfigError::DurationMustBePositive { field: "retry_period" });
        }

        if self.lock.identity().is_empty() {
            return Err(ConfigError::EmptyLockIdentity);
        }

        Ok(self)
    }
}
