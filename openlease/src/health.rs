//! Liveness projection of a leader elector.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use crate::elector::LeaderElector;

/// Error returned by a failed health check.
#[derive(Debug, thiserror::Error)]
#[derive(PartialEq, Eq)]
pub enum HealthError {
    /// The process holds the lease but has not renewed it within the
    /// tolerated staleness window. The surrounding supervisor should take
    /// the process down.
    #[error("failed election to renew leadership on lease {name}")]
    RenewStalled {
        /// Name of the election.
        name: String,
    },
}

/// Associates a liveness check with a [`LeaderElector`].
///
/// A health endpoint is usually set up before the elector exists, so the
/// adaptor starts empty and is bound later with
/// [`set_leader_election`](Self::set_leader_election). It reports unhealthy
/// only in one situation: the bound elector holds the lease but has failed
/// to renew it for longer than the lease duration plus the configured
/// tolerance, without exiting. Standby candidates are always healthy.
pub struct HealthAdaptor {
    elector: Mutex<Option<Arc<LeaderElector>>>,
    max_tolerable_expired_lease: Duration,
}

impl HealthAdaptor {
    /// Create an unbound adaptor. `max_tolerable_expired_lease` is the slack
    /// beyond the lease expiry during which checks still pass.
    pub fn new(max_tolerable_expired_lease: Duration) -> Self {
        Self {
            elector: Mutex::new(None),
            max_tolerable_expired_lease,
        }
    }

    /// Name of the health check this adaptor implements.
    pub fn name(&self) -> &'static str {
        "leader-election"
    }

    /// Tie a leader elector to this adaptor.
    pub fn set_leader_election(&self, elector: Arc<LeaderElector>) {
        *self.elector.lock().unwrap() = Some(elector);
    }

    /// Called by the health endpoint handler. A non-error return means
    /// healthy.
    pub fn check(&self) -> Result<(), HealthError> {
        let elector = self.elector.lock().unwrap().clone();
        match elector {
            None => Ok(()),
            Some(elector) => elector.check(self.max_tolerable_expired_lease),
        }
    }
}
