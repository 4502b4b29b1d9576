//! Pluggable sink for leader election metrics.
//!
//! This is deliberately a sink, not a source of truth: the elector records
//! events into it and never reads anything back. A process binds a provider
//! at most once with [`set_provider`]; unbound, every event is a no-op.

use std::sync::Arc;
use std::sync::OnceLock;

/// Instruments the leader election events of one election name.
pub trait LeaderMetric: Send + Sync {
    /// The current process became leader of the named election.
    fn on(&self, name: &str);

    /// The current process lost (or does not hold) leadership of the named
    /// election.
    fn off(&self, name: &str);

    /// The slow read-modify-write path was taken to renew the named lease.
    fn slowpath_exercised(&self, name: &str);
}

/// Builds the [`LeaderMetric`] used by each elector.
pub trait MetricsProvider: Send + Sync {
    /// Create a metric instance for a new elector.
    fn new_leader_metric(&self) -> Arc<dyn LeaderMetric>;
}

struct NoopMetric;

impl LeaderMetric for NoopMetric {
    fn on(&self, _name: &str) {}
    fn off(&self, _name: &str) {}
    fn slowpath_exercised(&self, _name: &str) {}
}

static GLOBAL_PROVIDER: OnceLock<Arc<dyn MetricsProvider>> = OnceLock::new();

/// Set the metrics provider for all subsequently created electors. Only the
/// first call has an effect.
pub fn set_provider(provider: Arc<dyn MetricsProvider>) {
    let _ = GLOBAL_PROVIDER.set(provider);
}

pub(crate) fn new_leader_metric() -> Arc<dyn LeaderMetric> {
    match GLOBAL_PROVIDER.get() {
        Some(provider) => provider.new_leader_metric(),
        None => Arc::new(NoopMetric),
    }
}
