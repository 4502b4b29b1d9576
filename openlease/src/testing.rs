//! Support types for deterministic tests of election behavior.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::time::Duration;
use std::time::Instant;

use chrono::DateTime;
use chrono::Utc;

use crate::clock::Clock;
use crate::metrics;
use crate::metrics::LeaderMetric;
use crate::metrics::MetricsProvider;

/// A [`Clock`] whose readings move only when a test advances them.
///
/// Both the monotonic and the wall reading advance together, so record
/// timestamps stay consistent with expiry math.
#[derive(Debug)]
pub struct FakeClock {
    base: Instant,
    wall_base: DateTime<Utc>,
    offset: Mutex<Duration>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            wall_base: Utc::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move both readings forward.
    pub fn advance(&self, d: Duration) {
        *self.offset.lock().unwrap() += d;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap()
    }

    fn wall_now(&self) -> DateTime<Utc> {
        let offset = *self.offset.lock().unwrap();
        self.wall_base + chrono::Duration::from_std(offset).expect("test offset fits chrono range")
    }
}

/// Per-election-name event counts recorded by [`CountingMetricsProvider`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricCounts {
    pub on: u64,
    pub off: u64,
    pub slowpath: u64,
}

/// A metrics provider that counts events per election name.
///
/// The process-wide provider can be bound only once, so tests share a single
/// instance through [`install`](Self::install) and keep their assertions
/// apart by using distinct election names.
#[derive(Default)]
pub struct CountingMetricsProvider {
    counts: Arc<Mutex<HashMap<String, MetricCounts>>>,
}

impl CountingMetricsProvider {
    /// Bind the shared counting provider for this process and return it.
    pub fn install() -> Arc<CountingMetricsProvider> {
        static INSTANCE: OnceLock<Arc<CountingMetricsProvider>> = OnceLock::new();
        let instance = INSTANCE.get_or_init(|| Arc::new(CountingMetricsProvider::default()));
        metrics::set_provider(instance.clone());
        instance.clone()
    }

    /// The counts recorded so far for one election name.
    pub fn counts(&self, name: &str) -> MetricCounts {
        self.counts.lock().unwrap().get(name).copied().unwrap_or_default()
    }
}

struct CountingMetric {
    counts: Arc<Mutex<HashMap<String, MetricCounts>>>,
}

impl LeaderMetric for CountingMetric {
    fn on(&self, name: &str) {
        self.counts.lock().unwrap().entry(name.to_string()).or_default().on += 1;
    }

    fn off(&self, name: &str) {
        self.counts.lock().unwrap().entry(name.to_string()).or_default().off += 1;
    }

    fn slowpath_exercised(&self, name: &str) {
        self.counts.lock().unwrap().entry(name.to_string()).or_default().slowpath += 1;
    }
}

impl MetricsProvider for CountingMetricsProvider {
    fn new_leader_metric(&self) -> Arc<dyn LeaderMetric> {
        Arc::new(CountingMetric {
            counts: self.counts.clone(),
        })
    }
}
