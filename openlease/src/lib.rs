//! Leader election over a strongly consistent lease store.
//!
//! A fleet of otherwise-identical processes uses this crate to elect exactly
//! one active leader at a time: the leader runs a protected workload while
//! the others stand by, ready to take over within a bounded time if the
//! leader dies. The election is backed by any store that offers atomic
//! create-if-absent, compare-and-set updates and a TTL; the store is
//! reached only through the [`ResourceLock`] trait, never directly.
//!
//! Guarantees, assuming a correct lease backend and bounded clock skew:
//!
//! - **Safety**: at most one candidate observes itself as leader with a
//!   locally valid lease at any moment.
//! - **Liveness**: if the leader dies, another candidate acquires the lease
//!   within a bounded time derived from the configured lease duration.
//! - **Observability**: each candidate is notified when it gains
//!   leadership, when it loses it, and whenever the observed leader
//!   identity changes.
//!
//! Expiry math runs exclusively on local monotonic clock deltas: a
//! candidate trusts the backend's compare-and-set ordering, but never
//! another node's timestamps.
//!
//! # Usage
//!
//! ```ignore
//! let callbacks = LeaderCallbacks::new(
//!     |token| async move {
//!         // Protected workload; stop when `token` is cancelled.
//!     },
//!     || tracing::info!("stepped down"),
//! );
//!
//! let config = LeaderElectionConfig {
//!     lock,
//!     lease_duration: Duration::from_secs(15),
//!     renew_deadline: Duration::from_secs(10),
//!     retry_period: Duration::from_secs(2),
//!     callbacks,
//!     watch_dog: None,
//!     release_on_cancel: true,
//!     name: "my-election".to_string(),
//! };
//!
//! run_or_die(config, shutdown).await;
//! ```

#![deny(unused_qualifications)]

mod clock;
mod config;
mod elector;
mod health;
mod record;
mod resource_lock;

pub mod metrics;
pub mod testing;

pub use tokio_util::sync::CancellationToken;

pub use crate::clock::Clock;
pub use crate::clock::SystemClock;
pub use crate::config::ConfigError;
pub use crate::config::LeaderCallbacks;
pub use crate::config::LeaderElectionConfig;
pub use crate::config::JITTER_FACTOR;
pub use crate::elector::run_or_die;
pub use crate::elector::LeaderElector;
pub use crate::health::HealthAdaptor;
pub use crate::health::HealthError;
pub use crate::record::LeaderElectionRecord;
pub use crate::resource_lock::LockError;
pub use crate::resource_lock::ResourceLock;
