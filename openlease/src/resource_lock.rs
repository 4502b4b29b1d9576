//! Abstraction over the backing record store.

use anyerror::AnyError;
use async_trait::async_trait;

use crate::record::LeaderElectionRecord;

/// Error variants surfaced by a [`ResourceLock`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// No record exists under the lock key. Returned by `get`; triggers a
    /// `create` in the election protocol.
    #[error("leader election record not found")]
    NotFound,

    /// An atomic create lost the race: the record already exists.
    #[error("leader election record already exists")]
    AlreadyExists,

    /// A compare-and-set update observed a revision newer than the one this
    /// handle last read.
    #[error("conflicting update: record was modified since it was last observed")]
    Conflict,

    /// Transport or other backend failure.
    #[error("lock backend error: {0}")]
    Backend(#[from] AnyError),
}

impl LockError {
    /// Whether this is the distinguishable "no record yet" case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, LockError::NotFound)
    }
}

/// A named lock record in a strongly consistent store.
///
/// The elector drives this interface and nothing else; implementations hide
/// the concrete backend. Two responsibilities stay on the implementation
/// side: `update` must be a compare-and-set keyed on the revision observed
/// by this handle's last successful `get`/`create`/`update`, and every write
/// must attach or refresh a backend TTL equal to the record's
/// `lease_duration_seconds` so that abandoned records eventually disappear.
#[async_trait]
pub trait ResourceLock: Send + Sync {
    /// Read the current record together with its raw encoded bytes.
    async fn get(&self) -> Result<(LeaderElectionRecord, Vec<u8>), LockError>;

    /// Atomically create the record; fails if it already exists.
    async fn create(&self, record: &LeaderElectionRecord) -> Result<(), LockError>;

    /// Update the existing record, conditional on the revision last observed
    /// through this handle.
    async fn update(&self, record: &LeaderElectionRecord) -> Result<(), LockError>;

    /// Best-effort event emission; must never block or fail visibly.
    fn record_event(&self, message: &str);

    /// The unique identity of this candidate across all participants.
    /// Non-empty.
    fn identity(&self) -> String;

    /// Human readable description of the lock for logs.
    fn describe(&self) -> String;
}
