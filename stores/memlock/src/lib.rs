//! An in-memory lease store.
//!
//! [`MemBackend`] is the store: a single mutex over one optional record, so
//! every operation is linearized by construction. [`MemLock`] is one
//! candidate's handle on it, carrying the candidate identity and the
//! revision observed by the handle's last successful operation, which is the
//! compare half of the update's compare-and-set.
//!
//! The backend doubles as the deterministic test double for election tests:
//! it can be driven by a fake clock, partitioned with
//! [`set_unreachable`](MemBackend::set_unreachable), and inspected through
//! the stored record and the event log.

#![deny(unused_qualifications)]

#[cfg(test)]
mod test;

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use anyerror::AnyError;
use async_trait::async_trait;
use openlease::Clock;
use openlease::LeaderElectionRecord;
use openlease::LockError;
use openlease::ResourceLock;
use openlease::SystemClock;

/// A stored record with its compare-and-set revision and lease expiry.
#[derive(Debug, Clone)]
struct StoredEntry {
    record: LeaderElectionRecord,
    raw: Vec<u8>,
    revision: u64,
    expires_at: Instant,
}

struct BackendState {
    entry: Option<StoredEntry>,
    next_revision: u64,
    expire_abandoned: bool,
    unreachable: bool,
    events: Vec<(String, String)>,
}

/// A shared in-memory lease store; one per lock name.
pub struct MemBackend {
    name: String,
    clock: Arc<dyn Clock>,
    state: Mutex<BackendState>,
}

impl MemBackend {
    /// Create a backend on the system clock.
    pub fn new(name: impl ToString) -> Arc<Self> {
        Self::with_clock(name, Arc::new(SystemClock))
    }

    /// Create a backend on an explicit clock, so tests can expire leases
    /// deterministically.
    pub fn with_clock(name: impl ToString, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            clock,
            state: Mutex::new(BackendState {
                entry: None,
                next_revision: 0,
                expire_abandoned: false,
                unreachable: false,
                events: Vec::new(),
            }),
        })
    }

    /// Reap expired records the way a lease-enabled store would.
    ///
    /// Off by default: the store then keeps abandoned records around like a
    /// plain kv object, which is what takeover flows observe and what their
    /// tests want. Switched on, a record disappears `lease_duration_seconds`
    /// after its last write.
    pub fn set_expire_abandoned(&self, on: bool) {
        self.state.lock().unwrap().expire_abandoned = on;
    }

    /// Simulate a partition: every operation fails until switched back.
    pub fn set_unreachable(&self, on: bool) {
        self.state.lock().unwrap().unreachable = on;
    }

    /// The record currently stored, if any.
    pub fn stored_record(&self) -> Option<LeaderElectionRecord> {
        let mut state = self.state.lock().unwrap();
        self.reap(&mut state);
        state.entry.as_ref().map(|e| e.record.clone())
    }

    /// Seed the store with a pre-existing record, as if written by an
    /// earlier process.
    pub fn seed(&self, record: &LeaderElectionRecord) -> Result<(), LockError> {
        let raw = encode(record)?;
        let mut state = self.state.lock().unwrap();
        state.next_revision += 1;
        let revision = state.next_revision;
        let expires_at = self.clock.now() + Duration::from_secs(record.lease_duration_seconds);
        state.entry = Some(StoredEntry {
            record: record.clone(),
            raw,
            revision,
            expires_at,
        });
        Ok(())
    }

    /// Rewrite the stored raw bytes into an equivalent but differently
    /// encoded form, the way a backend-side rewrite would. The decoded
    /// record is unchanged; the revision moves.
    pub fn reencode_stored(&self) {
        let mut state = self.state.lock().unwrap();
        state.next_revision += 1;
        let revision = state.next_revision;
        if let Some(entry) = &mut state.entry {
            entry.raw = serde_json::to_vec_pretty(&entry.record)
                .expect("leader election record serializes to JSON");
            entry.revision = revision;
        }
    }

    /// Events recorded through every handle, in order of
    /// `(identity, message)`.
    pub fn events(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().events.clone()
    }

    fn reap(&self, state: &mut BackendState) {
        if !state.expire_abandoned {
            return;
        }
        let expired = matches!(&state.entry, Some(entry) if self.clock.now() >= entry.expires_at);
        if expired {
            state.entry = None;
        }
    }
}

/// One candidate's handle on a shared [`MemBackend`].
pub struct MemLock {
    backend: Arc<MemBackend>,
    identity: String,
    /// Revision observed at the last successful get/create/update.
    observed_revision: Mutex<u64>,
}

impl MemLock {
    pub fn new(backend: Arc<MemBackend>, identity: impl ToString) -> Self {
        Self {
            backend,
            identity: identity.to_string(),
            observed_revision: Mutex::new(0),
        }
    }

    /// The backend this handle operates on.
    pub fn backend(&self) -> &Arc<MemBackend> {
        &self.backend
    }
}

#[async_trait]
impl ResourceLock for MemLock {
    async fn get(&self) -> Result<(LeaderElectionRecord, Vec<u8>), LockError> {
        let mut state = self.backend.state.lock().unwrap();
        if state.unreachable {
            return Err(unreachable_err());
        }
        self.backend.reap(&mut state);

        match &state.entry {
            None => Err(LockError::NotFound),
            Some(entry) => {
                *self.observed_revision.lock().unwrap() = entry.revision;
                Ok((entry.record.clone(), entry.raw.clone()))
            }
        }
    }

    async fn create(&self, record: &LeaderElectionRecord) -> Result<(), LockError> {
        let raw = encode(record)?;
        let mut state = self.backend.state.lock().unwrap();
        if state.unreachable {
            return Err(unreachable_err());
        }
        self.backend.reap(&mut state);

        if state.entry.is_some() {
            return Err(LockError::AlreadyExists);
        }

        state.next_revision += 1;
        let revision = state.next_revision;
        let expires_at = self.backend.clock.now() + Duration::from_secs(record.lease_duration_seconds);
        state.entry = Some(StoredEntry {
            record: record.clone(),
            raw,
            revision,
            expires_at,
        });
        *self.observed_revision.lock().unwrap() = revision;
        Ok(())
    }

    async fn update(&self, record: &LeaderElectionRecord) -> Result<(), LockError> {
        let raw = encode(record)?;
        let mut state = self.backend.state.lock().unwrap();
        if state.unreachable {
            return Err(unreachable_err());
        }
        self.backend.reap(&mut state);

        match &state.entry {
            None => return Err(LockError::NotFound),
            Some(entry) => {
                if entry.revision != *self.observed_revision.lock().unwrap() {
                    return Err(LockError::Conflict);
                }
            }
        }

        state.next_revision += 1;
        let revision = state.next_revision;
        let expires_at = self.backend.clock.now() + Duration::from_secs(record.lease_duration_seconds);
        state.entry = Some(StoredEntry {
            record: record.clone(),
            raw,
            revision,
            expires_at,
        });
        *self.observed_revision.lock().unwrap() = revision;
        Ok(())
    }

    fn record_event(&self, message: &str) {
        tracing::info!("{}: {}: {}", self.describe(), self.identity, message);
        if let Ok(mut state) = self.backend.state.lock() {
            state.events.push((self.identity.clone(), message.to_string()));
        }
    }

    fn identity(&self) -> String {
        self.identity.clone()
    }

    fn describe(&self) -> String {
        format!("memlock/{}", self.backend.name)
    }
}

fn encode(record: &LeaderElectionRecord) -> Result<Vec<u8>, LockError> {
    record.encode().map_err(|e| LockError::Backend(AnyError::error(e)))
}

fn unreachable_err() -> LockError {
    LockError::Backend(AnyError::error("memlock backend unreachable"))
}
