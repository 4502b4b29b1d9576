//! The record persisted under the lock key.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// The value stored in the backing store by the current (or last) holder of
/// the lease.
///
/// Standby candidates use it for observational purposes only: the embedded
/// timestamps come from another node's wall clock and are never trusted for
/// expiry math. Expiry is always judged from the local monotonic time at
/// which a candidate last observed this record change.
#[derive(Serialize, Deserialize)]
#[derive(Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderElectionRecord {
    /// The identity that currently claims the lease. If empty, no one owns
    /// the lease and all candidates may acquire it; a holder sets it to
    /// empty when it voluntarily steps down.
    pub holder_identity: String,

    /// TTL the holder promises to refresh within, in whole seconds.
    pub lease_duration_seconds: u64,

    /// When the current holder first took the lease. Carried forward across
    /// renewals by the same holder, reset on a leader transition.
    pub acquire_time: DateTime<Utc>,

    /// Last successful refresh.
    pub renew_time: DateTime<Utc>,

    /// Incremented each time a different identity takes over.
    pub leader_transitions: u64,
}

impl LeaderElectionRecord {
    /// Encode to the canonical wire form used by the in-tree store.
    ///
    /// The encoding is deterministic: two equal records encode to
    /// byte-identical output, so raw encoded bytes can be compared to detect
    /// backend-side rewrites. Any backend encoding with the same property
    /// satisfies the elector.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode from the canonical wire form.
    pub fn decode(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono::Utc;

    use super::LeaderElectionRecord;

    #[test]
    fn test_record_encoding_round_trips_byte_identically() -> Result<(), serde_json::Error> {
        let t = Utc.with_ymd_and_hms(2024, 5, 17, 8, 30, 0).unwrap();
        let record = LeaderElectionRecord {
            holder_identity: "candidate-0".to_string(),
            lease_duration_seconds: 15,
            acquire_time: t,
            renew_time: t,
            leader_transitions: 3,
        };

        let raw = record.encode()?;
        let decoded = LeaderElectionRecord::decode(&raw)?;
        assert_eq!(record, decoded);
        assert_eq!(raw, decoded.encode()?);

        Ok(())
    }

    #[test]
    fn test_record_field_names_match_wire_format() -> Result<(), serde_json::Error> {
        let t = Utc.with_ymd_and_hms(2024, 5, 17, 8, 30, 0).unwrap();
        let record = LeaderElectionRecord {
            holder_identity: "a".to_string(),
            lease_duration_seconds: 1,
            acquire_time: t,
            renew_time: t,
            leader_transitions: 0,
        };

        let encoded = String::from_utf8(record.encode()?).unwrap();
        assert_eq!(
            encoded,
            r#"{"holderIdentity":"a","leaseDurationSeconds":1,"acquireTime":"2024-05-17T08:30:00Z","renewTime":"2024-05-17T08:30:00Z","leaderTransitions":0}"#
        );

        Ok(())
    }
}
