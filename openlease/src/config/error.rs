use std::time::Duration;

/// Error variants related to configuration.
#[derive(Debug, thiserror::Error)]
#[derive(PartialEq, Eq)]
pub enum ConfigError {
    /// The lease duration does not dominate the renew deadline.
    #[error("lease_duration({lease_duration:?}) must be > renew_deadline({renew_deadline:?})")]
    LeaseDurationTooShort {
        /// Configured lease duration.
        lease_duration: Duration,
        /// Configured renew deadline.
        renew_deadline: Duration,
    },

    /// The renew deadline does not dominate a jittered retry period.
    #[error("renew_deadline({renew_deadline:?}) must be > retry_period({retry_period:?}) * jitter factor")]
    RenewDeadlineTooShort {
        /// Configured renew deadline.
        renew_deadline: Duration,
        /// Configured retry period.
        retry_period: Duration,
    },

    /// A required duration is zero.
    #[error("{field} must be greater than zero")]
    DurationMustBePositive {
        /// Name of the offending field.
        field: &'static str,
    },

    /// The lock reports an empty candidate identity.
    #[error("lock identity is empty")]
    EmptyLockIdentity,
}
