use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("Sealer list is empty")]
    EmptySealerList,

    #[error("Committee size must be at least 1")]
    EmptyCommittee,

    #[error("Rotating interval must be at least 1")]
    InvalidRotatingInterval,

    #[error("Rotation not configured: no sealer list has been applied")]
    NotConfigured,

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}
