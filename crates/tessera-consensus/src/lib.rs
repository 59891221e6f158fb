//! Tessera Consensus - Committee rotation and leader selection
//!
//! This crate owns the active committee drawn from the sealer list,
//! rotates it every `rotating_interval` blocks, picks the leader for a
//! view and derives the quorum threshold.

pub mod committee;
pub mod error;
pub mod events;
pub mod leader;
pub mod rotation;

pub use committee::{CommitteeSnapshot, Rotation, RotationConfig, RotationState};
pub use error::ConsensusError;
pub use events::RemainingTxForwarder;
pub use leader::{LeaderSelection, RoundRobin};
pub use rotation::CommitteeRotationController;
