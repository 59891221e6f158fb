use tessera_core::NodeId;

use crate::error::ConsensusError;

/// Governance-controlled rotation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationConfig {
    /// Configured committee size; capped by the sealer count
    pub group_size: usize,
    /// Blocks per rotation window
    pub rotating_interval: u64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        RotationConfig {
            group_size: 4,
            rotating_interval: 10,
        }
    }
}

impl RotationConfig {
    pub fn validate(&self) -> Result<(), ConsensusError> {
        if self.group_size == 0 {
            return Err(ConsensusError::EmptyCommittee);
        }
        if self.rotating_interval == 0 {
            return Err(ConsensusError::InvalidRotatingInterval);
        }
        Ok(())
    }
}

/// Counters advanced by each rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationState {
    pub window_start: usize,
    pub round: u64,
    pub block_number_at_last_rotation: u64,
}

/// One completed rotation step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rotation {
    pub evicted: NodeId,
    pub admitted: NodeId,
    pub round: u64,
    pub window_start: usize,
    pub block_number: u64,
}

impl Rotation {
    /// Evicting and admitting the same sealer leaves membership unchanged
    pub fn changes_membership(&self) -> bool {
        self.evicted != self.admitted
    }
}

/// Immutable copy of the committee as of one rotation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitteeSnapshot {
    pub sealers: Vec<NodeId>,
    /// Active committee in window order
    pub members: Vec<NodeId>,
    pub window_start: usize,
    pub round: u64,
    pub generation: u64,
}

/// Contiguous wrap-around window of `size` sealers starting at `start`
pub(crate) fn window(sealers: &[NodeId], start: usize, size: usize) -> Vec<NodeId> {
    let n = sealers.len();
    (0..size).map(|k| sealers[(start + k) % n]).collect()
}
