use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tessera_core::{NodeId, SealerList};
use tracing::{debug, error, info, warn};

use crate::committee::{window, CommitteeSnapshot, Rotation, RotationConfig, RotationState};
use crate::error::ConsensusError;
use crate::events::RemainingTxForwarder;
use crate::leader::{LeaderSelection, RoundRobin};

/// State guarded by the controller's lock. Every transition below runs
/// inside a single write guard, so readers never observe `window_start`
/// advanced without `round`.
#[derive(Debug, Default)]
struct RotationInner {
    config: RotationConfig,
    sealers: Vec<NodeId>,
    /// Generation of the applied sealer list; `None` until the first reset
    generation: Option<u64>,
    committee_size: usize,
    state: Option<RotationState>,
    members: Vec<NodeId>,
    member_set: HashSet<NodeId>,
}

impl RotationInner {
    fn rebuild_members(&mut self) {
        let window_start = self.state.map(|s| s.window_start).unwrap_or(0);
        self.members = window(&self.sealers, window_start, self.committee_size);
        self.member_set = self.members.iter().copied().collect();
    }

    /// Seed the counters from the block height alone, so a restarted node
    /// lands on the same window as one that rotated continuously.
    fn anchor(&mut self, current_block_number: u64) {
        let interval = self.config.rotating_interval;
        let round = current_block_number / interval;
        self.state = Some(RotationState {
            window_start: (round % self.sealers.len() as u64) as usize,
            round,
            block_number_at_last_rotation: round * interval,
        });
    }

    fn check_window(&self, state: &RotationState) -> Result<(), ConsensusError> {
        if state.window_start >= self.sealers.len() {
            let msg = format!(
                "window_start {} outside sealer list of {}",
                state.window_start,
                self.sealers.len()
            );
            error!("Refusing rotation: {}", msg);
            debug_assert!(false, "{}", msg);
            return Err(ConsensusError::InvariantViolation(msg));
        }
        Ok(())
    }

    fn rotate_if_due(&mut self, current_block_number: u64) -> Result<Option<Rotation>, ConsensusError> {
        let Some(mut state) = self.state else {
            return Err(ConsensusError::NotConfigured);
        };
        self.check_window(&state)?;

        let interval = self.config.rotating_interval;
        let elapsed = current_block_number.saturating_sub(state.round.saturating_mul(interval));
        if elapsed < interval {
            return Ok(None);
        }

        let n = self.sealers.len();
        let evicted = self.sealers[state.window_start];
        state.window_start = (state.window_start + 1) % n;
        let admitted = self.sealers[(state.window_start + self.committee_size - 1) % n];
        state.round += 1;
        state.block_number_at_last_rotation = current_block_number;

        self.state = Some(state);
        self.rebuild_members();

        info!(
            "Rotated committee at block {}: out {} in {}, round {}, window_start {}",
            current_block_number,
            evicted.abridged(),
            admitted.abridged(),
            state.round,
            state.window_start
        );

        Ok(Some(Rotation {
            evicted,
            admitted,
            round: state.round,
            window_start: state.window_start,
            block_number: current_block_number,
        }))
    }
}

/// Owns the active committee and rotates it through the sealer list.
pub struct CommitteeRotationController {
    local: NodeId,
    selection: Arc<dyn LeaderSelection>,
    forwarder: Option<Arc<dyn RemainingTxForwarder>>,
    inner: RwLock<RotationInner>,
}

impl CommitteeRotationController {
    /// Create a controller for the local node. No committee exists until
    /// [`reset_config`](Self::reset_config) applies a sealer list.
    pub fn new(local: NodeId, config: RotationConfig) -> Result<Self, ConsensusError> {
        config.validate()?;
        Ok(CommitteeRotationController {
            local,
            selection: Arc::new(RoundRobin),
            forwarder: None,
            inner: RwLock::new(RotationInner {
                config,
                ..Default::default()
            }),
        })
    }

    /// Replace the default round-robin leader choice
    pub fn with_leader_selection(mut self, selection: Arc<dyn LeaderSelection>) -> Self {
        self.selection = selection;
        self
    }

    pub fn set_forwarder(&mut self, forwarder: Arc<dyn RemainingTxForwarder>) {
        self.forwarder = Some(forwarder);
    }

    pub fn local(&self) -> NodeId {
        self.local
    }

    /// Apply the current sealer list and rotate if a window boundary passed.
    ///
    /// The committee size is recomputed only when the list differs from the
    /// one last applied. Replaying this call after a restart reproduces the
    /// same committee, since nothing here depends on earlier calls beyond
    /// the round counter.
    pub fn reset_config(
        &self,
        current_block_number: u64,
        sealers: &SealerList,
    ) -> Result<Option<Rotation>, ConsensusError> {
        if sealers.is_empty() {
            error!("Refusing empty sealer list at block {}", current_block_number);
            return Err(ConsensusError::EmptySealerList);
        }

        let rotation = {
            let mut inner = self.inner.write();
            let changed = inner.generation != Some(sealers.generation())
                || inner.sealers.as_slice() != sealers.nodes();

            if changed {
                let committee_size = inner.config.group_size.min(sealers.len());
                if committee_size == 0 {
                    return Err(ConsensusError::EmptyCommittee);
                }
                inner.sealers = sealers.nodes().to_vec();
                inner.generation = Some(sealers.generation());
                inner.committee_size = committee_size;

                let n = inner.sealers.len() as u64;
                match inner.state {
                    None => inner.anchor(current_block_number),
                    Some(state) => {
                        inner.state = Some(RotationState {
                            window_start: (state.round % n) as usize,
                            ..state
                        })
                    }
                }
                inner.rebuild_members();

                info!(
                    "Sealer list applied: {} sealers, generation {}, committee size {}, window_start {}",
                    inner.sealers.len(),
                    sealers.generation(),
                    committee_size,
                    inner.state.map(|s| s.window_start).unwrap_or(0)
                );
            }

            inner.rotate_if_due(current_block_number)?
        };

        self.notify_rotation(rotation.as_ref());
        Ok(rotation)
    }

    /// Apply new governance parameters (group size, rotating interval).
    ///
    /// The round counter is re-derived from the current height under the
    /// new interval, exactly as a fresh start would compute it.
    pub fn reconfigure(
        &self,
        config: RotationConfig,
        current_block_number: u64,
    ) -> Result<Option<Rotation>, ConsensusError> {
        config.validate()?;

        let rotation = {
            let mut inner = self.inner.write();
            if inner.config == config {
                return Ok(None);
            }
            info!(
                "Rotation parameters updated: group_size {} -> {}, interval {} -> {}",
                inner.config.group_size,
                config.group_size,
                inner.config.rotating_interval,
                config.rotating_interval
            );
            inner.config = config;

            if inner.sealers.is_empty() {
                return Ok(None);
            }
            inner.committee_size = config.group_size.min(inner.sealers.len());
            inner.anchor(current_block_number);
            inner.rebuild_members();
            inner.rotate_if_due(current_block_number)?
        };

        self.notify_rotation(rotation.as_ref());
        Ok(rotation)
    }

    /// Rotate by one member if `rotating_interval` blocks have passed since
    /// the current round began. No-op otherwise.
    pub fn rotate_if_due(
        &self,
        current_block_number: u64,
    ) -> Result<Option<Rotation>, ConsensusError> {
        let rotation = self.inner.write().rotate_if_due(current_block_number)?;
        self.notify_rotation(rotation.as_ref());
        Ok(rotation)
    }

    fn notify_rotation(&self, rotation: Option<&Rotation>) {
        let Some(rotation) = rotation else {
            return;
        };
        if rotation.evicted != self.local || !rotation.changes_membership() {
            return;
        }
        debug!(
            "Rotated out; forwarding remaining transactions to {}",
            rotation.admitted.abridged()
        );
        if let Some(forwarder) = &self.forwarder {
            forwarder.forward_remaining(&rotation.admitted);
        }
    }

    /// Leader for `(view, block_number)`, or `None` before configuration
    pub fn leader_for(&self, view: u64, block_number: u64) -> Option<NodeId> {
        let inner = self.inner.read();
        let state = inner.state?;
        if inner.members.is_empty() {
            return None;
        }

        let mut index =
            self.selection
                .select(view, block_number, &inner.members, state.window_start);
        if index >= inner.members.len() {
            warn!(
                "Leader selection returned index {} for committee of {}; using round-robin",
                index,
                inner.members.len()
            );
            index = RoundRobin.select(view, block_number, &inner.members, state.window_start);
        }
        inner.members.get(index).copied()
    }

    /// Byzantine members tolerated: `(committee_size - 1) / 3`
    pub fn fault_tolerance(&self) -> usize {
        self.inner.read().committee_size.saturating_sub(1) / 3
    }

    /// Matching votes needed to finalize: `committee_size - f`
    pub fn quorum_size(&self) -> usize {
        let size = self.inner.read().committee_size;
        size - size.saturating_sub(1) / 3
    }

    pub fn is_active_member(&self, node: &NodeId) -> bool {
        self.inner.read().member_set.contains(node)
    }

    pub fn is_local_active(&self) -> bool {
        self.is_active_member(&self.local)
    }

    pub fn committee_size(&self) -> usize {
        self.inner.read().committee_size
    }

    pub fn committee(&self) -> Vec<NodeId> {
        self.inner.read().members.clone()
    }

    pub fn rotation_state(&self) -> Option<RotationState> {
        self.inner.read().state
    }

    pub fn config(&self) -> RotationConfig {
        self.inner.read().config
    }

    pub fn snapshot(&self) -> Option<CommitteeSnapshot> {
        let inner = self.inner.read();
        let state = inner.state?;
        Some(CommitteeSnapshot {
            sealers: inner.sealers.clone(),
            members: inner.members.clone(),
            window_start: state.window_start,
            round: state.round,
            generation: inner.generation.unwrap_or_default(),
        })
    }

    /// Committee members this node cannot reach directly.
    ///
    /// A consensus packet carries this list so connected members can relay
    /// it to the ones the sender has no session with.
    pub fn disconnected_members(&self, connected: &HashSet<NodeId>) -> Vec<NodeId> {
        self.inner
            .read()
            .members
            .iter()
            .filter(|m| **m != self.local && !connected.contains(*m))
            .copied()
            .collect()
    }
}
