use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tessera_consensus::{
    CommitteeRotationController, RemainingTxForwarder, Rotation, RotationConfig,
};
use tessera_core::{NodeId, RawPrepareStatus, SealerList};
use tessera_sync::{
    CatchUpCache, CatchUpConfig, OwnRole, RawPrepareRequest, RawPrepareResponse,
    StatusAnnouncement, StatusOutcome, SyncError, TreeTopology,
};
use tracing::{debug, info};

use crate::config::NodeConfig;

/// Logs the hand-off of pending transactions when this node rotates out.
/// Transaction sync is not part of this node, so nothing is sent.
struct LoggingForwarder;

impl RemainingTxForwarder for LoggingForwarder {
    fn forward_remaining(&self, admitted: &NodeId) {
        info!(
            "Left the committee; pending transactions go to {}",
            admitted.abridged()
        );
    }
}

/// One line of membership state, used for logs and the `plan` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSummary {
    pub block_number: u64,
    pub role: OwnRole,
    pub leader: Option<NodeId>,
    pub committee: Vec<NodeId>,
    pub quorum_size: usize,
    pub fault_tolerance: usize,
    pub round: u64,
}

/// Owns the rotation controller, tree topology and catch-up cache and
/// drives them from block and network events.
pub struct MembershipNode {
    local: NodeId,
    controller: CommitteeRotationController,
    topology: TreeTopology,
    cache: CatchUpCache,
}

impl MembershipNode {
    pub fn new(
        local: NodeId,
        rotation: RotationConfig,
        tree_width: usize,
        catch_up: CatchUpConfig,
    ) -> Result<Self> {
        let mut controller = CommitteeRotationController::new(local, rotation)?;
        controller.set_forwarder(Arc::new(LoggingForwarder));

        Ok(MembershipNode {
            local,
            controller,
            topology: TreeTopology::new(local, tree_width)?,
            cache: CatchUpCache::new(catch_up)?,
        })
    }

    /// Create a node from configuration and apply its sealer list at
    /// `start_block`
    pub fn from_config(config: &NodeConfig, start_block: u64) -> Result<Self> {
        let keypair = config.keypair()?;
        let node = MembershipNode::new(
            keypair.id,
            config.rotation_config(),
            config.tree_width,
            config.catch_up_config(),
        )?;
        node.on_sealer_list_changed(&config.sealer_list()?, start_block)?;
        Ok(node)
    }

    pub fn local(&self) -> NodeId {
        self.local
    }

    pub fn controller(&self) -> &CommitteeRotationController {
        &self.controller
    }

    pub fn topology(&self) -> &TreeTopology {
        &self.topology
    }

    pub fn cache(&self) -> &CatchUpCache {
        &self.cache
    }

    fn refresh_topology(&self) -> Result<()> {
        if let Some(snapshot) = self.controller.snapshot() {
            self.topology.recompute(&snapshot.sealers, &snapshot.members)?;
        }
        Ok(())
    }

    /// Apply a governance change to the sealer list
    pub fn on_sealer_list_changed(
        &self,
        sealers: &SealerList,
        block_number: u64,
    ) -> Result<Option<Rotation>> {
        let rotation = self.controller.reset_config(block_number, sealers)?;
        self.refresh_topology()?;
        Ok(rotation)
    }

    /// Apply new rotation parameters
    pub fn on_rotation_config_changed(
        &self,
        config: RotationConfig,
        block_number: u64,
    ) -> Result<Option<Rotation>> {
        let rotation = self.controller.reconfigure(config, block_number)?;
        self.refresh_topology()?;
        Ok(rotation)
    }

    /// Advance to a newly committed block
    pub fn on_new_block(&self, block_number: u64, view: u64) -> Result<Option<Rotation>> {
        let rotation = self.controller.rotate_if_due(block_number)?;
        self.cache.on_local_progress(block_number, view);

        // the window order shifts even when evicted == admitted
        if rotation.is_some() {
            self.refresh_topology()?;
        }
        Ok(rotation)
    }

    pub fn on_peer_status(&self, announcement: StatusAnnouncement) -> StatusOutcome {
        self.cache.on_peer_status(announcement.from, announcement.status)
    }

    pub fn on_local_proposal(&self, status: RawPrepareStatus, payload: Vec<u8>) {
        self.cache.on_local_proposal_advance(status, payload);
    }

    /// Status announcement for the proposal this node currently holds
    pub fn announcement(&self) -> Option<StatusAnnouncement> {
        self.cache.current_proposal().map(|status| StatusAnnouncement {
            from: self.local,
            status,
        })
    }

    /// Peer and request for the raw prepare at `expected_height`, if one
    /// is worth fetching
    pub fn next_catch_up_request(&self, expected_height: u64) -> Option<(NodeId, RawPrepareRequest)> {
        self.cache
            .select_peer_to_request(expected_height)
            .map(|(peer, identity)| (peer, RawPrepareRequest { identity }))
    }

    pub fn serve_request(&self, request: &RawPrepareRequest) -> Result<RawPrepareResponse, SyncError> {
        let payload = self.cache.respond_to_request(&request.identity)?;
        Ok(RawPrepareResponse {
            identity: request.identity,
            payload,
        })
    }

    pub fn on_response(&self, response: &RawPrepareResponse) {
        self.cache.on_fulfilled(&response.identity);
    }

    /// Peers to push a committed block to
    pub fn block_targets(&self, online: &HashSet<NodeId>) -> Vec<NodeId> {
        self.topology.children_to_forward_to(online)
    }

    /// Peers to exchange sync status with
    pub fn status_targets(&self, online: &HashSet<NodeId>) -> Vec<NodeId> {
        self.topology.nodes_for_status_sync(online)
    }

    pub fn summary(&self, block_number: u64, view: u64) -> NodeSummary {
        NodeSummary {
            block_number,
            role: self.topology.role(),
            leader: self.controller.leader_for(view, block_number),
            committee: self.controller.committee(),
            quorum_size: self.controller.quorum_size(),
            fault_tolerance: self.controller.fault_tolerance(),
            round: self.controller.rotation_state().map_or(0, |s| s.round),
        }
    }

    /// Tick once per `block_time`, treating each tick as a committed block.
    /// Stops after `max_blocks` ticks if given; returns the last block number.
    pub async fn drive(
        &self,
        block_time: Duration,
        start_block: u64,
        max_blocks: Option<u64>,
    ) -> Result<u64> {
        let mut ticker = tokio::time::interval(block_time);
        let mut block_number = start_block;
        let mut produced = 0u64;

        info!(
            "Membership scheduler started at block {} as {:?}",
            start_block,
            self.topology.role()
        );

        loop {
            ticker.tick().await;
            if max_blocks.is_some_and(|max| produced >= max) {
                break;
            }
            block_number += 1;
            produced += 1;

            if let Some(rotation) = self.on_new_block(block_number, 0)? {
                let summary = self.summary(block_number, 0);
                info!(
                    "Round {}: role {:?}, leader {}, quorum {}/{}",
                    rotation.round,
                    summary.role,
                    summary.leader.map(|l| l.abridged()).unwrap_or_default(),
                    summary.quorum_size,
                    summary.committee.len()
                );
            } else {
                debug!("Block {} committed", block_number);
            }
        }

        Ok(block_number)
    }
}
