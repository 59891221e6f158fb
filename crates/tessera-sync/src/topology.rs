use std::collections::HashSet;

use parking_lot::RwLock;
use tessera_core::{NodeDirectory, NodeId, SealerList};
use tracing::{debug, trace};

use crate::error::SyncError;

/// Where the local node sits relative to the active committee
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnRole {
    /// Index in the active committee
    Committee(usize),
    /// Index in the sealer list
    Observer(usize),
    Unaffiliated,
}

/// Inclusive range of sealer-list indices one committee member disseminates to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotWindow {
    pub start: usize,
    pub end: usize,
}

impl SlotWindow {
    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologySnapshot {
    pub tree_width: usize,
    pub role: OwnRole,
    pub slot_size: usize,
    /// `None` when unaffiliated, or for a committee member whose slot
    /// would start past the end of the sealer list
    pub slot: Option<SlotWindow>,
}

#[derive(Debug)]
struct TopologyInner {
    role: OwnRole,
    slot_size: usize,
    slot: Option<SlotWindow>,
    directory: NodeDirectory,
    committee: Vec<NodeId>,
    committee_set: HashSet<NodeId>,
}

impl TopologyInner {
    fn empty(local: NodeId) -> Self {
        TopologyInner {
            role: OwnRole::Unaffiliated,
            slot_size: 0,
            slot: None,
            directory: NodeDirectory::new(SealerList::default(), local),
            committee: Vec::new(),
            committee_set: HashSet::new(),
        }
    }

    /// Walk the children of `position`, descending through peers that are
    /// offline or already in the committee.
    fn collect_children(
        &self,
        position: usize,
        slot: SlotWindow,
        width: usize,
        online: &HashSet<NodeId>,
        out: &mut Vec<NodeId>,
    ) {
        for k in 1..=width {
            let child = position * width + k;
            let index = slot.start + child - 1;
            let Some(node) = self.directory.get(index).filter(|_| slot.contains(index)) else {
                break;
            };
            if online.contains(&node) && !self.committee_set.contains(&node) {
                out.push(node);
            } else {
                self.collect_children(child, slot, width, online, out);
            }
        }
    }
}

/// k-ary dissemination tree over the sealer list.
///
/// The sealer list is cut into one slot per committee member. Inside a
/// slot, positions are 1-based: the owning committee member is the root at
/// position 0 and sealer `slot.start + p - 1` sits at position `p`. The
/// children of `p` are `p*w+1 ..= p*w+w` and its parent is `(p-1)/w`.
pub struct TreeTopology {
    local: NodeId,
    tree_width: usize,
    inner: RwLock<TopologyInner>,
}

impl TreeTopology {
    pub fn new(local: NodeId, tree_width: usize) -> Result<Self, SyncError> {
        if tree_width < 2 {
            return Err(SyncError::InvalidTreeWidth(tree_width));
        }
        Ok(TreeTopology {
            local,
            tree_width,
            inner: RwLock::new(TopologyInner::empty(local)),
        })
    }

    /// Rebuild the whole topology from a new membership. Duplicate
    /// sealers are rejected.
    pub fn recompute(&self, sealers: &[NodeId], committee: &[NodeId]) -> Result<(), SyncError> {
        let directory = NodeDirectory::new(SealerList::new(sealers.to_vec())?, self.local);
        if directory.is_empty() {
            return Err(SyncError::EmptySealerList);
        }
        if committee.is_empty() {
            return Err(SyncError::EmptyCommittee);
        }
        let n = directory.len();
        let slot_size = n.div_ceil(committee.len());

        let role = if let Some(c) = committee.iter().position(|m| *m == self.local) {
            OwnRole::Committee(c)
        } else if let Some(i) = directory.local_index() {
            OwnRole::Observer(i)
        } else {
            OwnRole::Unaffiliated
        };

        let window = |start: usize| SlotWindow {
            start,
            end: (start + slot_size - 1).min(n - 1),
        };
        let slot = match role {
            OwnRole::Committee(c) => Some(slot_size * c).filter(|s| *s < n).map(window),
            OwnRole::Observer(i) => Some(window(((i / slot_size) * slot_size).min(n - 1))),
            OwnRole::Unaffiliated => None,
        };

        *self.inner.write() = TopologyInner {
            role,
            slot_size,
            slot,
            directory,
            committee: committee.to_vec(),
            committee_set: committee.iter().copied().collect(),
        };

        debug!(
            "Topology recomputed: {} sealers, {} committee, slot size {}, role {:?}, slot {:?}",
            n,
            committee.len(),
            slot_size,
            role,
            slot
        );
        Ok(())
    }

    /// Peers this node pushes blocks to, skipping offline subtrees.
    pub fn children_to_forward_to(&self, online: &HashSet<NodeId>) -> Vec<NodeId> {
        let inner = self.inner.read();
        let Some(slot) = inner.slot else {
            return Vec::new();
        };
        let origin = match inner.role {
            OwnRole::Committee(_) => 0,
            OwnRole::Observer(i) => i - slot.start + 1,
            OwnRole::Unaffiliated => return Vec::new(),
        };

        let mut children = Vec::new();
        inner.collect_children(origin, slot, self.tree_width, online, &mut children);
        trace!(
            "Selected {} children from position {}",
            children.len(),
            origin
        );
        children
    }

    /// Peers this node may pull missing blocks from.
    ///
    /// A committee member asks the rest of the committee; an observer walks
    /// up its slot to the nearest online ancestor. The slot root is not a
    /// candidate, so the first level below it has no parent.
    pub fn parent_candidates(&self, online: &HashSet<NodeId>) -> Vec<NodeId> {
        let inner = self.inner.read();
        match inner.role {
            OwnRole::Unaffiliated => Vec::new(),
            OwnRole::Committee(_) => inner
                .committee
                .iter()
                .filter(|m| **m != self.local && online.contains(*m))
                .copied()
                .collect(),
            OwnRole::Observer(i) => {
                let Some(slot) = inner.slot else {
                    return Vec::new();
                };
                let mut position = i - slot.start + 1;
                while position > 0 {
                    position = (position - 1) / self.tree_width;
                    if position == 0 {
                        break;
                    }
                    let node = inner.directory.get(slot.start + position - 1);
                    if let Some(node) = node.filter(|n| online.contains(n)) {
                        return vec![node];
                    }
                }
                Vec::new()
            }
        }
    }

    /// Everyone this node exchanges sync status with: children then parents
    pub fn nodes_for_status_sync(&self, online: &HashSet<NodeId>) -> Vec<NodeId> {
        let mut nodes = self.children_to_forward_to(online);
        for parent in self.parent_candidates(online) {
            if !nodes.contains(&parent) {
                nodes.push(parent);
            }
        }
        nodes
    }

    pub fn role(&self) -> OwnRole {
        self.inner.read().role
    }

    pub fn tree_width(&self) -> usize {
        self.tree_width
    }

    pub fn snapshot(&self) -> TopologySnapshot {
        let inner = self.inner.read();
        TopologySnapshot {
            tree_width: self.tree_width,
            role: inner.role,
            slot_size: inner.slot_size,
            slot: inner.slot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: u8) -> Vec<NodeId> {
        (0..n).map(|i| NodeId([i + 1; 32])).collect()
    }

    fn all_online(nodes: &[NodeId]) -> HashSet<NodeId> {
        nodes.iter().copied().collect()
    }

    fn indices(nodes: &[NodeId], selected: &[NodeId]) -> Vec<usize> {
        selected
            .iter()
            .map(|s| nodes.iter().position(|n| n == s).unwrap())
            .collect()
    }

    #[test]
    fn test_width_one_rejected() {
        assert!(matches!(
            TreeTopology::new(NodeId([1; 32]), 1),
            Err(SyncError::InvalidTreeWidth(1))
        ));
        assert!(TreeTopology::new(NodeId([1; 32]), 2).is_ok());
    }

    #[test]
    fn test_empty_membership_rejected() {
        let topology = TreeTopology::new(NodeId([1; 32]), 2).unwrap();
        let nodes = ids(3);
        assert!(matches!(
            topology.recompute(&[], &nodes),
            Err(SyncError::EmptySealerList)
        ));
        assert!(matches!(
            topology.recompute(&nodes, &[]),
            Err(SyncError::EmptyCommittee)
        ));
    }

    #[test]
    fn test_duplicate_sealers_rejected() {
        let nodes = ids(3);
        let topology = TreeTopology::new(nodes[0], 2).unwrap();
        let duplicated = vec![nodes[0], nodes[1], nodes[0]];
        assert!(matches!(
            topology.recompute(&duplicated, &nodes[..1]),
            Err(SyncError::Core(_))
        ));
    }

    #[test]
    fn test_unaffiliated_node_has_no_peers() {
        let nodes = ids(4);
        let topology = TreeTopology::new(NodeId([99; 32]), 2).unwrap();
        topology.recompute(&nodes, &nodes[2..]).unwrap();

        assert_eq!(topology.role(), OwnRole::Unaffiliated);
        assert!(topology.children_to_forward_to(&all_online(&nodes)).is_empty());
        assert!(topology.parent_candidates(&all_online(&nodes)).is_empty());
        assert_eq!(topology.snapshot().slot, None);
    }

    #[test]
    fn test_observer_slot_and_children() {
        // 13 sealers, committee at 11 and 12, slot size 7
        let nodes = ids(13);
        let committee = &nodes[11..];
        let online = all_online(&nodes);

        let first = TreeTopology::new(nodes[0], 2).unwrap();
        first.recompute(&nodes, committee).unwrap();
        assert_eq!(first.role(), OwnRole::Observer(0));
        assert_eq!(first.snapshot().slot, Some(SlotWindow { start: 0, end: 6 }));
        assert_eq!(indices(&nodes, &first.children_to_forward_to(&online)), vec![2, 3]);

        let expected: [(usize, Vec<usize>); 4] =
            [(1, vec![4, 5]), (2, vec![6]), (3, vec![]), (6, vec![])];
        for (index, children) in expected {
            let topology = TreeTopology::new(nodes[index], 2).unwrap();
            topology.recompute(&nodes, committee).unwrap();
            assert_eq!(
                indices(&nodes, &topology.children_to_forward_to(&online)),
                children,
                "children of {}",
                index
            );
        }

        let tail = TreeTopology::new(nodes[10], 2).unwrap();
        tail.recompute(&nodes, committee).unwrap();
        assert_eq!(tail.snapshot().slot, Some(SlotWindow { start: 7, end: 12 }));
    }

    #[test]
    fn test_observer_parents() {
        let nodes = ids(13);
        let committee = &nodes[11..];
        let online = all_online(&nodes);

        let expected: [(usize, Vec<usize>); 7] = [
            (0, vec![]),
            (1, vec![]),
            (2, vec![0]),
            (3, vec![0]),
            (4, vec![1]),
            (5, vec![1]),
            (6, vec![2]),
        ];
        for (index, parents) in expected {
            let topology = TreeTopology::new(nodes[index], 2).unwrap();
            topology.recompute(&nodes, committee).unwrap();
            assert_eq!(
                indices(&nodes, &topology.parent_candidates(&online)),
                parents,
                "parents of {}",
                index
            );
        }
    }

    #[test]
    fn test_committee_member_roots_its_slot() {
        let nodes = ids(13);
        let committee = vec![nodes[11], nodes[12]];
        let online = all_online(&nodes);

        let topology = TreeTopology::new(nodes[12], 2).unwrap();
        topology.recompute(&nodes, &committee).unwrap();
        assert_eq!(topology.role(), OwnRole::Committee(1));
        assert_eq!(topology.snapshot().slot, Some(SlotWindow { start: 7, end: 12 }));
        assert_eq!(indices(&nodes, &topology.children_to_forward_to(&online)), vec![7, 8]);
        assert_eq!(topology.parent_candidates(&online), vec![nodes[11]]);
    }

    #[test]
    fn test_offline_child_is_skipped_through() {
        let nodes = ids(13);
        let committee = &nodes[11..];
        let mut online = all_online(&nodes);
        online.remove(&nodes[2]);

        let topology = TreeTopology::new(nodes[0], 2).unwrap();
        topology.recompute(&nodes, committee).unwrap();
        // index 2 is offline; its only child, 6, is taken over
        assert_eq!(indices(&nodes, &topology.children_to_forward_to(&online)), vec![6, 3]);

        // 6 walks past its offline parent up to 0
        let leaf = TreeTopology::new(nodes[6], 2).unwrap();
        leaf.recompute(&nodes, committee).unwrap();
        assert_eq!(leaf.parent_candidates(&online), vec![nodes[0]]);
    }

    #[test]
    fn test_committee_member_inside_slot_is_skipped() {
        // committee {0, 5}: slot 0 = [0..2], slot 1 = [3..5]
        let nodes = ids(6);
        let committee = vec![nodes[0], nodes[5]];
        let online = all_online(&nodes);

        let root = TreeTopology::new(nodes[0], 2).unwrap();
        root.recompute(&nodes, &committee).unwrap();
        // position 1 holds the root itself, so its child at index 2 comes first
        assert_eq!(indices(&nodes, &root.children_to_forward_to(&online)), vec![2, 1]);

        let second = TreeTopology::new(nodes[5], 2).unwrap();
        second.recompute(&nodes, &committee).unwrap();
        assert_eq!(indices(&nodes, &second.children_to_forward_to(&online)), vec![3, 4]);
    }

    #[test]
    fn test_committee_member_with_empty_slot() {
        // 9 sealers, 4 committee members: slot size 3, member 3 would start at 9
        let nodes = ids(9);
        let committee = vec![nodes[0], nodes[1], nodes[2], nodes[8]];
        let topology = TreeTopology::new(nodes[8], 2).unwrap();
        topology.recompute(&nodes, &committee).unwrap();

        assert_eq!(topology.role(), OwnRole::Committee(3));
        assert_eq!(topology.snapshot().slot, None);
        assert!(topology.children_to_forward_to(&all_online(&nodes)).is_empty());
        assert_eq!(topology.parent_candidates(&all_online(&nodes)).len(), 3);
    }

    #[test]
    fn test_no_online_peers_gives_empty_results() {
        let nodes = ids(13);
        let topology = TreeTopology::new(nodes[3], 3).unwrap();
        topology.recompute(&nodes, &nodes[9..]).unwrap();
        let nobody = HashSet::new();
        assert!(topology.children_to_forward_to(&nobody).is_empty());
        assert!(topology.parent_candidates(&nobody).is_empty());
    }

    #[test]
    fn test_status_sync_nodes_union() {
        let nodes = ids(13);
        let committee = &nodes[11..];
        let topology = TreeTopology::new(nodes[2], 2).unwrap();
        topology.recompute(&nodes, committee).unwrap();

        let sync_nodes = topology.nodes_for_status_sync(&all_online(&nodes));
        assert_eq!(indices(&nodes, &sync_nodes), vec![6, 0]);
    }

    #[test]
    fn test_recompute_replaces_role() {
        let nodes = ids(6);
        let topology = TreeTopology::new(nodes[1], 2).unwrap();
        topology.recompute(&nodes, &nodes[..3]).unwrap();
        assert_eq!(topology.role(), OwnRole::Committee(1));

        topology.recompute(&nodes, &nodes[2..5]).unwrap();
        assert_eq!(topology.role(), OwnRole::Observer(1));
    }
}
