use std::collections::HashMap;

use crate::crypto::NodeId;
use crate::types::SealerList;

/// Read-only lookup over the sealer list plus the local identity.
#[derive(Debug, Clone)]
pub struct NodeDirectory {
    sealers: SealerList,
    local: NodeId,
    index: HashMap<NodeId, usize>,
}

impl NodeDirectory {
    pub fn new(sealers: SealerList, local: NodeId) -> Self {
        let index = sealers
            .nodes()
            .iter()
            .enumerate()
            .map(|(i, node)| (*node, i))
            .collect();
        NodeDirectory {
            sealers,
            local,
            index,
        }
    }

    pub fn index_of(&self, node: &NodeId) -> Option<usize> {
        self.index.get(node).copied()
    }

    pub fn local_index(&self) -> Option<usize> {
        self.index_of(&self.local)
    }

    pub fn get(&self, index: usize) -> Option<NodeId> {
        self.sealers.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.sealers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sealers.is_empty()
    }
}
