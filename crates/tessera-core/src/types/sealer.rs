use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::crypto::NodeId;
use crate::error::CoreError;

/// Ordered, duplicate-free list of every identity eligible to seal.
///
/// Only governance events change the list; each effective change bumps
/// `generation` so holders of an older copy can tell it is stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SealerList {
    nodes: Vec<NodeId>,
    generation: u64,
}

impl SealerList {
    pub fn new(nodes: Vec<NodeId>) -> Result<Self, CoreError> {
        check_unique(&nodes)?;
        Ok(SealerList {
            nodes,
            generation: 0,
        })
    }

    /// Replace the list after a governance event.
    ///
    /// Returns `true` if the contents changed (and the generation advanced).
    pub fn replace(&mut self, nodes: Vec<NodeId>) -> Result<bool, CoreError> {
        check_unique(&nodes)?;
        if nodes == self.nodes {
            return Ok(false);
        }
        self.nodes = nodes;
        self.generation += 1;
        Ok(true)
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&NodeId> {
        self.nodes.get(index)
    }

    pub fn position(&self, node: &NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| n == node)
    }
}

fn check_unique(nodes: &[NodeId]) -> Result<(), CoreError> {
    let mut seen = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if !seen.insert(node) {
            return Err(CoreError::DuplicateSealer(node.to_hex()));
        }
    }
    Ok(())
}
