use serde::{Deserialize, Serialize};

use crate::crypto::Hash;

/// Identity of a proposed-but-uncommitted block ("raw prepare").
///
/// Statuses are ranked by `(height, view)`; height always dominates view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawPrepareStatus {
    pub height: u64,
    pub view: u64,
    pub block_hash: Hash,
    /// Index of the proposer in the sealer list
    pub proposer_index: u64,
}

impl RawPrepareStatus {
    pub fn new(height: u64, view: u64, block_hash: Hash, proposer_index: u64) -> Self {
        RawPrepareStatus {
            height,
            view,
            block_hash,
            proposer_index,
        }
    }

    pub fn order_key(&self) -> (u64, u64) {
        (self.height, self.view)
    }

    /// Strictly newer: greater height, or same height and greater view
    pub fn is_newer_than(&self, other: &RawPrepareStatus) -> bool {
        self.order_key() > other.order_key()
    }
}
