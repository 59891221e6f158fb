use std::collections::{HashSet, VecDeque};

use tessera_core::Hash;

/// Bounded FIFO of block hashes already requested from a peer
#[derive(Debug, Clone)]
pub struct RequestedQueue {
    capacity: usize,
    order: VecDeque<Hash>,
    members: HashSet<Hash>,
}

impl RequestedQueue {
    pub fn new(capacity: usize) -> Self {
        RequestedQueue {
            capacity,
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
        }
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.members.contains(hash)
    }

    /// Insert a hash, evicting the oldest entry when full.
    ///
    /// Returns the evicted hash, if any. Re-inserting a present hash is a
    /// no-op and does not refresh its position.
    pub fn insert(&mut self, hash: Hash) -> Option<Hash> {
        if !self.members.insert(hash) {
            return None;
        }
        self.order.push_back(hash);
        if self.order.len() > self.capacity {
            let evicted = self.order.pop_front()?;
            self.members.remove(&evicted);
            return Some(evicted);
        }
        None
    }

    pub fn remove(&mut self, hash: &Hash) -> bool {
        if !self.members.remove(hash) {
            return false;
        }
        self.order.retain(|h| h != hash);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hash> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
