use std::collections::HashMap;

use parking_lot::RwLock;
use rand::seq::SliceRandom;
use tessera_core::{Hash, NodeId, RawPrepareStatus};
use tracing::{debug, trace};

use crate::error::SyncError;
use crate::requested::RequestedQueue;

/// Configuration for the catch-up cache
#[derive(Debug, Clone)]
pub struct CatchUpConfig {
    /// Maximum number of block hashes remembered as already requested
    pub max_requested_queue_size: usize,
}

impl Default for CatchUpConfig {
    fn default() -> Self {
        CatchUpConfig {
            max_requested_queue_size: 512,
        }
    }
}

/// Lifecycle of one proposal identity, keyed by block hash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Unknown,
    Announced,
    Requested,
    Fulfilled,
    Abandoned,
}

/// Result of feeding a peer's status into the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOutcome {
    /// At or below the committed height, or behind the local view
    Stale,
    /// Not strictly newer than what this peer already reported
    NotNewer,
    Accepted,
    /// Accepted and now the newest status known from any peer
    NewLatest,
}

impl StatusOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, StatusOutcome::Accepted | StatusOutcome::NewLatest)
    }
}

#[derive(Debug, Clone, Copy)]
struct TrackedEntry {
    height: u64,
    state: EntryState,
}

#[derive(Debug, Clone)]
struct LocalProposal {
    status: RawPrepareStatus,
    payload: Vec<u8>,
}

#[derive(Debug)]
struct CacheInner {
    committed_height: u64,
    local_view: u64,
    peers: HashMap<NodeId, RawPrepareStatus>,
    latest_known: Option<RawPrepareStatus>,
    requested: RequestedQueue,
    entries: HashMap<Hash, TrackedEntry>,
    current: Option<LocalProposal>,
}

impl CacheInner {
    fn set_state(&mut self, status: &RawPrepareStatus, state: EntryState) {
        self.entries
            .entry(status.block_hash)
            .and_modify(|e| e.state = state)
            .or_insert(TrackedEntry {
                height: status.height,
                state,
            });
    }

    fn state_of(&self, hash: &Hash) -> EntryState {
        self.entries
            .get(hash)
            .map(|e| e.state)
            .unwrap_or(EntryState::Unknown)
    }

    /// A hash leaving the requested set becomes fetchable again
    fn release(&mut self, hash: &Hash) {
        if let Some(entry) = self.entries.get_mut(hash) {
            if entry.state == EntryState::Requested {
                entry.state = EntryState::Announced;
            }
        }
        self.forget_if_unreferenced(hash);
    }

    /// Drop the lifecycle entry of a hash no peer announces and nobody has
    /// requested. Keeps `entries` within `peers + requested` in size.
    fn forget_if_unreferenced(&mut self, hash: &Hash) {
        if self.requested.contains(hash) || self.peers.values().any(|s| s.block_hash == *hash) {
            return;
        }
        if self.entries.remove(hash).is_some() {
            trace!("Forgot lifecycle of {}", hash.abridged());
        }
    }
}

/// Tracks the newest raw prepare each peer announced and decides which
/// peer to fetch it from.
///
/// Every operation takes the lock once, so a compare-and-update on a
/// peer's status is never interleaved with another writer.
pub struct CatchUpCache {
    inner: RwLock<CacheInner>,
}

impl CatchUpCache {
    pub fn new(config: CatchUpConfig) -> Result<Self, SyncError> {
        if config.max_requested_queue_size == 0 {
            return Err(SyncError::InvalidQueueSize);
        }
        Ok(CatchUpCache {
            inner: RwLock::new(CacheInner {
                committed_height: 0,
                local_view: 0,
                peers: HashMap::new(),
                latest_known: None,
                requested: RequestedQueue::new(config.max_requested_queue_size),
                entries: HashMap::new(),
                current: None,
            }),
        })
    }

    /// Record local chain progress.
    ///
    /// Statuses at or below the committed height can never be useful
    /// again and are dropped. The latest known status is left alone.
    pub fn on_local_progress(&self, committed_height: u64, view: u64) {
        let mut inner = self.inner.write();
        inner.committed_height = inner.committed_height.max(committed_height);
        inner.local_view = view;

        let committed = inner.committed_height;
        let peers_before = inner.peers.len();
        inner.peers.retain(|_, s| s.height > committed);
        inner.entries.retain(|_, e| e.height > committed);

        trace!(
            "Local progress: committed {}, view {}, pruned {} peer statuses",
            committed,
            view,
            peers_before - inner.peers.len()
        );
    }

    /// Feed a status announced by `peer`.
    pub fn on_peer_status(&self, peer: NodeId, status: RawPrepareStatus) -> StatusOutcome {
        let mut inner = self.inner.write();

        if status.height <= inner.committed_height || status.view < inner.local_view {
            debug!(
                "Stale status from {}: height {} view {} (committed {}, view {})",
                peer.abridged(),
                status.height,
                status.view,
                inner.committed_height,
                inner.local_view
            );
            return StatusOutcome::Stale;
        }

        if let Some(previous) = inner.peers.get(&peer) {
            if !status.is_newer_than(previous) {
                trace!(
                    "Ignoring status from {}: ({}, {}) not newer than ({}, {})",
                    peer.abridged(),
                    status.height,
                    status.view,
                    previous.height,
                    previous.view
                );
                return StatusOutcome::NotNewer;
            }
        }

        let replaced = inner.peers.insert(peer, status);
        if let Some(old) = replaced.filter(|old| old.block_hash != status.block_hash) {
            inner.forget_if_unreferenced(&old.block_hash);
        }
        match inner.state_of(&status.block_hash) {
            EntryState::Unknown | EntryState::Abandoned => {
                inner.set_state(&status, EntryState::Announced)
            }
            _ => {}
        }

        let is_latest = inner
            .latest_known
            .map_or(true, |latest| status.is_newer_than(&latest));
        if !is_latest {
            return StatusOutcome::Accepted;
        }

        debug!(
            "New latest raw prepare from {}: height {} view {} hash {}",
            peer.abridged(),
            status.height,
            status.view,
            status.block_hash.abridged()
        );
        inner.latest_known = Some(status);
        StatusOutcome::NewLatest
    }

    /// Choose a peer to fetch the raw prepare at `expected_height` from.
    ///
    /// Only peers whose cached height is exactly `expected_height` are
    /// eligible; one is picked uniformly at random and its block hash is
    /// marked requested so the same proposal is not fetched twice.
    pub fn select_peer_to_request(
        &self,
        expected_height: u64,
    ) -> Option<(NodeId, RawPrepareStatus)> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        let latest = inner.latest_known?;
        if latest.height < expected_height {
            trace!(
                "Nothing to request at {}: latest known height {}",
                expected_height,
                latest.height
            );
            return None;
        }
        if inner.requested.contains(&latest.block_hash) {
            trace!(
                "Latest raw prepare {} already requested",
                latest.block_hash.abridged()
            );
            return None;
        }

        let mut candidates: Vec<(NodeId, RawPrepareStatus)> = inner
            .peers
            .iter()
            .filter(|(_, s)| s.height == expected_height)
            .filter(|(_, s)| !inner.requested.contains(&s.block_hash))
            .map(|(peer, s)| (*peer, *s))
            .collect();
        // HashMap order is arbitrary; sort so the random draw is the only source of choice
        candidates.sort_by_key(|(peer, _)| *peer);

        let (peer, status) = *candidates.choose(&mut rand::thread_rng())?;

        if let Some(evicted) = inner.requested.insert(status.block_hash) {
            inner.release(&evicted);
        }
        inner.set_state(&status, EntryState::Requested);

        debug!(
            "Requesting raw prepare {} (height {}, view {}) from {}",
            status.block_hash.abridged(),
            status.height,
            status.view,
            peer.abridged()
        );
        Some((peer, status))
    }

    /// Serve the locally held proposal to a peer.
    ///
    /// The full identity must match; a request for the right height but a
    /// different view, hash or proposer is refused.
    pub fn respond_to_request(&self, identity: &RawPrepareStatus) -> Result<Vec<u8>, SyncError> {
        let inner = self.inner.read();
        match &inner.current {
            Some(current) if current.status == *identity => Ok(current.payload.clone()),
            _ => {
                debug!(
                    "No proposal for request: height {} view {} hash {}",
                    identity.height,
                    identity.view,
                    identity.block_hash.abridged()
                );
                Err(SyncError::NotFound)
            }
        }
    }

    /// Replace the proposal this node serves.
    ///
    /// Outstanding requests for any other identity are abandoned and leave
    /// the requested set, so a later announcement can trigger them again.
    pub fn on_local_proposal_advance(&self, status: RawPrepareStatus, payload: Vec<u8>) {
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        let outstanding: Vec<Hash> = inner.requested.iter().copied().collect();
        for hash in outstanding {
            if hash == status.block_hash {
                inner.set_state(&status, EntryState::Fulfilled);
                continue;
            }
            if inner.state_of(&hash) == EntryState::Requested {
                if let Some(entry) = inner.entries.get_mut(&hash) {
                    entry.state = EntryState::Abandoned;
                }
                inner.requested.remove(&hash);
                inner.forget_if_unreferenced(&hash);
                debug!("Abandoned request for {}", hash.abridged());
            }
        }

        inner.current = Some(LocalProposal { status, payload });
    }

    /// Mark a fetched proposal as received. It stays in the requested set.
    pub fn on_fulfilled(&self, status: &RawPrepareStatus) {
        let mut inner = self.inner.write();
        if let Some(evicted) = inner.requested.insert(status.block_hash) {
            inner.release(&evicted);
        }
        inner.set_state(status, EntryState::Fulfilled);
    }

    /// Forget that `block_hash` was requested, typically after the
    /// transport gave up on it. Returns `false` if it was not requested.
    pub fn expire(&self, block_hash: &Hash) -> bool {
        let mut inner = self.inner.write();
        if !inner.requested.remove(block_hash) {
            return false;
        }
        inner.release(block_hash);
        debug!("Expired request for {}", block_hash.abridged());
        true
    }

    pub fn entry_state(&self, block_hash: &Hash) -> EntryState {
        self.inner.read().state_of(block_hash)
    }

    pub fn latest_known(&self) -> Option<RawPrepareStatus> {
        self.inner.read().latest_known
    }

    pub fn peer_status(&self, peer: &NodeId) -> Option<RawPrepareStatus> {
        self.inner.read().peers.get(peer).copied()
    }

    pub fn current_proposal(&self) -> Option<RawPrepareStatus> {
        self.inner.read().current.as_ref().map(|p| p.status)
    }

    pub fn is_requested(&self, block_hash: &Hash) -> bool {
        self.inner.read().requested.contains(block_hash)
    }

    pub fn requested_len(&self) -> usize {
        self.inner.read().requested.len()
    }

    /// Number of block hashes with a tracked lifecycle
    pub fn tracked_len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn committed_height(&self) -> u64 {
        self.inner.read().committed_height
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tessera_core::hash_blake3;

    fn peer(i: u8) -> NodeId {
        NodeId([i; 32])
    }

    fn status(height: u64, view: u64) -> RawPrepareStatus {
        let mut seed = height.to_le_bytes().to_vec();
        seed.extend_from_slice(&view.to_le_bytes());
        RawPrepareStatus::new(height, view, hash_blake3(&seed), 0)
    }

    fn cache() -> CatchUpCache {
        CatchUpCache::new(CatchUpConfig::default()).unwrap()
    }

    #[test]
    fn test_height_dominates_view() {
        let cache = cache();
        cache.on_local_progress(99, 0);

        assert_eq!(cache.on_peer_status(peer(9), status(100, 2)), StatusOutcome::NewLatest);
        // At the committed height: rejected outright
        assert_eq!(cache.on_peer_status(peer(1), status(99, 5)), StatusOutcome::Stale);
        assert_eq!(cache.peer_status(&peer(1)), None);

        assert_eq!(cache.on_peer_status(peer(2), status(101, 0)), StatusOutcome::NewLatest);
        assert_eq!(cache.latest_known(), Some(status(101, 0)));
    }

    #[test]
    fn test_lower_height_does_not_displace_latest() {
        let cache = cache();
        cache.on_peer_status(peer(9), status(100, 2));
        assert_eq!(cache.on_peer_status(peer(1), status(99, 5)), StatusOutcome::Accepted);
        assert_eq!(cache.latest_known(), Some(status(100, 2)));
    }

    #[test]
    fn test_identical_status_rejected_second_time() {
        let cache = cache();
        assert!(cache.on_peer_status(peer(1), status(10, 1)).is_accepted());
        assert_eq!(cache.on_peer_status(peer(1), status(10, 1)), StatusOutcome::NotNewer);
        // Same status from a different peer is fine
        assert!(cache.on_peer_status(peer(2), status(10, 1)).is_accepted());
    }

    #[test]
    fn test_view_behind_local_is_stale() {
        let cache = cache();
        cache.on_local_progress(5, 3);
        assert_eq!(cache.on_peer_status(peer(1), status(6, 2)), StatusOutcome::Stale);
        assert!(cache.on_peer_status(peer(1), status(6, 3)).is_accepted());
    }

    #[test]
    fn test_no_double_request() {
        let cache = cache();
        for i in 1..=3 {
            cache.on_peer_status(peer(i), status(20, 0));
        }

        let (chosen, requested) = cache.select_peer_to_request(20).unwrap();
        assert!((1..=3).map(peer).any(|p| p == chosen));
        assert_eq!(requested, status(20, 0));
        assert_eq!(cache.entry_state(&requested.block_hash), EntryState::Requested);

        assert!(cache.select_peer_to_request(20).is_none());
    }

    #[test]
    fn test_expire_makes_hash_eligible_again() {
        let cache = cache();
        cache.on_peer_status(peer(1), status(20, 0));
        let (_, requested) = cache.select_peer_to_request(20).unwrap();

        assert!(cache.expire(&requested.block_hash));
        assert!(!cache.expire(&requested.block_hash));
        assert_eq!(cache.entry_state(&requested.block_hash), EntryState::Announced);
        assert!(cache.select_peer_to_request(20).is_some());
    }

    #[test]
    fn test_only_exact_height_candidates() {
        let cache = cache();
        cache.on_peer_status(peer(1), status(30, 0));
        cache.on_peer_status(peer(2), status(31, 0));

        let (chosen, s) = cache.select_peer_to_request(30).unwrap();
        assert_eq!(chosen, peer(1));
        assert_eq!(s.height, 30);

        // No peer sits exactly at 29, no substitution
        assert!(cache.select_peer_to_request(29).is_none());
        // Latest known is 31, so 32 is out of reach
        assert!(cache.select_peer_to_request(32).is_none());
    }

    #[test]
    fn test_random_choice_covers_all_candidates() {
        let mut seen = HashSet::new();
        for _ in 0..200 {
            let cache = cache();
            for i in 1..=3 {
                cache.on_peer_status(peer(i), status(40, 0));
            }
            seen.insert(cache.select_peer_to_request(40).unwrap().0);
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_requested_queue_evicts_oldest() {
        let cache = CatchUpCache::new(CatchUpConfig {
            max_requested_queue_size: 1,
        })
        .unwrap();

        cache.on_peer_status(peer(1), status(50, 0));
        let (_, first) = cache.select_peer_to_request(50).unwrap();
        cache.on_peer_status(peer(1), status(51, 0));
        let (_, second) = cache.select_peer_to_request(51).unwrap();

        assert!(!cache.is_requested(&first.block_hash));
        assert!(cache.is_requested(&second.block_hash));
        // no peer announces height 50 any more, so its lifecycle is dropped
        assert_eq!(cache.entry_state(&first.block_hash), EntryState::Unknown);
        assert_eq!(cache.requested_len(), 1);
        assert_eq!(cache.tracked_len(), 1);
    }

    #[test]
    fn test_respond_requires_exact_identity() {
        let cache = cache();
        let proposal = status(60, 1);
        cache.on_local_proposal_advance(proposal, b"block-60".to_vec());

        assert_eq!(cache.respond_to_request(&proposal).unwrap(), b"block-60".to_vec());

        let mut other_view = proposal;
        other_view.view = 2;
        assert!(matches!(cache.respond_to_request(&other_view), Err(SyncError::NotFound)));

        let mut other_proposer = proposal;
        other_proposer.proposer_index = 3;
        assert!(matches!(cache.respond_to_request(&other_proposer), Err(SyncError::NotFound)));
    }

    #[test]
    fn test_respond_without_proposal() {
        assert!(matches!(
            cache().respond_to_request(&status(1, 0)),
            Err(SyncError::NotFound)
        ));
    }

    #[test]
    fn test_local_advance_abandons_other_requests() {
        let cache = cache();
        cache.on_peer_status(peer(1), status(70, 0));
        let (_, requested) = cache.select_peer_to_request(70).unwrap();

        cache.on_local_proposal_advance(status(70, 1), vec![1]);
        assert_eq!(cache.entry_state(&requested.block_hash), EntryState::Abandoned);
        assert!(!cache.is_requested(&requested.block_hash));
        assert_eq!(cache.current_proposal(), Some(status(70, 1)));

        // Re-announcement revives it
        cache.on_peer_status(peer(2), status(70, 0));
        assert_eq!(cache.entry_state(&requested.block_hash), EntryState::Announced);
    }

    #[test]
    fn test_local_advance_fulfils_matching_request() {
        let cache = cache();
        cache.on_peer_status(peer(1), status(80, 0));
        let (_, requested) = cache.select_peer_to_request(80).unwrap();

        cache.on_local_proposal_advance(requested, vec![8]);
        assert_eq!(cache.entry_state(&requested.block_hash), EntryState::Fulfilled);
        assert!(cache.select_peer_to_request(80).is_none());
    }

    #[test]
    fn test_on_fulfilled() {
        let cache = cache();
        cache.on_peer_status(peer(1), status(90, 0));
        let (_, requested) = cache.select_peer_to_request(90).unwrap();
        cache.on_fulfilled(&requested);
        assert_eq!(cache.entry_state(&requested.block_hash), EntryState::Fulfilled);
        assert!(cache.is_requested(&requested.block_hash));
    }

    #[test]
    fn test_progress_prunes_committed_statuses() {
        let cache = cache();
        cache.on_peer_status(peer(1), status(10, 0));
        cache.on_peer_status(peer(2), status(12, 0));

        cache.on_local_progress(10, 0);
        assert_eq!(cache.peer_status(&peer(1)), None);
        assert_eq!(cache.peer_status(&peer(2)), Some(status(12, 0)));
        assert_eq!(cache.entry_state(&status(10, 0).block_hash), EntryState::Unknown);

        // Committed height never moves backwards
        cache.on_local_progress(4, 0);
        assert_eq!(cache.committed_height(), 10);
    }

    #[test]
    fn test_concurrent_status_updates_keep_max() {
        let cache = cache();
        std::thread::scope(|scope| {
            for t in 0..8u8 {
                let cache = &cache;
                scope.spawn(move || {
                    for h in 1..=50u64 {
                        cache.on_peer_status(peer(t), status(h * 8 + t as u64, 0));
                    }
                });
            }
        });

        assert_eq!(cache.latest_known().unwrap().height, 50 * 8 + 7);
        for t in 0..8u8 {
            assert_eq!(cache.peer_status(&peer(t)).unwrap().height, 50 * 8 + t as u64);
        }
    }

    #[test]
    fn test_view_storm_keeps_tracking_bounded() {
        let cache = cache();
        for view in 0..20_000 {
            assert!(cache.on_peer_status(peer(1), status(1000, view)).is_accepted());
        }

        assert_eq!(cache.tracked_len(), 1);
        assert_eq!(cache.entry_state(&status(1000, 0).block_hash), EntryState::Unknown);
        assert_eq!(
            cache.entry_state(&status(1000, 19_999).block_hash),
            EntryState::Announced
        );
    }

    #[test]
    fn test_superseded_hash_kept_while_referenced() {
        let cache = cache();
        cache.on_peer_status(peer(1), status(40, 0));
        cache.on_peer_status(peer(2), status(40, 0));
        let (_, requested) = cache.select_peer_to_request(40).unwrap();

        cache.on_peer_status(peer(3), status(41, 0));
        cache.on_peer_status(peer(1), status(41, 0));
        // peer 2 still announces it and it is requested
        assert_eq!(cache.entry_state(&requested.block_hash), EntryState::Requested);

        cache.on_peer_status(peer(2), status(41, 0));
        assert!(cache.expire(&requested.block_hash));
        assert_eq!(cache.entry_state(&requested.block_hash), EntryState::Unknown);
        assert_eq!(cache.tracked_len(), 1);
    }

    #[test]
    fn test_zero_queue_rejected() {
        assert!(matches!(
            CatchUpCache::new(CatchUpConfig {
                max_requested_queue_size: 0
            }),
            Err(SyncError::InvalidQueueSize)
        ));
    }
}
