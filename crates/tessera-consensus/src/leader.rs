use tessera_core::NodeId;

/// Pluggable leader choice for a `(view, block_number)` pair.
///
/// Implementations must be pure: every node evaluating the same inputs
/// has to arrive at the same index, or the committee splits.
pub trait LeaderSelection: Send + Sync {
    /// Returns an index into `committee`
    fn select(&self, view: u64, block_number: u64, committee: &[NodeId], window_start: usize)
        -> usize;
}

/// Round-robin over the active committee; always available
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundRobin;

impl LeaderSelection for RoundRobin {
    fn select(
        &self,
        view: u64,
        block_number: u64,
        committee: &[NodeId],
        window_start: usize,
    ) -> usize {
        let size = committee.len() as u64;
        if size == 0 {
            return 0;
        }
        // (view + block_number) mod size, without overflowing on large views
        let offset = (view % size + block_number % size) % size;
        ((window_start as u64 % size + offset) % size) as usize
    }
}
