use tessera_core::NodeId;

/// Hands buffered outbound data to a node that just joined the committee.
///
/// Called when the local node rotates out; the transactions it still holds
/// must reach the member that replaced it.
pub trait RemainingTxForwarder: Send + Sync {
    fn forward_remaining(&self, admitted: &NodeId);
}
