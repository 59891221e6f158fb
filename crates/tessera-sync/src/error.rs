use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Tree width must be at least 2, got {0}")]
    InvalidTreeWidth(usize),

    #[error("Requested queue size must be at least 1")]
    InvalidQueueSize,

    #[error("Sealer list is empty")]
    EmptySealerList,

    #[error("Active committee is empty")]
    EmptyCommittee,

    #[error("No proposal matches the requested identity")]
    NotFound,

    #[error("Core error: {0}")]
    Core(#[from] tessera_core::CoreError),
}
