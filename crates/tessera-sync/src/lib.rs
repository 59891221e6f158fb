//! Tessera Sync - Dissemination tree and raw-prepare catch-up
//!
//! This crate provides the k-ary tree topology used to fan committed
//! blocks out from the active committee, and the cache that lets a node
//! outside the committee fetch the newest uncommitted proposal.

pub mod catchup;
pub mod error;
pub mod net;
pub mod requested;
pub mod topology;

pub use catchup::{CatchUpCache, CatchUpConfig, EntryState, StatusOutcome};
pub use error::SyncError;
pub use net::{RawPrepareRequest, RawPrepareResponse, StatusAnnouncement};
pub use requested::RequestedQueue;
pub use topology::{OwnRole, SlotWindow, TopologySnapshot, TreeTopology};
