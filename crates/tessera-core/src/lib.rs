//! Tessera Core - Node identities, sealer lists and proposal status
//!
//! This crate provides the value types shared by the committee rotation,
//! tree topology and catch-up layers of the Tessera consensus engine.

pub mod crypto;
pub mod error;
pub mod serialize;
pub mod types;

pub use crypto::{hash_blake3, Hash, KeyPair, NodeId, SecretKey};
pub use error::CoreError;
pub use types::*;
