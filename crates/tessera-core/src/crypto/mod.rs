pub mod hash;
pub mod keys;

pub use hash::{hash_blake3, Hash};
pub use keys::{KeyPair, NodeId, SecretKey};
