use serde::{Deserialize, Serialize};
use tessera_core::{serialize, NodeId, RawPrepareStatus};

use crate::error::SyncError;

/// Periodic broadcast of a peer's newest raw prepare
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusAnnouncement {
    pub from: NodeId,
    pub status: RawPrepareStatus,
}

/// Ask a peer for the payload matching an announced status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPrepareRequest {
    pub identity: RawPrepareStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPrepareResponse {
    pub identity: RawPrepareStatus,
    pub payload: Vec<u8>,
}

macro_rules! wire_codec {
    ($($ty:ty),*) => {
        $(
            impl $ty {
                pub fn encode(&self) -> Result<Vec<u8>, SyncError> {
                    Ok(serialize::to_bytes(self)?)
                }

                pub fn decode(bytes: &[u8]) -> Result<Self, SyncError> {
                    Ok(serialize::from_bytes(bytes)?)
                }
            }
        )*
    };
}

wire_codec!(StatusAnnouncement, RawPrepareRequest, RawPrepareResponse);

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{hash_blake3, CoreError};

    #[test]
    fn test_response_carries_payload() {
        let identity = RawPrepareStatus::new(12, 3, hash_blake3(b"p12"), 1);
        let response = RawPrepareResponse {
            identity,
            payload: b"proposal bytes".to_vec(),
        };
        let decoded = RawPrepareResponse::decode(&response.encode().unwrap()).unwrap();
        assert_eq!(decoded.identity, identity);
        assert_eq!(decoded.payload, b"proposal bytes");
    }

    #[test]
    fn test_garbage_is_rejected() {
        let result = StatusAnnouncement::decode(&[1, 2, 3]);
        assert!(matches!(
            result,
            Err(SyncError::Core(CoreError::Deserialization(_)))
        ));
    }
}
