use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Serialize to deterministic bincode bytes
pub fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CoreError> {
    bincode::serialize(value).map_err(|e| CoreError::Serialization(e.to_string()))
}

/// Deserialize from bincode bytes
pub fn from_bytes<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, CoreError> {
    bincode::deserialize(bytes).map_err(|e| CoreError::Deserialization(e.to_string()))
}

/// Serialize to pretty JSON string
pub fn to_json_pretty<T: Serialize>(value: &T) -> Result<String, CoreError> {
    serde_json::to_string_pretty(value).map_err(|e| CoreError::Serialization(e.to_string()))
}

/// Deserialize from JSON string
pub fn from_json<'a, T: Deserialize<'a>>(json: &'a str) -> Result<T, CoreError> {
    serde_json::from_str(json).map_err(|e| CoreError::Deserialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{hash_blake3, RawPrepareStatus};

    #[test]
    fn test_status_bincode_is_deterministic() {
        let status = RawPrepareStatus::new(7, 1, hash_blake3(b"b7"), 2);
        assert_eq!(to_bytes(&status).unwrap(), to_bytes(&status).unwrap());
    }

    #[test]
    fn test_truncated_bytes_fail_to_decode() {
        let status = RawPrepareStatus::new(7, 1, hash_blake3(b"b7"), 2);
        let bytes = to_bytes(&status).unwrap();
        let result: Result<RawPrepareStatus, _> = from_bytes(&bytes[..bytes.len() - 1]);
        assert!(matches!(result, Err(CoreError::Deserialization(_))));
    }

    #[test]
    fn test_json_decode_rejects_garbage() {
        let result: Result<RawPrepareStatus, _> = from_json("{\"height\": \"nope\"}");
        assert!(result.is_err());
    }
}
