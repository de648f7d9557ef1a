//! Base64 codec: payload stored as standard-alphabet base64 text bytes.

use super::StorageCodec;
use crate::error::StorageError;
use crate::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

pub struct Base64Codec;

impl StorageCodec for Base64Codec {
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(STANDARD.encode(data).into_bytes())
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        STANDARD
            .decode(data)
            .map_err(|e| StorageError::Serialization(format!("invalid base64 payload: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_to_standard_alphabet() {
        let encoded = Base64Codec.encode(b"hello world").unwrap();
        assert_eq!(encoded, b"aGVsbG8gd29ybGQ=");
    }

    #[test]
    fn corrupt_payload_is_serialization_error() {
        let err = Base64Codec.decode(b"!!! not base64 !!!").unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }
}
