//! Gzip codec: payload stored compressed.

use super::StorageCodec;
use crate::error::StorageError;
use crate::Result;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

pub struct GzipCodec;

impl StorageCodec for GzipCodec {
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(data)
            .map_err(|e| StorageError::Serialization(format!("gzip encode failed: {e}")))?;
        encoder
            .finish()
            .map_err(|e| StorageError::Serialization(format!("gzip encode failed: {e}")))
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| StorageError::Serialization(format!("gzip decode failed: {e}")))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compresses_repetitive_payloads() {
        let payload = vec![b'a'; 4096];
        let encoded = GzipCodec.encode(&payload).unwrap();
        assert!(encoded.len() < payload.len());
        assert_eq!(GzipCodec.decode(&encoded).unwrap(), payload);
    }

    #[test]
    fn corrupt_payload_is_serialization_error() {
        let err = GzipCodec.decode(b"definitely not gzip").unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }
}
