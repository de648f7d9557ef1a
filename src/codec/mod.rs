//! Payload codecs - encode/decode applied between the contract payload and
//! the persisted column.
//!
//! Each stored row records the format it was written with, so the configured
//! default can change without breaking existing rows: writes use the default,
//! reads use the row's recorded format.

mod base64;
mod binary;
mod gzip;

pub use self::base64::Base64Codec;
pub use self::binary::BinaryCodec;
pub use self::gzip::GzipCodec;

use crate::error::StorageError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Persisted payload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageFormat {
    /// Raw bytes, stored as-is.
    Binary,
    /// Base64 text encoding.
    Base64,
    /// Gzip compression.
    Gzip,
}

impl StorageFormat {
    /// String form stored in the `storage_format` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageFormat::Binary => "binary",
            StorageFormat::Base64 => "base64",
            StorageFormat::Gzip => "gzip",
        }
    }

    pub fn all() -> &'static [StorageFormat] {
        &[
            StorageFormat::Binary,
            StorageFormat::Base64,
            StorageFormat::Gzip,
        ]
    }

    /// The codec implementing this format.
    pub fn codec(&self) -> &'static dyn StorageCodec {
        match self {
            StorageFormat::Binary => &BinaryCodec,
            StorageFormat::Base64 => &Base64Codec,
            StorageFormat::Gzip => &GzipCodec,
        }
    }
}

impl FromStr for StorageFormat {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "binary" | "raw" => Ok(StorageFormat::Binary),
            "base64" => Ok(StorageFormat::Base64),
            "gzip" | "gz" => Ok(StorageFormat::Gzip),
            _ => Err(StorageError::Serialization(format!(
                "unknown storage format: {s}"
            ))),
        }
    }
}

impl std::fmt::Display for StorageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Symmetric payload transformation.
///
/// `decode(encode(data)) == data` for all byte sequences. Decode failures
/// surface as [`StorageError::Serialization`], never as a database error.
pub trait StorageCodec: Send + Sync {
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>>;
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_string_roundtrip() {
        for format in StorageFormat::all() {
            let parsed: StorageFormat = format.as_str().parse().unwrap();
            assert_eq!(*format, parsed);
        }
    }

    #[test]
    fn unknown_format_is_serialization_error() {
        let err = "zstd".parse::<StorageFormat>().unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[test]
    fn every_codec_roundtrips() {
        let payload = b"some payload that is long enough to compress \
                        some payload that is long enough to compress";
        for format in StorageFormat::all() {
            let codec = format.codec();
            let encoded = codec.encode(payload).unwrap();
            let decoded = codec.decode(&encoded).unwrap();
            assert_eq!(decoded, payload, "roundtrip failed for {format}");
        }
    }
}
