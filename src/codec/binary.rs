//! Identity codec: payload stored exactly as provided.

use super::StorageCodec;
use crate::Result;

pub struct BinaryCodec;

impl StorageCodec for BinaryCodec {
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}
