use crate::error::CodecError;
use crate::ports::outbound::RecordCodec;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Default record codec using bincode.
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeCodec;

impl RecordCodec for BincodeCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(value).map_err(|e| CodecError {
            message: e.to_string(),
        })
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError {
            message: e.to_string(),
        })
    }
}
