use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Failed to serialize data: {0}")]
    SerializationError(String),
    #[error("Failed to deserialize data: {0}")]
    DeserializationError(String),
    #[error("Invalid UTF-8 string: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Key encoding for the history store. Keys must order/prefix naturally as
/// raw bytes, so they get a dedicated byte form rather than JSON.
pub trait DbKey: Sized + Clone + fmt::Debug {
    fn encode_key(&self) -> Vec<u8>;
    fn decode_key(data: &[u8]) -> Result<Self, CodecError>;
}

impl DbKey for String {
    fn encode_key(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn decode_key(data: &[u8]) -> Result<Self, CodecError> {
        String::from_utf8(data.to_vec()).map_err(CodecError::from)
    }
}

/// Value encoding: JSON for every serde-capable record. Human-readable,
/// which keeps store dumps debuggable.
pub trait DbValue: Sized + Clone + fmt::Debug {
    fn encode_value(&self) -> Result<Vec<u8>, CodecError>;
    fn decode_value(data: &[u8]) -> Result<Self, CodecError>;
}

impl<T> DbValue for T
where
    T: Serialize + DeserializeOwned + Clone + fmt::Debug,
{
    fn encode_value(&self) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(self).map_err(|e| CodecError::SerializationError(e.to_string()))
    }

    fn decode_value(data: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(data).map_err(|e| CodecError::DeserializationError(e.to_string()))
    }
}
