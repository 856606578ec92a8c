//! Value serializer seam for cookie payloads.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Error produced by a [`Serializer`] implementation.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SerializerError(pub String);

/// Converts cookie values to and from bytes.
///
/// Implementations must round-trip: deserializing the output of
/// `serialize` yields an equal value, and malformed input is rejected
/// rather than silently producing a default.
pub trait Serializer: Send + Sync + 'static {
    fn serialize<T>(&self, value: &T) -> Result<Vec<u8>, SerializerError>
    where
        T: Serialize + ?Sized;

    fn deserialize<T>(&self, data: &[u8]) -> Result<T, SerializerError>
    where
        T: DeserializeOwned;
}

/// The default serializer: self-describing MessagePack via `rmp-serde`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MsgPack;

impl Serializer for MsgPack {
    fn serialize<T>(&self, value: &T) -> Result<Vec<u8>, SerializerError>
    where
        T: Serialize + ?Sized,
    {
        rmp_serde::to_vec(value).map_err(|e| SerializerError(e.to_string()))
    }

    fn deserialize<T>(&self, data: &[u8]) -> Result<T, SerializerError>
    where
        T: DeserializeOwned,
    {
        rmp_serde::from_slice(data).map_err(|e| SerializerError(e.to_string()))
    }
}
