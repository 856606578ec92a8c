//! Cookie encoding and decoding.
//!
//! The codec turns session values into authenticated-encrypted cookie
//! strings and back. Each secret in the keyring yields one
//! [`SealedCodec`]; the [`CodecView`] groups them into the encoder and
//! decoder lists that a [`Safe`](crate::safe::Safe) publishes to request
//! handlers.

mod sealed;
mod serializer;
mod view;

pub use sealed::{SealedCodec, NONCE_LEN, TAG_LEN};
pub use serializer::{MsgPack, Serializer, SerializerError};
pub use view::CodecView;

use thiserror::Error;

use crate::safe::SafeError;

/// Errors raised while encoding a cookie.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Refreshing the keyring from storage failed.
    #[error(transparent)]
    Refresh(#[from] SafeError),

    /// The cookie value could not be serialized.
    #[error("cannot serialize cookie value: {0}")]
    Serialize(String),

    /// Every secret in the keyring is future-dated.
    #[error("no secret is active for encoding yet")]
    NoActiveSecret,

    /// The authenticated encryption step failed.
    #[error("cookie encryption failed")]
    Seal,
}

/// Errors raised while decoding a cookie.
///
/// All variants except [`DecodeError::Refresh`] are decode errors in the
/// narrow sense: the input itself was rejected, and retrying with the
/// same input cannot succeed. Callers that only care about the category
/// can use [`DecodeError::is_decode`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Refreshing the keyring from storage failed.
    #[error(transparent)]
    Refresh(#[from] SafeError),

    /// The input failed structural checks before decryption.
    #[error("{0}")]
    Malformed(&'static str),

    /// No secret in the keyring authenticates the input.
    #[error("invalid cookie")]
    AuthFailed,

    /// The cookie's embedded timestamp is older than the maximum age.
    #[error("cookie expired")]
    Expired,

    /// The decrypted payload could not be deserialized.
    #[error("cannot deserialize cookie value: {0}")]
    Deserialize(String),
}

impl DecodeError {
    /// Whether this failure means the cookie itself was rejected, as
    /// opposed to the keyring being unavailable.
    pub fn is_decode(&self) -> bool {
        !matches!(self, DecodeError::Refresh(_))
    }
}
