//! Immutable snapshot of the keyring's cookie codecs.

use std::sync::Arc;
use std::time::SystemTime;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{DecodeError, EncodeError, SealedCodec, Serializer};

/// Encoder/decoder snapshot derived from a keyring at a point in time.
///
/// Decoders cover every secret, newest first. Encoders cover only the
/// secrets whose start time had passed when the view was built, so a
/// freshly minted secret is never used for encoding before every station
/// has had a chance to download it. The view is never mutated; when
/// `expires_at` passes, the safe replaces it wholesale.
pub struct CodecView<S> {
    encoders: Vec<Arc<SealedCodec<S>>>,
    decoders: Vec<Arc<SealedCodec<S>>>,
    expires_at: SystemTime,
}

impl<S: Serializer> CodecView<S> {
    pub(crate) fn new(
        encoders: Vec<Arc<SealedCodec<S>>>,
        decoders: Vec<Arc<SealedCodec<S>>>,
        expires_at: SystemTime,
    ) -> Self {
        CodecView {
            encoders,
            decoders,
            expires_at,
        }
    }

    /// Encodes `value` under the newest active secret.
    pub fn encode<T>(&self, name: &str, value: &T) -> Result<String, EncodeError>
    where
        T: Serialize + ?Sized,
    {
        match self.encoders.first() {
            Some(codec) => codec.encode(name, value),
            None => Err(EncodeError::NoActiveSecret),
        }
    }

    /// Decodes a cookie, trying each secret newest-first.
    ///
    /// Authentication failures move on to the next secret. A failure
    /// found after authentication succeeded (expiry, deserialization) is
    /// final: no other secret can open the same box.
    pub fn decode<T>(&self, name: &str, value: &str) -> Result<T, DecodeError>
    where
        T: DeserializeOwned,
    {
        let mut last: Option<DecodeError> = None;
        for codec in &self.decoders {
            match codec.decode(name, value) {
                Ok(decoded) => return Ok(decoded),
                Err(err @ (DecodeError::Expired | DecodeError::Deserialize(_))) => {
                    return Err(err)
                }
                Err(err) => last = Some(err),
            }
        }
        Err(last.unwrap_or(DecodeError::AuthFailed))
    }

    /// Time after which this view must be replaced.
    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    pub(crate) fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }

    /// Number of secrets currently usable for encoding.
    pub fn encoder_count(&self) -> usize {
        self.encoders.len()
    }

    /// Number of secrets usable for decoding.
    pub fn decoder_count(&self) -> usize {
        self.decoders.len()
    }
}
