//! Per-secret cookie codec: HKDF-SHA256 key derivation plus
//! XChaCha20-Poly1305 authenticated encryption.
//!
//! Cookie wire format, base64url without padding:
//!
//! ```text
//! nonce(24) || seal( timestamp(8, big-endian unix seconds) || serialized value )
//! ```
//!
//! The per-cookie key is derived from the secret's keying material with
//! the cookie name as the HKDF info parameter, so a token issued for one
//! cookie name cannot be replayed under another without carrying the
//! name in clear text. The embedded timestamp bounds the cookie's age on
//! decode.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64ct::{Base64UrlUnpadded, Encoding};
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{Key, KeyInit, XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::clock::{unix_seconds, Clock};
use crate::keyring::KEYING_MATERIAL_LEN;
use crate::random::SecureRandom;

use super::{DecodeError, EncodeError, Serializer};

/// Nonce length of the XChaCha20-Poly1305 construction.
pub const NONCE_LEN: usize = 24;

/// Authentication tag length.
pub const TAG_LEN: usize = 16;

const TIMESTAMP_LEN: usize = 8;

/// Cookie codec bound to a single secret. Immutable once constructed and
/// safe to share across threads. Keying material is erased on drop.
pub struct SealedCodec<S> {
    keying_material: [u8; KEYING_MATERIAL_LEN],
    serializer: Arc<S>,
    max_age: Duration,
    clock: Arc<dyn Clock>,
    rng: Arc<dyn SecureRandom>,
}

impl<S> Drop for SealedCodec<S> {
    fn drop(&mut self) {
        self.keying_material.zeroize();
    }
}

impl<S: Serializer> SealedCodec<S> {
    pub fn new(
        keying_material: [u8; KEYING_MATERIAL_LEN],
        serializer: Arc<S>,
        max_age: Duration,
        clock: Arc<dyn Clock>,
        rng: Arc<dyn SecureRandom>,
    ) -> Self {
        SealedCodec {
            keying_material,
            serializer,
            max_age,
            clock,
            rng,
        }
    }

    /// Encrypts `value` into a cookie string for cookie `name`.
    pub fn encode<T>(&self, name: &str, value: &T) -> Result<String, EncodeError>
    where
        T: Serialize + ?Sized,
    {
        let serialized = self
            .serializer
            .serialize(value)
            .map_err(|e| EncodeError::Serialize(e.to_string()))?;

        let mut message = Vec::with_capacity(TIMESTAMP_LEN + serialized.len());
        let now = unix_seconds(self.clock.now());
        message.extend_from_slice(&(now as u64).to_be_bytes());
        message.extend_from_slice(&serialized);

        let mut nonce = [0u8; NONCE_LEN];
        self.rng.fill(&mut nonce);

        let mut key = self.derive_key(name).map_err(|_| EncodeError::Seal)?;
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
        let sealed = cipher
            .encrypt(XNonce::from_slice(&nonce), message.as_slice())
            .map_err(|_| EncodeError::Seal)?;
        key.zeroize();

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(Base64UrlUnpadded::encode_string(&out))
    }

    /// Decrypts and validates a cookie string issued for cookie `name`.
    pub fn decode<T>(&self, name: &str, value: &str) -> Result<T, DecodeError>
    where
        T: DeserializeOwned,
    {
        let sealed = Base64UrlUnpadded::decode_vec(value)
            .map_err(|_| DecodeError::Malformed("invalid cookie characters"))?;
        if sealed.len() <= NONCE_LEN + TAG_LEN + TIMESTAMP_LEN {
            return Err(DecodeError::Malformed("cookie has been cut"));
        }
        let (nonce, boxed) = sealed.split_at(NONCE_LEN);

        let mut key = self.derive_key(name).map_err(|_| DecodeError::AuthFailed)?;
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
        let message = cipher
            .decrypt(XNonce::from_slice(nonce), boxed)
            .map_err(|_| DecodeError::AuthFailed)?;
        key.zeroize();

        let (ts_bytes, payload) = message.split_at(TIMESTAMP_LEN);
        let ts_bytes: [u8; TIMESTAMP_LEN] = ts_bytes
            .try_into()
            .map_err(|_| DecodeError::Malformed("cookie has been cut"))?;
        let timestamp = u64::from_be_bytes(ts_bytes) as i64;

        let now = unix_seconds(self.clock.now());
        if timestamp.saturating_add(self.max_age.as_secs() as i64) < now {
            return Err(DecodeError::Expired);
        }

        self.serializer
            .deserialize(payload)
            .map_err(|e| DecodeError::Deserialize(e.to_string()))
    }

    fn derive_key(&self, name: &str) -> Result<[u8; 32], hkdf::InvalidLength> {
        let hk = Hkdf::<Sha256>::new(None, &self.keying_material);
        let mut key = [0u8; 32];
        hk.expand(name.as_bytes(), &mut key)?;
        Ok(key)
    }
}

impl<S> fmt::Debug for SealedCodec<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealedCodec")
            .field("keying_material", &"[redacted]")
            .field("max_age", &self.max_age)
            .finish()
    }
}
