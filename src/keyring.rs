//! Secret keying material and the rotation arithmetic over it.
//!
//! A [`Keyring`] is an ordered list of [`Secret`]s, most recent first,
//! shared by every host through the storage provider. Each secret is 32
//! random bytes plus the instant it becomes active for encoding. A secret
//! can decode cookies from the moment it exists, but is only used for
//! encoding once its start time has passed, giving every host a chance to
//! download it first.

use std::fmt;
use std::time::Duration;

use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::random::SecureRandom;

/// Maximum age for cookies when none is configured (30 days).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Lower bound on the rotation period, and the interval at which hosts
/// poll storage for secrets minted elsewhere. Also the grace delay before
/// a freshly minted secret becomes active for encoding.
pub const MINIMUM_ROTATION_PERIOD: Duration = Duration::from_secs(15 * 60);

/// Length of the random keying material in each secret.
pub const KEYING_MATERIAL_LEN: usize = 32;

/// Format tag of the canonical keyring encoding. Persisted alongside the
/// data so that a future encoding can be introduced under a new tag.
pub const KEYRING_FORMAT: &str = "msgpack";

/// Errors raised while encoding or decoding a persisted keyring.
#[derive(Debug, Error)]
pub enum KeyringError {
    #[error("unsupported secret record format: {0}")]
    UnsupportedFormat(String),

    #[error("cannot decode secret keyring: {0}")]
    Malformed(String),

    #[error("cannot encode secret keyring: {0}")]
    Encode(String),
}

/// Secret keying material for a key derivation function, together with
/// the unix time at which it becomes active for encoding.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Secret {
    keying_material: [u8; KEYING_MATERIAL_LEN],
    start_at: i64,
}

impl Secret {
    pub(crate) fn mint(rng: &dyn SecureRandom, start_at: i64) -> Self {
        let mut keying_material = [0u8; KEYING_MATERIAL_LEN];
        rng.fill(&mut keying_material);
        Secret {
            keying_material,
            start_at,
        }
    }

    /// Unix time at which this secret becomes active for encoding.
    pub fn start_at(&self) -> i64 {
        self.start_at
    }

    pub(crate) fn keying_material(&self) -> &[u8; KEYING_MATERIAL_LEN] {
        &self.keying_material
    }

    /// Derives a `(hash_key, encrypt_key)` pair from this secret for use
    /// with external sign-then-encrypt cookie codecs: two consecutive
    /// 32-byte reads from a single HKDF-SHA256 stream with empty salt and
    /// empty info.
    pub fn key_pair(&self) -> KeyPair {
        let hk = Hkdf::<Sha256>::new(None, &self.keying_material);
        let mut okm = [0u8; 64];
        hk.expand(&[], &mut okm)
            .expect("64 bytes is a valid HKDF-SHA256 output length");
        let mut hash_key = [0u8; 32];
        let mut encrypt_key = [0u8; 32];
        hash_key.copy_from_slice(&okm[..32]);
        encrypt_key.copy_from_slice(&okm[32..]);
        okm.zeroize();
        KeyPair {
            hash_key,
            encrypt_key,
        }
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("keying_material", &"[redacted]")
            .field("start_at", &self.start_at)
            .finish()
    }
}

/// Hash and encryption keys derived from one secret, for interop with
/// HMAC-then-encrypt cookie codecs.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyPair {
    pub hash_key: [u8; 32],
    pub encrypt_key: [u8; 32],
}

/// Ordered list of secrets, most recent first.
#[derive(Debug, Default, Clone)]
pub struct Keyring {
    secrets: Vec<Secret>,
}

impl Keyring {
    /// The secrets, newest first.
    pub fn secrets(&self) -> &[Secret] {
        &self.secrets
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    /// Trims obsolete secrets and mints a new one when the newest is
    /// older than the rotation period. Returns whether the keyring
    /// changed.
    ///
    /// A secret is obsolete when it is older than the first secret that
    /// fell behind `now - max_age`: that first secret may still be needed
    /// to decode a cookie issued just before the cutoff, anything behind
    /// it cannot be. Trimming never empties the keyring.
    ///
    /// The first secret ever minted starts immediately; later secrets
    /// start [`MINIMUM_ROTATION_PERIOD`] in the future so that other
    /// stations refresh and receive them before any cookie is encoded
    /// under them.
    pub fn rotate(
        &mut self,
        now: i64,
        rotation_period: Duration,
        max_age: Duration,
        rng: &dyn SecureRandom,
    ) -> bool {
        let mut modified = false;

        let cutoff = now - max_age.as_secs() as i64;
        for i in 0..self.secrets.len() {
            if self.secrets[i].start_at < cutoff {
                if i + 1 < self.secrets.len() {
                    self.secrets.truncate(i + 1);
                    modified = true;
                }
                break;
            }
        }

        let key_required = match self.secrets.first() {
            None => true,
            Some(newest) => newest.start_at < now - rotation_period.as_secs() as i64,
        };

        if key_required {
            let start_at = if self.secrets.is_empty() {
                now
            } else {
                now + MINIMUM_ROTATION_PERIOD.as_secs() as i64
            };
            self.secrets.insert(0, Secret::mint(rng, start_at));
            modified = true;
        }

        modified
    }

    /// Encodes the secrets list in the canonical format, returning the
    /// format tag together with the data.
    pub fn marshal(&self) -> Result<(String, Vec<u8>), KeyringError> {
        let data =
            rmp_serde::to_vec(&self.secrets).map_err(|e| KeyringError::Encode(e.to_string()))?;
        Ok((KEYRING_FORMAT.to_string(), data))
    }

    /// Decodes a persisted secrets list, rejecting unknown format tags.
    pub fn unmarshal(format: &str, data: &[u8]) -> Result<Keyring, KeyringError> {
        if format != KEYRING_FORMAT {
            return Err(KeyringError::UnsupportedFormat(format.to_string()));
        }
        let secrets: Vec<Secret> =
            rmp_serde::from_slice(data).map_err(|e| KeyringError::Malformed(e.to_string()))?;
        Ok(Keyring { secrets })
    }

    /// Returns the encode and decode key-pair lists for external cookie
    /// codecs. Decode pairs cover every secret; encode pairs only those
    /// whose start time has passed.
    pub fn key_pairs(&self, now: i64) -> (Vec<KeyPair>, Vec<KeyPair>) {
        let mut encode = Vec::with_capacity(self.secrets.len());
        let mut decode = Vec::with_capacity(self.secrets.len());
        for secret in &self.secrets {
            decode.push(secret.key_pair());
            if secret.start_at <= now {
                encode.push(secret.key_pair());
            }
        }
        (encode, decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CountingRng {
        next: Mutex<u8>,
    }

    impl CountingRng {
        fn new() -> Self {
            CountingRng {
                next: Mutex::new(0),
            }
        }
    }

    impl SecureRandom for CountingRng {
        fn fill(&self, dest: &mut [u8]) {
            let mut next = self.next.lock().unwrap();
            for byte in dest {
                *byte = *next;
                *next = next.wrapping_add(1);
            }
        }
    }

    const HOUR: Duration = Duration::from_secs(3600);
    const MIN_ROTATION_SECS: i64 = 15 * 60;

    #[test]
    fn first_rotation_mints_immediately() {
        let rng = CountingRng::new();
        let mut keyring = Keyring::default();

        let modified = keyring.rotate(1000, HOUR, HOUR, &rng);

        assert!(modified);
        assert_eq!(keyring.len(), 1);
        assert_eq!(keyring.secrets()[0].start_at(), 1000);
    }

    #[test]
    fn second_secret_is_future_dated() {
        let rng = CountingRng::new();
        let mut keyring = Keyring::default();
        keyring.rotate(1000, HOUR, HOUR, &rng);

        let now = 1000 + HOUR.as_secs() as i64 + 1;
        let modified = keyring.rotate(now, HOUR, HOUR, &rng);

        assert!(modified);
        assert_eq!(keyring.len(), 2);
        assert_eq!(keyring.secrets()[0].start_at(), now + MIN_ROTATION_SECS);
        assert_eq!(keyring.secrets()[1].start_at(), 1000);
    }

    #[test]
    fn no_rotation_within_period() {
        let rng = CountingRng::new();
        let mut keyring = Keyring::default();
        keyring.rotate(1000, HOUR, HOUR, &rng);

        let modified = keyring.rotate(1000 + 60, HOUR, HOUR, &rng);

        assert!(!modified);
        assert_eq!(keyring.len(), 1);
    }

    #[test]
    fn trim_keeps_first_secret_behind_cutoff() {
        let rng = CountingRng::new();
        let mut keyring = Keyring::default();
        let mut now = 1000;
        // build up three secrets an hour apart
        for _ in 0..3 {
            keyring.rotate(now, HOUR, Duration::from_secs(86400), &rng);
            now += HOUR.as_secs() as i64 + 1;
        }
        assert_eq!(keyring.len(), 3);

        // with max_age of one hour, only the newest and the first secret
        // older than the cutoff survive
        let modified = keyring.rotate(now, HOUR, HOUR, &rng);
        assert!(modified);
        assert_eq!(keyring.len(), 2);
    }

    #[test]
    fn trim_never_empties() {
        let rng = CountingRng::new();
        let mut keyring = Keyring::default();
        keyring.rotate(1000, HOUR, HOUR, &rng);

        // far beyond max_age: the stale secret is retained, a new one is
        // minted ahead of it
        let now = 1000 + 100 * HOUR.as_secs() as i64;
        keyring.rotate(now, HOUR, HOUR, &rng);

        assert_eq!(keyring.len(), 2);
        assert!(keyring.secrets()[1].start_at() < now - HOUR.as_secs() as i64);
    }

    #[test]
    fn start_at_non_increasing_and_single_future() {
        let rng = CountingRng::new();
        let mut keyring = Keyring::default();
        let mut now = 1000;
        for _ in 0..10 {
            keyring.rotate(now, HOUR, Duration::from_secs(7200), &rng);
            let starts: Vec<i64> = keyring.secrets().iter().map(Secret::start_at).collect();
            for pair in starts.windows(2) {
                assert!(pair[0] >= pair[1], "start_at out of order: {starts:?}");
            }
            let future = starts.iter().filter(|&&s| s > now).count();
            assert!(future <= 1, "more than one future secret: {starts:?}");
            now += 1800;
        }
    }

    #[test]
    fn marshal_round_trip() {
        let rng = CountingRng::new();
        let mut keyring = Keyring::default();
        keyring.rotate(1000, HOUR, HOUR, &rng);
        keyring.rotate(1000 + 7200, HOUR, Duration::from_secs(86400), &rng);

        let (format, data) = keyring.marshal().unwrap();
        assert_eq!(format, KEYRING_FORMAT);

        let decoded = Keyring::unmarshal(&format, &data).unwrap();
        assert_eq!(decoded.len(), keyring.len());
        for (a, b) in decoded.secrets().iter().zip(keyring.secrets()) {
            assert_eq!(a.start_at(), b.start_at());
            assert_eq!(a.keying_material(), b.keying_material());
        }
    }

    #[test]
    fn unmarshal_rejects_unknown_format() {
        let err = Keyring::unmarshal("gob", b"anything").unwrap_err();
        assert!(matches!(err, KeyringError::UnsupportedFormat(f) if f == "gob"));
    }

    #[test]
    fn unmarshal_rejects_garbage() {
        let err = Keyring::unmarshal(KEYRING_FORMAT, &[0xc1, 0xff, 0x00]).unwrap_err();
        assert!(matches!(err, KeyringError::Malformed(_)));
    }

    #[test]
    fn key_pair_is_deterministic_and_split() {
        let rng = CountingRng::new();
        let secret = Secret::mint(&rng, 1000);

        let a = secret.key_pair();
        let b = secret.key_pair();
        assert_eq!(a.hash_key, b.hash_key);
        assert_eq!(a.encrypt_key, b.encrypt_key);
        assert_ne!(a.hash_key, a.encrypt_key);
    }

    #[test]
    fn key_pairs_split_current_and_future() {
        let rng = CountingRng::new();
        let mut keyring = Keyring::default();
        keyring.rotate(1000, HOUR, HOUR, &rng);
        let now = 1000 + HOUR.as_secs() as i64 + 1;
        keyring.rotate(now, HOUR, HOUR, &rng);

        let (encode, decode) = keyring.key_pairs(now);
        assert_eq!(encode.len(), 1);
        assert_eq!(decode.len(), 2);
    }
}
