//! # sessionkit-core
//!
//! Rotating secret keys and authenticated session cookies, shared across
//! a fleet of hosts.
//!
//! The crate generates random long-term keying material, persists it to
//! a shared storage backend under optimistic concurrency control, and
//! rotates it on a schedule — with no leader election, because every
//! station runs the same rotation arithmetic and the backend's
//! compare-and-swap save orders concurrent attempts. From the current
//! keyring it derives per-cookie-name symmetric keys and seals session
//! values into compact authenticated-encrypted cookie strings.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sessionkit_core::{MemoryProvider, Safe};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = Arc::new(MemoryProvider::new());
//! let safe = Safe::new(provider);
//!
//! // Encode: serialize + seal under the newest active secret
//! let cookie = safe.encode("session", "user-1234").await?;
//!
//! // Decode: try every known secret, newest first
//! let value: String = safe.decode("session", &cookie).await?;
//! assert_eq!(value, "user-1234");
//! # Ok(())
//! # }
//! ```
//!
//! ## Sharing a backend across hosts
//!
//! Point every process at the same storage [`Provider`] and give each
//! application its own `secret_id`. Stations poll storage at least every
//! fifteen minutes; a freshly minted secret is future-dated by the same
//! interval, so every station can decode with it before any station
//! encodes with it. Backends other than [`MemoryProvider`] implement the
//! [`Provider`] contract and must pass `tests/storage_conformance.rs`.
//!
//! ## Security Properties
//!
//! - **XChaCha20-Poly1305**: authenticated encryption with a random
//!   24-byte nonce per cookie
//! - **HKDF-SHA256**: per-cookie-name key derivation (RFC 5869), so a
//!   token for one cookie cannot be replayed under another
//! - **Embedded timestamp**: cookies expire after the configured
//!   maximum age regardless of client-side attributes
//! - **Memory safety**: `zeroize` on drop for all keying material

pub mod clock;
pub mod codec;
pub mod keyring;
pub mod random;
pub mod safe;
pub mod storage;

pub use clock::{Clock, SystemClock};
pub use codec::{
    CodecView, DecodeError, EncodeError, MsgPack, SealedCodec, Serializer, SerializerError,
};
pub use keyring::{
    KeyPair, Keyring, KeyringError, Secret, DEFAULT_MAX_AGE, KEYRING_FORMAT,
    MINIMUM_ROTATION_PERIOD,
};
pub use random::{OsRandom, SecureRandom};
pub use safe::{Safe, SafeError, DEFAULT_SECRET_ID};
pub use storage::{MemoryProvider, Provider, Record, StorageError, MAX_ID_LENGTH};
