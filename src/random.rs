//! Injectable source of cryptographically secure random bytes.
//!
//! Keying material and nonces are drawn through the [`SecureRandom`]
//! trait. Production uses the operating system RNG; tests substitute a
//! deterministic byte counter so minted secrets are predictable.

use rand::rngs::OsRng;
use rand::RngCore;

/// Fills buffers with cryptographically secure random bytes.
pub trait SecureRandom: Send + Sync {
    /// Fills `dest` with random bytes.
    fn fill(&self, dest: &mut [u8]);
}

/// The production RNG, backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl SecureRandom for OsRandom {
    fn fill(&self, dest: &mut [u8]) {
        let mut rng = OsRng;
        rng.fill_bytes(dest);
    }
}
