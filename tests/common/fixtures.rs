//! Deterministic clock, RNG and safe builders shared across the test
//! suite.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sessionkit_core::{Clock, MemoryProvider, Safe, SecureRandom};

/// Unix seconds for 2099-01-01T00:00:00Z, the base instant for rotation
/// schedules. Far enough in the future that real wall-clock leakage
/// into a test would be obvious.
pub const BASE_UNIX: i64 = 4_070_908_800;

/// Manually advanced clock shared between a safe and its provider.
pub struct FakeClock {
    now: Mutex<SystemTime>,
}

impl FakeClock {
    pub fn at_unix(secs: i64) -> Arc<Self> {
        Arc::new(FakeClock {
            now: Mutex::new(UNIX_EPOCH + Duration::from_secs(secs as u64)),
        })
    }

    pub fn advance(&self, d: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += d;
    }

    pub fn unix(&self) -> i64 {
        self.now
            .lock()
            .unwrap()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }
}

impl Clock for FakeClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap()
    }
}

/// Byte-counter RNG: every fill continues the same incrementing byte
/// sequence, so minted secrets and nonces are predictable and distinct.
pub struct CountingRng {
    next: Mutex<u8>,
}

impl CountingRng {
    pub fn new() -> Arc<Self> {
        Self::starting_at(0)
    }

    /// Starts the byte counter at `first`, so two stations in one test
    /// mint distinct keying material.
    pub fn starting_at(first: u8) -> Arc<Self> {
        Arc::new(CountingRng {
            next: Mutex::new(first),
        })
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

/// Deterministic PCG for jittered time steps in long-running schedules.
/// Not cryptographic; the crate's RNG seam is [`CountingRng`].
pub struct SimplePcg {
    state: u64,
}

impl SimplePcg {
    pub fn new(seed: u64) -> Self {
        SimplePcg { state: seed }
    }

    pub fn next_u32(&mut self) -> u32 {
        let old_state = self.state;
        self.state = old_state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let xor_shifted = (((old_state >> 18) ^ old_state) >> 27) as u32;
        let rot = (old_state >> 59) as u32;
        xor_shifted.rotate_right(rot)
    }
}

/// A memory provider sharing the given clock, so record TTL expiry and
/// rotation schedules observe the same time.
pub fn provider_with_clock(clock: &Arc<FakeClock>) -> Arc<MemoryProvider> {
    Arc::new(MemoryProvider::new().with_clock(Arc::clone(clock) as Arc<dyn Clock>))
}

/// A safe with one-hour max age and rotation period, deterministic
/// clock and RNG — the configuration the rotation scenarios run under.
pub fn hourly_safe(
    provider: Arc<MemoryProvider>,
    clock: &Arc<FakeClock>,
    rng: Arc<CountingRng>,
) -> Safe {
    Safe::new(provider)
        .with_max_age(Duration::from_secs(3600))
        .with_rotation_period(Duration::from_secs(3600))
        .with_clock(Arc::clone(clock) as Arc<dyn Clock>)
        .with_rng(rng as Arc<dyn SecureRandom>)
}
