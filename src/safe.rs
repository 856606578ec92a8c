//! The safe: generates, persists and rotates the secret keying material
//! shared by every station in the fleet.
//!
//! Each process owns one [`Safe`] per keyring. The safe keeps an
//! immutable [`CodecView`] cached behind a reader/writer guard; encode
//! and decode calls take the shared path until the view's local expiry,
//! at which point one refresh cycle runs against the storage provider.
//! Rotation needs no leader: every station runs the same rotate
//! arithmetic, the provider's compare-and-swap save orders concurrent
//! attempts, and losers adopt the winner's keyring as-is.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::clock::{from_unix_seconds, unix_seconds, Clock, SystemClock};
use crate::codec::{CodecView, DecodeError, EncodeError, MsgPack, SealedCodec, Serializer};
use crate::keyring::{Keyring, KeyringError, DEFAULT_MAX_AGE, MINIMUM_ROTATION_PERIOD};
use crate::random::{OsRandom, SecureRandom};
use crate::storage::{Provider, Record, StorageError};

/// Storage id under which the keyring is persisted when none is
/// configured.
pub const DEFAULT_SECRET_ID: &str = "secret";

/// Errors raised by a refresh cycle.
#[derive(Debug, Error)]
pub enum SafeError {
    /// The storage provider failed or was cancelled.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The persisted keyring record could not be decoded.
    #[error(transparent)]
    Keyring(#[from] KeyringError),
}

/// Rotation coordinator and cookie codec front end.
///
/// Configuration is chainable; all settings have working defaults:
///
/// - `max_age`: cookie validity window, default 30 days.
/// - `rotation_period`: cadence for minting new secrets, default
///   `max_age`, floored at 15 minutes.
/// - `secret_id`: storage key for the keyring, default `"secret"`.
///   Distinct ids partition keyrings of applications sharing a backend.
/// - serializer, clock and RNG seams.
pub struct Safe<S: Serializer = MsgPack> {
    provider: Arc<dyn Provider>,
    max_age: Duration,
    rotation_period: Duration,
    secret_id: String,
    serializer: Arc<S>,
    clock: Arc<dyn Clock>,
    rng: Arc<dyn SecureRandom>,
    view: RwLock<Option<Arc<CodecView<S>>>>,
}

impl Safe<MsgPack> {
    /// Creates a safe over `provider` with default configuration and the
    /// MessagePack serializer.
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Safe {
            provider,
            max_age: Duration::ZERO,
            rotation_period: Duration::ZERO,
            secret_id: String::new(),
            serializer: Arc::new(MsgPack),
            clock: Arc::new(SystemClock),
            rng: Arc::new(OsRandom),
            view: RwLock::new(None),
        }
    }
}

impl<S: Serializer> Safe<S> {
    /// Sets the maximum cookie age. Zero selects the 30-day default.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Sets the rotation period. Zero selects the maximum age. Values
    /// are capped at the maximum age and floored at
    /// [`MINIMUM_ROTATION_PERIOD`].
    pub fn with_rotation_period(mut self, rotation_period: Duration) -> Self {
        self.rotation_period = rotation_period;
        self
    }

    /// Sets the storage id under which the keyring is persisted. Must be
    /// at most 255 bytes; an empty string selects the default.
    pub fn with_secret_id(mut self, secret_id: impl Into<String>) -> Self {
        self.secret_id = secret_id.into();
        self
    }

    /// Replaces the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the random source.
    pub fn with_rng(mut self, rng: Arc<dyn SecureRandom>) -> Self {
        self.rng = rng;
        self
    }

    /// Replaces the value serializer, dropping any cached view.
    pub fn with_serializer<S2: Serializer>(self, serializer: S2) -> Safe<S2> {
        Safe {
            provider: self.provider,
            max_age: self.max_age,
            rotation_period: self.rotation_period,
            secret_id: self.secret_id,
            serializer: Arc::new(serializer),
            clock: self.clock,
            rng: self.rng,
            view: RwLock::new(None),
        }
    }

    /// Encodes `value` into a cookie string for cookie `name`,
    /// refreshing the keyring first if the cached view has expired.
    pub async fn encode<T>(&self, name: &str, value: &T) -> Result<String, EncodeError>
    where
        T: Serialize + ?Sized,
    {
        let view = self.current_view().await?;
        view.encode(name, value)
    }

    /// Decodes a cookie string issued for cookie `name`, refreshing the
    /// keyring first if the cached view has expired.
    pub async fn decode<T>(&self, name: &str, value: &str) -> Result<T, DecodeError>
    where
        T: DeserializeOwned,
    {
        let view = self.current_view().await?;
        view.decode(name, value)
    }

    /// Ensures the cached view is up to date, rotating the persisted
    /// keyring if it is due.
    ///
    /// Calling this is optional, since `encode` and `decode` refresh on
    /// demand, but it lets servers warm up at startup and surface
    /// storage problems early.
    pub async fn refresh(&self) -> Result<(), SafeError> {
        self.current_view().await.map(drop)
    }

    /// Time remaining until the cached view expires and the next call
    /// will hit storage. Zero when no view is cached or it has already
    /// expired.
    pub async fn refresh_in(&self) -> Duration {
        let guard = self.view.read().await;
        match guard.as_ref() {
            Some(view) => view
                .expires_at()
                .duration_since(self.clock.now())
                .unwrap_or(Duration::ZERO),
            None => Duration::ZERO,
        }
    }

    /// Returns the current codec view, running a refresh cycle when the
    /// cached one is absent or expired. Safe to call concurrently; the
    /// storage round trip runs outside the guard and the last finished
    /// refresh wins the pointer swap.
    pub async fn current_view(&self) -> Result<Arc<CodecView<S>>, SafeError> {
        {
            let guard = self.view.read().await;
            if let Some(view) = guard.as_ref() {
                if !view.is_expired(self.clock.now()) {
                    return Ok(Arc::clone(view));
                }
            }
        }

        let view = self.rebuild_view().await?;
        let mut guard = self.view.write().await;
        *guard = Some(Arc::clone(&view));
        Ok(view)
    }

    /// One refresh cycle: fetch the persisted keyring, rotate it, save
    /// under optimistic concurrency control, and derive a fresh view.
    ///
    /// A version conflict means another station rotated first; the cycle
    /// re-fetches and adopts the stored keyring without retrying its own
    /// mutation.
    async fn rebuild_view(&self) -> Result<Arc<CodecView<S>>, SafeError> {
        let now = self.clock.now();
        let now_unix = unix_seconds(now);
        let secret_id = self.secret_id();
        let rotation_period = self.effective_rotation_period();
        let max_age = self.effective_max_age();

        let rec = self.provider.fetch(secret_id).await?;
        let mut keyring = match &rec {
            Some(rec) => Keyring::unmarshal(&rec.format, &rec.data)?,
            None => Keyring::default(),
        };

        let modified = keyring.rotate(now_unix, rotation_period, max_age, self.rng.as_ref());
        if modified {
            let expect_version = rec.as_ref().map(|r| r.version).unwrap_or(0);
            let (format, data) = keyring.marshal()?;
            let envelope = Record {
                id: secret_id.to_string(),
                version: expect_version + 1,
                expires_at: now + rotation_period * 4,
                format,
                data,
            };
            match self.provider.save(&envelope, expect_version).await {
                Ok(()) => {
                    debug!(
                        secret_id,
                        version = envelope.version,
                        secrets = keyring.len(),
                        "rotated secret keyring"
                    );
                }
                Err(StorageError::VersionConflict) => {
                    // another station beat us to the update
                    debug!(secret_id, "keyring rotated concurrently; adopting stored secrets");
                    let rec = self.provider.fetch(secret_id).await?.ok_or_else(|| {
                        warn!(secret_id, "secret record disappeared after version conflict");
                        StorageError::Unavailable(
                            "secret record disappeared after version conflict".to_string(),
                        )
                    })?;
                    keyring = Keyring::unmarshal(&rec.format, &rec.data)?;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(Arc::new(self.view_from(&keyring, now_unix)))
    }

    fn view_from(&self, keyring: &Keyring, now_unix: i64) -> CodecView<S> {
        let max_age = self.effective_max_age();
        let mut encoders = Vec::with_capacity(keyring.len());
        let mut decoders = Vec::with_capacity(keyring.len());
        for secret in keyring.secrets() {
            let codec = Arc::new(SealedCodec::new(
                *secret.keying_material(),
                Arc::clone(&self.serializer),
                max_age,
                Arc::clone(&self.clock),
                Arc::clone(&self.rng),
            ));
            decoders.push(Arc::clone(&codec));
            if secret.start_at() <= now_unix {
                encoders.push(codec);
            }
        }

        // expire at the next scheduled rotation, but poll at least every
        // minimum rotation period to pick up secrets minted by peers
        let next_refresh = from_unix_seconds(now_unix) + MINIMUM_ROTATION_PERIOD;
        let expires_at = match keyring.secrets().first() {
            Some(newest) => {
                let next_rotation =
                    from_unix_seconds(newest.start_at()) + self.effective_rotation_period();
                next_rotation.min(next_refresh)
            }
            None => next_refresh,
        };

        CodecView::new(encoders, decoders, expires_at)
    }

    fn secret_id(&self) -> &str {
        if self.secret_id.is_empty() {
            DEFAULT_SECRET_ID
        } else {
            &self.secret_id
        }
    }

    fn effective_max_age(&self) -> Duration {
        if self.max_age.is_zero() {
            DEFAULT_MAX_AGE
        } else {
            self.max_age
        }
    }

    fn effective_rotation_period(&self) -> Duration {
        let max_age = self.effective_max_age();
        let mut rotation_period = if self.rotation_period.is_zero() {
            max_age
        } else {
            self.rotation_period
        };
        if rotation_period > max_age {
            rotation_period = max_age;
        }
        // the floor wins: refreshing less often than peers poll would
        // defeat the publish grace window
        if rotation_period < MINIMUM_ROTATION_PERIOD {
            rotation_period = MINIMUM_ROTATION_PERIOD;
        }
        rotation_period
    }
}
