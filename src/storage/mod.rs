//! Storage provider contract.
//!
//! A [`Provider`] persists versioned records and gives the fleet the one
//! primitive multi-host rotation needs: a compare-and-swap save on a
//! single id. Any backend that keeps these semantics (linearizable CAS
//! per id, reads that see the last committed write, idempotent delete)
//! can hold the keyring; `tests/storage_conformance.rs` is the check an
//! adapter must pass. Record expiry is best-effort cleanup only, never a
//! correctness mechanism.

use std::time::SystemTime;

use async_trait::async_trait;
use thiserror::Error;

mod memory;

pub use memory::MemoryProvider;

/// Maximum allowed length of a [`Record::id`] in bytes.
pub const MAX_ID_LENGTH: usize = 255;

/// A versioned record persisted by a [`Provider`].
#[derive(Debug, Clone)]
pub struct Record {
    /// Unique identifier, at most [`MAX_ID_LENGTH`] bytes.
    pub id: String,
    /// Optimistic-locking version; always positive once persisted.
    pub version: i64,
    /// Time after which the backend may delete the record.
    pub expires_at: SystemTime,
    /// Tag identifying how `data` is encoded.
    pub format: String,
    /// Opaque payload.
    pub data: Vec<u8>,
}

/// Errors returned by storage providers.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The save's `expect_version` precondition failed.
    #[error("version conflict")]
    VersionConflict,

    /// The record id exceeds [`MAX_ID_LENGTH`] bytes.
    #[error("record id exceeds {MAX_ID_LENGTH} bytes")]
    IdTooLong,

    /// The backend could not complete the operation, including cancelled
    /// I/O.
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Persistent record storage shared by every station in the fleet.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Returns the current record for `id`, or `None` when absent.
    /// Implementations must never return a stale cached value.
    async fn fetch(&self, id: &str) -> Result<Option<Record>, StorageError>;

    /// Saves a record, with the version check selected by
    /// `expect_version`:
    ///
    /// - negative: unconditional upsert; any existing record is replaced
    ///   and no version check is performed.
    /// - zero: insert only; fails with [`StorageError::VersionConflict`]
    ///   if a record with that id already exists.
    /// - positive: update only; succeeds iff the stored record's version
    ///   equals `expect_version`, otherwise
    ///   [`StorageError::VersionConflict`].
    async fn save(&self, record: &Record, expect_version: i64) -> Result<(), StorageError>;

    /// Deletes the record for `id`. Idempotent: deleting an absent
    /// record succeeds.
    async fn delete(&self, id: &str) -> Result<(), StorageError>;
}
