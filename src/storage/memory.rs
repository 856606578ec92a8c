//! Memory-backed storage provider, intended for testing and for
//! single-process deployments that do not need persistence.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::clock::{Clock, SystemClock};

use super::{Provider, Record, StorageError, MAX_ID_LENGTH};

/// In-memory [`Provider`] implementation. Records expire lazily: a fetch
/// that finds an expired record deletes it and reports it absent.
pub struct MemoryProvider {
    clock: Arc<dyn Clock>,
    records: Mutex<HashMap<String, Record>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        MemoryProvider {
            clock: Arc::new(SystemClock),
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the time source used for record expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Record>>, StorageError> {
        self.records
            .lock()
            .map_err(|_| StorageError::Unavailable("memory provider lock poisoned".to_string()))
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for MemoryProvider {
    async fn fetch(&self, id: &str) -> Result<Option<Record>, StorageError> {
        let now = self.clock.now();
        let mut records = self.lock()?;
        match records.get(id) {
            Some(rec) if rec.expires_at < now => {
                records.remove(id);
                Ok(None)
            }
            Some(rec) => Ok(Some(rec.clone())),
            None => Ok(None),
        }
    }

    async fn save(&self, record: &Record, expect_version: i64) -> Result<(), StorageError> {
        if record.id.len() > MAX_ID_LENGTH {
            return Err(StorageError::IdTooLong);
        }
        debug_assert!(
            expect_version < 0 || record.version > 0,
            "versioned records must carry a positive version"
        );
        let mut records = self.lock()?;
        if expect_version == 0 {
            if records.contains_key(&record.id) {
                return Err(StorageError::VersionConflict);
            }
        } else if expect_version > 0 {
            match records.get(&record.id) {
                None => return Err(StorageError::VersionConflict),
                Some(existing) if existing.version != expect_version => {
                    return Err(StorageError::VersionConflict)
                }
                Some(_) => {}
            }
        }
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.lock()?.remove(id);
        Ok(())
    }
}
