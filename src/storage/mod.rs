use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::anyhow;

use crate::storage::{error::StorageError, operations::Storage};

pub mod cache;
pub mod db;
pub mod error;
pub mod fs;
pub mod operations;
pub(crate) mod schema;

/// The single writer connection, shared between the dispatch loop and download workers.
pub type SharedStorage = Arc<Mutex<Storage>>;

pub fn shared(storage: Storage) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

pub fn lock(storage: &SharedStorage) -> Result<MutexGuard<'_, Storage>, StorageError> {
    storage.lock().map_err(|e| {
        StorageError::Internal(anyhow!("could not access storage under lock: {e}"))
    })
}
