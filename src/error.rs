use thiserror::Error;

use crate::{backend::ExtractionError, metadata::RemoteServiceError, storage::error::StorageError};

/// Failures reported back to the host as error responses.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Concurrent download limit reached. Please wait for active downloads to complete.")]
    ConcurrencyLimit,

    #[error("Download workers are not running")]
    WorkersUnavailable,

    #[error("{0}")]
    Extraction(#[from] ExtractionError),

    #[error("{0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    RemoteService(#[from] RemoteServiceError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),
}
