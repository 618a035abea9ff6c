use core_cache::CacheError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Storage error: {0}")]
    Storage(#[from] CacheError),

    #[error("Failed to resolve derived artifact for {item_id}: {message}")]
    Resolution { item_id: String, message: String },

    #[error("Invalid lifecycle state: {0}")]
    InvalidState(String),
}

impl SyncError {
    /// Whether calling the same command again may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_) | SyncError::Storage(_) | SyncError::Resolution { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
