use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "rocksdb")]
impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<StorageError> for civic_types::CivicError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(what) => civic_types::CivicError::NotFound(what),
            StorageError::AlreadyExists(what) => {
                civic_types::CivicError::Conflict(format!("already exists: {}", what))
            }
            StorageError::VersionConflict { .. } => civic_types::CivicError::StaleVersion,
            other => civic_types::CivicError::Storage(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
