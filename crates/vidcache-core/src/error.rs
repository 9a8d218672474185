use thiserror::Error;

use crate::models::VideoId;

/// The underlying store rejected a read or write.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Store is not open")]
    NotOpen,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store file is corrupt: {0}")]
    Corrupt(String),

    #[error("Write rejected: {0}")]
    WriteRejected(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// A record failed the checks applied before anything is written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Record {index}: missing required field `{field}`")]
    MissingField { index: usize, field: &'static str },

    #[error("Record {index}: invalid `{field}`: {reason}")]
    InvalidField {
        index: usize,
        field: &'static str,
        reason: String,
    },

    #[error("Record {index}: id {id} is reserved")]
    ReservedId { index: usize, id: VideoId },
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;
