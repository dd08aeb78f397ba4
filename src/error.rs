//! 同步错误类型

use crate::storage::ClientError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Connection to {address} failed: {source}")]
    Connection {
        address: String,
        #[source]
        source: ClientError,
    },

    #[error("Catalog {path} could not be read: {source}")]
    CatalogRead {
        path: String,
        #[source]
        source: ClientError,
    },

    #[error("Catalog is malformed: {0}")]
    CatalogFormat(String),

    #[error("Could not create remote directory {path}: {reason}")]
    DirectoryCreate { path: String, reason: String },

    #[error("Transfer of {local} to {remote} failed: {source}")]
    Transfer {
        local: PathBuf,
        remote: String,
        #[source]
        source: ClientError,
    },

    #[error("Could not delete remote entry {path}: {source}")]
    Deletion {
        path: String,
        #[source]
        source: ClientError,
    },

    #[error("Local IO error on {path}: {source}")]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    pub(crate) fn local_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::LocalIo {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
