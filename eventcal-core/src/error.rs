//! Error types for eventcal.

use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::event::EventId;

/// Failures of the persisted event file.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Permission denied for {}", path.display())]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Corrupt event data in {}: {source}", path.display())]
    CorruptData {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        match source.kind() {
            io::ErrorKind::PermissionDenied => StoreError::PermissionDenied { path, source },
            _ => StoreError::Io { path, source },
        }
    }
}

/// User input rejected before anything is written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Event description cannot be empty")]
    EmptyDescription,

    #[error("Event time {} is not in the future", .0.format("%Y-%m-%d %H:%M"))]
    PastDate(NaiveDateTime),
}

/// Errors returned by `EventService` operations.
#[derive(Error, Debug)]
pub enum EventError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Event not found: {0}")]
    NotFound(EventId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors loading the application configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine {0} directory")]
    NoDirectory(&'static str),

    #[error("Configuration error: {0}")]
    Invalid(String),

    #[error("Could not write config file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;
pub type EventResult<T> = Result<T, EventError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
