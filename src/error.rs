// Error type shared by the backup core.

use std::io;
use std::path::PathBuf;

use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by transfer, revision and restore operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The remote store has no room for the write. Never retried.
    #[error("insufficient space")]
    CapacityExhausted,

    #[error("{message}")]
    Remote {
        message: String,
        #[source]
        source: StoreError,
    },

    #[error("invalid selection {index}: choose 1-{max}, or 0 to quit")]
    InvalidSelection { index: i64, max: usize },

    #[error("{}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("prompt failed: {0}")]
    Prompt(#[source] io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    /// A batch finished, but some of its files were not backed up.
    #[error("{} file(s) not backed up: {}", failed.len(), failed.join(", "))]
    Incomplete { failed: Vec<String> },
}

impl Error {
    pub(crate) fn local_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::LocalIo {
            path: path.into(),
            source,
        }
    }

    /// Whether the whole operation (and any batch it belongs to) must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::CapacityExhausted)
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientSpace => Error::CapacityExhausted,
            other => {
                let message = other
                    .user_message()
                    .map(str::to_string)
                    .unwrap_or_else(|| other.to_string());
                Error::Remote {
                    message,
                    source: other,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_space_maps_to_capacity_exhausted() {
        let err = Error::from(StoreError::InsufficientSpace);
        assert!(matches!(err, Error::CapacityExhausted));
        assert!(err.is_fatal());
    }

    #[test]
    fn remote_error_prefers_user_message() {
        let err = Error::from(StoreError::Api {
            summary: "path/conflict/file/..".into(),
            user_message: Some("A file with that name already exists.".into()),
        });
        assert_eq!(err.to_string(), "A file with that name already exists.");
        assert!(!err.is_fatal());
    }

    #[test]
    fn remote_error_falls_back_to_cause() {
        let err = Error::from(StoreError::NotFound("path/not_found/..".into()));
        match err {
            Error::Remote { message, .. } => assert_eq!(message, "not found: path/not_found/.."),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
