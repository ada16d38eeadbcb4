// Remote store contract.
//
// Everything the backup core needs from the cloud side goes through the
// `RemoteStore` trait. The concrete implementation lives in `dropbox`;
// tests substitute an in-memory store. Handles are always passed in
// explicitly, there is no shared global client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// How a write treats an object that already exists at the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Fail (or auto-rename, depending on the store) if the key exists.
    Add,
    /// Replace the current content. The store keeps the old revision.
    Overwrite,
}

/// Metadata of a stored file as reported by the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub name: String,
    /// Display path of the object, usable as a remote key.
    pub path: String,
    pub size: u64,
    pub server_modified: DateTime<Utc>,
    pub rev: String,
}

/// One historical version of a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionDescriptor {
    pub revision_id: String,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
}

/// Position of an open upload session: the bytes the store has acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadCursor {
    pub session_id: String,
    pub offset: u64,
}

/// Where and how a finished upload session is committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub path: String,
    pub mode: WriteMode,
}

/// Failure kinds reported by a remote store.
///
/// Capacity exhaustion is its own variant so callers can switch on it
/// without digging through provider-specific error payloads.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("insufficient space")]
    InsufficientSpace,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("{summary}")]
    Api {
        summary: String,
        user_message: Option<String>,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Human readable message supplied by the server, if any.
    pub fn user_message(&self) -> Option<&str> {
        match self {
            StoreError::Api {
                user_message: Some(text),
                ..
            } => Some(text.as_str()),
            _ => None,
        }
    }
}

/// Operations the backup core consumes from the cloud object store.
///
/// All calls block until the store answers. Implementations must be safe
/// to share between threads so independent transfers can run side by side.
pub trait RemoteStore: Send + Sync {
    /// Atomically writes `data` at `key`.
    fn put(&self, key: &str, data: Vec<u8>, mode: WriteMode) -> Result<Metadata, StoreError>;

    /// Opens a resumable upload session with its first chunk. Returns the session id.
    fn session_start(&self, first_chunk: Vec<u8>) -> Result<String, StoreError>;

    /// Appends `chunk` at `cursor.offset`.
    fn session_append(&self, cursor: &UploadCursor, chunk: Vec<u8>) -> Result<(), StoreError>;

    /// Sends the last chunk and commits the session to `commit.path`.
    fn session_finish(
        &self,
        cursor: &UploadCursor,
        commit: &CommitInfo,
        last_chunk: Vec<u8>,
    ) -> Result<Metadata, StoreError>;

    /// Lists at most `limit` revisions of `key`, in store order.
    fn list_revisions(&self, key: &str, limit: u32)
        -> Result<Vec<RevisionDescriptor>, StoreError>;

    /// Makes `revision_id` the current content of `key` on the server.
    fn restore_to_revision(&self, key: &str, revision_id: &str) -> Result<Metadata, StoreError>;

    /// Streams the current content of `key` into `sink`. Returns the bytes written.
    fn download(&self, key: &str, sink: &mut dyn Write) -> Result<u64, StoreError>;

    /// Lists the files directly under `dir_key`.
    fn list_folder(&self, dir_key: &str) -> Result<Vec<Metadata>, StoreError>;
}
