// Transfer engine: moves one local file to one remote key.
//
// Files up to the size threshold go up in a single overwrite put. Bigger
// files go through an upload session: the first chunk opens it, full
// chunks are appended one at a time, and the remainder closes it. The
// session offset is the resume cursor the store checks on every call,
// so chunks are strictly sequential.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::store::{CommitInfo, Metadata, RemoteStore, StoreError, UploadCursor, WriteMode};

pub const MIB: u64 = 1024 * 1024;

/// Files larger than this many MiB are uploaded in chunks.
pub const DEFAULT_MAX_FILE_SIZE_MIB: u64 = 150;

/// Chunk size for upload sessions: 8 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 8 * MIB;

/// Size threshold and chunk size used to pick and drive an upload path.
/// The chunk size is never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPolicy {
    max_single_upload_bytes: u64,
    chunk_size: u64,
}

impl Default for TransferPolicy {
    fn default() -> Self {
        Self {
            max_single_upload_bytes: DEFAULT_MAX_FILE_SIZE_MIB * MIB,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl TransferPolicy {
    pub fn new(max_single_upload_bytes: u64, chunk_size: u64) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("upload chunk size must not be zero".into()));
        }
        Ok(Self {
            max_single_upload_bytes,
            chunk_size,
        })
    }

    pub fn from_mib(max_file_size_mib: u64, chunk_size_mib: u64) -> Result<Self> {
        Self::new(max_file_size_mib * MIB, chunk_size_mib * MIB)
    }

    pub fn max_single_upload_bytes(&self) -> u64 {
        self.max_single_upload_bytes
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn is_chunked(&self, size_bytes: u64) -> bool {
        size_bytes > self.max_single_upload_bytes
    }
}

/// A local file and the key it is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTarget {
    pub local_path: PathBuf,
    pub remote_key: String,
    pub size_bytes: u64,
}

impl TransferTarget {
    /// Stats `local_path` and builds a target. Fails before any network
    /// call if the file is missing or not a regular file.
    pub fn from_path(local_path: impl Into<PathBuf>, remote_key: impl Into<String>) -> Result<Self> {
        let local_path = local_path.into();
        let meta = fs::metadata(&local_path).map_err(|e| Error::local_io(&local_path, e))?;
        if !meta.is_file() {
            return Err(Error::local_io(
                &local_path,
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }
        Ok(Self {
            local_path,
            remote_key: remote_key.into(),
            size_bytes: meta.len(),
        })
    }
}

/// An open upload session. `offset` always equals the bytes the store
/// has acknowledged. Finishing consumes the session.
#[derive(Debug)]
pub struct UploadSession {
    session_id: String,
    offset: u64,
    remote_key: String,
}

impl UploadSession {
    fn start(
        store: &dyn RemoteStore,
        remote_key: &str,
        first_chunk: Vec<u8>,
    ) -> std::result::Result<Self, StoreError> {
        let len = first_chunk.len() as u64;
        let session_id = store.session_start(first_chunk)?;
        debug!(session_id = %session_id, bytes = len, "upload session started");
        Ok(Self {
            session_id,
            offset: len,
            remote_key: remote_key.to_string(),
        })
    }

    fn append(
        &mut self,
        store: &dyn RemoteStore,
        chunk: Vec<u8>,
    ) -> std::result::Result<(), StoreError> {
        let len = chunk.len() as u64;
        store.session_append(&self.cursor(), chunk)?;
        self.offset += len;
        debug!(session_id = %self.session_id, offset = self.offset, "chunk appended");
        Ok(())
    }

    fn finish(
        self,
        store: &dyn RemoteStore,
        last_chunk: Vec<u8>,
    ) -> std::result::Result<Metadata, StoreError> {
        let commit = CommitInfo {
            path: self.remote_key.clone(),
            mode: WriteMode::Overwrite,
        };
        let len = last_chunk.len() as u64;
        let metadata = store.session_finish(&self.cursor(), &commit, last_chunk)?;
        debug!(
            session_id = %self.session_id,
            offset = self.offset + len,
            "upload session finished"
        );
        Ok(metadata)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn cursor(&self) -> UploadCursor {
        UploadCursor {
            session_id: self.session_id.clone(),
            offset: self.offset,
        }
    }
}

/// Uploads files to a remote store according to a `TransferPolicy`.
pub struct TransferEngine<'a> {
    store: &'a dyn RemoteStore,
    policy: TransferPolicy,
    progress: ProgressBar,
}

impl<'a> TransferEngine<'a> {
    pub fn new(store: &'a dyn RemoteStore, policy: TransferPolicy) -> Self {
        Self {
            store,
            policy,
            progress: ProgressBar::hidden(),
        }
    }

    /// Reports chunked upload progress on `bar`.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = bar;
        self
    }

    /// Uploads `target`, replacing whatever is stored at its key.
    pub fn upload(&self, target: &TransferTarget) -> Result<Metadata> {
        if self.policy.is_chunked(target.size_bytes) {
            info!(
                "{} exceeds {:.2} MiB ({:.2} MiB), uploading in chunks",
                target.local_path.display(),
                self.policy.max_single_upload_bytes as f64 / MIB as f64,
                target.size_bytes as f64 / MIB as f64,
            );
            self.upload_chunked(target)
        } else {
            self.upload_single(target)
        }
    }

    fn upload_single(&self, target: &TransferTarget) -> Result<Metadata> {
        let data =
            fs::read(&target.local_path).map_err(|e| Error::local_io(&target.local_path, e))?;
        info!(
            "uploading {} as {}",
            target.local_path.display(),
            target.remote_key
        );
        Ok(self
            .store
            .put(&target.remote_key, data, WriteMode::Overwrite)?)
    }

    fn upload_chunked(&self, target: &TransferTarget) -> Result<Metadata> {
        let path = target.local_path.as_path();
        let mut file = File::open(path).map_err(|e| Error::local_io(path, e))?;
        let chunk_size = self.policy.chunk_size;

        info!(
            "uploading {} as {} in {} byte chunks",
            path.display(),
            target.remote_key,
            chunk_size
        );

        let first = read_chunk(&mut file, chunk_size.min(target.size_bytes), path)?;
        let mut session = UploadSession::start(self.store, &target.remote_key, first)?;
        self.progress.set_length(target.size_bytes);
        self.progress.set_position(session.offset());

        loop {
            let remaining = target.size_bytes - session.offset();
            if remaining <= chunk_size {
                let last = read_chunk(&mut file, remaining, path)?;
                let metadata = session.finish(self.store, last)?;
                self.progress.finish_and_clear();
                return Ok(metadata);
            }
            let chunk = read_chunk(&mut file, chunk_size, path)?;
            session.append(self.store, chunk)?;
            self.progress.set_position(session.offset());
        }
    }
}

/// Reads exactly `len` bytes. A file that shrank since it was measured is
/// reported as unexpected EOF.
fn read_chunk(file: &mut File, len: u64, path: &Path) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(len as usize);
    file.by_ref()
        .take(len)
        .read_to_end(&mut buf)
        .map_err(|e| Error::local_io(path, e))?;
    if (buf.len() as u64) < len {
        return Err(Error::local_io(
            path,
            io::Error::new(io::ErrorKind::UnexpectedEof, "file shrank during upload"),
        ));
    }
    Ok(buf)
}
