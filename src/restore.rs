// Restore coordinator.
//
// A restore first makes the chosen revision current on the server, then
// downloads it. Existing local files are only replaced when the user says
// so; otherwise the download lands next to them with a `_rev_<id>` suffix.
// Downloads go to a temporary file in the destination directory and are
// renamed into place once complete.

use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::info;

use crate::error::{Error, Result};
use crate::prompt::Prompter;
use crate::store::RemoteStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreRequest {
    pub remote_key: String,
    pub revision_id: String,
    pub local_path: PathBuf,
}

/// Restores `req.remote_key` to `req.revision_id` and downloads it.
/// Returns the path that was written.
pub fn restore(
    store: &dyn RemoteStore,
    prompter: &mut dyn Prompter,
    req: &RestoreRequest,
) -> Result<PathBuf> {
    info!(
        "restoring {} to revision {}",
        req.remote_key, req.revision_id
    );
    store.restore_to_revision(&req.remote_key, &req.revision_id)?;

    let target = resolve_local_path(prompter, &req.local_path, &req.revision_id)?;

    info!(
        "downloading current version of {}, saving as {}",
        req.remote_key,
        target.display()
    );
    let written = download_to(store, &req.remote_key, &target)?;
    info!("restored {} ({} bytes)", target.display(), written);
    Ok(target)
}

/// `<local_path>_rev_<revision_id>`
pub fn revision_path(local_path: &Path, revision_id: &str) -> PathBuf {
    let mut name = OsString::from(local_path.as_os_str());
    name.push("_rev_");
    name.push(revision_id);
    PathBuf::from(name)
}

fn resolve_local_path(
    prompter: &mut dyn Prompter,
    local_path: &Path,
    revision_id: &str,
) -> Result<PathBuf> {
    if !local_path.exists() {
        return Ok(local_path.to_path_buf());
    }
    let question = format!(
        "{} already exists. Do you want to overwrite it?",
        local_path.display()
    );
    if prompter.confirm(&question).map_err(Error::Prompt)? {
        Ok(local_path.to_path_buf())
    } else {
        Ok(revision_path(local_path, revision_id))
    }
}

fn download_to(store: &dyn RemoteStore, remote_key: &str, target: &Path) -> Result<u64> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| Error::local_io(&dir, e))?;

    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| Error::local_io(&dir, e))?;
    let written = download_into(store, remote_key, tmp.as_file_mut(), target)?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| Error::local_io(tmp.path(), e))?;
    tmp.persist(target)
        .map_err(|e| Error::local_io(target, e.error))?;
    Ok(written)
}

/// Streams `remote_key` into `dest`. A failed local write is reported as
/// `LocalIo` on `dest_path`, whatever the store made of it.
fn download_into<W: Write>(
    store: &dyn RemoteStore,
    remote_key: &str,
    dest: W,
    dest_path: &Path,
) -> Result<u64> {
    let mut sink = LocalSink {
        inner: dest,
        error: None,
    };
    let result = store.download(remote_key, &mut sink);
    if let Some(err) = sink.error {
        return Err(Error::local_io(dest_path, err));
    }
    Ok(result?)
}

/// Keeps the first local write error so it can be told apart from
/// failures on the store side.
struct LocalSink<W> {
    inner: W,
    error: Option<io::Error>,
}

impl<W: Write> LocalSink<W> {
    fn keep(&mut self, err: io::Error) -> io::Error {
        let copy = io::Error::new(err.kind(), err.to_string());
        self.error.get_or_insert(err);
        copy
    }
}

impl<W: Write> Write for LocalSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.inner.write(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(e),
            Err(e) => Err(self.keep(e)),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().map_err(|e| self.keep(e))
    }
}
