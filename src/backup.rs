// Operations exposed to the command line: back up one file or a whole
// file list, list what is stored, and restore a chosen revision.
//
// Every function takes the remote store handle explicitly. Nothing here
// prints or exits; results and errors go back to the caller.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::config::FileList;
use crate::error::{Error, Result};
use crate::format::describe_file;
use crate::prompt::{choose, Prompter};
use crate::restore::{restore, RestoreRequest};
use crate::revisions::{list_revisions, prompt_for_revision};
use crate::store::{Metadata, RemoteStore, RevisionDescriptor, StoreError};
use crate::transfer::{TransferEngine, TransferTarget};

/// Remote key for `name` inside `backup_dir`, always rooted at `/`.
pub fn backup_path(backup_dir: &str, name: &str) -> String {
    let dir = backup_dir.trim_matches('/');
    let name = name.trim_start_matches('/');
    if dir.is_empty() {
        format!("/{name}")
    } else {
        format!("/{dir}/{name}")
    }
}

/// Uploads one local file to `remote_key`.
pub fn upload_file(engine: &TransferEngine<'_>, local_path: &Path, remote_key: &str) -> Result<Metadata> {
    let target = TransferTarget::from_path(local_path, remote_key)?;
    engine.upload(&target)
}

/// Outcome of a batch backup. Files that failed with a non-fatal error are
/// listed with their error; the rest were uploaded.
#[derive(Debug, Default)]
pub struct BackupReport {
    pub uploaded: Vec<Metadata>,
    pub failed: Vec<(String, Error)>,
}

impl BackupReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// `Error::Incomplete` naming the failed files, if there are any.
    pub fn ensure_complete(&self) -> Result<()> {
        if self.is_success() {
            return Ok(());
        }
        Err(Error::Incomplete {
            failed: self.failed.iter().map(|(name, _)| name.clone()).collect(),
        })
    }
}

/// Backs up every entry of `files` into `backup_dir`.
///
/// All local paths are checked before anything is sent. Capacity
/// exhaustion stops the batch at once; other failures are recorded and
/// the remaining files are still attempted.
pub fn backup_files(
    engine: &TransferEngine<'_>,
    backup_dir: &str,
    files: &FileList,
) -> Result<BackupReport> {
    check_files_exist(files.iter().map(|(_, path)| path))?;

    let mut report = BackupReport::default();
    for (name, path) in files.iter() {
        let remote_key = backup_path(backup_dir, name);
        match upload_file(engine, path, &remote_key) {
            Ok(meta) => {
                info!("backed up {} as {}", path.display(), meta.path);
                report.uploaded.push(meta);
            }
            Err(err) if err.is_fatal() => {
                error!("cannot back up {}: {}", path.display(), err);
                return Err(err);
            }
            Err(err) => {
                warn!("failed to back up {}: {}", path.display(), err);
                report.failed.push((name.to_string(), err));
            }
        }
    }
    Ok(report)
}

/// Fails with `LocalIo` on the first path that does not exist.
pub fn check_files_exist<'a>(paths: impl IntoIterator<Item = &'a Path>) -> Result<()> {
    for path in paths {
        if !path.exists() {
            return Err(Error::local_io(
                path,
                io::Error::new(io::ErrorKind::NotFound, "file not found"),
            ));
        }
    }
    Ok(())
}

/// Files currently stored in `backup_dir`. A folder that does not exist
/// yet has no backups.
pub fn list_backups(store: &dyn RemoteStore, backup_dir: &str) -> Result<Vec<Metadata>> {
    let dir = backup_path(backup_dir, "");
    let dir = dir.trim_end_matches('/');
    match store.list_folder(dir) {
        Ok(files) => Ok(files),
        Err(StoreError::NotFound(_)) => Ok(Vec::new()),
        Err(err) => Err(err.into()),
    }
}

/// Revisions of `remote_key`, oldest first.
pub fn list_revisions_of(
    store: &dyn RemoteStore,
    remote_key: &str,
    limit: u32,
) -> Result<Vec<RevisionDescriptor>> {
    list_revisions(store, remote_key, limit)
}

/// Lets the user pick one of `files` by number. `None` when they quit.
pub fn select_backup(prompter: &mut dyn Prompter, files: &[Metadata]) -> Result<Option<Metadata>> {
    let picked = choose(
        prompter,
        "Enter the number of the file to see revisions (Enter 0 to quit)",
        files,
        describe_file,
    )?;
    Ok(picked.cloned())
}

/// Restores `remote_key` to `revision` (asking the user to pick one when
/// `None`) and downloads it to `local_path`.
///
/// Returns the written path, or `None` when there was nothing to restore
/// or the user quit the selection.
pub fn restore_file(
    store: &dyn RemoteStore,
    prompter: &mut dyn Prompter,
    local_path: &Path,
    remote_key: &str,
    revision: Option<&str>,
    revision_limit: u32,
) -> Result<Option<PathBuf>> {
    let revision_id = match revision {
        Some(rev) => rev.to_string(),
        None => {
            let revisions = list_revisions(store, remote_key, revision_limit)?;
            if revisions.is_empty() {
                info!("no revisions found for {remote_key}");
                return Ok(None);
            }
            match prompt_for_revision(prompter, &revisions)? {
                Some(rev) => rev.revision_id,
                None => return Ok(None),
            }
        }
    };

    let req = RestoreRequest {
        remote_key: remote_key.to_string(),
        revision_id,
        local_path: local_path.to_path_buf(),
    };
    restore(store, prompter, &req).map(Some)
}
