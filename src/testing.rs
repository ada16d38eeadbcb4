// Scripted collaborators for unit tests: an in-memory remote store that
// records every call, and a prompter that replays canned answers.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Write};
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};

use crate::prompt::Prompter;
use crate::store::{
    CommitInfo, Metadata, RemoteStore, RevisionDescriptor, StoreError, UploadCursor, WriteMode,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Put { key: String, len: usize, mode: WriteMode },
    SessionStart { len: usize },
    SessionAppend { session_id: String, offset: u64, len: usize },
    SessionFinish { session_id: String, offset: u64, path: String, len: usize },
    ListRevisions { key: String, limit: u32 },
    Restore { key: String, revision_id: String },
    Download { key: String },
    ListFolder { dir: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Put,
    SessionStart,
    SessionAppend,
    SessionFinish,
    ListRevisions,
    Restore,
    Download,
    ListFolder,
}

struct Failure {
    op: Op,
    remaining_successes: usize,
    make: fn() -> StoreError,
}

#[derive(Default)]
struct Inner {
    calls: Vec<Call>,
    objects: HashMap<String, Vec<u8>>,
    sessions: HashMap<String, Vec<u8>>,
    next_session: u32,
    revisions: HashMap<String, Vec<RevisionDescriptor>>,
    revision_content: HashMap<(String, String), Vec<u8>>,
    folders: HashMap<String, Vec<Metadata>>,
    failures: Vec<Failure>,
}

impl Inner {
    fn check(&mut self, op: Op) -> Result<(), StoreError> {
        if let Some(failure) = self.failures.iter_mut().find(|f| f.op == op) {
            if failure.remaining_successes == 0 {
                return Err((failure.make)());
            }
            failure.remaining_successes -= 1;
        }
        Ok(())
    }
}

/// In-memory `RemoteStore` that records calls.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().objects.get(key).cloned()
    }

    pub fn insert_object(&self, key: &str, data: &[u8]) {
        self.inner
            .lock()
            .unwrap()
            .objects
            .insert(key.to_string(), data.to_vec());
    }

    /// Registers a revision of `key` and the content it restores to.
    pub fn add_revision(&self, key: &str, revision: RevisionDescriptor, content: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .revision_content
            .insert((key.to_string(), revision.revision_id.clone()), content.to_vec());
        inner
            .revisions
            .entry(key.to_string())
            .or_default()
            .push(revision);
    }

    pub fn set_folder(&self, dir: &str, entries: Vec<Metadata>) {
        self.inner
            .lock()
            .unwrap()
            .folders
            .insert(dir.to_string(), entries);
    }

    /// Makes every call of `op` fail.
    pub fn fail(&self, op: Op, make: fn() -> StoreError) {
        self.fail_after(op, 0, make);
    }

    /// Lets `successes` calls of `op` through, then fails the rest.
    pub fn fail_after(&self, op: Op, successes: usize, make: fn() -> StoreError) {
        self.inner.lock().unwrap().failures.push(Failure {
            op,
            remaining_successes: successes,
            make,
        });
    }
}

fn metadata_for(key: &str, size: u64) -> Metadata {
    Metadata {
        name: key.rsplit('/').next().unwrap_or(key).to_string(),
        path: key.to_string(),
        size,
        server_modified: ts(0),
        rev: "0001".into(),
    }
}

impl RemoteStore for MemoryStore {
    fn put(&self, key: &str, data: Vec<u8>, mode: WriteMode) -> Result<Metadata, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Put {
            key: key.to_string(),
            len: data.len(),
            mode,
        });
        inner.check(Op::Put)?;
        let size = data.len() as u64;
        inner.objects.insert(key.to_string(), data);
        Ok(metadata_for(key, size))
    }

    fn session_start(&self, first_chunk: Vec<u8>) -> Result<String, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::SessionStart {
            len: first_chunk.len(),
        });
        inner.check(Op::SessionStart)?;
        inner.next_session += 1;
        let id = format!("session-{}", inner.next_session);
        inner.sessions.insert(id.clone(), first_chunk);
        Ok(id)
    }

    fn session_append(&self, cursor: &UploadCursor, chunk: Vec<u8>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::SessionAppend {
            session_id: cursor.session_id.clone(),
            offset: cursor.offset,
            len: chunk.len(),
        });
        inner.check(Op::SessionAppend)?;
        let buffer = inner
            .sessions
            .get_mut(&cursor.session_id)
            .ok_or_else(|| StoreError::NotFound(cursor.session_id.clone()))?;
        if buffer.len() as u64 != cursor.offset {
            return Err(StoreError::Api {
                summary: "incorrect_offset".into(),
                user_message: None,
            });
        }
        buffer.extend_from_slice(&chunk);
        Ok(())
    }

    fn session_finish(
        &self,
        cursor: &UploadCursor,
        commit: &CommitInfo,
        last_chunk: Vec<u8>,
    ) -> Result<Metadata, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::SessionFinish {
            session_id: cursor.session_id.clone(),
            offset: cursor.offset,
            path: commit.path.clone(),
            len: last_chunk.len(),
        });
        inner.check(Op::SessionFinish)?;
        let mut buffer = inner
            .sessions
            .remove(&cursor.session_id)
            .ok_or_else(|| StoreError::NotFound(cursor.session_id.clone()))?;
        if buffer.len() as u64 != cursor.offset {
            return Err(StoreError::Api {
                summary: "incorrect_offset".into(),
                user_message: None,
            });
        }
        buffer.extend_from_slice(&last_chunk);
        let size = buffer.len() as u64;
        inner.objects.insert(commit.path.clone(), buffer);
        Ok(metadata_for(&commit.path, size))
    }

    fn list_revisions(
        &self,
        key: &str,
        limit: u32,
    ) -> Result<Vec<RevisionDescriptor>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::ListRevisions {
            key: key.to_string(),
            limit,
        });
        inner.check(Op::ListRevisions)?;
        match inner.revisions.get(key) {
            Some(revisions) => Ok(revisions.iter().take(limit as usize).cloned().collect()),
            None => Err(StoreError::NotFound(format!("path/not_found/{key}"))),
        }
    }

    fn restore_to_revision(&self, key: &str, revision_id: &str) -> Result<Metadata, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Restore {
            key: key.to_string(),
            revision_id: revision_id.to_string(),
        });
        inner.check(Op::Restore)?;
        let content = inner
            .revision_content
            .get(&(key.to_string(), revision_id.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{key}@{revision_id}")))?;
        let size = content.len() as u64;
        inner.objects.insert(key.to_string(), content);
        Ok(metadata_for(key, size))
    }

    fn download(&self, key: &str, sink: &mut dyn Write) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Download {
            key: key.to_string(),
        });
        inner.check(Op::Download)?;
        let data = inner
            .objects
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        sink.write_all(data)?;
        Ok(data.len() as u64)
    }

    fn list_folder(&self, dir_key: &str) -> Result<Vec<Metadata>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::ListFolder {
            dir: dir_key.to_string(),
        });
        inner.check(Op::ListFolder)?;
        inner
            .folders
            .get(dir_key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("path/not_found/{dir_key}")))
    }
}

/// Prompter replaying queued answers. Panics when a question has no answer.
#[derive(Default)]
pub struct ScriptedPrompter {
    confirms: VecDeque<bool>,
    indices: VecDeque<i64>,
    pub asked: Vec<String>,
    /// Choices offered by the most recent selection prompt.
    pub shown: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn confirm_with(mut self, answer: bool) -> Self {
        self.confirms.push_back(answer);
        self
    }

    pub fn select_with(mut self, index: i64) -> Self {
        self.indices.push_back(index);
        self
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&mut self, prompt: &str) -> io::Result<bool> {
        self.asked.push(prompt.to_string());
        Ok(self.confirms.pop_front().expect("unexpected confirm prompt"))
    }

    fn select_index(&mut self, prompt: &str, choices: &[String]) -> io::Result<i64> {
        self.asked.push(prompt.to_string());
        self.shown = choices.to_vec();
        Ok(self.indices.pop_front().expect("unexpected selection prompt"))
    }
}

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn revision(id: &str, size: u64, secs: i64) -> RevisionDescriptor {
    RevisionDescriptor {
        revision_id: id.to_string(),
        size_bytes: size,
        modified_at: ts(secs),
    }
}
