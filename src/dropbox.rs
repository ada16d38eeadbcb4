// Dropbox API v2 client.
//
// A small blocking HTTP client implementing `RemoteStore`. RPC endpoints
// take a JSON body on api.dropboxapi.com; content endpoints carry their
// arguments in the `Dropbox-API-Arg` header on content.dropboxapi.com and
// move file bytes in the request or response body.

use std::io::Write;

use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::auth::{Credentials, TokenSource, TOKEN_URL};
use crate::store::{
    CommitInfo, Metadata, RemoteStore, RevisionDescriptor, StoreError, UploadCursor, WriteMode,
};

pub const API_URL: &str = "https://api.dropboxapi.com";
pub const CONTENT_URL: &str = "https://content.dropboxapi.com";

const API_ARG_HEADER: &str = "Dropbox-API-Arg";

/// `files/list_revisions` accepts 1..=100.
const MAX_REVISION_LIMIT: u32 = 100;

/// Base URLs the client talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub api_url: String,
    pub content_url: String,
    pub token_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            api_url: API_URL.to_string(),
            content_url: CONTENT_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// All three services under one base URL, e.g. a local test server.
    pub fn at(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            api_url: base.to_string(),
            content_url: base.to_string(),
            token_url: format!("{base}/oauth2/token"),
        }
    }
}

pub struct DropboxClient {
    client: Client,
    api_url: String,
    content_url: String,
    tokens: TokenSource,
}

impl DropboxClient {
    /// Builds a client that authenticates with `credentials`. Requests have
    /// no timeout: large chunks are waited on until they finish or fail.
    pub fn new(credentials: Credentials) -> Result<Self, StoreError> {
        Self::with_endpoints(credentials, Endpoints::default())
    }

    pub fn with_endpoints(credentials: Credentials, endpoints: Endpoints) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(None::<std::time::Duration>)
            .build()?;
        Ok(Self {
            tokens: TokenSource::with_token_url(client.clone(), credentials, &endpoints.token_url),
            client,
            api_url: endpoints.api_url,
            content_url: endpoints.content_url,
        })
    }

    /// Fetches an access token now, so bad credentials surface before any work.
    pub fn check_auth(&self) -> Result<(), StoreError> {
        self.tokens.access_token().map(|_| ())
    }

    fn authorized(&self, req: RequestBuilder) -> Result<RequestBuilder, StoreError> {
        let token = self.tokens.access_token()?;
        Ok(req.header(AUTHORIZATION, format!("Bearer {token}")))
    }

    fn rpc<A: Serialize, T: DeserializeOwned>(&self, endpoint: &str, arg: &A) -> Result<T, StoreError> {
        let url = format!("{}/2/{}", self.api_url, endpoint);
        debug!(endpoint, "rpc request");
        let req = self.authorized(self.client.post(&url))?.json(arg);
        let res = self.check(req.send()?)?;
        Ok(res.json()?)
    }

    fn content<A: Serialize>(
        &self,
        endpoint: &str,
        arg: &A,
        body: Option<Vec<u8>>,
    ) -> Result<Response, StoreError> {
        let url = format!("{}/2/{}", self.content_url, endpoint);
        debug!(endpoint, bytes = body.as_ref().map_or(0, Vec::len), "content request");
        let mut req = self
            .authorized(self.client.post(&url))?
            .header(API_ARG_HEADER, header_safe_json(arg)?);
        if let Some(body) = body {
            req = req
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(body);
        }
        self.check(req.send()?)
    }

    fn check(&self, res: Response) -> Result<Response, StoreError> {
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }
        let body = res.text().unwrap_or_default();
        let err = classify_error(status, &body);
        if matches!(err, StoreError::Auth(_)) {
            warn!("access token rejected, will refresh on next call");
            self.tokens.invalidate();
        }
        Err(err)
    }
}

impl RemoteStore for DropboxClient {
    fn put(&self, key: &str, data: Vec<u8>, mode: WriteMode) -> Result<Metadata, StoreError> {
        let arg = json!({ "path": key, "mode": mode, "autorename": false, "mute": true });
        let res = self.content("files/upload", &arg, Some(data))?;
        let wire: FileMetadataWire = res.json()?;
        wire.into_metadata()
    }

    fn session_start(&self, first_chunk: Vec<u8>) -> Result<String, StoreError> {
        #[derive(Deserialize)]
        struct StartResult {
            session_id: String,
        }
        let res = self.content(
            "files/upload_session/start",
            &json!({ "close": false }),
            Some(first_chunk),
        )?;
        let started: StartResult = res.json()?;
        Ok(started.session_id)
    }

    fn session_append(&self, cursor: &UploadCursor, chunk: Vec<u8>) -> Result<(), StoreError> {
        self.content(
            "files/upload_session/append_v2",
            &json!({ "cursor": cursor, "close": false }),
            Some(chunk),
        )?;
        Ok(())
    }

    fn session_finish(
        &self,
        cursor: &UploadCursor,
        commit: &CommitInfo,
        last_chunk: Vec<u8>,
    ) -> Result<Metadata, StoreError> {
        let arg = json!({
            "cursor": cursor,
            "commit": {
                "path": commit.path,
                "mode": commit.mode,
                "autorename": false,
                "mute": true,
            },
        });
        let res = self.content("files/upload_session/finish", &arg, Some(last_chunk))?;
        let wire: FileMetadataWire = res.json()?;
        wire.into_metadata()
    }

    fn list_revisions(
        &self,
        key: &str,
        limit: u32,
    ) -> Result<Vec<RevisionDescriptor>, StoreError> {
        let limit = limit.clamp(1, MAX_REVISION_LIMIT);
        let result: ListRevisionsResult = self.rpc(
            "files/list_revisions",
            &json!({ "path": key, "mode": "path", "limit": limit }),
        )?;
        result
            .entries
            .into_iter()
            .map(FileMetadataWire::into_revision)
            .collect()
    }

    fn restore_to_revision(&self, key: &str, revision_id: &str) -> Result<Metadata, StoreError> {
        let wire: FileMetadataWire =
            self.rpc("files/restore", &json!({ "path": key, "rev": revision_id }))?;
        wire.into_metadata()
    }

    fn download(&self, key: &str, sink: &mut dyn Write) -> Result<u64, StoreError> {
        let mut res = self.content("files/download", &json!({ "path": key }), None)?;
        let written = res.copy_to(sink)?;
        sink.flush()?;
        Ok(written)
    }

    fn list_folder(&self, dir_key: &str) -> Result<Vec<Metadata>, StoreError> {
        let mut page: ListFolderResult = self.rpc("files/list_folder", &json!({ "path": dir_key }))?;
        let mut files = Vec::new();
        loop {
            for entry in page.entries {
                if let Some(meta) = entry.into_file_metadata()? {
                    files.push(meta);
                }
            }
            if !page.has_more {
                return Ok(files);
            }
            page = self.rpc("files/list_folder/continue", &json!({ "cursor": page.cursor }))?;
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error_summary: String,
    #[serde(default)]
    user_message: Option<UserMessage>,
}

#[derive(Debug, Deserialize)]
struct UserMessage {
    text: String,
}

/// Turns an error response into a `StoreError` kind.
///
/// Endpoint errors arrive as HTTP 409 with an `error_summary` such as
/// `path/insufficient_space/..` or `path_write/insufficient_space/...`.
fn classify_error(status: StatusCode, body: &str) -> StoreError {
    let parsed = serde_json::from_str::<ApiErrorBody>(body).ok();
    if status == StatusCode::UNAUTHORIZED {
        let detail = parsed
            .map(|b| b.error_summary)
            .unwrap_or_else(|| body.trim().to_string());
        return StoreError::Auth(detail);
    }
    let Some(parsed) = parsed else {
        let summary = if body.trim().is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {}", body.trim())
        };
        return StoreError::Api {
            summary,
            user_message: None,
        };
    };

    let has_tag = |tag: &str| parsed.error_summary.split('/').any(|part| part == tag);
    let insufficient_space = has_tag("insufficient_space");
    let not_found = has_tag("not_found");
    if insufficient_space {
        StoreError::InsufficientSpace
    } else if not_found {
        StoreError::NotFound(parsed.error_summary)
    } else {
        StoreError::Api {
            summary: parsed.error_summary,
            user_message: parsed.user_message.map(|m| m.text),
        }
    }
}

/// JSON for the `Dropbox-API-Arg` header, with non-ASCII escaped as `\uXXXX`.
fn header_safe_json<A: Serialize>(arg: &A) -> Result<String, StoreError> {
    let raw = serde_json::to_string(arg).map_err(|e| StoreError::Api {
        summary: format!("cannot encode request arguments: {e}"),
        user_message: None,
    })?;
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    Ok(out)
}

#[derive(Debug, Deserialize)]
struct FileMetadataWire {
    #[serde(rename = ".tag", default)]
    tag: Option<String>,
    name: String,
    #[serde(default)]
    path_display: Option<String>,
    #[serde(default)]
    path_lower: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    server_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    rev: Option<String>,
}

impl FileMetadataWire {
    fn missing(&self, field: &str) -> StoreError {
        StoreError::Api {
            summary: format!("file metadata for {} has no {field}", self.name),
            user_message: None,
        }
    }

    fn into_metadata(self) -> Result<Metadata, StoreError> {
        let size = self.size.ok_or_else(|| self.missing("size"))?;
        let server_modified = self
            .server_modified
            .ok_or_else(|| self.missing("server_modified"))?;
        let rev = self.rev.clone().ok_or_else(|| self.missing("rev"))?;
        let path = self
            .path_display
            .or(self.path_lower)
            .unwrap_or_else(|| format!("/{}", self.name));
        Ok(Metadata {
            name: self.name,
            path,
            size,
            server_modified,
            rev,
        })
    }

    fn into_revision(self) -> Result<RevisionDescriptor, StoreError> {
        let meta = self.into_metadata()?;
        Ok(RevisionDescriptor {
            revision_id: meta.rev,
            size_bytes: meta.size,
            modified_at: meta.server_modified,
        })
    }

    /// Folder and deleted entries are skipped.
    fn into_file_metadata(self) -> Result<Option<Metadata>, StoreError> {
        match self.tag.as_deref() {
            Some("file") | None => self.into_metadata().map(Some),
            _ => Ok(None),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListRevisionsResult {
    entries: Vec<FileMetadataWire>,
}

#[derive(Debug, Deserialize)]
struct ListFolderResult {
    entries: Vec<FileMetadataWire>,
    cursor: String,
    has_more: bool,
}
