// Configuration: application settings and the batch backup file list.
//
// Settings live in a JSON file under the user's config directory
// (`~/.config/dropbackup/config.json` on Linux). Credentials can also be
// supplied through environment variables, which win over the file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::auth::Credentials;
use crate::error::{Error, Result};
use crate::revisions::DEFAULT_REVISION_LIMIT;
use crate::transfer::{TransferPolicy, DEFAULT_MAX_FILE_SIZE_MIB};

pub const ENV_APP_KEY: &str = "DROPBACKUP_APP_KEY";
pub const ENV_APP_SECRET: &str = "DROPBACKUP_APP_SECRET";
pub const ENV_REFRESH_TOKEN: &str = "DROPBACKUP_REFRESH_TOKEN";

/// Largest request body the store accepts, in MiB.
const MAX_REQUEST_MIB: u64 = 150;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_secret: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Remote folder backups are written to.
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,
    #[serde(default = "default_max_file_size_mib")]
    pub max_file_size_mib: u64,
    #[serde(default = "default_chunk_size_mib")]
    pub chunk_size_mib: u64,
    #[serde(default = "default_revision_limit")]
    pub revision_limit: u32,
    /// JSON file listing what `backup-files` uploads.
    #[serde(default = "default_file_list")]
    pub file_list: PathBuf,
}

fn default_backup_dir() -> String {
    "/backups".to_string()
}

fn default_max_file_size_mib() -> u64 {
    DEFAULT_MAX_FILE_SIZE_MIB
}

fn default_chunk_size_mib() -> u64 {
    8
}

fn default_revision_limit() -> u32 {
    DEFAULT_REVISION_LIMIT
}

fn default_file_list() -> PathBuf {
    PathBuf::from("file_paths.json")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_key: None,
            app_secret: None,
            refresh_token: None,
            backup_dir: default_backup_dir(),
            max_file_size_mib: default_max_file_size_mib(),
            chunk_size_mib: default_chunk_size_mib(),
            revision_limit: default_revision_limit(),
            file_list: default_file_list(),
        }
    }
}

impl Settings {
    /// `<config_dir>/dropbackup/config.json`, or `./config.json` when the
    /// platform has no config directory.
    pub fn default_path() -> PathBuf {
        match dirs::config_dir() {
            Some(dir) => dir.join("dropbackup").join("config.json"),
            None => PathBuf::from("config.json"),
        }
    }

    /// Loads settings from `path`. A missing or empty file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(|e| Error::local_io(path, e))?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::local_io(parent, e))?;
        }
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("cannot encode settings: {e}")))?;
        fs::write(path, text).map_err(|e| Error::local_io(path, e))
    }

    /// Applies the `DROPBACKUP_*` environment variables.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(v) = non_empty(ENV_APP_KEY) {
            self.app_key = Some(v);
        }
        if let Some(v) = non_empty(ENV_APP_SECRET) {
            self.app_secret = Some(v);
        }
        if let Some(v) = non_empty(ENV_REFRESH_TOKEN) {
            self.refresh_token = Some(v);
        }
    }

    /// Credentials for the token refresh, or a config error naming what is missing.
    pub fn credentials(&self) -> Result<Credentials> {
        let app_key = required(&self.app_key, "app_key")?;
        let refresh_token = required(&self.refresh_token, "refresh_token")?;
        Ok(Credentials {
            app_key,
            app_secret: self.app_secret.clone().filter(|s| !s.is_empty()),
            refresh_token,
        })
    }

    pub fn transfer_policy(&self) -> Result<TransferPolicy> {
        if self.chunk_size_mib == 0 || self.chunk_size_mib > MAX_REQUEST_MIB {
            return Err(Error::Config(format!(
                "chunk_size_mib must be between 1 and {MAX_REQUEST_MIB}, got {}",
                self.chunk_size_mib
            )));
        }
        if self.max_file_size_mib > MAX_REQUEST_MIB {
            return Err(Error::Config(format!(
                "max_file_size_mib must be at most {MAX_REQUEST_MIB}, got {}",
                self.max_file_size_mib
            )));
        }
        TransferPolicy::from_mib(self.max_file_size_mib, self.chunk_size_mib)
    }
}

fn required(value: &Option<String>, name: &str) -> Result<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::Config(format!(
                "{name} is not set; run `dropbackup configure` or set the environment variable"
            ))
        })
}

/// Named local files uploaded by a batch backup. The name becomes the
/// remote file name inside the backup folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileList {
    entries: BTreeMap<String, PathBuf>,
}

impl FileList {
    /// Reads a JSON object of `name -> path`. Relative paths are taken
    /// relative to `home`.
    pub fn load(path: &Path, home: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::local_io(path, e))?;
        Self::from_json(&text, home)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json(text: &str, home: &Path) -> std::result::Result<Self, serde_json::Error> {
        let raw: BTreeMap<String, String> = serde_json::from_str(text)?;
        let entries = raw
            .into_iter()
            .map(|(name, value)| {
                let path = Path::new(&value);
                let full = if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    home.join(path)
                };
                (name, full)
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries
            .iter()
            .map(|(name, path)| (name.as_str(), path.as_path()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
