// Library root
// -----------
// Backs up local files to Dropbox and restores earlier revisions. The
// binary (`main.rs`) parses the command line and drives these modules.
//
// Module responsibilities:
// - `store`: the remote store contract and its error kinds.
// - `transfer`: single-shot vs. chunked uploads and the session cursor.
// - `revisions`: listing, ordering and selecting stored revisions.
// - `restore`: server-side restore followed by a local download.
// - `backup`: the operations the command line exposes.
// - `dropbox` and `auth`: the Dropbox HTTP client and token refresh.
// - `config`: settings file and batch file list.
// - `ui`: terminal prompts, listings and the interactive menu.
pub mod auth;
pub mod backup;
pub mod config;
pub mod dropbox;
pub mod error;
pub mod format;
pub mod prompt;
pub mod restore;
pub mod revisions;
pub mod store;
pub mod transfer;
pub mod ui;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
