// UI layer: terminal prompts, listings and the interactive menu.
//
// Each command helper prints its own results and hands errors back to the
// caller, so both the subcommands in `main.rs` and the menu loop below can
// share them. The remote store handle is created once in `main` and passed
// in through `Context`.

use std::io;
use std::path::{Path, PathBuf};

use dialoguer::{Confirm, Input, Password, Select};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::backup::{
    backup_files, backup_path, list_backups, list_revisions_of, restore_file, select_backup,
    upload_file, BackupReport,
};
use crate::config::{FileList, Settings};
use crate::error::{Error, Result};
use crate::format::describe_file;
use crate::prompt::Prompter;
use crate::revisions::prompt_for_revision;
use crate::store::{Metadata, RemoteStore};
use crate::transfer::{TransferEngine, TransferPolicy};

/// Answers prompts on the terminal with `dialoguer`.
pub struct TerminalPrompter {
    /// Answer every yes/no question with yes.
    assume_yes: bool,
}

impl TerminalPrompter {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl Prompter for TerminalPrompter {
    fn confirm(&mut self, prompt: &str) -> io::Result<bool> {
        if self.assume_yes {
            return Ok(true);
        }
        // Declining keeps the existing file, so that is the default.
        Confirm::new().with_prompt(prompt).default(false).interact()
    }

    fn select_index(&mut self, prompt: &str, choices: &[String]) -> io::Result<i64> {
        for (i, choice) in choices.iter().enumerate() {
            println!("{}: {}", i + 1, choice);
        }
        Input::<i64>::new().with_prompt(prompt).interact_text()
    }
}

/// Everything a command needs: the store handle and the loaded settings.
pub struct Context<'a> {
    pub store: &'a dyn RemoteStore,
    pub settings: &'a Settings,
    pub policy: TransferPolicy,
}

impl<'a> Context<'a> {
    pub fn new(store: &'a dyn RemoteStore, settings: &'a Settings) -> Result<Self> {
        Ok(Self {
            store,
            settings,
            policy: settings.transfer_policy()?,
        })
    }

    /// Remote key for a name typed by the user. Absolute keys are kept,
    /// bare names are looked up in the backup folder.
    pub fn remote_key(&self, name: &str) -> String {
        if name.starts_with('/') {
            name.to_string()
        } else {
            backup_path(&self.settings.backup_dir, name)
        }
    }
}

fn upload_progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template(
        "{spinner} [{elapsed_precise}] [{bar:40}] {bytes}/{total_bytes} ({eta})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

/// Backs up the configured file list (or `file_list` when given).
pub fn cmd_backup_files(ctx: &Context<'_>, file_list: Option<&Path>) -> Result<BackupReport> {
    let list_path = file_list.unwrap_or(ctx.settings.file_list.as_path());
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    let files = FileList::load(list_path, &home)?;
    if files.is_empty() {
        println!("No files listed in {}.", list_path.display());
        return Ok(BackupReport::default());
    }

    let bar = upload_progress_bar();
    let engine = TransferEngine::new(ctx.store, ctx.policy).with_progress(bar.clone());
    let result = backup_files(&engine, &ctx.settings.backup_dir, &files);
    bar.finish_and_clear();
    let report = result?;

    if report.is_success() {
        println!("All files backed up successfully.");
    } else {
        println!(
            "Backed up {} of {} files.",
            report.uploaded.len(),
            files.len()
        );
        for (name, err) in &report.failed {
            println!("  {name}: {err}");
        }
    }
    Ok(report)
}

/// Backs up a single file under its own base name.
pub fn cmd_backup_file(ctx: &Context<'_>, path: &Path) -> Result<Metadata> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            Error::local_io(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
            )
        })?;
    let remote_key = backup_path(&ctx.settings.backup_dir, &name);

    let bar = upload_progress_bar();
    let engine = TransferEngine::new(ctx.store, ctx.policy).with_progress(bar.clone());
    let result = upload_file(&engine, path, &remote_key);
    bar.finish_and_clear();
    let meta = result?;

    println!("File {} backed up successfully.", path.display());
    Ok(meta)
}

/// Prints the stored backups, numbered from 1.
pub fn cmd_list_files(ctx: &Context<'_>) -> Result<Vec<Metadata>> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_message("Listing backups...");
    let result = list_backups(ctx.store, &ctx.settings.backup_dir);
    spinner.finish_and_clear();
    let files = result?;

    if files.is_empty() {
        println!("No files found in Dropbox.");
    } else {
        println!("Files in Dropbox:");
        for (i, file) in files.iter().enumerate() {
            println!("{}: {}", i + 1, describe_file(file));
        }
    }
    Ok(files)
}

/// Pick a stored file, then one of its revisions.
pub fn cmd_select_revision(ctx: &Context<'_>, prompter: &mut dyn Prompter) -> Result<()> {
    let files = list_backups(ctx.store, &ctx.settings.backup_dir)?;
    if files.is_empty() {
        println!("No files found in Dropbox.");
        return Ok(());
    }
    let Some(file) = select_backup(prompter, &files)? else {
        return Ok(());
    };
    println!("Selected file: {}", file.name);

    let revisions = list_revisions_of(ctx.store, &file.path, ctx.settings.revision_limit)?;
    if revisions.is_empty() {
        println!("No revisions found for {}.", file.path);
        return Ok(());
    }
    println!("Revisions for {}:", file.path);
    if let Some(rev) = prompt_for_revision(prompter, &revisions)? {
        println!("Selected revision: {}", rev.revision_id);
    }
    Ok(())
}

/// Restores `name` to `revision` (or a revision picked interactively) and
/// saves it to `output`, defaulting to the file name in the current directory.
pub fn cmd_restore_file(
    ctx: &Context<'_>,
    prompter: &mut dyn Prompter,
    name: &str,
    revision: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let remote_key = ctx.remote_key(name);
    let local_path = match output {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(remote_key.rsplit('/').next().unwrap_or(name)),
    };

    if revision.is_none() {
        println!("Revisions for {remote_key}:");
    }
    match restore_file(
        ctx.store,
        prompter,
        &local_path,
        &remote_key,
        revision,
        ctx.settings.revision_limit,
    )? {
        Some(written) => println!("Restored {} as {}.", remote_key, written.display()),
        None => println!("Nothing restored."),
    }
    Ok(())
}

/// Prompts for the app key, secret and refresh token and saves them.
pub fn configure(config_path: &Path) -> anyhow::Result<()> {
    let mut settings = Settings::load(config_path)?;

    println!("Create an app at https://www.dropbox.com/developers/apps with scoped access");
    println!("to an app folder and the files.metadata/files.content read and write permissions.");
    println!("Authorize it with offline access to obtain a refresh token.\n");

    let app_key: String = Input::new()
        .with_prompt("App key")
        .with_initial_text(settings.app_key.clone().unwrap_or_default())
        .interact_text()?;
    let app_secret: String = Password::new()
        .with_prompt("App secret (leave empty for PKCE apps)")
        .allow_empty_password(true)
        .interact()?;
    let refresh_token: String = Password::new().with_prompt("Refresh token").interact()?;

    settings.app_key = Some(app_key.trim().to_string());
    settings.app_secret = Some(app_secret.trim().to_string()).filter(|s| !s.is_empty());
    settings.refresh_token = Some(refresh_token.trim().to_string());
    settings.save(config_path)?;

    info!("configuration written to {}", config_path.display());
    println!("Configuration written to {}", config_path.display());
    Ok(())
}

/// Main interactive menu. Runs a select loop until the user chooses "Exit".
///
/// Errors from a single action are printed and the menu continues, except
/// capacity exhaustion, which ends the session.
pub fn main_menu(ctx: &Context<'_>) -> Result<()> {
    let mut prompter = TerminalPrompter::new(false);
    loop {
        let items = vec![
            "Back up file list",
            "Back up a file",
            "List backups",
            "Browse revisions",
            "Restore a file",
            "Exit",
        ];
        let selection = Select::new()
            .items(&items)
            .default(0)
            .interact()
            .map_err(Error::Prompt)?;

        let outcome = match selection {
            0 => cmd_backup_files(ctx, None).map(|_| ()),
            1 => {
                let path: String = Input::new()
                    .with_prompt("File path")
                    .interact_text()
                    .map_err(Error::Prompt)?;
                cmd_backup_file(ctx, Path::new(path.trim())).map(|_| ())
            }
            2 => cmd_list_files(ctx).map(|_| ()),
            3 => cmd_select_revision(ctx, &mut prompter),
            4 => {
                let name: String = Input::new()
                    .with_prompt("Backup name")
                    .interact_text()
                    .map_err(Error::Prompt)?;
                cmd_restore_file(ctx, &mut prompter, name.trim(), None, None)
            }
            _ => break,
        };

        match outcome {
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => println!("Error: {err}"),
            Ok(()) => {}
        }
    }
    Ok(())
}
