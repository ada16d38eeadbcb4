// Entrypoint for the CLI application.
// - Parses the command line, loads settings and builds the Dropbox client.
// - Without a subcommand it starts the interactive menu.
// - Capacity exhaustion exits with status 2, other failures (including a
//   batch with files left unsaved) with 1.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context as _;
use clap::{ArgAction, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use dropbackup::config::Settings;
use dropbackup::dropbox::DropboxClient;
use dropbackup::ui::{self, Context, TerminalPrompter};
use dropbackup::Error;

#[derive(Parser)]
#[command(name = "dropbackup", version)]
#[command(about = "Back up files to Dropbox and restore earlier revisions")]
struct Cli {
    /// Path to the settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log more (repeat for even more)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Store the app key, secret and refresh token
    Configure,
    /// List files in the backup folder
    ListFiles,
    /// Back up every file in the file list
    BackupFiles {
        /// JSON file mapping backup names to local paths
        #[arg(long)]
        file_list: Option<PathBuf>,
    },
    /// Back up a single file
    BackupFile { path: PathBuf },
    /// Pick a backed up file and browse its revisions
    SelectRevision,
    /// Restore a backed up file to a revision
    RestoreFile {
        /// Backup name, or an absolute remote path
        name: String,

        /// Revision to restore. Prompts with the revision list when omitted
        #[arg(short, long)]
        revision: Option<String>,

        /// Where to write the file (default: its name in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing local file without asking
        #[arg(short, long)]
        yes: bool,
    },
}

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "dropbackup=info",
        1 => "dropbackup=debug",
        _ => "dropbackup=trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(Error::CapacityExhausted) = err.downcast_ref::<Error>() {
                eprintln!("ERROR: insufficient space.");
                return ExitCode::from(2);
            }
            eprintln!("ERROR: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.unwrap_or_else(Settings::default_path);

    match cli.command {
        Some(Commands::Configure) => ui::configure(&config_path),
        None => with_context(&config_path, ui::main_menu),
        Some(Commands::ListFiles) => {
            with_context(&config_path, |ctx| ui::cmd_list_files(ctx).map(drop))
        }
        Some(Commands::BackupFiles { file_list }) => with_context(&config_path, |ctx| {
            ui::cmd_backup_files(ctx, file_list.as_deref())?.ensure_complete()
        }),
        Some(Commands::BackupFile { path }) => {
            with_context(&config_path, |ctx| ui::cmd_backup_file(ctx, &path).map(drop))
        }
        Some(Commands::SelectRevision) => with_context(&config_path, |ctx| {
            ui::cmd_select_revision(ctx, &mut TerminalPrompter::new(false))
        }),
        Some(Commands::RestoreFile {
            name,
            revision,
            output,
            yes,
        }) => with_context(&config_path, |ctx| {
            ui::cmd_restore_file(
                ctx,
                &mut TerminalPrompter::new(yes),
                &name,
                revision.as_deref(),
                output.as_deref(),
            )
        }),
    }
}

/// Loads settings, authenticates, and runs `f` with the resulting context.
fn with_context<T>(
    config_path: &Path,
    f: impl FnOnce(&Context<'_>) -> dropbackup::Result<T>,
) -> anyhow::Result<T> {
    let mut settings = Settings::load(config_path)?;
    settings.apply_env();
    let credentials = settings.credentials()?;
    info!(
        "configuration loaded from {} (app key {})",
        config_path.display(),
        credentials.app_key
    );

    let client = DropboxClient::new(credentials).context("Failed to build Dropbox client")?;
    client
        .check_auth()
        .context("Failed to refresh the access token")?;
    let ctx = Context::new(&client, &settings)?;
    Ok(f(&ctx)?)
}
