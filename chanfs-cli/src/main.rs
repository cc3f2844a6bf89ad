// SPDX-License-Identifier: AGPL-3.0-or-later
//! chanfs CLI
//!
//! Browse and edit a versioned filesystem stored in a message backend.

mod commands;
mod settings;

use chanfs_core::{ChanfsError, ChanfsResult};
use chanfs_vfs::Filesystem;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use settings::Settings;

#[derive(Parser)]
#[command(name = "chanfs")]
#[command(author, version, about = "chanfs - a versioned filesystem in a message backend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to config.toml in the user config dir)
    #[arg(short = 'f', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List directory contents, or show a single file
    Ls {
        /// Path to list
        #[arg(default_value = "/")]
        path: String,

        /// Long format with details
        #[arg(short, long)]
        long: bool,
    },

    /// Create directories
    Mkdir {
        /// Directory path(s) to create
        #[arg(required = true)]
        paths: Vec<String>,

        /// Create parent directories as needed
        #[arg(short, long)]
        parents: bool,
    },

    /// Upload a local file as a new version
    Cp {
        /// Local source file
        local: PathBuf,

        /// Destination file or directory
        remote: String,
    },

    /// Download a file
    Get {
        /// File to download
        remote: String,

        /// Local destination
        local: PathBuf,

        /// Version id (defaults to latest)
        #[arg(long)]
        version: Option<String>,
    },

    /// Display file contents
    Cat {
        /// File to display
        path: String,

        /// Version id (defaults to latest)
        #[arg(long)]
        version: Option<String>,
    },

    /// Remove files or directories
    Rm {
        /// Path(s) to remove
        #[arg(required = true)]
        paths: Vec<String>,

        /// Recursive removal for directories
        #[arg(short, long)]
        recursive: bool,
    },

    /// Create empty files
    Touch {
        /// File path(s)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Show file or directory information
    Stat {
        /// Path to inspect
        path: String,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::prelude::*;

    let level = if verbose {
        LevelFilter::INFO
    } else {
        LevelFilter::WARN
    };
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(level),
        )
        .try_init();
}

async fn run(cli: Cli) -> ChanfsResult<()> {
    let settings = Settings::load(cli.config.as_deref())?;
    let backend = settings.open_backend()?;
    let fs = Filesystem::open(backend, settings.filesystem).await?;

    match cli.command {
        Commands::Ls { path, long } => commands::ls(&fs, &path, long).await,
        Commands::Mkdir { paths, parents } => commands::mkdir(&fs, &paths, parents).await,
        Commands::Cp { local, remote } => commands::cp(&fs, &local, &remote).await,
        Commands::Get {
            remote,
            local,
            version,
        } => commands::get(&fs, &remote, &local, version.as_deref()).await,
        Commands::Cat { path, version } => commands::cat(&fs, &path, version.as_deref()).await,
        Commands::Rm { paths, recursive } => commands::rm(&fs, &paths, recursive).await,
        Commands::Touch { paths } => commands::touch(&fs, &paths).await,
        Commands::Stat { path } => commands::stat(&fs, &path).await,
    }
}

/// 1 for mistakes in the request or configuration, 2 when storage failed
/// underneath it.
fn exit_status(err: &ChanfsError) -> u8 {
    if err.is_logical() || matches!(err, ChanfsError::Config(_)) {
        1
    } else {
        2
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(exit_status(&e))
        }
    }
}
