//! `upload-session` binary
//!
//! Manages the browser sessions used to publish videos.
//!
//! # Usage
//!
//! ```bash
//! upload-session login douyin --account brand_1 --artifact-out qr.png
//! upload-session verify douyin --account brand_1
//! upload-session ensure xhs
//! upload-session list --json
//! upload-session delete kuaishou --account old
//! ```
//!
//! Exits with status 1 when a login does not succeed or a session is not
//! valid.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use upload_session::cli::{self, Command, GlobalArgs};
use upload_session::types::{Account, Platform};

/// Acquire, verify and store publishing sessions
#[derive(Parser)]
#[command(name = "upload-session", author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding session records
    #[arg(long, global = true, value_name = "DIR")]
    sessions_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print events and results as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct Target {
    /// Platform to act on
    #[arg(value_enum)]
    platform: Platform,

    /// Account name
    #[arg(short, long, default_value = "default")]
    account: Account,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in interactively and store the new session
    Login {
        #[command(flatten)]
        target: Target,

        /// Seconds to wait for the login to complete
        #[arg(long, value_name = "SECONDS")]
        timeout: Option<u64>,

        /// Also write the login QR code to this PNG file
        #[arg(long, value_name = "FILE")]
        artifact_out: Option<PathBuf>,
    },
    /// Check whether the stored session is still accepted
    Verify {
        #[command(flatten)]
        target: Target,
    },
    /// Verify the stored session and log in if it is missing or expired
    Ensure {
        #[command(flatten)]
        target: Target,

        /// Log in even if the stored session is valid
        #[arg(long)]
        force: bool,

        /// Seconds to wait for the login to complete
        #[arg(long, value_name = "SECONDS")]
        timeout: Option<u64>,

        /// Also write the login QR code to this PNG file
        #[arg(long, value_name = "FILE")]
        artifact_out: Option<PathBuf>,
    },
    /// List stored sessions
    List,
    /// Delete a stored session
    Delete {
        #[command(flatten)]
        target: Target,
    },
}

impl From<Commands> for Command {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Login {
                target,
                timeout,
                artifact_out,
            } => Command::Login {
                platform: target.platform,
                account: target.account,
                timeout: timeout.map(Duration::from_secs),
                artifact_out,
            },
            Commands::Verify { target } => Command::Verify {
                platform: target.platform,
                account: target.account,
            },
            Commands::Ensure {
                target,
                force,
                timeout,
                artifact_out,
            } => Command::Ensure {
                platform: target.platform,
                account: target.account,
                force,
                timeout: timeout.map(Duration::from_secs),
                artifact_out,
            },
            Commands::List => Command::List,
            Commands::Delete { target } => Command::Delete {
                platform: target.platform,
                account: target.account,
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let global = GlobalArgs {
        config: cli.config,
        sessions_dir: cli.sessions_dir,
        verbose: cli.verbose,
        json: cli.json,
    };

    if !cli::run(global, cli.command.into()).await? {
        std::process::exit(1);
    }
    Ok(())
}
