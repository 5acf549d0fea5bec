//! Community CLI - a command line client for the community forum service.
//!
//! The session saved by a previous `login` is restored on every run, so
//! commands that need an account work until the server rejects the token.

mod commands;
mod output;

use std::path::Path;

use anyhow::Result;
use clap::{Parser, Subcommand};
use community_core::api::{DEFAULT_PAGE, DEFAULT_PAGE_SIZE};
use community_core::Config;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log file name prefix inside `<data_dir>/logs`
const LOG_FILE: &str = "community.log";

#[derive(Parser)]
#[command(name = "community")]
#[command(about = "Command line client for the community forum")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and remember the session
    Login {
        /// Account name (defaults to COMMUNITY_USERNAME or the last login)
        username: Option<String>,
    },
    /// End the session on this machine and on the server
    Logout,
    /// Show the logged-in account
    Whoami,
    /// Create an account
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        nickname: String,
    },
    /// List posts, newest first
    Posts {
        #[arg(long, default_value_t = DEFAULT_PAGE)]
        page: u32,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        size: u32,
    },
    /// Show a post with its comment threads
    Post { id: i64 },
    /// Publish a new post
    NewPost {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
        /// Image file to upload and attach
        #[arg(long)]
        image: Option<std::path::PathBuf>,
    },
    /// Comment on a post
    Comment {
        post_id: i64,
        #[arg(long)]
        content: String,
        /// Reply to this comment instead of the post
        #[arg(long)]
        reply_to: Option<i64>,
    },
    /// Post and comment counts for a user (yourself by default)
    Stats { user_id: Option<i64> },
    /// Set your profile image to an uploaded image URL
    Avatar { url: String },
}

/// Initialize the tracing subscriber, writing to a daily log file.
/// The returned guard flushes the file writer when dropped.
fn init_tracing(log_dir: &Path, debug: bool) -> WorkerGuard {
    let filter = if debug {
        EnvFilter::new("community_core=debug,community_cli=debug,warn")
    } else {
        // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    std::fs::create_dir_all(log_dir).ok();
    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let mut config = Config::load()?;

    let _guard = init_tracing(&config.data_dir()?.join("logs"), cli.debug);
    info!(base_url = %config.api_base_url(), "Community CLI starting");

    let session = config.session_manager()?;
    let phase = session.restore().await;
    info!(?phase, "Session restored");

    let out = output::Output::new(cli.json);
    let result = commands::run(cli.command, &session, &mut config, &out).await;

    if let Err(e) = &result {
        tracing::error!(error = %e, "Command failed");
    }
    result
}
