//! SafawiNet CLI - admin dashboard client

mod commands;
mod config;
mod logging;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use commands::{Commands, Context};
use safawinet_client::ClientError;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{Level, error, info};

#[derive(Parser)]
#[command(name = "safawinet")]
#[command(about = "Command-line client for the SafawiNet admin dashboard")]
#[command(version)]
struct Cli {
    /// Set logging level
    #[arg(short = 'l', long, global = true, default_value = "warn")]
    log_level: LogLevel,

    /// Data directory for the stored session, configuration and logs
    #[arg(short = 'd', long, global = true)]
    data_dir: Option<PathBuf>,

    /// Configuration file (defaults to <data-dir>/config.toml)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Request timeout in seconds (0 = no timeout)
    #[arg(short = 't', long, global = true, default_value = "30")]
    timeout: u64,

    /// Disable file logging (only log to stderr)
    #[arg(long, global = true)]
    no_file_log: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let data_dir = config::resolve_data_dir(cli.data_dir);
    logging::init_logging(cli.log_level.into(), &data_dir, cli.no_file_log)?;

    let config_path = cli
        .config
        .unwrap_or_else(|| data_dir.join(config::CONFIG_FILE));
    let config = config::CliConfig::load(&config_path)?;
    info!(api_url = %config.api_url, "Starting SafawiNet CLI");

    let ctx = Context {
        data_dir,
        config,
        request_timeout: (cli.timeout > 0).then(|| Duration::from_secs(cli.timeout)),
    };

    if let Err(e) = cli.command.execute(ctx).await {
        error!("Command failed: {e:#}");
        eprintln!("Error: {e:#}");
        if let Some(client_error) = e.downcast_ref::<ClientError>() {
            if client_error.category().requires_login() {
                eprintln!("Sign in again with `safawinet login`.");
            }
        }
        std::process::exit(1);
    }

    Ok(())
}

#[derive(Clone, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}
