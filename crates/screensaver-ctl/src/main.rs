use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "screensaver-ctl",
    about = "Send a command to the TV screensaver daemon"
)]
struct Args {
    /// Command to deliver.
    #[arg(value_enum)]
    command: Command,

    /// Screensaver control socket.
    #[arg(long, default_value = "/run/tv-screensaver/control.sock")]
    control_socket: PathBuf,

    /// Logging level (error|warn|info|debug|trace).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
enum Command {
    UserActivity,
    Enable,
    Disable,
    PlaybackStarted,
    PlaybackStopped,
    Block,
    Unblock,
    ReloadPreferences,
}

#[derive(Debug, Serialize)]
struct Request {
    command: Command,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    send(&args.control_socket, args.command)?;
    info!(command = ?args.command, "command delivered");
    Ok(())
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::builder()
        .parse(level)
        .with_context(|| format!("invalid log level '{level}'"))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn encode(command: Command) -> Result<Vec<u8>> {
    serde_json::to_vec(&Request { command }).context("failed to encode command")
}

fn send(socket: &Path, command: Command) -> Result<()> {
    let payload = encode(command)?;
    let mut stream = UnixStream::connect(socket).with_context(|| {
        format!("failed to connect to control socket at {}", socket.display())
    })?;
    stream
        .write_all(&payload)
        .with_context(|| format!("failed to send {command:?} command"))?;
    Ok(())
}
