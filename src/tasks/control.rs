use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::ScreensaverCommand;

const MAX_PAYLOAD_BYTES: u64 = 16 * 1024;

/// Accepts JSON control commands such as `{"command":"user-activity"}` on a
/// Unix domain socket.
pub async fn run(
    path: PathBuf,
    commands: mpsc::Sender<ScreensaverCommand>,
    cancel: CancellationToken,
) -> Result<()> {
    prepare_socket_path(&path)?;
    let listener = UnixListener::bind(&path)
        .with_context(|| format!("failed to bind control socket at {}", path.display()))?;
    info!(path = %path.display(), "listening for control commands");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    let commands = commands.clone();
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(stream, commands).await {
                            warn!(error = ?err, "control connection failed");
                        }
                    });
                }
                Err(err) => warn!(error = %err, "failed to accept control connection"),
            },
        }
    }

    if let Err(err) = std::fs::remove_file(&path) {
        if err.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %err, "failed to remove control socket");
        }
    }
    Ok(())
}

async fn handle_connection(
    stream: UnixStream,
    commands: mpsc::Sender<ScreensaverCommand>,
) -> Result<()> {
    let mut payload = Vec::new();
    stream
        .take(MAX_PAYLOAD_BYTES)
        .read_to_end(&mut payload)
        .await
        .context("failed to read control payload")?;

    for command in parse_commands(&payload) {
        debug!(?command, "control command received");
        commands
            .send(command)
            .await
            .context("screensaver driver is gone")?;
    }
    Ok(())
}

/// Parses one or more concatenated JSON commands. Parsing stops at the first
/// malformed entry; everything before it is kept.
pub fn parse_commands(payload: &[u8]) -> Vec<ScreensaverCommand> {
    let mut parsed = Vec::new();
    let stream = serde_json::Deserializer::from_slice(payload).into_iter::<ScreensaverCommand>();
    for item in stream {
        match item {
            Ok(command) => parsed.push(command),
            Err(err) => {
                warn!(error = %err, "ignoring malformed control payload");
                break;
            }
        }
    }
    parsed
}

fn prepare_socket_path(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create control socket directory {}", parent.display())
            })?;
        }
    }
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed stale control socket"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| {
                format!("failed to remove stale control socket {}", path.display())
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_and_concatenated_commands() {
        assert_eq!(
            parse_commands(br#"{"command":"user-activity"}"#),
            vec![ScreensaverCommand::UserActivity]
        );
        assert_eq!(
            parse_commands(b"{\"command\":\"playback-started\"}\n{\"command\":\"block\"}\n"),
            vec![ScreensaverCommand::PlaybackStarted, ScreensaverCommand::Block]
        );
    }

    #[test]
    fn stops_at_malformed_entry() {
        assert_eq!(
            parse_commands(br#"{"command":"disable"} {"command":"explode"}"#),
            vec![ScreensaverCommand::Disable]
        );
        assert!(parse_commands(b"not json").is_empty());
        assert!(parse_commands(b"").is_empty());
    }
}
