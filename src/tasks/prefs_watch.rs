use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher, recommended_watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::events::ScreensaverCommand;

/// Editors write in bursts; collapse them into one reload.
const SETTLE_DELAY: Duration = Duration::from_millis(250);

/// Watches the preferences file and asks the driver to reload it whenever it
/// changes on disk.
pub async fn run(
    path: PathBuf,
    commands: mpsc::Sender<ScreensaverCommand>,
    cancel: CancellationToken,
) -> Result<()> {
    // The parent is watched so atomic replace-by-rename is seen too.
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    // Bridge notify callback -> async channel
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Result<Event>>(64);
    let mut watcher = recommended_watcher(move |res| {
        let _ = watch_tx.blocking_send(res);
    })
    .context("failed to create preferences watcher")?;
    if let Err(err) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
        // Reloads still work through SIGHUP and the control socket.
        warn!(dir = %dir.display(), error = %err, "cannot watch preferences directory");
        return Ok(());
    }
    info!(watching = %path.display(), "preferences watcher initialized");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            Some(res) = watch_rx.recv() => match res {
                Ok(event) => {
                    if !touches_preferences(&event, &path) {
                        continue;
                    }
                    debug!(kind = ?event.kind, "preferences file changed");
                    tokio::time::sleep(SETTLE_DELAY).await;
                    while watch_rx.try_recv().is_ok() {}
                    if commands.send(ScreensaverCommand::ReloadPreferences).await.is_err() {
                        break;
                    }
                }
                Err(err) => error!("preferences watch error: {err}"),
            },
        }
    }
    Ok(())
}

fn touches_preferences(event: &Event, path: &Path) -> bool {
    let relevant = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_)
    );
    relevant
        && event
            .paths
            .iter()
            .any(|p| p.file_name().is_some() && p.file_name() == path.file_name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, ModifyKind, RemoveKind};

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn only_writes_to_the_preferences_file_count() {
        let prefs = Path::new("/var/lib/tv/prefs.yaml");
        assert!(touches_preferences(
            &event(
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                "/var/lib/tv/prefs.yaml"
            ),
            prefs
        ));
        assert!(touches_preferences(
            &event(EventKind::Create(CreateKind::File), "/var/lib/tv/prefs.yaml"),
            prefs
        ));
        assert!(!touches_preferences(
            &event(EventKind::Create(CreateKind::File), "/var/lib/tv/other.yaml"),
            prefs
        ));
        assert!(!touches_preferences(
            &event(EventKind::Remove(RemoveKind::File), "/var/lib/tv/prefs.yaml"),
            prefs
        ));
    }
}
