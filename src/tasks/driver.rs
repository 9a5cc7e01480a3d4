use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::events::ScreensaverCommand;
use crate::host::PlaybackFlag;
use crate::prefs::PreferenceStore;
use crate::screensaver::ScreensaverManager;

/// Owns the manager and the state its commands mutate.
#[derive(Debug)]
pub struct Driver {
    manager: ScreensaverManager,
    playback: Arc<PlaybackFlag>,
    prefs: Arc<PreferenceStore>,
}

impl Driver {
    pub fn new(
        manager: ScreensaverManager,
        playback: Arc<PlaybackFlag>,
        prefs: Arc<PreferenceStore>,
    ) -> Self {
        Self {
            manager,
            playback,
            prefs,
        }
    }

    pub fn manager(&self) -> &ScreensaverManager {
        &self.manager
    }

    pub fn handle(&mut self, command: ScreensaverCommand, now: Instant) {
        match command {
            ScreensaverCommand::UserActivity | ScreensaverCommand::Enable => {
                self.manager.enable(now)
            }
            ScreensaverCommand::Disable => self.manager.disable(now),
            ScreensaverCommand::PlaybackStarted => {
                self.playback.set_playing(true);
                self.manager.disable(now);
            }
            ScreensaverCommand::PlaybackStopped => {
                self.playback.set_playing(false);
                self.manager.enable(now);
            }
            ScreensaverCommand::Block => self.manager.set_blocked(true),
            ScreensaverCommand::Unblock => self.manager.set_blocked(false),
            ScreensaverCommand::ReloadPreferences => {
                let timeout = self.prefs.reload();
                info!(%timeout, "preferences reloaded");
                self.manager.enable(now);
            }
        }
    }

    pub fn tick(&mut self, now: Instant) {
        let before = self.manager.state();
        self.manager.run_due(now);
        let after = self.manager.state();
        if before != after {
            info!(from = ?before, to = ?after, "screensaver state changed");
        }
    }
}

/// Drives the manager until cancelled. Dim/undim may run shell commands or
/// touch sysfs, so every step runs on the blocking pool.
pub async fn run(
    mut driver: Driver,
    mut control: mpsc::Receiver<ScreensaverCommand>,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        let deadline = driver.manager.next_deadline();
        tokio::select! {
            _ = cancel.cancelled() => break,
            command = control.recv() => match command {
                Some(command) => {
                    debug!(?command, "screensaver command");
                    let now = Instant::now();
                    driver = step(driver, move |d| d.handle(command, now)).await?;
                }
                None => {
                    debug!("control channel closed");
                    break;
                }
            },
            _ = wait_until(deadline) => {
                let now = Instant::now();
                driver = step(driver, move |d| d.tick(now)).await?;
            }
        }
    }
    step(driver, |d| d.manager.release()).await?;
    info!("screensaver released");
    Ok(())
}

async fn step<F>(mut driver: Driver, f: F) -> Result<Driver>
where
    F: FnOnce(&mut Driver) + Send + 'static,
{
    task::spawn_blocking(move || {
        f(&mut driver);
        driver
    })
    .await
    .context("screensaver step panicked")
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
