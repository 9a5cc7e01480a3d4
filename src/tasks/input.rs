use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use evdev::{Device, EventSummary};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::events::ScreensaverCommand;

/// Limits how often input events are forwarded as user activity.
#[derive(Debug)]
pub struct ActivityThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ActivityThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn admit(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last {
            if now.saturating_duration_since(last) < self.interval {
                return false;
            }
        }
        self.last = Some(now);
        true
    }
}

/// Starts one reader thread per input device. Devices that cannot be opened
/// are skipped. Returns how many devices are being watched.
pub fn spawn(
    devices: &[PathBuf],
    throttle: Duration,
    commands: mpsc::Sender<ScreensaverCommand>,
) -> usize {
    let mut watched = 0;
    for path in devices {
        let device = match open_device(path) {
            Ok(Some(device)) => device,
            Ok(None) => continue,
            Err(err) => {
                warn!(device = %path.display(), error = ?err, "skipping input device");
                continue;
            }
        };
        let commands = commands.clone();
        let path = path.clone();
        let spawned = thread::Builder::new()
            .name("input-activity".to_string())
            .spawn(move || watch_device(device, path, throttle, commands));
        match spawned {
            Ok(_) => watched += 1,
            Err(err) => warn!(error = %err, "failed to spawn input reader thread"),
        }
    }
    watched
}

fn open_device(path: &Path) -> Result<Option<Device>> {
    match Device::open(path) {
        Ok(device) => {
            info!(
                device = %path.display(),
                name = device.name().unwrap_or("<unnamed>"),
                "watching input device for activity"
            );
            Ok(Some(device))
        }
        Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
            warn!(device = %path.display(), "no permission to read device");
            Ok(None)
        }
        Err(err) => Err(err).with_context(|| format!("failed to open {}", path.display())),
    }
}

fn watch_device(
    mut device: Device,
    path: PathBuf,
    interval: Duration,
    commands: mpsc::Sender<ScreensaverCommand>,
) {
    let mut throttle = ActivityThrottle::new(interval);
    loop {
        let active = match device.fetch_events() {
            Ok(events) => events.fold(false, |seen, event| {
                is_activity(event.destructure()) || seen
            }),
            Err(err) => {
                warn!(device = %path.display(), error = %err, "failed reading input events");
                return;
            }
        };
        if !active || !throttle.admit(Instant::now()) {
            continue;
        }
        if commands
            .blocking_send(ScreensaverCommand::UserActivity)
            .is_err()
        {
            debug!(device = %path.display(), "screensaver driver gone; stopping input reader");
            return;
        }
    }
}

fn is_activity(event: EventSummary) -> bool {
    match event {
        EventSummary::Key(_, _, value) => value != 0,
        EventSummary::RelativeAxis(..) | EventSummary::AbsoluteAxis(..) => true,
        _ => false,
    }
}
