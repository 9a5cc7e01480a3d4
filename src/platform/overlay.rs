use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::config::OverlayConfig;
use crate::host::{DimOverlay, HostWindow};
use crate::platform::shell::{self, CommandExecution, CommandRunner};

/// The kiosk's display. The dim overlay is realised by dropping the
/// backlight and/or running configured commands.
pub struct KioskDisplay {
    config: OverlayConfig,
    runner: CommandRunner,
    overlay: Mutex<Option<Arc<BacklightOverlay>>>,
}

impl KioskDisplay {
    pub fn new(config: OverlayConfig) -> Self {
        Self::with_runner(config, shell::default_runner())
    }

    pub fn with_runner(config: OverlayConfig, runner: CommandRunner) -> Self {
        if !config.is_configured() {
            warn!("no overlay backlight or commands configured; dimming has no visible effect");
        }
        Self {
            config,
            runner,
            overlay: Mutex::new(None),
        }
    }

    /// The backlight overlay, attached on first use. `None` when nothing is
    /// configured to dim.
    pub fn overlay(&self) -> Option<Arc<BacklightOverlay>> {
        if !self.config.is_configured() {
            return None;
        }
        let mut slot = self.slot();
        let overlay = slot.get_or_insert_with(|| {
            Arc::new(BacklightOverlay::attach(&self.config, self.runner.clone()))
        });
        Some(overlay.clone())
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<BacklightOverlay>>> {
        match self.overlay.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl fmt::Debug for KioskDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KioskDisplay")
            .field("config", &self.config)
            .field("has_overlay", &self.slot().is_some())
            .finish()
    }
}

impl HostWindow for KioskDisplay {
    fn find_dim_overlay(&self) -> Option<Arc<dyn DimOverlay>> {
        self.slot()
            .as_ref()
            .map(|overlay| overlay.clone() as Arc<dyn DimOverlay>)
    }

    fn attach_dim_overlay(&self) -> Option<Arc<dyn DimOverlay>> {
        self.overlay()
            .map(|overlay| overlay as Arc<dyn DimOverlay>)
    }
}

#[derive(Debug, Clone)]
struct BacklightLevels {
    path: PathBuf,
    dim_value: String,
    restore_value: Option<String>,
}

/// Dims the panel through the backlight sysfs file and optional commands.
pub struct BacklightOverlay {
    backlight: Option<BacklightLevels>,
    show_command: Option<String>,
    hide_command: Option<String>,
    runner: CommandRunner,
    visible: AtomicBool,
}

#[derive(Debug, Clone)]
pub struct SysfsExecution {
    pub path: PathBuf,
    pub value: String,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct OverlayReport {
    pub sysfs: Option<SysfsExecution>,
    pub command: Option<CommandExecution>,
}

impl OverlayReport {
    pub fn success(&self) -> bool {
        self.sysfs.as_ref().is_some_and(|s| s.success)
            || self.command.as_ref().is_some_and(|c| c.success)
    }
}

impl BacklightOverlay {
    fn attach(config: &OverlayConfig, runner: CommandRunner) -> Self {
        let backlight = config.backlight_path.as_ref().map(|path| {
            let restore_value = config
                .restore_value
                .clone()
                .or_else(|| capture_brightness(path));
            BacklightLevels {
                path: path.clone(),
                dim_value: config.dim_value.clone(),
                restore_value,
            }
        });
        info!(
            backlight = ?backlight.as_ref().map(|b| b.path.display().to_string()),
            restore = ?backlight.as_ref().and_then(|b| b.restore_value.clone()),
            "attached dim overlay"
        );
        Self {
            backlight,
            show_command: config.show_command.clone(),
            hide_command: config.hide_command.clone(),
            runner,
            visible: AtomicBool::new(false),
        }
    }

    /// Applies the visibility unconditionally and reports what ran.
    pub fn apply(&self, visible: bool) -> OverlayReport {
        let sysfs = self
            .backlight
            .as_ref()
            .and_then(|levels| levels.write(visible));
        let command = if visible {
            self.show_command.as_deref()
        } else {
            self.hide_command.as_deref()
        };
        let label = if visible { "overlay show" } else { "overlay hide" };
        let command = command.map(|cmd| shell::execute(&self.runner, label, cmd));
        self.visible.store(visible, Ordering::SeqCst);
        OverlayReport { sysfs, command }
    }
}

impl fmt::Debug for BacklightOverlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BacklightOverlay")
            .field("backlight", &self.backlight)
            .field("show_command", &self.show_command)
            .field("hide_command", &self.hide_command)
            .field("visible", &self.is_visible())
            .finish()
    }
}

impl DimOverlay for BacklightOverlay {
    fn set_visible(&self, visible: bool) {
        if self.is_visible() == visible {
            debug!(visible, "dim overlay already in requested state");
            return;
        }
        let report = self.apply(visible);
        debug!(visible, success = report.success(), "dim overlay toggled");
    }

    fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }
}

impl BacklightLevels {
    fn write(&self, dimmed: bool) -> Option<SysfsExecution> {
        let value = if dimmed {
            &self.dim_value
        } else {
            match &self.restore_value {
                Some(value) => value,
                None => {
                    warn!(path = %self.path.display(), "no brightness to restore; skipping backlight write");
                    return None;
                }
            }
        };

        let execution = match fs::write(&self.path, value) {
            Ok(()) => {
                debug!(path = %self.path.display(), value, dimmed, "wrote backlight value");
                SysfsExecution {
                    path: self.path.clone(),
                    value: value.clone(),
                    success: true,
                    error: None,
                }
            }
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    value,
                    dimmed,
                    error = %err,
                    "failed to write backlight value"
                );
                SysfsExecution {
                    path: self.path.clone(),
                    value: value.clone(),
                    success: false,
                    error: Some(err.to_string()),
                }
            }
        };
        Some(execution)
    }
}

fn capture_brightness(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(raw) => {
            let value = raw.trim();
            if value.is_empty() {
                warn!(path = %path.display(), "backlight file is empty");
                None
            } else {
                Some(value.to_string())
            }
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to read current brightness");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::shell::testing::RecordingRunner;

    fn backlight_file(contents: &str) -> tempfile::NamedTempFile {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        fs::write(tmp.path(), contents).unwrap();
        tmp
    }

    #[test]
    fn restores_brightness_captured_at_attach() {
        let tmp = backlight_file("200\n");
        let display = KioskDisplay::with_runner(
            OverlayConfig {
                backlight_path: Some(tmp.path().to_path_buf()),
                dim_value: "10".to_string(),
                ..OverlayConfig::default()
            },
            RecordingRunner::default().runner(),
        );
        assert!(display.find_dim_overlay().is_none());
        let overlay = display.attach_dim_overlay().unwrap();

        overlay.set_visible(true);
        assert_eq!(fs::read_to_string(tmp.path()).unwrap(), "10");
        assert!(overlay.is_visible());

        overlay.set_visible(false);
        assert_eq!(fs::read_to_string(tmp.path()).unwrap(), "200");
        assert!(!overlay.is_visible());
    }

    #[test]
    fn attach_reuses_existing_overlay() {
        let display = KioskDisplay::with_runner(
            OverlayConfig {
                show_command: Some("dim-on".to_string()),
                ..OverlayConfig::default()
            },
            RecordingRunner::default().runner(),
        );
        let first = display.attach_dim_overlay().unwrap();
        let second = display.attach_dim_overlay().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(display.find_dim_overlay().is_some());
    }

    #[test]
    fn commands_run_once_per_visibility_change() {
        let recorder = RecordingRunner::default();
        let display = KioskDisplay::with_runner(
            OverlayConfig {
                show_command: Some("dim-on".to_string()),
                hide_command: Some("dim-off".to_string()),
                ..OverlayConfig::default()
            },
            recorder.runner(),
        );
        let overlay = display.attach_dim_overlay().unwrap();
        overlay.set_visible(false);
        overlay.set_visible(true);
        overlay.set_visible(true);
        overlay.set_visible(false);
        assert_eq!(recorder.seen(), vec!["dim-on", "dim-off"]);
    }

    #[test]
    fn failed_command_is_reported_not_raised() {
        let recorder = RecordingRunner::default();
        recorder.fail("dim-on", 3);
        let overlay = BacklightOverlay::attach(
            &OverlayConfig {
                show_command: Some("dim-on".to_string()),
                ..OverlayConfig::default()
            },
            recorder.runner(),
        );
        let report = overlay.apply(true);
        assert!(!report.success());
        assert_eq!(report.command.unwrap().exit_code, Some(3));
        assert!(overlay.is_visible());
    }

    #[test]
    fn unconfigured_display_cannot_host_overlay() {
        let display =
            KioskDisplay::with_runner(OverlayConfig::default(), RecordingRunner::default().runner());
        assert!(display.attach_dim_overlay().is_none());
    }

    #[test]
    fn missing_backlight_leaves_restore_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brightness");
        let overlay = BacklightOverlay::attach(
            &OverlayConfig {
                backlight_path: Some(path.clone()),
                ..OverlayConfig::default()
            },
            RecordingRunner::default().runner(),
        );
        let report = overlay.apply(false);
        assert!(report.sysfs.is_none());
        assert!(!path.exists());
    }
}
