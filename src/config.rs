use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::platform::shell::ensure_not_blank;
use crate::prefs::DimmingTimeout;

pub const DEFAULT_CONTROL_SOCKET_PATH: &str = "/run/tv-screensaver/control.sock";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Unix domain socket accepting runtime control commands.
    pub control_socket_path: PathBuf,
    /// Dimming timeout used when no preferences file overrides it.
    pub dimming_timeout: DimmingTimeout,
    /// Optional YAML file holding the user's `dimming-timeout` preference.
    pub preferences_path: Option<PathBuf>,
    /// How the dim overlay is realised on this display.
    pub overlay: OverlayConfig,
    /// Commands toggling the platform screensaver.
    pub platform_screensaver: PlatformScreensaverConfig,
    /// Input devices whose events count as user activity.
    pub input: InputConfig,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            !self.control_socket_path.as_os_str().is_empty(),
            "control-socket-path must not be empty"
        );
        ensure!(
            self.control_socket_path.file_name().is_some(),
            "control-socket-path must include a socket file name"
        );
        if let Some(path) = &self.preferences_path {
            ensure!(
                !path.as_os_str().is_empty(),
                "preferences-path must not be empty"
            );
        }
        self.overlay
            .validate()
            .context("invalid overlay configuration")?;
        self.platform_screensaver
            .validate()
            .context("invalid platform-screensaver configuration")?;
        self.input
            .validate()
            .context("invalid input configuration")?;
        Ok(self)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            control_socket_path: PathBuf::from(DEFAULT_CONTROL_SOCKET_PATH),
            dimming_timeout: DimmingTimeout::default(),
            preferences_path: None,
            overlay: OverlayConfig::default(),
            platform_screensaver: PlatformScreensaverConfig::default(),
            input: InputConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct OverlayConfig {
    /// Sysfs brightness file written while the overlay is shown.
    pub backlight_path: Option<PathBuf>,
    /// Brightness written when dimming.
    pub dim_value: String,
    /// Brightness written when undimming. Captured from the backlight file
    /// when the overlay is first attached if omitted.
    pub restore_value: Option<String>,
    /// Shell command run when the overlay is shown.
    pub show_command: Option<String>,
    /// Shell command run when the overlay is hidden.
    pub hide_command: Option<String>,
}

impl OverlayConfig {
    pub fn is_configured(&self) -> bool {
        self.backlight_path.is_some() || self.show_command.is_some() || self.hide_command.is_some()
    }

    fn validate(&self) -> Result<()> {
        if self.backlight_path.is_some() {
            ensure_not_blank(&self.dim_value, "overlay.dim-value")?;
        }
        if let Some(value) = &self.restore_value {
            ensure_not_blank(value, "overlay.restore-value")?;
        }
        if let Some(cmd) = &self.show_command {
            ensure_not_blank(cmd, "overlay.show-command")?;
        }
        if let Some(cmd) = &self.hide_command {
            ensure_not_blank(cmd, "overlay.hide-command")?;
        }
        Ok(())
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            backlight_path: None,
            dim_value: "16".to_string(),
            restore_value: None,
            show_command: None,
            hide_command: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PlatformScreensaverConfig {
    /// Lets the platform blank the screen, e.g. `xset s on +dpms`.
    pub enable_command: Option<String>,
    /// Suppresses the platform screensaver, e.g. `xset s off -dpms`.
    pub disable_command: Option<String>,
}

impl PlatformScreensaverConfig {
    fn validate(&self) -> Result<()> {
        if let Some(cmd) = &self.enable_command {
            ensure_not_blank(cmd, "platform-screensaver.enable-command")?;
        }
        if let Some(cmd) = &self.disable_command {
            ensure_not_blank(cmd, "platform-screensaver.disable-command")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct InputConfig {
    /// evdev device nodes to watch for key presses and pointer motion.
    pub devices: Vec<PathBuf>,
    /// Minimum spacing between forwarded activity notifications.
    #[serde(with = "humantime_serde")]
    pub activity_throttle: Duration,
}

impl InputConfig {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.activity_throttle > Duration::ZERO,
            "input.activity-throttle must be positive"
        );
        for device in &self.devices {
            ensure!(
                !device.as_os_str().is_empty(),
                "input.devices entries must not be empty"
            );
        }
        Ok(())
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            activity_throttle: Duration::from_secs(1),
        }
    }
}
