use serde::Deserialize;

/// Callbacks the screensaver posts to its event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Dim,
    Undim,
}

/// Requests delivered to the screensaver driver from signals, input devices
/// and the control socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum ScreensaverCommand {
    /// Any key press or pointer motion; re-arms the dim timer.
    UserActivity,
    Enable,
    Disable,
    PlaybackStarted,
    PlaybackStopped,
    Block,
    Unblock,
    ReloadPreferences,
}
