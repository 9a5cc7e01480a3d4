use tracing::debug;

use crate::config::PlatformScreensaverConfig;
use crate::host::PlatformScreensaver;
use crate::platform::shell::{self, CommandExecution, CommandRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreensaverAction {
    Enable,
    Disable,
}

/// Toggles the platform screensaver through shell commands such as `xset`.
pub struct CommandScreensaver {
    enable_command: Option<String>,
    disable_command: Option<String>,
    runner: CommandRunner,
}

impl CommandScreensaver {
    pub fn new(config: &PlatformScreensaverConfig) -> Self {
        Self::with_runner(config, shell::default_runner())
    }

    pub fn with_runner(config: &PlatformScreensaverConfig, runner: CommandRunner) -> Self {
        Self {
            enable_command: config.enable_command.clone(),
            disable_command: config.disable_command.clone(),
            runner,
        }
    }

    pub fn perform(&self, action: ScreensaverAction) -> Option<CommandExecution> {
        let command = match action {
            ScreensaverAction::Enable => self.enable_command.as_deref(),
            ScreensaverAction::Disable => self.disable_command.as_deref(),
        };
        let Some(command) = command else {
            debug!(?action, "no platform screensaver command configured");
            return None;
        };
        let label = match action {
            ScreensaverAction::Enable => "screensaver enable",
            ScreensaverAction::Disable => "screensaver disable",
        };
        Some(shell::execute(&self.runner, label, command))
    }
}

impl std::fmt::Debug for CommandScreensaver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandScreensaver")
            .field("enable_command", &self.enable_command)
            .field("disable_command", &self.disable_command)
            .finish()
    }
}

impl PlatformScreensaver for CommandScreensaver {
    fn enable(&self) {
        self.perform(ScreensaverAction::Enable);
    }

    fn disable(&self) {
        self.perform(ScreensaverAction::Disable);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::shell::testing::RecordingRunner;

    #[test]
    fn runs_matching_command() {
        let recorder = RecordingRunner::default();
        let saver = CommandScreensaver::with_runner(
            &PlatformScreensaverConfig {
                enable_command: Some("xset s on +dpms".to_string()),
                disable_command: Some("xset s off -dpms".to_string()),
            },
            recorder.runner(),
        );
        saver.disable();
        saver.enable();
        assert_eq!(recorder.seen(), vec!["xset s off -dpms", "xset s on +dpms"]);
    }

    #[test]
    fn unconfigured_action_is_skipped() {
        let recorder = RecordingRunner::default();
        let saver = CommandScreensaver::with_runner(
            &PlatformScreensaverConfig {
                enable_command: None,
                disable_command: Some("xset s off".to_string()),
            },
            recorder.runner(),
        );
        assert!(saver.perform(ScreensaverAction::Enable).is_none());
        let execution = saver.perform(ScreensaverAction::Disable).unwrap();
        assert!(execution.success);
        assert_eq!(recorder.seen(), vec!["xset s off"]);
    }
}
