use std::process::{Command, ExitStatus};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, warn};

pub type CommandRunner = Arc<dyn Fn(&str) -> Result<CommandOutput> + Send + Sync>;

#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone)]
pub struct CommandExecution {
    pub command: String,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

pub fn default_runner() -> CommandRunner {
    Arc::new(|command| run_shell(command))
}

/// Runs `command` through the runner and logs the outcome under `label`.
pub fn execute(runner: &CommandRunner, label: &str, command: &str) -> CommandExecution {
    let execution = match runner(command) {
        Ok(output) => CommandExecution {
            command: command.to_string(),
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        },
        Err(err) => CommandExecution {
            command: command.to_string(),
            success: false,
            exit_code: None,
            stdout: String::new(),
            stderr: err.to_string(),
        },
    };

    if execution.success {
        debug!(label, command, "command succeeded");
    } else {
        let exit = execution
            .exit_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "signal".to_string());
        warn!(
            label,
            exit_code = exit,
            stderr = execution.stderr,
            command,
            "command failed"
        );
    }
    execution
}

pub fn ensure_not_blank(value: &str, label: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(anyhow!("{label} must not be blank"))
    } else {
        Ok(())
    }
}

fn run_shell(command: &str) -> Result<CommandOutput> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .output()
        .with_context(|| format!("failed to spawn shell for command: {command}"))?;

    Ok(CommandOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn execute_records_success_and_failure() {
        let recorder = RecordingRunner::default();
        recorder.fail("false", 1);
        let runner = recorder.runner();

        let ok = execute(&runner, "test", "true");
        assert!(ok.success);
        assert_eq!(ok.exit_code, Some(0));

        let failed = execute(&runner, "test", "false");
        assert!(!failed.success);
        assert_eq!(failed.exit_code, Some(1));
        assert_eq!(failed.stderr, "boom");
        assert_eq!(recorder.seen(), vec!["true", "false"]);
    }

    #[test]
    fn runner_errors_become_failed_executions() {
        let runner: CommandRunner =
            Arc::new(|command: &str| -> Result<CommandOutput> { Err(anyhow!("no shell for {command}")) });
        let execution = execute(&runner, "test", "echo hi");
        assert!(!execution.success);
        assert_eq!(execution.exit_code, None);
        assert!(execution.stderr.contains("no shell"));
    }

    #[test]
    fn blank_commands_are_rejected() {
        assert!(ensure_not_blank("  ", "show command").is_err());
        assert!(ensure_not_blank("xset s off", "show command").is_ok());
    }
}
