use std::process::{Command, ExitStatus};
use std::sync::Arc;

use anyhow::{Context, Result};

#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Result of running one configured shell command.
#[derive(Debug, Clone)]
pub struct CommandExecution {
    pub command: String,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

pub type CommandRunner = Arc<dyn Fn(&str) -> Result<CommandOutput> + Send + Sync>;

pub fn default_runner() -> CommandRunner {
    Arc::new(|command| run_shell(command))
}

pub fn run_shell(command: &str) -> Result<CommandOutput> {
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

/// Run `command` through `runner`, folding spawn failures into the report.
pub fn execute(runner: &CommandRunner, command: &str) -> CommandExecution {
    match runner(command) {
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
    }
}
