use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Result, anyhow};
use tracing::{debug, info, warn};

use crate::config::DisplaySwitchOptions;
use crate::platform::shell::{CommandExecution, CommandRunner, default_runner, execute};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// A once or weekly event is playing.
    Event,
    /// The standard playlist is playing.
    Standard,
}

/// Fires the configured shell command whenever playback changes between event and standard mode.
#[derive(Debug, Clone)]
pub struct DisplaySwitch {
    inner: Arc<DisplaySwitchInner>,
}

struct DisplaySwitchInner {
    event_command: Option<String>,
    standard_command: Option<String>,
    runner: CommandRunner,
    current: Mutex<Option<DisplayMode>>,
}

impl fmt::Debug for DisplaySwitchInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplaySwitchInner")
            .field("event_command", &self.event_command)
            .field("standard_command", &self.standard_command)
            .field(
                "current",
                &*self.current.lock().unwrap_or_else(PoisonError::into_inner),
            )
            .finish()
    }
}

impl DisplaySwitch {
    pub fn new(options: DisplaySwitchOptions) -> Result<Self> {
        Self::build(options, default_runner())
    }

    fn build(options: DisplaySwitchOptions, runner: CommandRunner) -> Result<Self> {
        let DisplaySwitchOptions {
            event_command,
            standard_command,
        } = options;
        if event_command.is_none() && standard_command.is_none() {
            return Err(anyhow!(
                "display-switch must configure an event-command or a standard-command"
            ));
        }
        for (cmd, label) in [
            (&event_command, "event-command"),
            (&standard_command, "standard-command"),
        ] {
            if let Some(cmd) = cmd {
                ensure_not_blank(cmd, label)?;
            }
        }
        Ok(Self {
            inner: Arc::new(DisplaySwitchInner {
                event_command,
                standard_command,
                runner,
                current: Mutex::new(None),
            }),
        })
    }

    #[cfg(test)]
    fn with_runner(options: DisplaySwitchOptions, runner: CommandRunner) -> Result<Self> {
        Self::build(options, runner)
    }

    /// Switch to `mode` unless it is already active. Blocks on the shell command.
    ///
    /// Returns the command report when a command ran.
    pub fn apply(&self, mode: DisplayMode) -> Option<CommandExecution> {
        {
            let mut current = self
                .inner
                .current
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *current == Some(mode) {
                return None;
            }
            *current = Some(mode);
        }

        let command = match mode {
            DisplayMode::Event => self.inner.event_command.as_deref(),
            DisplayMode::Standard => self.inner.standard_command.as_deref(),
        };
        let Some(command) = command else {
            debug!(?mode, "no display switch command configured for mode");
            return None;
        };

        let execution = execute(&self.inner.runner, command);
        if execution.success {
            info!(?mode, command, "display switch succeeded");
        } else {
            let exit = execution
                .exit_code
                .map(|code| code.to_string())
                .unwrap_or_else(|| "signal".to_string());
            warn!(
                ?mode,
                exit_code = exit,
                stderr = execution.stderr,
                command,
                "display switch failed"
            );
        }
        Some(execution)
    }
}

fn ensure_not_blank(value: &str, label: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(anyhow!("{label} must not be blank"))
    } else {
        Ok(())
    }
}
