//! Double-fork launcher for detached programs

use crate::{LaunchConfig, LaunchError, LaunchId};
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;

use unsafe_linux_process::{safe_spawn_detached, IntermediateExit};

/// Starts shell command lines as processes the caller never owns
#[derive(Debug, Clone)]
pub struct Launcher {
    config: LaunchConfig,
}

impl Launcher {
    /// Create a launcher with the given configuration
    pub fn new(config: LaunchConfig) -> Self {
        Self { config }
    }

    /// Create a launcher using `$SHELL`
    pub fn from_env() -> Self {
        Self::new(LaunchConfig::from_env())
    }

    /// Configuration in use
    pub fn config(&self) -> &LaunchConfig {
        &self.config
    }

    /// Detach `command` and return once the intermediate process is gone.
    ///
    /// Only failures of the launch mechanism are reported. Whether the
    /// command itself can be executed is never observed.
    pub fn try_launch(&self, command: &str) -> Result<LaunchId, LaunchError> {
        let id = LaunchId::new();

        let shell = CString::new(self.config.shell.as_os_str().as_bytes()).map_err(|_| {
            LaunchError::InvalidCommand {
                details: format!("shell path {:?} contains a NUL byte", self.config.shell),
            }
        })?;
        let command_c = CString::new(command).map_err(|_| LaunchError::InvalidCommand {
            details: "command contains a NUL byte".to_string(),
        })?;

        tracing::info!(launch = %id, shell = ?self.config.shell, "Spawn {}", command);

        let result = safe_spawn_detached(&shell, &command_c)?;

        match result.exit {
            IntermediateExit::Detached => {
                tracing::debug!(launch = %id, pid = result.intermediate_pid, "Intermediate process collected");
            }
            IntermediateExit::Collected => {
                tracing::debug!(launch = %id, pid = result.intermediate_pid, "Intermediate process already reaped");
            }
            _ => {}
        }
        check_intermediate_exit(result.exit)?;

        Ok(id)
    }

    /// Detach `command`, logging any failure of the launch mechanism
    pub fn launch(&self, command: &str) {
        if let Err(e) = self.try_launch(command) {
            tracing::error!("Failed to spawn {:?}: {}", command, e);
        }
    }
}

/// Turn the intermediate process outcome into a launch result.
///
/// A status collected elsewhere cannot be inspected and counts as detached.
pub fn check_intermediate_exit(exit: IntermediateExit) -> Result<(), LaunchError> {
    match exit {
        IntermediateExit::Detached | IntermediateExit::Collected => Ok(()),
        IntermediateExit::ForkFailed => Err(LaunchError::ForkFailed {
            stage: "detach".to_string(),
            errno: 0,
        }),
        IntermediateExit::Abnormal { status } => Err(LaunchError::DetachFailed {
            reason: format!("intermediate process ended with wait status {:#x}", status),
        }),
    }
}

impl Default for Launcher {
    fn default() -> Self {
        Self::from_env()
    }
}
