//! Error types for the process launcher

use unsafe_linux_process::UnsafeLinuxError;

/// Errors raised by the launch mechanism itself.
///
/// Nothing the launched program does after exec is ever reported here.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Invalid command: {details}")]
    InvalidCommand { details: String },

    /// `errno` is 0 when the failing fork ran inside the intermediate process
    #[error("Fork failed during {stage}: errno {errno}")]
    ForkFailed { stage: String, errno: i32 },

    #[error("Detach failed: {reason}")]
    DetachFailed { reason: String },

    #[error("Waiting for intermediate process failed: errno {errno}")]
    WaitFailed { errno: i32 },
}

impl From<UnsafeLinuxError> for LaunchError {
    fn from(error: UnsafeLinuxError) -> Self {
        match error {
            UnsafeLinuxError::SystemCallFailed { syscall, errno } if syscall == "waitpid" => {
                LaunchError::WaitFailed { errno }
            }
            UnsafeLinuxError::SystemCallFailed { syscall, errno } => {
                LaunchError::ForkFailed { stage: syscall, errno }
            }
            UnsafeLinuxError::InvalidParameter { details } => {
                LaunchError::InvalidCommand { details }
            }
            other => LaunchError::DetachFailed {
                reason: other.to_string(),
            },
        }
    }
}

/// Reaper-specific error types
#[derive(Debug, thiserror::Error)]
pub enum ReaperError {
    #[error("Failed to install SIGCHLD handler: {reason}")]
    InstallFailed { reason: String },

    #[error("Reaper has not been installed")]
    NotInstalled,
}

impl From<UnsafeLinuxError> for ReaperError {
    fn from(error: UnsafeLinuxError) -> Self {
        ReaperError::InstallFailed {
            reason: error.to_string(),
        }
    }
}
