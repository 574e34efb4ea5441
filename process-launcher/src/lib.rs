//! Process Launcher - detached program launching and child reaping
//!
//! This library starts external programs (terminals, bars, utilities bound to
//! keys) as fully detached processes and keeps the launching process free of
//! zombies by reaping its terminated children on SIGCHLD.

use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

pub use uuid::Uuid;

// Core modules
pub mod error;
pub mod launcher;
pub mod reaper;

// Re-export core types
pub use error::{LaunchError, ReaperError};
pub use launcher::Launcher;
pub use reaper::{ensure_reaper_armed, install_reaper, Reaper};

/// Shell used when `$SHELL` is unset or empty
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Correlation id of a single launch, carried in log records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaunchId(pub Uuid);

impl LaunchId {
    /// Create a new unique launch id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LaunchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LaunchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How launched commands are executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Shell that runs each command as `shell -c command`
    pub shell: PathBuf,
}

impl LaunchConfig {
    /// Create a configuration using the given shell
    pub fn new<P: Into<PathBuf>>(shell: P) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    /// Configuration taken from the `SHELL` environment variable
    pub fn from_env() -> Self {
        Self::new(resolve_shell(std::env::var_os("SHELL")))
    }

    /// Set the shell
    pub fn shell<P: Into<PathBuf>>(mut self, shell: P) -> Self {
        self.shell = shell.into();
        self
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SHELL)
    }
}

/// Pick the shell from a `SHELL` value, falling back to [`DEFAULT_SHELL`]
pub fn resolve_shell(value: Option<OsString>) -> PathBuf {
    match value {
        Some(shell) if !shell.is_empty() => PathBuf::from(shell),
        _ => PathBuf::from(DEFAULT_SHELL),
    }
}

/// Detach `command` using `$SHELL`; failures are logged, never returned
pub fn launch(command: &str) {
    Launcher::from_env().launch(command);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_id_creation() {
        let id1 = LaunchId::new();
        let id2 = LaunchId::new();
        assert_ne!(id1, id2);
        assert_eq!(id1.to_string(), id1.0.to_string());
    }

    #[test]
    fn test_shell_falls_back_when_unset_or_empty() {
        assert_eq!(resolve_shell(None), PathBuf::from("/bin/sh"));
        assert_eq!(resolve_shell(Some(OsString::new())), PathBuf::from("/bin/sh"));
    }

    #[test]
    fn test_shell_taken_from_environment_value() {
        let shell = resolve_shell(Some(OsString::from("/usr/bin/zsh")));
        assert_eq!(shell, PathBuf::from("/usr/bin/zsh"));
    }

    #[test]
    fn test_launch_config_builder() {
        let config = LaunchConfig::default().shell("/bin/bash");
        assert_eq!(config.shell, PathBuf::from("/bin/bash"));
        assert_eq!(LaunchConfig::default().shell, PathBuf::from(DEFAULT_SHELL));
    }
}
