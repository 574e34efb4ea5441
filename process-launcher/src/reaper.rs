//! Process reaper system for zombie cleanup
//!
//! The reaper owns the process-wide SIGCHLD disposition. Once installed, the
//! handler stays armed for the lifetime of the process and drains every
//! terminated direct child on each delivery, so coalesced notifications never
//! leave zombies behind.

use crate::error::ReaperError;
use std::sync::OnceLock;

use unsafe_linux_process::{
    safe_child_reaper_installed, safe_install_child_reaper, safe_reap_children,
    safe_reaped_count,
};

static REAPER: OnceLock<Reaper> = OnceLock::new();

/// Handle on the installed SIGCHLD reaper
#[derive(Debug)]
pub struct Reaper {
    _private: (),
}

impl Reaper {
    /// Install the reaper, or return the already installed instance
    pub fn install() -> Result<&'static Reaper, ReaperError> {
        if let Some(reaper) = REAPER.get() {
            return Ok(reaper);
        }

        safe_install_child_reaper()?;
        tracing::info!("SIGCHLD reaper installed");

        Ok(REAPER.get_or_init(|| Reaper { _private: () }))
    }

    /// The installed reaper, if any
    pub fn get() -> Option<&'static Reaper> {
        REAPER.get()
    }

    /// Re-apply the SIGCHLD disposition
    pub fn rearm(&self) -> Result<(), ReaperError> {
        safe_install_child_reaper()?;
        tracing::debug!("SIGCHLD reaper re-armed");
        Ok(())
    }

    /// Whether SIGCHLD is still routed to the reaper
    pub fn is_armed(&self) -> bool {
        safe_child_reaper_installed()
    }

    /// Re-arm only if something replaced the disposition
    pub fn ensure_armed(&self) -> Result<(), ReaperError> {
        if self.is_armed() {
            return Ok(());
        }

        tracing::warn!("SIGCHLD disposition was replaced, re-arming reaper");
        self.rearm()
    }

    /// Drain terminated children from ordinary context
    pub fn drain(&self) -> usize {
        let reaped = safe_reap_children();
        if reaped > 0 {
            tracing::debug!("Reaped {} children outside the signal handler", reaped);
        }
        reaped
    }

    /// Children reclaimed since installation
    pub fn reaped(&self) -> usize {
        safe_reaped_count()
    }
}

/// Arm SIGCHLD reaping for the rest of the process lifetime.
///
/// A manager that cannot reap its children is not safe to keep running, so
/// failure terminates the process.
pub fn install_reaper() -> &'static Reaper {
    match Reaper::install() {
        Ok(reaper) => reaper,
        Err(e) => {
            tracing::error!("Can't install SIGCHLD handler: {}", e);
            std::process::exit(1);
        }
    }
}

/// Ensure the installed reaper is still armed, terminating the process if it
/// cannot be restored.
pub fn ensure_reaper_armed() -> Result<(), ReaperError> {
    let reaper = Reaper::get().ok_or(ReaperError::NotInstalled)?;
    if let Err(e) = reaper.ensure_armed() {
        tracing::error!("Can't re-arm SIGCHLD handler: {}", e);
        std::process::exit(1);
    }
    Ok(())
}
