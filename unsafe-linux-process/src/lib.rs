//! Unsafe Linux process operations with safe wrappers
//!
//! This crate contains every raw system call used to detach programs and to
//! reap terminated children. Callers only see safe functions; the forked
//! children and the SIGCHLD handler below restrict themselves to
//! async-signal-safe calls.

#[cfg(target_os = "linux")]
use std::ffi::CStr;
#[cfg(target_os = "linux")]
use std::io;
#[cfg(target_os = "linux")]
use std::sync::atomic::{AtomicUsize, Ordering};

/// Exit status of the intermediate process when its second fork failed.
pub const EXIT_DETACH_FORK_FAILED: i32 = 71;

/// Exit status of the grandchild when the shell could not be executed.
pub const EXIT_EXEC_FAILED: i32 = 127;

/// Errors that can occur during unsafe Linux operations
#[derive(Debug, thiserror::Error)]
pub enum UnsafeLinuxError {
    #[error("System call failed: {syscall}: {errno}")]
    SystemCallFailed { syscall: String, errno: i32 },

    #[error("Invalid parameter: {details}")]
    InvalidParameter { details: String },

    #[error("Process not found")]
    ProcessNotFound,

    #[error("Permission denied: {operation}")]
    PermissionDenied { operation: String },
}

/// What the manager learned from collecting the intermediate process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntermediateExit {
    /// Intermediate exited normally after forking the target
    Detached,
    /// Intermediate could not fork the target
    ForkFailed,
    /// Status was already collected elsewhere (typically by the reaper)
    Collected,
    /// Intermediate died some other way (signal or unexpected status)
    Abnormal { status: i32 },
}

/// Result of a double-fork detach
#[derive(Debug, Clone, Copy)]
pub struct DetachResult {
    /// Pid of the intermediate process (already gone when this is returned)
    pub intermediate_pid: u32,
    /// How the intermediate process ended
    pub exit: IntermediateExit,
}

#[cfg(target_os = "linux")]
static REAPED_CHILDREN: AtomicUsize = AtomicUsize::new(0);

#[cfg(target_os = "linux")]
fn last_errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

#[cfg(target_os = "linux")]
fn syscall_failed(syscall: &str) -> UnsafeLinuxError {
    UnsafeLinuxError::SystemCallFailed {
        syscall: syscall.to_string(),
        errno: last_errno(),
    }
}

/// Detach `shell -c command` into a new session via double fork.
///
/// Blocks only until the intermediate process has exited. The target process
/// is reparented to init and never becomes a child of the caller.
#[cfg(target_os = "linux")]
pub fn safe_spawn_detached(shell: &CStr, command: &CStr) -> Result<DetachResult, UnsafeLinuxError> {
    if shell.to_bytes().is_empty() {
        return Err(UnsafeLinuxError::InvalidParameter {
            details: "Shell path cannot be empty".to_string(),
        });
    }

    // Everything the children touch is prepared before forking.
    let argv: [*const libc::c_char; 4] = [
        shell.as_ptr(),
        c"-c".as_ptr(),
        command.as_ptr(),
        std::ptr::null(),
    ];

    // Keep this thread's SIGCHLD pending until the intermediate status is
    // ours, so an armed reaper on this thread cannot collect it first.
    let previous_mask = block_child_signal()?;

    let pid = unsafe { libc::fork() };

    if pid == -1 {
        let error = syscall_failed("fork");
        restore_signal_mask(&previous_mask);
        return Err(error);
    }

    if pid == 0 {
        unsafe { detach_and_exec(&argv) }
    }

    let exit = wait_for_intermediate(pid);
    restore_signal_mask(&previous_mask);

    Ok(DetachResult {
        intermediate_pid: pid as u32,
        exit: exit?,
    })
}

#[cfg(target_os = "linux")]
fn block_child_signal() -> Result<libc::sigset_t, UnsafeLinuxError> {
    unsafe {
        let mut blocked: libc::sigset_t = std::mem::zeroed();
        let mut previous: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut blocked);
        libc::sigaddset(&mut blocked, libc::SIGCHLD);

        let result = libc::pthread_sigmask(libc::SIG_BLOCK, &blocked, &mut previous);
        if result != 0 {
            return Err(UnsafeLinuxError::SystemCallFailed {
                syscall: "pthread_sigmask(SIG_BLOCK)".to_string(),
                errno: result,
            });
        }
        Ok(previous)
    }
}

#[cfg(target_os = "linux")]
fn restore_signal_mask(previous: &libc::sigset_t) {
    unsafe {
        libc::pthread_sigmask(libc::SIG_SETMASK, previous, std::ptr::null_mut());
    }
}

/// Whether SIGCHLD is blocked in the calling thread
#[cfg(target_os = "linux")]
pub fn safe_child_signal_blocked() -> bool {
    unsafe {
        let mut current: libc::sigset_t = std::mem::zeroed();
        libc::pthread_sigmask(libc::SIG_BLOCK, std::ptr::null(), &mut current);
        libc::sigismember(&current, libc::SIGCHLD) == 1
    }
}

/// Body of the intermediate process. Never returns.
#[cfg(target_os = "linux")]
unsafe fn detach_and_exec(argv: &[*const libc::c_char; 4]) -> ! {
    // Fresh fork is never a group leader, so this cannot fail in practice.
    libc::setsid();

    let mut empty: libc::sigset_t = std::mem::zeroed();
    libc::sigemptyset(&mut empty);
    libc::sigprocmask(libc::SIG_SETMASK, &empty, std::ptr::null_mut());

    // The Rust runtime ignores SIGPIPE and ignored dispositions survive exec.
    let mut default_action: libc::sigaction = std::mem::zeroed();
    default_action.sa_sigaction = libc::SIG_DFL;
    libc::sigaction(libc::SIGPIPE, &default_action, std::ptr::null_mut());

    match libc::fork() {
        -1 => libc::_exit(EXIT_DETACH_FORK_FAILED),
        0 => {
            libc::execv(argv[0], argv.as_ptr());
            libc::_exit(EXIT_EXEC_FAILED)
        }
        _ => libc::_exit(0),
    }
}

#[cfg(target_os = "linux")]
fn wait_for_intermediate(pid: libc::pid_t) -> Result<IntermediateExit, UnsafeLinuxError> {
    let mut status: libc::c_int = 0;

    loop {
        let result = unsafe { libc::waitpid(pid, &mut status, 0) };
        if result == pid {
            break;
        }

        match last_errno() {
            libc::EINTR => continue,
            libc::ECHILD => return Ok(IntermediateExit::Collected),
            errno => {
                return Err(UnsafeLinuxError::SystemCallFailed {
                    syscall: "waitpid".to_string(),
                    errno,
                })
            }
        }
    }

    Ok(decode_intermediate_status(status))
}

/// Classify the wait status of the intermediate process
#[cfg(target_os = "linux")]
pub fn decode_intermediate_status(status: libc::c_int) -> IntermediateExit {
    if libc::WIFEXITED(status) {
        match libc::WEXITSTATUS(status) {
            0 => IntermediateExit::Detached,
            EXIT_DETACH_FORK_FAILED => IntermediateExit::ForkFailed,
            _ => IntermediateExit::Abnormal { status },
        }
    } else {
        IntermediateExit::Abnormal { status }
    }
}

/// Collect every terminated child without blocking. Returns how many were reaped.
///
/// Safe to call from a signal handler: only `waitpid` and atomics are used.
#[cfg(target_os = "linux")]
pub fn safe_reap_children() -> usize {
    let mut reaped = 0;
    while unsafe { libc::waitpid(-1, std::ptr::null_mut(), libc::WNOHANG) } > 0 {
        reaped += 1;
    }
    if reaped > 0 {
        REAPED_CHILDREN.fetch_add(reaped, Ordering::Relaxed);
    }
    reaped
}

/// Total number of children collected through [`safe_reap_children`]
#[cfg(target_os = "linux")]
pub fn safe_reaped_count() -> usize {
    REAPED_CHILDREN.load(Ordering::Relaxed)
}

#[cfg(target_os = "linux")]
extern "C" fn on_child_exit(_signal: libc::c_int) {
    unsafe {
        let errno = *libc::__errno_location();
        safe_reap_children();
        *libc::__errno_location() = errno;
    }
}

/// Install the persistent SIGCHLD handler that drains terminated children.
///
/// The disposition stays in place across deliveries, so calling this again
/// only re-applies the same handler.
#[cfg(target_os = "linux")]
pub fn safe_install_child_reaper() -> Result<(), UnsafeLinuxError> {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = on_child_exit as extern "C" fn(libc::c_int) as libc::sighandler_t;
        action.sa_flags = libc::SA_RESTART | libc::SA_NOCLDSTOP;
        libc::sigemptyset(&mut action.sa_mask);

        if libc::sigaction(libc::SIGCHLD, &action, std::ptr::null_mut()) == -1 {
            return Err(syscall_failed("sigaction(SIGCHLD)"));
        }
    }

    // Children that died before the handler existed would otherwise linger.
    safe_reap_children();

    Ok(())
}

/// Check whether the current SIGCHLD disposition is the reaper's handler
#[cfg(target_os = "linux")]
pub fn safe_child_reaper_installed() -> bool {
    unsafe {
        let mut current: libc::sigaction = std::mem::zeroed();
        if libc::sigaction(libc::SIGCHLD, std::ptr::null(), &mut current) == -1 {
            return false;
        }
        current.sa_sigaction == on_child_exit as extern "C" fn(libc::c_int) as libc::sighandler_t
    }
}

/// Safely check if a process is alive.
///
/// A zombie still counts as alive until its parent reaps it.
#[cfg(target_os = "linux")]
pub fn safe_is_process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

/// Safely get the session id of a process (0 = the calling process)
#[cfg(target_os = "linux")]
pub fn safe_get_session_id(pid: u32) -> Result<i32, UnsafeLinuxError> {
    let sid = unsafe { libc::getsid(pid as libc::pid_t) };
    if sid == -1 {
        return match last_errno() {
            libc::ESRCH => Err(UnsafeLinuxError::ProcessNotFound),
            libc::EPERM => Err(UnsafeLinuxError::PermissionDenied {
                operation: format!("getsid({})", pid),
            }),
            errno => Err(UnsafeLinuxError::SystemCallFailed {
                syscall: "getsid".to_string(),
                errno,
            }),
        };
    }
    Ok(sid)
}

/// Safely send SIGKILL to a process
#[cfg(target_os = "linux")]
pub fn safe_force_kill_process(pid: u32) -> Result<(), UnsafeLinuxError> {
    let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) };

    if result == -1 {
        let errno = last_errno();
        if errno == libc::ESRCH {
            // Process doesn't exist, which is fine
            return Ok(());
        }
        return Err(UnsafeLinuxError::SystemCallFailed {
            syscall: "kill(SIGKILL)".to_string(),
            errno,
        });
    }

    Ok(())
}

// Provide stub implementations for non-Linux platforms
#[cfg(not(target_os = "linux"))]
fn unsupported(operation: &str) -> UnsafeLinuxError {
    UnsafeLinuxError::SystemCallFailed {
        syscall: format!("{} (unsupported platform)", operation),
        errno: 0,
    }
}

#[cfg(not(target_os = "linux"))]
pub fn safe_spawn_detached(
    _shell: &std::ffi::CStr,
    _command: &std::ffi::CStr,
) -> Result<DetachResult, UnsafeLinuxError> {
    Err(unsupported("fork"))
}

#[cfg(not(target_os = "linux"))]
pub fn safe_child_signal_blocked() -> bool {
    false
}

#[cfg(not(target_os = "linux"))]
pub fn safe_reap_children() -> usize {
    0
}

#[cfg(not(target_os = "linux"))]
pub fn safe_reaped_count() -> usize {
    0
}

#[cfg(not(target_os = "linux"))]
pub fn safe_install_child_reaper() -> Result<(), UnsafeLinuxError> {
    Err(unsupported("sigaction(SIGCHLD)"))
}

#[cfg(not(target_os = "linux"))]
pub fn safe_child_reaper_installed() -> bool {
    false
}

#[cfg(not(target_os = "linux"))]
pub fn safe_is_process_alive(_pid: u32) -> bool {
    false
}

#[cfg(not(target_os = "linux"))]
pub fn safe_get_session_id(_pid: u32) -> Result<i32, UnsafeLinuxError> {
    Err(unsupported("getsid"))
}

#[cfg(not(target_os = "linux"))]
pub fn safe_force_kill_process(_pid: u32) -> Result<(), UnsafeLinuxError> {
    Err(unsupported("kill(SIGKILL)"))
}
