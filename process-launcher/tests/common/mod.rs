//! Common test utilities for launcher and reaper tests

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use uuid::Uuid;

/// Initialize tracing for tests (idempotent)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}

/// Shell used by tests, independent of the caller's `$SHELL`
pub const TEST_SHELL: &str = "/bin/sh";

/// A unique scratch path in the system temp directory
pub fn unique_temp_path(prefix: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{}_{}", prefix, Uuid::new_v4()))
}

/// Process state and parent pid read from `/proc/<pid>/stat`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcStat {
    pub pid: u32,
    pub state: char,
    pub ppid: u32,
}

/// Parse `/proc/<pid>/stat`; `None` once the process is fully gone
pub fn read_proc_stat(pid: u32) -> Option<ProcStat> {
    let content = fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    // comm may contain spaces and parentheses, so split after the last ')'
    let rest = &content[content.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let state = fields.next()?.chars().next()?;
    let ppid = fields.next()?.parse().ok()?;
    Some(ProcStat { pid, state, ppid })
}

/// All processes whose parent is `parent`
pub fn children_of(parent: u32) -> Vec<ProcStat> {
    let Ok(entries) = fs::read_dir("/proc") else {
        return Vec::new();
    };

    entries
        .flatten()
        .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
        .filter_map(read_proc_stat)
        .filter(|stat| stat.ppid == parent)
        .collect()
}

/// Zombie children of the current test process
pub fn own_zombies() -> Vec<ProcStat> {
    children_of(std::process::id())
        .into_iter()
        .filter(|stat| stat.state == 'Z')
        .collect()
}

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(20));
    }
}

/// Wait for a detached shell to write its pid into `path`
pub fn wait_for_pid_file(path: &Path, timeout: Duration) -> Option<u32> {
    let mut pid = None;
    wait_until(timeout, || {
        pid = fs::read_to_string(path)
            .ok()
            .and_then(|content| content.trim().parse::<u32>().ok());
        pid.is_some()
    });
    pid
}

/// Remove a scratch file, ignoring errors
pub fn cleanup_test_file(path: &Path) {
    let _ = fs::remove_file(path);
}
