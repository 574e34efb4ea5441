//! Minimal manager loop around the launcher
//!
//! Installs the SIGCHLD reaper, launches every command given on the command
//! line, then keeps launching one command per stdin line until EOF.

use process_launcher::{ensure_reaper_armed, install_reaper, Launcher};
use std::env;
use std::io::{self, BufRead};
use tracing::Level;

const USAGE: &str = "Usage: spawn-detached [--debug][--version][--help] [command]...";

/// Launch one command, first making sure its intermediate will be reaped
fn launch_armed(launcher: &Launcher, command: &str) {
    if let Err(e) = ensure_reaper_armed() {
        tracing::error!("Reaper unavailable: {}", e);
        std::process::exit(1);
    }
    launcher.launch(command);
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();

    let mut debug = false;
    let mut commands = Vec::new();
    for arg in args {
        match arg.as_str() {
            "--debug" => debug = true,
            "--version" => {
                println!("spawn-detached {}", env!("CARGO_PKG_VERSION"));
                return;
            }
            "--help" => {
                println!("{}", USAGE);
                return;
            }
            _ => commands.push(arg),
        }
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(if debug { Level::DEBUG } else { Level::INFO })
        .init();

    let reaper = install_reaper();
    let launcher = Launcher::from_env();
    tracing::debug!("Using shell {:?}", launcher.config().shell);

    for command in &commands {
        launch_armed(&launcher, command);
    }

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Failed to read command: {}", e);
                break;
            }
        };

        let command = line.trim();
        if command.is_empty() {
            continue;
        }

        launch_armed(&launcher, command);
    }

    tracing::info!("Input closed, {} children reaped", reaper.reaped());
}
