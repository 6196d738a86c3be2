//! Status command - reports whether a supervisor is running

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use crate::bus::supervisor_socket_path;
use crate::config::WatchConfig;
use crate::pidfile::{read_pid, running_pid};

/// Execute the status command
pub fn execute(config_path: &Path) -> Result<()> {
    let config = WatchConfig::load(config_path)?;
    let settings = &config.supervisor;

    println!("{}", "Watch Service Status".bold().blue());
    println!("{}", "=".repeat(40));

    match settings.pid_file.as_deref() {
        Some(pid_path) => match (running_pid(pid_path), read_pid(pid_path)) {
            (Some(pid), _) => {
                println!("{} Running (pid {pid})", "✓".green().bold());
            }
            (None, Some(pid)) => {
                println!(
                    "{} Not running (stale pid file, pid {pid})",
                    "✗".red().bold()
                );
            }
            (None, None) => println!("{} Not running", "─".dimmed()),
        },
        None => println!("{} No pid file configured", "─".dimmed()),
    }

    let socket = supervisor_socket_path(&settings.bus_dir);
    if socket.exists() {
        println!("  Bus socket: {}", socket.display());
    } else {
        println!("  Bus socket: {}", "missing".yellow());
    }

    println!("  Modules:    {}", config.modules.len());
    if let Some(log_dir) = &settings.log_dir {
        println!("  Log dir:    {}", log_dir.display());
    }

    println!();
    Ok(())
}
