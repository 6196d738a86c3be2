//! Check command - validates the configuration and prints the module table

use std::path::Path;

use anyhow::{bail, Result};
use chrono::Utc;
use colored::Colorize;

use crate::config::{default_kill_timeout, executable_dir, WatchConfig};
use crate::system::cpu_speed_mhz;

/// Execute the check command
pub fn execute(config_path: &Path) -> Result<()> {
    let config = WatchConfig::load(config_path)?;
    let kill_timeout = default_kill_timeout(cpu_speed_mhz());
    let records = config.build_records(&executable_dir(), kill_timeout, None, Utc::now());

    if records.is_empty() {
        bail!("No modules configured in {}", config_path.display());
    }

    println!("{}", "Watch Service Modules".bold().blue());
    println!("{}", "=".repeat(40));
    println!(
        "  check interval {} ms, default kill timeout {kill_timeout} sec",
        config.supervisor.check_interval().as_millis()
    );
    println!();

    let mut missing = 0;
    for record in records.values() {
        let marker = if record.executable.exists() {
            "✓".green().bold()
        } else {
            missing += 1;
            "✗".red().bold()
        };

        println!("{marker} {}", record.name.bold());
        println!("    file:      {}", record.executable.display());
        if let Some(dir) = &record.working_directory {
            println!("    directory: {}", dir.display());
        }
        println!(
            "    mode {}, autostart {}, gui {}",
            record.start_mode, record.auto_start, record.gui
        );
        println!(
            "    priority {}, close priority {}, max starts {}",
            record.start_priority, record.close_priority, record.max_start_count
        );
        println!(
            "    first ping {} sec, kill timeout {} sec, after start {} ms",
            record.first_ping_timeout_base_secs,
            record.kill_timeout_secs,
            record.after_start_delay.as_millis()
        );
    }

    println!();
    if missing > 0 {
        println!(
            "{} {missing} module executable(s) not found",
            "─".dimmed()
        );
    } else {
        println!("{} Configuration is valid", "✓".green().bold());
    }
    Ok(())
}
