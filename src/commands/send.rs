//! Send command - delivers one message to a running supervisor

use std::path::Path;

use anyhow::{bail, Context, Result};
use colored::Colorize;

use crate::bus::message::{KEY_MODULE, KEY_PARAMS, KEY_SENDER, KEY_TYPE};
use crate::bus::{send_to_supervisor, BusMessage};
use crate::config::WatchConfig;
use crate::supervisor::Command;

/// Sender name used when none is given on the command line.
pub const DEFAULT_SENDER: &str = "operator";

/// Build the wire message for `kind`.
///
/// `start_module` and `close_module` need a target module.
pub fn build_message(
    kind: &str,
    module: Option<&str>,
    params: Option<&str>,
    sender: &str,
) -> Result<BusMessage> {
    let command: Command = kind.parse().map_err(anyhow::Error::msg)?;

    if matches!(command, Command::StartModule | Command::CloseModule) && module.is_none() {
        bail!("'{command}' needs --module");
    }

    let mut message = BusMessage::new()
        .with(KEY_SENDER, sender)
        .with(KEY_TYPE, command.as_str());
    if let Some(module) = module {
        message = message.with(KEY_MODULE, module);
    }
    if let Some(params) = params {
        message = message.with(KEY_PARAMS, params);
    }
    Ok(message)
}

/// Execute the send command
/// Usage: kiosk-watch send TYPE [--module NAME] [--params TEXT] [--sender NAME]
pub fn execute(
    config_path: &Path,
    kind: &str,
    module: Option<&str>,
    params: Option<&str>,
    sender: &str,
) -> Result<()> {
    let config = WatchConfig::load(config_path)?;
    let message = build_message(kind, module, params, sender)?;

    send_to_supervisor(&config.supervisor.bus_dir, &message).with_context(|| {
        format!(
            "Failed to reach the watch service in {}",
            config.supervisor.bus_dir.display()
        )
    })?;

    println!("{} Sent {}", "✓".green().bold(), message.to_string().cyan());
    Ok(())
}
