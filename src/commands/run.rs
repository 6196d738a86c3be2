//! Run command - supervises the configured modules until told to stop

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

use crate::bus::SocketBusConnector;
use crate::clock::SystemClock;
use crate::config::{default_kill_timeout, parse_module_option, ConfigModuleSource, WatchConfig};
use crate::logging;
use crate::pidfile::PidFile;
use crate::presentation::HeadlessPresentation;
use crate::process::OsLauncher;
use crate::runtime;
use crate::supervisor::{Services, Supervisor, SupervisorConfig};
use crate::system::{cpu_speed_mhz, OsHost};

/// Execute the run command
/// Usage: kiosk-watch run [-c FILE] [--module-options NAME=ARGS]...
pub fn execute(config_path: &Path, module_options: &[String]) -> Result<()> {
    let config = WatchConfig::load(config_path)?;
    let settings = config.supervisor;

    let log = logging::init(settings.log_dir.as_deref())?;

    let _pid_file = settings
        .pid_file
        .as_deref()
        .map(PidFile::acquire)
        .transpose()?;

    let launch_args = module_options
        .iter()
        .map(|raw| parse_module_option(raw))
        .collect::<Result<HashMap<_, _>>>()
        .context("Invalid --module-options")?;

    let cpu_mhz = cpu_speed_mhz();
    let kill_timeout = default_kill_timeout(cpu_mhz);
    tracing::info!(
        "Watch service starting (cpu {} MHz, default kill timeout {kill_timeout} sec).",
        cpu_mhz.map_or_else(|| "unknown".to_string(), |mhz| mhz.to_string())
    );

    let source = ConfigModuleSource::from_file(config_path)
        .with_launch_args(launch_args)
        .with_default_kill_timeout(kill_timeout);

    let (events_tx, events_rx) = runtime::channel();
    runtime::install_signal_handler(events_tx.clone())?;

    let services = Services {
        launcher: Box::new(OsLauncher),
        bus: Box::new(SocketBusConnector::new(settings.bus_dir.clone())),
        presentation: Box::new(HeadlessPresentation::new()),
        host: Box::new(OsHost::new()),
        modules: Box::new(source),
        clock: Box::new(SystemClock),
        log,
    };

    let supervisor_config = SupervisorConfig::from_settings(&settings);
    let mut supervisor = Supervisor::new(supervisor_config, services, events_tx);
    runtime::run(&mut supervisor, &events_rx);
    Ok(())
}
