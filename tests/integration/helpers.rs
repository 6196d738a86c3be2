//! Shared helpers: module scripts and a supervisor running on its own thread

use std::fs::{self, Permissions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use kiosk_watch::bus::MemoryBus;
use kiosk_watch::clock::SystemClock;
use kiosk_watch::config::{ConfigModuleSource, ModuleDefinition, WatchConfig};
use kiosk_watch::logging::LogHandle;
use kiosk_watch::presentation::HeadlessPresentation;
use kiosk_watch::process::OsLauncher;
use kiosk_watch::runtime;
use kiosk_watch::supervisor::{Event, Services, Supervisor, SupervisorConfig};
use kiosk_watch::system::{Host, MemoryInfo};

/// Host that never reboots anything.
pub struct NullHost;

impl Host for NullHost {
    fn reboot(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn shutdown(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn process_memory(&mut self, _pid: u32) -> Option<u64> {
        None
    }

    fn system_memory(&mut self) -> Option<MemoryInfo> {
        None
    }
}

/// Write an executable `sh` script into `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("Failed to write script");
    fs::set_permissions(&path, Permissions::from_mode(0o755))
        .expect("Failed to make script executable");
    path
}

/// Autostart module definition with one-second timeouts.
pub fn module(name: &str, file: &Path) -> ModuleDefinition {
    let mut definition = ModuleDefinition::new(name, file.to_string_lossy());
    definition.autostart = true;
    definition.first_ping_timeout = 1;
    definition.kill_timeout = Some(1);
    definition
}

pub fn source(modules: Vec<ModuleDefinition>) -> ConfigModuleSource {
    ConfigModuleSource::from_config(WatchConfig {
        modules,
        ..Default::default()
    })
    .with_default_kill_timeout(1)
}

/// Lines of a file, empty when it does not exist yet.
pub fn lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .map(|content| content.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    condition()
}

/// A supervisor driven by [`runtime::run`] on a background thread.
pub struct RunningSupervisor {
    pub bus: MemoryBus,
    pub events: Sender<Event>,
    handle: JoinHandle<Supervisor>,
}

impl RunningSupervisor {
    pub fn start(source: ConfigModuleSource) -> Self {
        let bus = MemoryBus::new();
        let (events_tx, events_rx) = runtime::channel();

        let services = Services {
            launcher: Box::new(OsLauncher),
            bus: Box::new(bus.clone()),
            presentation: Box::new(HeadlessPresentation::new()),
            host: Box::new(NullHost),
            modules: Box::new(source),
            clock: Box::new(SystemClock),
            log: LogHandle::disabled(),
        };
        let config = SupervisorConfig {
            check_interval: Duration::from_millis(200),
            clock_watch: false,
            kill_grace: Duration::from_millis(500),
        };
        let mut supervisor = Supervisor::new(config, services, events_tx.clone());

        let handle = thread::spawn(move || {
            runtime::run(&mut supervisor, &events_rx);
            supervisor
        });

        Self {
            bus,
            events: events_tx,
            handle,
        }
    }

    /// Wait for the loop to end on its own.
    pub fn join(self) -> Supervisor {
        self.handle.join().expect("supervisor thread panicked")
    }

    /// Ask the supervisor to exit and wait for it.
    pub fn stop(self) -> Supervisor {
        let _ = self.events.send(Event::Terminate);
        self.join()
    }
}
