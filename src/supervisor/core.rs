//! Supervisor state, construction and (re)initialization.

use std::collections::BTreeMap;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::bus::{Bus, BusConnector, BusMessage};
use crate::clock::{Clock, ClockWatcher};
use crate::config::{ModuleSource, SupervisorSettings};
use crate::logging::LogHandle;
use crate::models::constants::{
    CHECK_INTERVAL_MS, KILL_GRACE_PERIOD_MS, MEMORY_REPORT_INTERVAL_SECS,
    REINITIALIZE_FAIL_MAX_COUNT, REINITIALIZE_TIMEOUT_MS,
};
use crate::models::ModuleRecord;
use crate::presentation::PresentationSink;
use crate::process::ProcessLauncher;
use crate::system::Host;

use super::{CloseAction, Event, Scheduler, Timer};

/// Configuration for the supervisor
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Interval between reconcile ticks.
    pub check_interval: Duration,
    /// Run a [`ClockWatcher`] while the bus is up.
    pub clock_watch: bool,
    /// Time between SIGTERM and SIGKILL when a module is killed.
    pub kill_grace: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_millis(CHECK_INTERVAL_MS),
            clock_watch: true,
            kill_grace: Duration::from_millis(KILL_GRACE_PERIOD_MS),
        }
    }
}

impl SupervisorConfig {
    pub fn from_settings(settings: &SupervisorSettings) -> Self {
        Self {
            check_interval: settings.check_interval(),
            clock_watch: settings.clock_watch,
            ..Default::default()
        }
    }
}

/// Collaborators the supervisor drives. Each one is a seam for tests.
pub struct Services {
    pub launcher: Box<dyn ProcessLauncher>,
    pub bus: Box<dyn BusConnector>,
    pub presentation: Box<dyn PresentationSink>,
    pub host: Box<dyn Host>,
    pub modules: Box<dyn ModuleSource>,
    pub clock: Box<dyn Clock>,
    pub log: LogHandle,
}

/// The watch service engine.
///
/// Owns the module table and every piece of mutable state. All entry points
/// take `&mut self`, so events, timers and exit reaping are serialized by
/// whoever drives it (see [`crate::runtime::run`]).
pub struct Supervisor {
    pub(super) config: SupervisorConfig,
    pub(super) launcher: Box<dyn ProcessLauncher>,
    pub(super) connector: Box<dyn BusConnector>,
    pub(super) presentation: Box<dyn PresentationSink>,
    pub(super) host: Box<dyn Host>,
    pub(super) source: Box<dyn ModuleSource>,
    pub(super) clock: Box<dyn Clock>,
    pub(super) log: LogHandle,
    pub(super) events: Sender<Event>,

    pub(super) modules: BTreeMap<String, ModuleRecord>,
    pub(super) bus: Option<Box<dyn Bus>>,
    pub(super) clock_watcher: Option<ClockWatcher>,
    pub(super) timers: Scheduler,
    pub(super) close_action: CloseAction,
    pub(super) first_run: bool,
    pub(super) restart_params: String,
    pub(super) init_failures: u32,
    pub(super) screen_protection: bool,
    pub(super) clicks: String,
    pub(super) exit_requested: bool,
}

impl Supervisor {
    /// `events` is the sending half of the channel the runtime drains; the
    /// bus, the clock watcher and the presentation deliver into it.
    pub fn new(config: SupervisorConfig, services: Services, events: Sender<Event>) -> Self {
        Self {
            config,
            launcher: services.launcher,
            connector: services.bus,
            presentation: services.presentation,
            host: services.host,
            source: services.modules,
            clock: services.clock,
            log: services.log,
            events,
            modules: BTreeMap::new(),
            bus: None,
            clock_watcher: None,
            timers: Scheduler::new(),
            close_action: CloseAction::None,
            first_run: true,
            restart_params: String::new(),
            init_failures: 0,
            screen_protection: true,
            clicks: String::new(),
            exit_requested: false,
        }
    }

    pub(super) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(super) fn instant(&self) -> Instant {
        self.clock.monotonic()
    }

    /// Load the module table and bring up the bus.
    ///
    /// A bus failure is retried every 7 seconds; after 85 consecutive
    /// failures the host is rebooted.
    pub fn initialize(&mut self) {
        self.presentation.unprotect();
        self.presentation.connect_clicks(self.events.clone());

        let now = self.now();
        self.modules = match self.source.load(self.first_run, now) {
            Ok(modules) => modules,
            Err(e) => {
                tracing::error!("Failed to load module configuration: {e:#}");
                BTreeMap::new()
            }
        };

        if self.modules.is_empty() {
            tracing::error!("Module list is empty, it is nothing to watch.");
            return;
        }

        if !self.restart_params.is_empty() {
            for record in self.modules.values_mut() {
                record.params = self.restart_params.clone();
            }
        }

        match self.connector.connect(self.events.clone()) {
            Ok(bus) => {
                self.bus = Some(bus);
                self.schedule_repeating(Timer::Tick, self.config.check_interval);
                self.schedule_repeating(
                    Timer::MemoryReport,
                    Duration::from_secs(MEMORY_REPORT_INTERVAL_SECS),
                );
                self.first_run = false;

                if self.config.clock_watch {
                    match ClockWatcher::start(self.events.clone()) {
                        Ok(watcher) => self.clock_watcher = Some(watcher),
                        Err(e) => tracing::warn!("Failed to start clock watcher: {e}"),
                    }
                }

                self.restart_params.clear();
                self.init_failures = 0;
                tracing::info!(
                    "Watch service initialized with {} module(s).",
                    self.modules.len()
                );
            }
            Err(e) => {
                tracing::error!("Cannot init service server: {e}");

                if self.init_failures >= REINITIALIZE_FAIL_MAX_COUNT {
                    tracing::error!("Reinitialize fail counter reached. Reboot system.");
                    self.do_reboot();
                } else {
                    self.schedule_once(
                        Timer::Reinitialize,
                        Duration::from_millis(REINITIALIZE_TIMEOUT_MS),
                    );
                    self.init_failures += 1;
                }
            }
        }
    }

    /// Tear down the bus, the clock watcher and the periodic timers, then
    /// initialize again with a freshly loaded module table.
    pub fn reinitialize(&mut self) {
        tracing::info!("Reinitialize...");

        self.timers.cancel(Timer::Tick);
        self.timers.cancel(Timer::MemoryReport);
        self.clock_watcher = None;
        if let Some(mut bus) = self.bus.take() {
            bus.stop();
        }

        self.reap_exited();
        let grace = self.config.kill_grace;
        for record in self.modules.values_mut() {
            if record.is_running() {
                tracing::warn!(
                    "Module {} is still running on reinitialize, killing it.",
                    record.name
                );
                record.kill(grace);
            }
        }

        self.initialize();
    }

    /// Final teardown once the runtime stops.
    pub fn stop(&mut self) {
        self.timers.clear();
        self.clock_watcher = None;
        if let Some(mut bus) = self.bus.take() {
            bus.stop();
        }
    }

    pub(super) fn publish(&mut self, message: BusMessage) {
        match self.bus.as_mut() {
            Some(bus) => {
                if let Err(e) = bus.publish(&message) {
                    tracing::warn!("Failed to publish '{message}': {e}");
                }
            }
            None => tracing::debug!("Bus is down, dropping '{message}'"),
        }
    }

    pub fn modules(&self) -> &BTreeMap<String, ModuleRecord> {
        &self.modules
    }

    pub fn module(&self, name: &str) -> Option<&ModuleRecord> {
        self.modules.get(name)
    }

    pub fn module_mut(&mut self, name: &str) -> Option<&mut ModuleRecord> {
        self.modules.get_mut(name)
    }

    pub fn close_action(&self) -> CloseAction {
        self.close_action
    }

    pub fn is_bus_connected(&self) -> bool {
        self.bus.is_some()
    }

    pub fn init_failures(&self) -> u32 {
        self.init_failures
    }

    pub fn screen_protection_enabled(&self) -> bool {
        self.screen_protection
    }

    pub fn click_sequence(&self) -> &str {
        &self.clicks
    }

    /// Set once an `exit`, `reboot` or `shutdown` close has completed.
    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }
}
