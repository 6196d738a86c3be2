use std::collections::HashMap;
use std::fs;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use super::*;
use crate::bus::MemoryBus;
use crate::clock::ManualClock;
use crate::config::{ConfigModuleSource, ModuleDefinition, SupervisorSettings, WatchConfig};
use crate::error::SpawnError;
use crate::logging::LogHandle;
use crate::models::{ModuleRecord, StartMode};
use crate::presentation::{HeadlessPresentation, PresentationSink};
use crate::process::{LaunchSpec, ProcessExit, ProcessHandle, ProcessLauncher};
use crate::system::{Host, MemoryInfo};

const FAKE_PID: u32 = 4242;

#[derive(Debug, Default)]
struct FakeProc {
    running: bool,
    pending_exit: Option<ProcessExit>,
    starts: u32,
    kills: u32,
    fail_spawn: bool,
    unkillable: bool,
    last_spec: Option<LaunchSpec>,
    started_at: Option<Instant>,
}

/// Process table shared between the test and every fake handle.
#[derive(Debug, Clone, Default)]
struct FakeWorld {
    procs: Arc<Mutex<HashMap<String, FakeProc>>>,
}

impl FakeWorld {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, FakeProc>> {
        self.procs.lock().unwrap()
    }

    fn starts(&self, name: &str) -> u32 {
        self.lock().get(name).map_or(0, |p| p.starts)
    }

    fn kills(&self, name: &str) -> u32 {
        self.lock().get(name).map_or(0, |p| p.kills)
    }

    fn running(&self, name: &str) -> bool {
        self.lock().get(name).is_some_and(|p| p.running)
    }

    fn started_at(&self, name: &str) -> Option<Instant> {
        self.lock().get(name).and_then(|p| p.started_at)
    }

    fn last_spec(&self, name: &str) -> Option<LaunchSpec> {
        self.lock().get(name).and_then(|p| p.last_spec.clone())
    }

    /// The process ends on its own.
    fn exit(&self, name: &str, code: i32) {
        let mut procs = self.lock();
        let proc = procs.entry(name.to_string()).or_default();
        proc.running = false;
        proc.pending_exit = Some(ProcessExit::exited(code));
    }

    /// Kill attempts fail and the process keeps running.
    fn unkillable(&self, name: &str) {
        self.lock().entry(name.to_string()).or_default().unkillable = true;
    }

    fn fail_spawn(&self, name: &str, fail: bool) {
        self.lock().entry(name.to_string()).or_default().fail_spawn = fail;
    }
}

struct FakeLauncher(FakeWorld);

impl ProcessLauncher for FakeLauncher {
    fn create(&self, module: &str) -> Box<dyn ProcessHandle> {
        Box::new(FakeHandle {
            name: module.to_string(),
            world: self.0.clone(),
            spawned: false,
        })
    }
}

struct FakeHandle {
    name: String,
    world: FakeWorld,
    spawned: bool,
}

impl ProcessHandle for FakeHandle {
    fn start(&mut self, spec: &LaunchSpec) -> Result<(), SpawnError> {
        let mut procs = self.world.lock();
        let proc = procs.entry(self.name.clone()).or_default();
        if proc.fail_spawn {
            return Err(SpawnError::NotFound {
                program: spec.program.clone(),
            });
        }
        if proc.running {
            return Err(SpawnError::AlreadyRunning { pid: FAKE_PID });
        }
        proc.running = true;
        proc.starts += 1;
        proc.pending_exit = None;
        proc.last_spec = Some(spec.clone());
        proc.started_at = Some(Instant::now());
        self.spawned = true;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.spawned && self.world.running(&self.name)
    }

    fn poll_exit(&mut self) -> Option<ProcessExit> {
        if !self.spawned {
            return None;
        }
        self.world
            .lock()
            .get_mut(&self.name)
            .and_then(|p| p.pending_exit.take())
    }

    fn kill(&mut self, _grace: Duration) -> bool {
        if !self.is_running() {
            return true;
        }
        let mut procs = self.world.lock();
        let proc = procs.entry(self.name.clone()).or_default();
        if proc.unkillable {
            return false;
        }
        proc.running = false;
        proc.kills += 1;
        proc.pending_exit = Some(ProcessExit::signaled(15));
        true
    }

    fn pid(&self) -> Option<u32> {
        self.is_running().then_some(FAKE_PID)
    }
}

#[derive(Debug, Default)]
struct HostLog {
    reboots: u32,
    shutdowns: u32,
    memory: HashMap<u32, u64>,
}

#[derive(Debug, Clone, Default)]
struct RecordingHost {
    log: Arc<Mutex<HostLog>>,
}

impl RecordingHost {
    fn reboots(&self) -> u32 {
        self.log.lock().unwrap().reboots
    }

    fn shutdowns(&self) -> u32 {
        self.log.lock().unwrap().shutdowns
    }

    fn set_memory(&self, pid: u32, bytes: u64) {
        self.log.lock().unwrap().memory.insert(pid, bytes);
    }
}

impl Host for RecordingHost {
    fn reboot(&mut self) -> anyhow::Result<()> {
        self.log.lock().unwrap().reboots += 1;
        Ok(())
    }

    fn shutdown(&mut self) -> anyhow::Result<()> {
        self.log.lock().unwrap().shutdowns += 1;
        Ok(())
    }

    fn process_memory(&mut self, pid: u32) -> Option<u64> {
        self.log.lock().unwrap().memory.get(&pid).copied()
    }

    fn system_memory(&mut self) -> Option<MemoryInfo> {
        Some(MemoryInfo {
            total: 4 << 30,
            used: 1 << 30,
        })
    }
}

struct Harness {
    supervisor: Supervisor,
    events: Receiver<Event>,
    clock: ManualClock,
    bus: MemoryBus,
    screen: HeadlessPresentation,
    world: FakeWorld,
    host: RecordingHost,
}

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
}

fn module(name: &str) -> ModuleDefinition {
    let mut definition = ModuleDefinition::new(name, format!("/opt/kiosk/{name}"));
    definition.autostart = true;
    definition
}

fn harness(modules: Vec<ModuleDefinition>) -> Harness {
    let (tx, rx) = mpsc::channel();
    let clock = ManualClock::new(start_time());
    let bus = MemoryBus::new();
    let screen = HeadlessPresentation::new();
    let world = FakeWorld::default();
    let host = RecordingHost::default();

    let source = ConfigModuleSource::from_config(WatchConfig {
        supervisor: SupervisorSettings::default(),
        modules,
    })
    .with_app_dir("/opt/kiosk");

    let services = Services {
        launcher: Box::new(FakeLauncher(world.clone())),
        bus: Box::new(bus.clone()),
        presentation: Box::new(screen.clone()),
        host: Box::new(host.clone()),
        modules: Box::new(source),
        clock: Box::new(clock.clone()),
        log: LogHandle::disabled(),
    };
    let config = SupervisorConfig {
        check_interval: Duration::from_secs(3),
        clock_watch: false,
        kill_grace: Duration::from_millis(10),
    };

    Harness {
        supervisor: Supervisor::new(config, services, tx),
        events: rx,
        clock,
        bus,
        screen,
        world,
        host,
    }
}

/// A harness that is initialized and has run its first tick.
fn running(modules: Vec<ModuleDefinition>) -> Harness {
    let mut h = harness(modules);
    h.supervisor.initialize();
    h.tick();
    h
}

impl Harness {
    fn tick(&mut self) {
        self.supervisor.reconcile();
    }

    fn advance(&self, secs: u64) {
        self.clock.advance(Duration::from_secs(secs));
    }

    fn send(&mut self, raw: &str) {
        self.supervisor.on_message(raw.as_bytes());
    }

    fn record(&self, name: &str) -> &ModuleRecord {
        self.supervisor.module(name).expect("module should exist")
    }

    /// Dispatch everything the bus and the presentation queued up.
    fn drain(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.supervisor.handle_event(event);
        }
    }

    fn published(&self, message: &str) -> bool {
        self.bus.published().iter().any(|m| m == message)
    }
}

#[test]
fn test_initialize_connects_bus_and_schedules_timers() {
    let mut h = harness(vec![module("ui")]);
    h.supervisor.initialize();

    assert!(h.supervisor.is_bus_connected());
    assert!(h.supervisor.timer_active(Timer::Tick));
    assert!(h.supervisor.timer_active(Timer::MemoryReport));
    assert!(h.screen.is_shown());
    assert_eq!(h.supervisor.modules().len(), 1);
}

#[test]
fn test_empty_module_table_leaves_bus_down() {
    let mut h = harness(vec![]);
    h.supervisor.initialize();

    assert!(!h.supervisor.is_bus_connected());
    assert_eq!(h.bus.connects(), 0);
    assert!(!h.supervisor.timer_active(Timer::Tick));
}

#[test]
fn test_heartbeats_keep_module_alive() {
    let mut a = module("a");
    a.priority = -1;
    let mut h = running(vec![a]);

    assert_eq!(h.world.starts("a"), 1);
    assert!(h.record("a").in_startup_grace());

    h.advance(30);
    h.tick();
    assert_eq!(h.world.starts("a"), 1);
    assert_eq!(h.world.kills("a"), 0);

    h.send("sender=a;type=alive");
    assert!(!h.record("a").in_startup_grace());

    for _ in 0..10 {
        h.advance(20);
        h.send("sender=a;type=alive");
        h.tick();
        assert_eq!(h.record("a").no_response_count, 0);
    }
    assert_eq!(h.world.kills("a"), 0);
    assert_eq!(h.world.starts("a"), 1);
}

#[test]
fn test_silent_module_is_killed_on_second_stale_tick() {
    let mut b = module("b");
    b.kill_timeout = Some(30);
    let mut h = running(vec![b]);
    assert_eq!(h.record("b").first_ping_timeout(), Duration::from_secs(60));

    h.advance(61);
    h.tick();
    assert_eq!(h.world.kills("b"), 0);
    assert_eq!(h.record("b").no_response_count, 1);

    h.advance(3);
    h.tick();
    assert_eq!(h.world.kills("b"), 1);
    assert_eq!(h.record("b").kill_on_start_count, 1);
    assert_eq!(h.record("b").no_response_count, 0);
    assert_eq!(h.record("b").first_ping_timeout(), Duration::from_secs(70));

    // reaped and started again with the longer first ping timeout
    h.tick();
    assert_eq!(h.world.starts("b"), 2);
    assert_eq!(h.record("b").first_ping_timeout(), Duration::from_secs(70));

    h.advance(65);
    h.tick();
    assert_eq!(h.world.kills("b"), 1);
    assert_eq!(h.record("b").no_response_count, 0);
}

#[test]
fn test_stale_module_with_heartbeat_history_resets_kill_on_start_count() {
    let mut h = running(vec![module("ui")]);
    h.advance(1);
    h.send("sender=ui;type=alive");

    h.advance(31);
    h.tick();
    h.advance(3);
    h.tick();

    assert_eq!(h.world.kills("ui"), 1);
    assert_eq!(h.record("ui").kill_on_start_count, 0);
}

#[test]
fn test_exclusive_start_waits_for_everything_else() {
    let mut service = module("service");
    service.autostart = false;
    service.start_mode = StartMode::Exclusive;
    let mut h = running(vec![module("ui"), module("pay_daemon"), service]);

    assert!(h.world.running("ui"));
    assert!(h.world.running("pay_daemon"));

    h.send("sender=ui;type=start_module;module=service;params=--maintenance");

    assert!(h.record("service").need_to_start);
    assert!(!h.record("ui").need_to_start);
    assert!(!h.record("pay_daemon").need_to_start);
    assert!(h.record("ui").previous_need_to_start);
    assert!(h.record("pay_daemon").previous_need_to_start);
    assert_eq!(h.world.starts("service"), 0);
    assert!(!h.supervisor.can_run("service"));
    assert!(h.published("sender=watch_service;target=ui;type=close"));
    assert!(h.published("sender=watch_service;target=pay_daemon;type=close"));

    h.world.exit("ui", 0);
    h.tick();
    assert_eq!(h.world.starts("service"), 0);

    h.world.exit("pay_daemon", 0);
    h.tick();
    assert_eq!(h.world.starts("service"), 1);
    assert_eq!(
        h.world.last_spec("service").unwrap().arguments,
        vec!["--maintenance".to_string()]
    );

    // and nothing else may start next to it
    h.supervisor.module_mut("ui").unwrap().need_to_start = true;
    assert!(!h.supervisor.can_run("ui"));
    h.tick();
    assert_eq!(h.world.starts("ui"), 1);
}

#[test]
fn test_exclusive_start_limit_restores_previous_wishes() {
    let mut pay = module("pay");
    pay.autostart = false;
    let mut service = module("service");
    service.autostart = false;
    service.start_mode = StartMode::Exclusive;
    service.max_start_count = 1;
    let mut h = running(vec![module("ui"), pay, service]);

    h.send("sender=ui;type=start_module;module=service");
    h.world.exit("ui", 0);
    h.tick();
    assert_eq!(h.world.starts("service"), 1);

    h.world.exit("service", 1);
    h.tick();

    assert!(!h.record("service").need_to_start);
    assert!(!h.record("pay").need_to_start);
    assert!(h.record("ui").need_to_start);
    assert_eq!(h.world.starts("ui"), 2);
    assert_eq!(h.world.starts("pay"), 0);
}

#[test]
fn test_priority_gates_start_until_first_heartbeat() {
    let base = module("base");
    let mut app = module("app");
    app.priority = 1;
    let mut h = running(vec![base, app]);

    assert_eq!(h.world.starts("base"), 1);
    assert_eq!(h.world.starts("app"), 0);
    assert!(!h.supervisor.can_run("app"));

    h.advance(1);
    h.send("sender=base;type=alive");
    h.tick();
    assert_eq!(h.world.starts("app"), 1);
}

#[test]
fn test_priority_minus_one_never_waits() {
    let mut service = module("service");
    service.start_mode = StartMode::Exclusive;
    let mut free = module("free");
    free.autostart = false;
    free.priority = -1;
    let h = running(vec![service, free]);

    assert!(h.world.running("service"));
    assert!(h.supervisor.can_run("free"));
}

#[test]
fn test_close_module_without_process_is_idempotent() {
    let mut idle = module("idle");
    idle.autostart = false;
    let mut h = harness(vec![idle]);
    h.supervisor.initialize();

    for _ in 0..3 {
        assert!(h.supervisor.close_module("idle", false));
        assert!(h.supervisor.close_module("idle", true));
    }
    assert!(h.bus.published().is_empty());
    assert!(!h.supervisor.timer_active(Timer::CloseRetry));
    assert_eq!(h.record("idle").kill_on_start_count, 0);
}

#[test]
fn test_close_module_kills_after_close_timeout() {
    let mut h = running(vec![module("ui")]);

    assert!(!h.supervisor.close_module("ui", true));
    assert_eq!(h.world.kills("ui"), 0);

    h.advance(31);
    assert!(h.supervisor.close_module("ui", true));
    assert_eq!(h.world.kills("ui"), 1);
    assert!(!h.record("ui").need_to_start);
}

#[test]
fn test_close_module_waits_for_smaller_close_priority() {
    let a = module("a");
    let mut b = module("b");
    b.close_priority = 1;
    let mut h = running(vec![a, b]);
    h.bus.take_published();

    assert!(!h.supervisor.can_terminate("b"));
    assert!(!h.supervisor.close_module("b", false));
    assert!(h.bus.published().is_empty());

    assert!(!h.supervisor.close_module("b", true));
    assert!(h.published("sender=watch_service;target=b;type=close"));
}

#[test]
fn test_close_pass_waits_for_smaller_close_priority() {
    let a = module("a");
    let mut b = module("b");
    b.close_priority = 1;
    let mut h = running(vec![a, b]);
    h.bus.take_published();

    h.send("sender=service;type=exit");
    let first_pass = h.bus.take_published();
    assert!(first_pass.contains(&"sender=watch_service;target=a;type=close".to_string()));
    assert!(!first_pass.contains(&"sender=watch_service;target=b;type=close".to_string()));
    assert!(h.supervisor.timer_active(Timer::CloseRetry));

    h.advance(1);
    h.supervisor.fire_due_timers();
    assert!(!h.published("sender=watch_service;target=b;type=close"));

    h.world.exit("a", 0);
    h.advance(1);
    h.supervisor.fire_due_timers();
    assert!(h.published("sender=watch_service;target=b;type=close"));
    assert!(!h.supervisor.exit_requested());

    h.world.exit("b", 0);
    h.advance(1);
    h.supervisor.fire_due_timers();
    assert!(h.supervisor.exit_requested());
    assert_eq!(h.world.kills("a"), 0);
    assert_eq!(h.world.kills("b"), 0);
}

#[test]
fn test_huge_kill_timeout_never_goes_stale() {
    let mut ui = module("ui");
    ui.kill_timeout = Some(10_000_000_000_000);
    let mut h = running(vec![ui]);

    h.advance(61);
    h.tick();
    h.advance(3);
    h.tick();

    assert_eq!(h.world.kills("ui"), 0);
    assert_eq!(h.record("ui").no_response_count, 0);
    assert!(h.world.running("ui"));
}

#[test]
fn test_huge_kill_timeout_closes_without_kill() {
    let mut ui = module("ui");
    ui.kill_timeout = Some(10_000_000_000_000);
    let mut h = running(vec![ui]);

    h.send("sender=service;type=exit");
    assert!(h.published("sender=watch_service;target=ui;type=close"));

    h.advance(600);
    h.supervisor.fire_due_timers();
    assert_eq!(h.world.kills("ui"), 0);
    assert!(h.supervisor.timer_active(Timer::CloseRetry));

    h.world.exit("ui", 0);
    h.advance(1);
    h.supervisor.fire_due_timers();
    assert!(h.supervisor.exit_requested());
}

#[test]
fn test_failed_kill_falls_back_to_close_message() {
    let mut h = running(vec![module("ui")]);
    h.world.unkillable("ui");

    h.advance(31);
    h.bus.take_published();
    assert!(!h.supervisor.close_module("ui", true));

    assert!(h.published("sender=watch_service;target=ui;type=close"));
    assert!(h.world.running("ui"));
}

#[test]
fn test_after_start_delay_blocks_the_tick() {
    let mut a = module("a");
    a.after_start_delay = 200;
    let mut h = harness(vec![a, module("b")]);
    h.supervisor.initialize();

    let started = Instant::now();
    h.tick();
    assert!(started.elapsed() >= Duration::from_millis(200));

    let a_at = h.world.started_at("a").expect("a should start");
    let b_at = h.world.started_at("b").expect("b should start");
    assert!(b_at.duration_since(a_at) >= Duration::from_millis(200));
}

#[test]
fn test_after_start_delay_skipped_when_spawn_fails() {
    let mut a = module("a");
    a.after_start_delay = 200;
    let mut h = harness(vec![a, module("b")]);
    h.world.fail_spawn("a", true);
    h.supervisor.initialize();

    let started = Instant::now();
    h.tick();
    assert!(started.elapsed() < Duration::from_millis(200));
    assert_eq!(h.world.starts("a"), 0);
    assert_eq!(h.world.starts("b"), 1);
}

#[test]
fn test_reboot_closes_everything_then_reboots() {
    let mut h = running(vec![module("ui"), module("pay")]);

    h.send("sender=service;type=reboot");

    assert_eq!(h.supervisor.close_action(), CloseAction::Reboot);
    assert!(h.supervisor.modules().values().all(|r| !r.need_to_start));
    assert!(!h.supervisor.timer_active(Timer::Tick));
    assert!(h.supervisor.timer_active(Timer::CloseRetry));
    assert!(h.published("sender=watch_service;target=updater;type=close"));
    assert_eq!(h.host.reboots(), 0);

    h.advance(1);
    h.supervisor.fire_due_timers();
    assert_eq!(h.host.reboots(), 0);
    assert!(h.supervisor.timer_active(Timer::CloseRetry));

    h.world.exit("ui", 0);
    h.world.exit("pay", 0);
    h.advance(1);
    h.supervisor.fire_due_timers();

    assert_eq!(h.host.reboots(), 1);
    assert!(h.supervisor.exit_requested());
    assert_eq!(h.world.starts("ui"), 1);
}

#[test]
fn test_shutdown_powers_off_host() {
    let mut idle = module("idle");
    idle.autostart = false;
    let mut h = running(vec![idle]);

    h.send("sender=service;type=shutdown");

    assert_eq!(h.supervisor.close_action(), CloseAction::Shutdown);
    assert_eq!(h.host.shutdowns(), 1);
    assert!(h.supervisor.exit_requested());
}

#[test]
fn test_exit_force_kills_unresponsive_modules() {
    let mut h = running(vec![module("ui")]);

    h.send("sender=service;type=exit");
    assert!(!h.supervisor.exit_requested());

    h.advance(31);
    h.supervisor.fire_due_timers();

    assert_eq!(h.world.kills("ui"), 1);
    assert!(h.supervisor.exit_requested());
    assert_eq!(h.host.reboots(), 0);
}

#[test]
fn test_close_reinitializes_after_pause() {
    let mut idle = module("idle");
    idle.autostart = false;
    let mut h = running(vec![idle]);

    h.send("sender=service;type=close");

    assert_eq!(h.supervisor.close_action(), CloseAction::None);
    assert!(!h.supervisor.exit_requested());
    assert!(h.supervisor.timer_active(Timer::Reinitialize));
    assert!(!h.supervisor.timer_active(Timer::Tick));

    h.advance(300);
    h.supervisor.fire_due_timers();
    assert_eq!(h.bus.connects(), 2);
    assert!(h.supervisor.timer_active(Timer::Tick));
}

#[test]
fn test_close_from_updater_broadcasts_close() {
    let mut idle = module("idle");
    idle.autostart = false;
    let mut h = running(vec![idle]);

    h.send("sender=updater;type=close");

    assert!(h.published("sender=watch_service;type=close"));
    assert!(!h.published("sender=watch_service;target=updater;type=close"));
}

#[test]
fn test_restart_reinitializes_with_params() {
    let mut h = running(vec![module("ui")]);
    assert_eq!(h.world.starts("ui"), 1);

    h.send("sender=service;type=restart;params=--safe-mode");
    assert_eq!(h.supervisor.close_action(), CloseAction::Restart);

    h.world.exit("ui", 0);
    h.advance(1);
    h.supervisor.fire_due_timers();

    assert_eq!(h.supervisor.close_action(), CloseAction::None);
    assert_eq!(h.bus.connects(), 2);
    assert!(h.supervisor.timer_active(Timer::Tick));
    assert_eq!(h.record("ui").params, "--safe-mode");

    h.tick();
    assert_eq!(h.world.starts("ui"), 2);
    assert_eq!(
        h.world.last_spec("ui").unwrap().arguments,
        vec!["--safe-mode".to_string()]
    );
}

#[test]
fn test_bus_failure_is_retried_and_counter_resets() {
    let mut h = harness(vec![module("ui")]);
    h.bus.fail_next_connects(2);

    h.supervisor.initialize();
    assert_eq!(h.supervisor.init_failures(), 1);
    assert!(h.supervisor.timer_active(Timer::Reinitialize));

    h.advance(7);
    h.supervisor.fire_due_timers();
    assert_eq!(h.supervisor.init_failures(), 2);

    h.advance(7);
    h.supervisor.fire_due_timers();
    assert_eq!(h.supervisor.init_failures(), 0);
    assert!(h.supervisor.is_bus_connected());
}

#[test]
fn test_bus_failure_ladder_ends_in_reboot() {
    let mut h = harness(vec![module("ui")]);
    h.bus.fail_next_connects(u32::MAX);

    h.supervisor.initialize();
    for _ in 0..84 {
        h.advance(7);
        h.supervisor.fire_due_timers();
    }
    assert_eq!(h.supervisor.init_failures(), 85);
    assert_eq!(h.host.reboots(), 0);

    h.advance(7);
    h.supervisor.fire_due_timers();
    assert_eq!(h.host.reboots(), 1);
    assert_eq!(h.supervisor.close_action(), CloseAction::Reboot);
    assert!(h.supervisor.exit_requested());
}

#[test]
fn test_close_logs_broadcasts_and_rotates() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut h = running(vec![module("ui")]);
    h.supervisor.log = LogHandle::open(dir.path()).unwrap();

    h.send("sender=ui;type=close_logs");

    assert!(h.published("sender=watch_service;type=close_logs"));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
}

#[test]
fn test_start_module_for_unknown_target_is_ignored() {
    let mut h = running(vec![module("ui")]);
    h.send("sender=ui;type=start_module;module=ghost");

    assert!(h.supervisor.module("ghost").is_none());
    assert!(h.record("ui").need_to_start);
}

#[test]
fn test_close_module_for_unknown_target_sends_direct_close() {
    let mut h = running(vec![module("ui")]);
    h.send("sender=ui;type=close_module;module=ghost");

    assert!(h.published("sender=watch_service;target=ghost;type=close"));
}

#[test]
fn test_close_module_of_autostart_module_recovers_later() {
    let mut h = running(vec![module("ui")]);

    h.send("sender=service;type=close_module;module=ui");
    assert!(!h.record("ui").need_to_start);
    assert!(h.supervisor.timer_active(Timer::CheckAutoStart));
    assert!(h.published("sender=watch_service;target=ui;type=close"));

    h.world.exit("ui", 0);
    h.tick();
    assert_eq!(h.world.starts("ui"), 1);

    h.advance(600);
    h.supervisor.fire_due_timers();
    assert!(h.record("ui").need_to_start);
    assert_eq!(h.world.starts("ui"), 2);
}

#[test]
fn test_message_touches_sender_and_forwards_state() {
    let mut h = running(vec![module("ui")]);
    h.advance(10);

    h.send("sender=ui;type=set_state;params=Loading");

    assert_eq!(h.screen.state_of("ui").as_deref(), Some("Loading"));
    assert_eq!(h.record("ui").last_update, start_time() + chrono::Duration::seconds(10));
    assert_eq!(
        h.record("ui").last_message.as_deref(),
        Some("sender=ui;type=set_state;params=Loading")
    );

    h.send("sender=ui;type=reset_state");
    assert_eq!(h.screen.state_of("ui"), None);
}

#[test]
fn test_last_message_keeps_raw_payload() {
    let mut h = running(vec![module("ui")]);

    h.send("sender=ui;type=alive;flag;params=x");

    assert_eq!(
        h.record("ui").last_message.as_deref(),
        Some("sender=ui;type=alive;flag;params=x")
    );
}

#[test]
fn test_message_from_unknown_sender_touches_nothing() {
    let mut h = running(vec![module("ui")]);
    h.advance(10);

    h.send("sender=stranger;type=alive");
    assert!(h.record("ui").in_startup_grace());
}

#[test]
fn test_exit_publishes_module_closed_unless_continue_code() {
    let mut h = running(vec![module("a"), module("b")]);
    h.send("sender=a;type=set_state;params=Busy");

    h.world.exit("a", 1);
    h.world.exit("b", 54321);
    h.supervisor.reap_exited();

    assert!(h.published("type=module_closed;sender=a"));
    assert!(!h.published("type=module_closed;sender=b"));
    assert_eq!(h.screen.state_of("a"), None);
    assert!(h.record("a").process.is_none());
    assert!(h.record("a").need_to_start);
}

#[test]
fn test_screen_protection_follows_gui_modules() {
    let mut ui = module("ui");
    ui.gui = true;
    let mut h = running(vec![ui]);
    assert!(h.screen.is_shown());

    h.advance(1);
    h.send("sender=ui;type=alive");
    h.tick();
    assert!(!h.screen.is_shown());

    h.world.exit("ui", 0);
    h.tick();
    assert!(h.screen.is_shown());
    assert_eq!(h.world.starts("ui"), 2);
}

#[test]
fn test_hide_and_show_splash_screen() {
    let mut h = running(vec![module("ui")]);
    assert!(h.screen.is_shown());

    h.send("sender=ui;type=hide_splash_screen");
    assert!(!h.supervisor.screen_protection_enabled());
    assert!(!h.screen.is_shown());

    h.send("sender=ui;type=show_splash_screen");
    assert!(h.supervisor.screen_protection_enabled());
    assert!(h.screen.is_shown());
}

#[test]
fn test_clicks_publish_hash_of_sequence() {
    let mut h = running(vec![module("ui")]);

    h.supervisor.on_screen_click(1);
    assert!(h.published(
        "sender=watch_service;type=screen_activity;params=c4ca4238a0b923820dcc509a6f75849b"
    ));

    assert!(h.screen.click(2));
    h.drain();
    assert_eq!(h.supervisor.click_sequence(), "12");
    assert!(h.published(
        "sender=watch_service;type=screen_activity;params=c20ad4d76fe97759aa27a0c99bff6710"
    ));

    h.supervisor.on_screen_click(7);
    assert_eq!(h.supervisor.click_sequence(), "12");

    h.advance(5);
    h.supervisor.fire_due_timers();
    assert_eq!(h.supervisor.click_sequence(), "");
}

#[test]
fn test_clicks_before_bus_is_up_are_dropped() {
    let mut h = harness(vec![module("ui")]);
    h.supervisor.on_screen_click(3);

    assert_eq!(h.supervisor.click_sequence(), "");
    assert!(h.bus.published().is_empty());
}

#[test]
fn test_clock_jump_shifts_every_record() {
    let mut h = running(vec![module("ui"), module("pay")]);
    let before = h.record("ui").init_date;

    h.clock.set_wall(start_time() - chrono::Duration::hours(1));
    h.supervisor
        .handle_event(Event::ClockJump { offset_ms: -3_600_000 });

    for record in h.supervisor.modules().values() {
        assert_eq!(record.init_date, before - chrono::Duration::hours(1));
        assert_eq!(record.last_update, before - chrono::Duration::hours(1));
    }

    // no false stale detection after the correction
    h.advance(20);
    h.tick();
    h.tick();
    assert_eq!(h.world.kills("ui"), 0);
}

#[test]
fn test_terminate_runs_exit_once() {
    let mut h = running(vec![module("ui")]);

    h.supervisor.handle_event(Event::Terminate);
    assert_eq!(h.supervisor.close_action(), CloseAction::Exit);
    assert!(h.supervisor.timer_active(Timer::CloseRetry));

    h.supervisor.handle_event(Event::Terminate);
    assert_eq!(h.supervisor.close_action(), CloseAction::Exit);

    h.world.exit("ui", 0);
    h.advance(1);
    h.supervisor.fire_due_timers();
    assert!(h.supervisor.exit_requested());
}

#[test]
fn test_memory_sample_keeps_first_baseline() {
    let mut h = running(vec![module("ui")]);
    h.host.set_memory(FAKE_PID, 100 << 20);

    h.supervisor.check_process_memory();
    assert_eq!(h.record("ui").memory_baseline, Some(100 << 20));

    h.host.set_memory(FAKE_PID, 150 << 20);
    h.supervisor.check_process_memory();
    assert_eq!(h.record("ui").memory_baseline, Some(100 << 20));
    assert!(h.supervisor.timer_active(Timer::MemorySample));
}

#[test]
fn test_reinitialize_kills_leftover_modules() {
    let mut h = running(vec![module("ui")]);

    h.supervisor.reinitialize();

    assert_eq!(h.world.kills("ui"), 1);
    assert_eq!(h.bus.connects(), 2);
    assert!(h.record("ui").process.is_none());
}

#[test]
fn test_spawn_failure_is_retried_next_tick() {
    let mut h = harness(vec![module("ui")]);
    h.world.fail_spawn("ui", true);
    h.supervisor.initialize();

    h.tick();
    assert_eq!(h.world.starts("ui"), 0);
    assert_eq!(h.record("ui").restart_count, 0);

    h.world.fail_spawn("ui", false);
    h.tick();
    assert_eq!(h.world.starts("ui"), 1);
    assert_eq!(h.record("ui").restart_count, 1);
}

#[test]
fn test_max_start_count_stops_retrying() {
    let mut ui = module("ui");
    ui.max_start_count = 2;
    let mut h = running(vec![ui]);

    h.world.exit("ui", 1);
    h.tick();
    assert_eq!(h.world.starts("ui"), 2);

    h.world.exit("ui", 1);
    h.tick();
    h.tick();
    assert_eq!(h.world.starts("ui"), 2);
    assert!(!h.record("ui").need_to_start);
}

#[test]
fn test_tick_timer_drives_reconcile() {
    let mut h = harness(vec![module("ui")]);
    h.supervisor.initialize();
    assert_eq!(h.world.starts("ui"), 0);

    h.advance(3);
    h.supervisor.fire_due_timers();
    assert_eq!(h.world.starts("ui"), 1);
    assert!(h.supervisor.time_until_next_timer().is_some());
}
