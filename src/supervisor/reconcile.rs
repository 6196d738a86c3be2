//! The periodic decision pass: start, watch and stop modules.

use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::models::constants::MEMORY_SAMPLE_AFTER_START_SECS;
use crate::models::{ModuleCommand, ModuleRecord};
use crate::process::LaunchSpec;

use super::{Supervisor, Timer};

impl Supervisor {
    /// One pass over the module table in name order.
    ///
    /// May block: a start waits for the spawn and then for the module's
    /// `after_start_delay`, a kill waits for the process to go away.
    pub fn reconcile(&mut self) {
        self.reap_exited();

        let names: Vec<String> = self.modules.keys().cloned().collect();
        for name in &names {
            self.reconcile_module(name);
        }

        self.check_screen_protection();
    }

    fn reconcile_module(&mut self, name: &str) {
        let need_to_start = {
            let Some(record) = self.modules.get_mut(name) else {
                return;
            };

            match record.command_queue.pop_front() {
                Some(ModuleCommand::Start) => record.need_to_start = true,
                Some(ModuleCommand::Close) => record.need_to_start = false,
                None => {}
            }

            if record.need_to_start && record.process.is_none() {
                record.process = Some(self.launcher.create(name));
            }
            record.need_to_start
        };

        if !need_to_start {
            self.close_module(name, true);
        } else if self.modules.get(name).is_some_and(|r| r.is_running()) {
            self.check_heartbeat(name);
        } else {
            self.try_start(name);
        }
    }

    fn try_start(&mut self, name: &str) {
        if !self.can_run(name) {
            // waiting for modules with a smaller start priority
            return;
        }

        let Some(record) = self.modules.get_mut(name) else {
            return;
        };

        if record.max_start_count > 0 && record.restart_count >= record.max_start_count {
            tracing::warn!("Module {name} has exceeded start count limit.");
            record.need_to_start = false;

            if record.is_exclusive() {
                self.restore_after_exclusive(name);
            }
            return;
        }

        self.start_module(name);
    }

    /// Give the other modules back the wish to run they had before an
    /// exclusive module took over.
    fn restore_after_exclusive(&mut self, exclusive: &str) {
        for record in self.modules.values_mut() {
            if record.name != exclusive && !record.is_exclusive() {
                record.need_to_start = record.previous_need_to_start;
            }
        }
    }

    fn start_module(&mut self, name: &str) {
        let now = self.now();
        let Some(record) = self.modules.get_mut(name) else {
            return;
        };

        let spec = match LaunchSpec::new(
            record.executable.clone(),
            record.spawn_arguments(),
            record.working_directory.clone(),
        ) {
            Ok(spec) => spec,
            Err(e) => {
                tracing::error!("Error occurred while executing module {name}: {e}");
                return;
            }
        };

        tracing::info!(
            "Starting module {name}... Executing command {}.",
            spec.command_line()
        );

        let Some(process) = record.process.as_mut() else {
            return;
        };
        if let Err(e) = process.start(&spec) {
            tracing::error!("Error occurred while executing module {name}: {e}");
            return;
        }

        let verb = if record.restart_count > 0 {
            "restarted"
        } else {
            "started"
        };
        record.mark_started(now);
        tracing::info!(
            "Module {name} has been successfully {verb} (pid {}).",
            record.pid().unwrap_or_default()
        );

        let delay = record.after_start_delay;
        if !delay.is_zero() {
            tracing::info!("Waiting {} ms...", delay.as_millis());
            thread::sleep(delay);
        }

        self.schedule_once(
            Timer::MemorySample,
            Duration::from_secs(MEMORY_SAMPLE_AFTER_START_SECS),
        );
    }

    /// Kill a running module whose heartbeat went stale on two consecutive passes.
    fn check_heartbeat(&mut self, name: &str) {
        let now = self.now();
        let grace = self.config.kill_grace;
        let Some(record) = self.modules.get_mut(name) else {
            return;
        };

        if record.in_startup_grace() {
            let first_ping = deadline(record.init_date, record.first_ping_timeout());
            if first_ping.map_or(true, |due| now < due) {
                return;
            }
            tracing::debug!("Module {name} has exceeded first time ping timeout.");
        }

        let kill_timeout = Duration::from_secs(record.kill_timeout_secs);
        if deadline(record.last_update, kill_timeout).map_or(true, |due| due >= now) {
            record.no_response_count = 0;
            return;
        }

        if record.no_response_count == 0 {
            record.no_response_count += 1;
            return;
        }

        tracing::warn!("Module {name} has exceeded ping timeout. Killing module...");
        record.kill(grace);
        record.no_response_count = 0;

        if record.kill_on_start_count > 0 {
            tracing::warn!(
                "Module {name} killed during startup. New first ping timeout {} sec.",
                record.first_ping_timeout().as_secs()
            );
        }
    }

    /// Whether `name` may be started now.
    ///
    /// Modules with priority -1 never wait. An exclusive module waits until
    /// nothing else runs, and nothing starts while an exclusive module runs.
    /// Otherwise a module waits for every module with a numerically smaller
    /// start priority that still wants to run but has not come up yet.
    pub fn can_run(&self, name: &str) -> bool {
        let Some(record) = self.modules.get(name) else {
            return false;
        };

        if record.start_priority == -1 {
            return true;
        }

        if record.is_exclusive() {
            return !self.others(name).any(|other| other.is_running());
        }

        if self
            .others(name)
            .any(|other| other.is_exclusive() && other.is_running())
        {
            return false;
        }

        !self.others(name).any(|other| {
            other.start_priority < record.start_priority
                && other.need_to_start
                && (!other.is_running() || other.in_startup_grace())
        })
    }

    /// Whether `name` may be closed now: every module with a numerically
    /// smaller close priority must be gone first.
    pub fn can_terminate(&self, name: &str) -> bool {
        let Some(record) = self.modules.get(name) else {
            return true;
        };

        if record.close_priority == -1 {
            return true;
        }

        !self
            .others(name)
            .any(|other| other.close_priority < record.close_priority && other.is_running())
    }

    fn others<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ModuleRecord> + 'a {
        self.modules.values().filter(move |other| other.name != name)
    }
}

/// `since + timeout`, or `None` when that lies beyond what a timestamp can hold.
pub(super) fn deadline(since: DateTime<Utc>, timeout: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(timeout)
        .ok()
        .and_then(|timeout| since.checked_add_signed(timeout))
}
