//! Close orchestration: stop every module, then run the pending close action.

use std::fmt;
use std::time::Duration;

use crate::bus::BusMessage;
use crate::models::constants::{
    CLOSE_RETRY_MS, RESTART_AFTER_CLOSE_SECS, SUPERVISOR_MODULE, UPDATER_MODULE,
};

use super::reconcile::deadline;
use super::{Supervisor, Timer};

/// What happens once every module has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloseAction {
    /// Initialize again after a pause.
    #[default]
    None,
    Restart,
    Exit,
    Reboot,
    Shutdown,
}

impl fmt::Display for CloseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CloseAction::None => "none",
            CloseAction::Restart => "restart",
            CloseAction::Exit => "exit",
            CloseAction::Reboot => "reboot",
            CloseAction::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

impl Supervisor {
    /// One close orchestration pass.
    ///
    /// Stops the reconcile tick, asks every module to close and schedules
    /// another pass in one second while anything is still running. When the
    /// pass finds nothing running the close action is carried out.
    pub fn close_modules(&mut self, sender: &str) {
        tracing::info!("Closing modules.");
        self.timers.cancel(Timer::Tick);
        self.reap_exited();

        let names: Vec<String> = self.modules.keys().cloned().collect();
        let mut all_closed = true;
        for name in &names {
            if !self.close_module(name, false) {
                tracing::warn!("Cannot close module: {name}.");
                all_closed = false;
            }
        }

        if sender.eq_ignore_ascii_case(UPDATER_MODULE) {
            // the updater wants everything gone, supervised or not
            self.publish(BusMessage::close_broadcast());
        } else {
            self.publish(BusMessage::close_updater());
        }

        if !all_closed {
            self.schedule_once(Timer::CloseRetry, Duration::from_millis(CLOSE_RETRY_MS));
            return;
        }

        self.reap_exited();
        tracing::info!("All running modules have been closed.");
        self.run_close_action();
    }

    /// Ask one module to stop. Returns `true` once it is not running.
    ///
    /// A module that has been silent for longer than its close timeout is
    /// killed. It is only sent a `close` message if the kill fails.
    pub fn close_module(&mut self, name: &str, ignore_priority: bool) -> bool {
        let running = self.modules.get(name).is_some_and(|r| r.is_running());
        if !running {
            return true;
        }

        let terminable = ignore_priority || self.can_terminate(name);
        let now = self.now();
        let grace = self.config.kill_grace;
        let Some(record) = self.modules.get_mut(name) else {
            return true;
        };
        record.need_to_start = false;

        if !terminable {
            tracing::info!(
                "Can't terminate module {name}: a module with a smaller close priority is still running."
            );
            return false;
        }

        // a timeout too large to represent never expires
        let overdue = deadline(record.last_update, record.close_timeout())
            .is_some_and(|due| now > due);
        if overdue {
            tracing::warn!("Module {name} did not close in time. Killing module...");
            if record.kill(grace) {
                return true;
            }
            tracing::warn!("Module {name} survived the kill, sending close event.");
        }

        tracing::info!("Sending close event to module {name}.");
        self.publish(BusMessage::close_to(name));
        false
    }

    /// Clear every wish to run and close everything, then reboot the host.
    pub(super) fn do_reboot(&mut self) {
        self.clear_need_to_start();
        self.close_action = CloseAction::Reboot;
        self.close_modules(SUPERVISOR_MODULE);
    }

    pub(super) fn clear_need_to_start(&mut self) {
        for record in self.modules.values_mut() {
            record.need_to_start = false;
        }
    }

    fn run_close_action(&mut self) {
        tracing::info!("Close action: {}.", self.close_action);

        match self.close_action {
            CloseAction::None => {
                self.schedule_once(
                    Timer::Reinitialize,
                    Duration::from_secs(RESTART_AFTER_CLOSE_SECS),
                );
            }
            CloseAction::Restart => {
                self.close_action = CloseAction::None;
                self.reinitialize();
            }
            CloseAction::Exit => {
                self.exit_requested = true;
            }
            CloseAction::Reboot => {
                if let Err(e) = self.host.reboot() {
                    tracing::error!("Failed to reboot the system: {e:#}");
                }
                self.exit_requested = true;
            }
            CloseAction::Shutdown => {
                if let Err(e) = self.host.shutdown() {
                    tracing::error!("Failed to shut down the system: {e:#}");
                }
                self.exit_requested = true;
            }
        }
    }
}
