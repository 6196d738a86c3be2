//! The inbound command protocol.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::bus::BusMessage;
use crate::models::constants::{AUTO_START_RECOVERY_SECS, SUPERVISOR_MODULE};
use crate::models::ModuleCommand;

use super::{CloseAction, Supervisor, Timer};

/// Message types the supervisor acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StartModule,
    CloseModule,
    Restart,
    CloseLogs,
    Close,
    Exit,
    Reboot,
    Shutdown,
    ShowSplashScreen,
    HideSplashScreen,
    SetState,
    ResetState,
}

impl Command {
    pub const ALL: [Command; 12] = [
        Command::StartModule,
        Command::CloseModule,
        Command::Restart,
        Command::CloseLogs,
        Command::Close,
        Command::Exit,
        Command::Reboot,
        Command::Shutdown,
        Command::ShowSplashScreen,
        Command::HideSplashScreen,
        Command::SetState,
        Command::ResetState,
    ];

    /// Wire name used in the `type` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::StartModule => "start_module",
            Command::CloseModule => "close_module",
            Command::Restart => "restart",
            Command::CloseLogs => "close_logs",
            Command::Close => "close",
            Command::Exit => "exit",
            Command::Reboot => "reboot",
            Command::Shutdown => "shutdown",
            Command::ShowSplashScreen => "show_splash_screen",
            Command::HideSplashScreen => "hide_splash_screen",
            Command::SetState => "set_state",
            Command::ResetState => "reset_state",
        }
    }

    /// Commands that always run a reconcile pass afterwards.
    fn reconciles(&self) -> bool {
        matches!(self, Command::StartModule | Command::CloseModule)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::ALL
            .into_iter()
            .find(|command| command.as_str() == s)
            .ok_or_else(|| format!("unknown command type '{s}'"))
    }
}

impl Supervisor {
    /// Handle one raw bus datagram.
    ///
    /// Any message, known command or not, counts as a heartbeat of the
    /// module named in `sender`.
    pub fn on_message(&mut self, raw: &[u8]) {
        let message = BusMessage::parse(raw);
        tracing::debug!("Received message: {message}");

        match message.kind().parse::<Command>() {
            Ok(command) => {
                self.dispatch(command, &message);

                // close orchestration cancels the tick and must not be overtaken
                if command.reconciles() || self.timers.is_active(Timer::Tick) {
                    self.reconcile();
                }
            }
            Err(e) if !message.kind().is_empty() => tracing::debug!("{e}"),
            Err(_) => {}
        }

        let now = self.now();
        if let Some(record) = self.modules.get_mut(message.sender()) {
            record.last_message = Some(String::from_utf8_lossy(raw).into_owned());
            record.touch(now);
        }
    }

    fn dispatch(&mut self, command: Command, message: &BusMessage) {
        let sender = message.sender();
        match command {
            Command::StartModule => self.start_module_command(message),
            Command::CloseModule => self.close_module_command(message.module()),
            Command::Restart => {
                tracing::info!("Module {sender} requested restart.");
                self.restart_params = message.params().to_string();
                self.begin_close(CloseAction::Restart, SUPERVISOR_MODULE);
            }
            Command::CloseLogs => {
                self.publish(BusMessage::close_logs());
                match self.log.rotate() {
                    Ok(Some(archived)) => {
                        tracing::info!("Log file archived to {}.", archived.display())
                    }
                    Ok(None) => {}
                    Err(e) => tracing::error!("Failed to rotate log file: {e:#}"),
                }
            }
            Command::Close => {
                tracing::info!("Module {sender} requested close.");
                self.begin_close(CloseAction::None, sender);
            }
            Command::Exit => {
                tracing::info!("Module {sender} requested exit.");
                self.begin_close(CloseAction::Exit, SUPERVISOR_MODULE);
            }
            Command::Reboot => {
                tracing::info!("Module {sender} requested reboot.");
                self.do_reboot();
            }
            Command::Shutdown => {
                tracing::info!("Module {sender} requested shutdown.");
                self.begin_close(CloseAction::Shutdown, SUPERVISOR_MODULE);
            }
            Command::ShowSplashScreen => self.enable_screen_protection(true),
            Command::HideSplashScreen => self.enable_screen_protection(false),
            Command::SetState => self.presentation.set_state(sender, message.params()),
            Command::ResetState => self.presentation.clear_state(sender),
        }
    }

    fn begin_close(&mut self, action: CloseAction, sender: &str) {
        self.clear_need_to_start();
        self.close_action = action;
        self.close_modules(sender);
    }

    fn start_module_command(&mut self, message: &BusMessage) {
        let target = message.module();
        let Some(exclusive) = self.modules.get(target).map(|r| r.is_exclusive()) else {
            tracing::warn!(
                "Module {} asked to start unknown module '{target}'.",
                message.sender()
            );
            return;
        };

        if exclusive {
            for record in self.modules.values_mut() {
                record.previous_need_to_start = record.need_to_start;
                record.need_to_start = false;
            }
        }

        let Some(record) = self.modules.get_mut(target) else {
            return;
        };
        record.need_to_start = true;
        record.restart_count = 0;
        record.params = message.params().to_string();
        record.command_queue.push_back(ModuleCommand::Start);

        tracing::info!(
            "Module {} sent 'start_module' command (module: {target}, params: '{}', exclusive: {exclusive}).",
            message.sender(),
            message.params()
        );
    }

    fn close_module_command(&mut self, target: &str) {
        let Some(record) = self.modules.get_mut(target) else {
            tracing::info!("Sending close command to unknown module {target}.");
            self.publish(BusMessage::close_to(target));
            return;
        };

        record.need_to_start = false;
        record.command_queue.push_back(ModuleCommand::Close);

        if record.auto_start {
            tracing::info!(
                "Module {target} is autostarted, it will be started again in {} min.",
                AUTO_START_RECOVERY_SECS / 60
            );
            self.schedule_once(
                Timer::CheckAutoStart,
                Duration::from_secs(AUTO_START_RECOVERY_SECS),
            );
        }
    }

    /// Re-enable every auto-start module that was closed on request.
    pub fn check_auto_start_modules(&mut self) {
        for record in self.modules.values_mut() {
            if record.auto_start && !record.need_to_start {
                tracing::info!("Module {} will be started again.", record.name);
                record.need_to_start = true;
                record.restart_count = 0;
            }
        }
        self.reconcile();
    }
}
