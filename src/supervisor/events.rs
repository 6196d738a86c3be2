//! Inbound events and their dispatch.

use crate::bus::message::{KEY_SENDER, KEY_TYPE};
use crate::bus::BusMessage;
use crate::models::constants::SYSTEM_SENDER;

use super::{CloseAction, Command, Supervisor};

/// Everything that reaches the supervisor from outside its own timers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Raw datagram from the bus.
    Message(Vec<u8>),
    /// The wall clock moved by this many milliseconds relative to the monotonic clock.
    ClockJump { offset_ms: i64 },
    /// Click on a splash zone (1..=5).
    ScreenClick(u8),
    /// The operating system asked the supervisor to stop.
    Terminate,
}

impl Supervisor {
    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Message(raw) => self.on_message(&raw),
            Event::ClockJump { offset_ms } => self.on_clock_jump(offset_ms),
            Event::ScreenClick(zone) => self.on_screen_click(zone),
            Event::Terminate => self.on_terminate(),
        }
    }

    /// Shift every record's timestamps so a system time change does not look
    /// like missing heartbeats.
    pub fn on_clock_jump(&mut self, offset_ms: i64) {
        tracing::info!(
            "System time changed. Offset {:.3} sec.",
            offset_ms as f64 / 1000.0
        );

        let offset = chrono::Duration::milliseconds(offset_ms);
        for record in self.modules.values_mut() {
            record.shift_times(offset);
        }
    }

    fn on_terminate(&mut self) {
        if self.close_action != CloseAction::None {
            tracing::info!(
                "Termination requested while {} is in progress, ignoring",
                self.close_action
            );
            return;
        }

        tracing::info!("System shutdown request.");
        let message = BusMessage::new()
            .with(KEY_SENDER, SYSTEM_SENDER)
            .with(KEY_TYPE, Command::Exit.as_str());
        self.on_message(message.encode().as_bytes());
    }
}
