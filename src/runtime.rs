//! The event loop that drives a [`Supervisor`].
//!
//! Bus receiver, clock watcher, presentation and signal handler only send
//! [`Event`]s into one channel. This loop is the single consumer: it fires
//! due timers, dispatches events and reaps exited children, one at a time.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::models::constants::EXIT_POLL_INTERVAL_MS;
use crate::supervisor::{Event, Supervisor};

pub fn channel() -> (Sender<Event>, Receiver<Event>) {
    mpsc::channel()
}

/// Initialize `supervisor` and run it until an exit, reboot or shutdown
/// close has completed.
pub fn run(supervisor: &mut Supervisor, events: &Receiver<Event>) {
    let poll = Duration::from_millis(EXIT_POLL_INTERVAL_MS);
    supervisor.initialize();

    loop {
        supervisor.fire_due_timers();
        if supervisor.exit_requested() {
            break;
        }

        let wait = supervisor
            .time_until_next_timer()
            .map_or(poll, |due| due.min(poll));

        match events.recv_timeout(wait) {
            Ok(event) => supervisor.handle_event(event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                tracing::error!("Event channel closed, stopping");
                break;
            }
        }

        supervisor.reap_exited();
        if supervisor.exit_requested() {
            break;
        }
    }

    supervisor.stop();
    tracing::info!("Watch service stopped.");
}

/// Turn SIGINT and SIGTERM into [`Event::Terminate`].
pub fn install_signal_handler(events: Sender<Event>) -> Result<()> {
    ctrlc::set_handler(move || {
        let _ = events.send(Event::Terminate);
    })
    .context("Failed to install signal handler")
}
