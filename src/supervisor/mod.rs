//! The watch service engine
//!
//! A [`Supervisor`] owns the module table and decides, tick by tick, which
//! module process to start, which one to kill and when the whole set is
//! closed for a restart, exit, reboot or shutdown. Bus messages, clock jumps,
//! screen clicks and process exits all arrive through `&mut self` methods, so
//! a single driver thread serializes them.

mod commands;
mod core;
mod events;
mod exits;
mod reconcile;
mod screen;
mod shutdown;
mod timers;

#[cfg(test)]
mod tests;

pub use self::core::{Services, Supervisor, SupervisorConfig};
pub use commands::Command;
pub use events::Event;
pub use shutdown::CloseAction;
pub use timers::{Scheduler, Timer};
