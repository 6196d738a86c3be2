//! Message bus used to talk to the supervised modules.
//!
//! The supervisor only needs two things from a transport: publish an encoded
//! message, and forward inbound datagrams onto the runtime channel. Everything
//! else (addressing, filtering on `target`) is left to the modules.

pub mod memory;
pub mod message;
pub mod socket;

use std::sync::mpsc::Sender;

use crate::error::BusError;
use crate::supervisor::Event;

pub use memory::MemoryBus;
pub use message::BusMessage;
pub use socket::{send_to_supervisor, supervisor_socket_path, SocketBusConnector};

/// A connected bus.
pub trait Bus: Send {
    fn publish(&mut self, message: &BusMessage) -> Result<(), BusError>;

    /// Disconnect. Inbound messages stop arriving once this returns.
    fn stop(&mut self);
}

/// Creates bus connections; called again on every (re)initialization.
pub trait BusConnector: Send {
    /// Connect and forward every inbound message as [`Event::Message`].
    fn connect(&mut self, inbound: Sender<Event>) -> Result<Box<dyn Bus>, BusError>;
}
