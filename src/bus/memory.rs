//! In-process bus for tests and embedders.

use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{Bus, BusConnector, BusMessage};
use crate::error::BusError;
use crate::supervisor::Event;

#[derive(Debug, Default)]
struct State {
    published: Vec<String>,
    fail_connects: u32,
    connects: u32,
    inbound: Option<Sender<Event>>,
}

/// Records everything published and lets tests inject inbound messages.
///
/// Clones share state, so a test keeps one clone while the supervisor owns
/// another as its [`BusConnector`].
#[derive(Debug, Clone, Default)]
pub struct MemoryBus {
    state: Arc<Mutex<State>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `count` connection attempts fail.
    pub fn fail_next_connects(&self, count: u32) {
        self.lock().fail_connects = count;
    }

    /// Number of successful connections so far.
    pub fn connects(&self) -> u32 {
        self.lock().connects
    }

    pub fn is_connected(&self) -> bool {
        self.lock().inbound.is_some()
    }

    /// Every message published so far, encoded.
    pub fn published(&self) -> Vec<String> {
        self.lock().published.clone()
    }

    /// Drain the published messages.
    pub fn take_published(&self) -> Vec<String> {
        std::mem::take(&mut self.lock().published)
    }

    /// Deliver a message as if a module had sent it. Returns `false` when not connected.
    pub fn inject(&self, raw: &str) -> bool {
        match &self.lock().inbound {
            Some(inbound) => inbound.send(Event::Message(raw.as_bytes().to_vec())).is_ok(),
            None => false,
        }
    }
}

impl BusConnector for MemoryBus {
    fn connect(&mut self, inbound: Sender<Event>) -> Result<Box<dyn Bus>, BusError> {
        let mut state = self.lock();
        if state.fail_connects > 0 {
            state.fail_connects -= 1;
            return Err(BusError::Unavailable("connection refused".to_string()));
        }
        state.connects += 1;
        state.inbound = Some(inbound);
        drop(state);

        Ok(Box::new(MemoryConnection { bus: self.clone() }))
    }
}

struct MemoryConnection {
    bus: MemoryBus,
}

impl Bus for MemoryConnection {
    fn publish(&mut self, message: &BusMessage) -> Result<(), BusError> {
        let mut state = self.bus.lock();
        if state.inbound.is_none() {
            return Err(BusError::Unavailable("bus stopped".to_string()));
        }
        state.published.push(message.encode());
        Ok(())
    }

    fn stop(&mut self) {
        self.bus.lock().inbound = None;
    }
}
