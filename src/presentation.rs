//! Splash/lock screen seam.
//!
//! The splash covers the desktop whenever no module GUI is up. `protect()`
//! hands the screen to a module GUI (splash down), `unprotect()` brings the
//! splash back. Zone clicks on the splash flow back as [`Event::ScreenClick`].

use std::collections::BTreeMap;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::supervisor::Event;

pub trait PresentationSink: Send {
    /// A module GUI owns the screen.
    fn protect(&mut self);

    /// Nothing owns the screen, show the splash.
    fn unprotect(&mut self);

    fn set_state(&mut self, sender: &str, state: &str);

    fn clear_state(&mut self, sender: &str);

    /// Whether the splash is currently visible.
    fn is_shown(&self) -> bool;

    /// Where zone clicks should be delivered. Sinks without input ignore this.
    fn connect_clicks(&mut self, _events: Sender<Event>) {}
}

#[derive(Debug, Default)]
struct HeadlessState {
    shown: bool,
    states: BTreeMap<String, String>,
    clicks: Option<Sender<Event>>,
}

/// Sink without a display. It logs transitions and remembers what it would show.
#[derive(Debug, Clone, Default)]
pub struct HeadlessPresentation {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessPresentation {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state_of(&self, sender: &str) -> Option<String> {
        self.lock().states.get(sender).cloned()
    }

    /// Simulate a click on a splash zone.
    pub fn click(&self, zone: u8) -> bool {
        match &self.lock().clicks {
            Some(events) => events.send(Event::ScreenClick(zone)).is_ok(),
            None => false,
        }
    }
}

impl PresentationSink for HeadlessPresentation {
    fn protect(&mut self) {
        let mut state = self.lock();
        if state.shown {
            tracing::info!("Splash screen hidden");
        }
        state.shown = false;
    }

    fn unprotect(&mut self) {
        let mut state = self.lock();
        if !state.shown {
            tracing::info!("Splash screen shown");
        }
        state.shown = true;
    }

    fn set_state(&mut self, sender: &str, state: &str) {
        tracing::debug!("Splash state for {sender}: {state}");
        self.lock()
            .states
            .insert(sender.to_string(), state.to_string());
    }

    fn clear_state(&mut self, sender: &str) {
        self.lock().states.remove(sender);
    }

    fn is_shown(&self) -> bool {
        self.lock().shown
    }

    fn connect_clicks(&mut self, events: Sender<Event>) {
        self.lock().clicks = Some(events);
    }
}
