//! Lock screen control and click sequences.

use std::time::Duration;

use md5::{Digest, Md5};

use crate::bus::BusMessage;
use crate::models::constants::{SCREEN_ACTIVITY_TIMEOUT_MS, SCREEN_ZONES};

use super::{Supervisor, Timer};

impl Supervisor {
    /// Show or hide the splash screen depending on the running GUI modules.
    ///
    /// With protection disabled the splash is only ever hidden. Otherwise it
    /// is hidden while a GUI module is running and has reported in, and shown
    /// when none is.
    pub(super) fn check_screen_protection(&mut self) {
        if !self.screen_protection {
            if self.presentation.is_shown() {
                self.presentation.protect();
            }
            return;
        }

        let gui_up = self.modules.values().any(|record| {
            record.gui && record.is_running() && record.init_date < record.last_update
        });

        if gui_up {
            self.presentation.protect();
        } else {
            self.presentation.unprotect();
        }
    }

    pub fn enable_screen_protection(&mut self, enabled: bool) {
        tracing::info!(
            "Screen protection {}.",
            if enabled { "enabled" } else { "disabled" }
        );
        self.screen_protection = enabled;
        self.check_screen_protection();
    }

    /// Append a click to the sequence and publish its hash.
    pub fn on_screen_click(&mut self, zone: u8) {
        if !SCREEN_ZONES.contains(&zone) {
            tracing::warn!("Ignoring click on unknown screen zone {zone}.");
            return;
        }

        self.schedule_once(
            Timer::ClearClicks,
            Duration::from_millis(SCREEN_ACTIVITY_TIMEOUT_MS),
        );

        if self.bus.is_none() {
            return;
        }

        self.clicks.push(char::from(b'0' + zone));
        let hash = hex::encode(Md5::digest(self.clicks.as_bytes()));
        self.publish(BusMessage::screen_activity(&hash));
        tracing::info!("Clicked sequence: {}.", self.clicks);
    }
}
