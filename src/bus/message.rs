//! Wire format of bus messages.
//!
//! A message is a `;`-separated list of `key=value` pairs, for example
//! `sender=ui;type=start_module;module=service_menu;params=--full`.
//! Keys are matched exactly. Pairs without `=` are ignored.

use std::fmt;

use crate::models::constants::{SUPERVISOR_NAME, UPDATER_MODULE};

pub const KEY_SENDER: &str = "sender";
pub const KEY_TYPE: &str = "type";
pub const KEY_MODULE: &str = "module";
pub const KEY_PARAMS: &str = "params";
pub const KEY_TARGET: &str = "target";

pub const TYPE_CLOSE: &str = "close";
pub const TYPE_CLOSE_LOGS: &str = "close_logs";
pub const TYPE_MODULE_CLOSED: &str = "module_closed";
pub const TYPE_SCREEN_ACTIVITY: &str = "screen_activity";

/// An ordered list of `key=value` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusMessage {
    fields: Vec<(String, String)>,
}

impl BusMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pair. Empty values are kept so the encoding stays predictable.
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.push((key.to_string(), value.into()));
        self
    }

    /// Decode a raw datagram. Invalid UTF-8 is replaced, never rejected.
    pub fn parse(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        let fields = text
            .split(';')
            .filter_map(|pair| pair.split_once('='))
            .map(|(key, value)| (key.trim().to_string(), value.to_string()))
            .collect();
        Self { fields }
    }

    /// Value of the first pair with this key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn sender(&self) -> &str {
        self.get(KEY_SENDER).unwrap_or_default()
    }

    pub fn kind(&self) -> &str {
        self.get(KEY_TYPE).unwrap_or_default()
    }

    pub fn module(&self) -> &str {
        self.get(KEY_MODULE).unwrap_or_default()
    }

    pub fn params(&self) -> &str {
        self.get(KEY_PARAMS).unwrap_or_default()
    }

    pub fn target(&self) -> &str {
        self.get(KEY_TARGET).unwrap_or_default()
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// `close` addressed to one module.
    pub fn close_to(target: &str) -> Self {
        Self::new()
            .with(KEY_SENDER, SUPERVISOR_NAME)
            .with(KEY_TARGET, target)
            .with(KEY_TYPE, TYPE_CLOSE)
    }

    /// `close` for every listener.
    pub fn close_broadcast() -> Self {
        Self::new()
            .with(KEY_SENDER, SUPERVISOR_NAME)
            .with(KEY_TYPE, TYPE_CLOSE)
    }

    pub fn close_updater() -> Self {
        Self::close_to(UPDATER_MODULE)
    }

    pub fn close_logs() -> Self {
        Self::new()
            .with(KEY_SENDER, SUPERVISOR_NAME)
            .with(KEY_TYPE, TYPE_CLOSE_LOGS)
    }

    /// Announce that a module process went away.
    pub fn module_closed(module: &str) -> Self {
        Self::new()
            .with(KEY_TYPE, TYPE_MODULE_CLOSED)
            .with(KEY_SENDER, module)
    }

    pub fn screen_activity(hash: &str) -> Self {
        Self::new()
            .with(KEY_SENDER, SUPERVISOR_NAME)
            .with(KEY_TYPE, TYPE_SCREEN_ACTIVITY)
            .with(KEY_PARAMS, hash)
    }
}

impl fmt::Display for BusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}
