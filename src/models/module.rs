//! Module record: configuration and runtime state of one supervised module.

use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::constants::{
    FIRST_PING_TIMEOUT_DEFAULT_SECS, FIRST_PING_TIMEOUT_INCREMENT_SECS,
    FIRST_PING_TIMEOUT_MAX_SECS, KILL_MODULE_TIMEOUT_SECS, SLOW_PC_KILL_MODULE_TIMEOUT_SECS,
    UPDATER_MODULE,
};
use crate::process::ProcessHandle;

/// How a module shares the terminal with the others.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StartMode {
    #[default]
    Normal,
    /// Runs alone: nothing else may run while it does.
    Exclusive,
}

impl fmt::Display for StartMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartMode::Normal => write!(f, "normal"),
            StartMode::Exclusive => write!(f, "exclusive"),
        }
    }
}

impl FromStr for StartMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "normal" => Ok(StartMode::Normal),
            "exclusive" => Ok(StartMode::Exclusive),
            other => Err(format!("unknown start mode '{other}'")),
        }
    }
}

impl<'de> Deserialize<'de> for StartMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Directive queued on a record by an inbound command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleCommand {
    Start,
    Close,
}

/// One supervised module.
///
/// Configuration fields are set at load time and left alone afterwards.
/// Runtime fields are owned by the supervisor.
pub struct ModuleRecord {
    pub name: String,
    pub executable: PathBuf,
    pub working_directory: Option<PathBuf>,
    pub start_mode: StartMode,
    pub auto_start: bool,
    /// -1 means the module does not wait for anything.
    pub start_priority: i32,
    /// -1 means the module may be closed at any time.
    pub close_priority: i32,
    pub after_start_delay: Duration,
    /// 0 means unlimited.
    pub max_start_count: u32,
    pub first_ping_timeout_base_secs: u64,
    pub kill_timeout_secs: u64,
    pub gui: bool,
    /// Arguments for the first successful start only.
    pub launch_arguments: Option<String>,

    pub need_to_start: bool,
    pub previous_need_to_start: bool,
    pub restart_count: u32,
    pub no_response_count: u32,
    pub kill_on_start_count: u32,
    /// Time of the last spawn.
    pub init_date: DateTime<Utc>,
    /// Time of the last message from the module.
    pub last_update: DateTime<Utc>,
    /// Arguments supplied by `start_module` or `restart`.
    pub params: String,
    pub command_queue: VecDeque<ModuleCommand>,
    pub last_message: Option<String>,
    pub process: Option<Box<dyn ProcessHandle>>,
    /// First memory sample taken after the module started, in bytes.
    pub memory_baseline: Option<u64>,
}

impl ModuleRecord {
    /// Create an idle record with default settings.
    pub fn new(
        name: impl Into<String>,
        executable: impl Into<PathBuf>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            executable: executable.into(),
            working_directory: None,
            start_mode: StartMode::Normal,
            auto_start: false,
            start_priority: 0,
            close_priority: 0,
            after_start_delay: Duration::ZERO,
            max_start_count: 0,
            first_ping_timeout_base_secs: FIRST_PING_TIMEOUT_DEFAULT_SECS,
            kill_timeout_secs: KILL_MODULE_TIMEOUT_SECS,
            gui: false,
            launch_arguments: None,
            need_to_start: false,
            previous_need_to_start: false,
            restart_count: 0,
            no_response_count: 0,
            kill_on_start_count: 0,
            init_date: now,
            last_update: now,
            params: String::new(),
            command_queue: VecDeque::new(),
            last_message: None,
            process: None,
            memory_baseline: None,
        }
    }

    pub fn is_exclusive(&self) -> bool {
        self.start_mode == StartMode::Exclusive
    }

    pub fn is_running(&self) -> bool {
        self.process.as_ref().is_some_and(|p| p.is_running())
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(|p| p.pid())
    }

    /// Spawned but not heard from yet.
    pub fn in_startup_grace(&self) -> bool {
        self.init_date == self.last_update
    }

    /// Time a fresh process gets to send its first message.
    ///
    /// Grows by ten seconds for every kill that happened before the first
    /// message and is capped at ten minutes.
    pub fn first_ping_timeout(&self) -> Duration {
        let grown = self.first_ping_timeout_base_secs.saturating_add(
            u64::from(self.kill_on_start_count).saturating_mul(FIRST_PING_TIMEOUT_INCREMENT_SECS),
        );
        Duration::from_secs(grown.min(FIRST_PING_TIMEOUT_MAX_SECS))
    }

    /// Timeout after which a module that ignores `close` is killed.
    pub fn close_timeout(&self) -> Duration {
        if self.name.eq_ignore_ascii_case(UPDATER_MODULE) {
            Duration::from_secs(SLOW_PC_KILL_MODULE_TIMEOUT_SECS)
        } else {
            Duration::from_secs(self.kill_timeout_secs)
        }
    }

    /// Arguments for the next spawn: queued params win over one-shot launch arguments.
    pub fn spawn_arguments(&self) -> &str {
        if !self.params.is_empty() {
            &self.params
        } else {
            self.launch_arguments.as_deref().unwrap_or_default()
        }
    }

    /// Record a successful spawn.
    pub fn mark_started(&mut self, now: DateTime<Utc>) {
        self.restart_count += 1;
        self.init_date = now;
        self.last_update = now;
        self.launch_arguments = None;
        self.memory_baseline = None;
    }

    /// The module was heard from.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_update = now.max(self.init_date);
        self.kill_on_start_count = 0;
        self.no_response_count = 0;
    }

    /// Kill the process and wait for it.
    ///
    /// The handle stays on the record so the exit is still reaped and
    /// announced by the supervisor.
    pub fn kill(&mut self, grace: Duration) -> bool {
        let Some(process) = self.process.as_mut() else {
            return true;
        };
        let killed = process.kill(grace);

        if self.init_date == self.last_update {
            self.kill_on_start_count += 1;
        } else {
            self.kill_on_start_count = 0;
        }
        killed
    }

    /// Move both timestamps after the wall clock was changed.
    pub fn shift_times(&mut self, offset: chrono::Duration) {
        self.init_date += offset;
        self.last_update += offset;
    }
}

impl fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("name", &self.name)
            .field("executable", &self.executable)
            .field("start_mode", &self.start_mode)
            .field("need_to_start", &self.need_to_start)
            .field("restart_count", &self.restart_count)
            .field("no_response_count", &self.no_response_count)
            .field("kill_on_start_count", &self.kill_on_start_count)
            .field("init_date", &self.init_date)
            .field("last_update", &self.last_update)
            .field("pid", &self.pid())
            .finish_non_exhaustive()
    }
}
