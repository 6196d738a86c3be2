//! Configuration file and module table loading.
//!
//! ```toml
//! [supervisor]
//! check_interval_ms = 3000
//! bus_dir = "/tmp/kiosk-watch"
//! log_dir = "/var/log/kiosk"
//!
//! [[module]]
//! name = "ui"
//! file = "{WS_DIR}/kiosk-ui"
//! autostart = true
//! gui = true
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::constants::{
    CHECK_INTERVAL_MS, FIRST_PING_TIMEOUT_DEFAULT_SECS, KILL_MODULE_TIMEOUT_SECS,
    SLOW_PC_KILL_MODULE_TIMEOUT_SECS, SLOW_PC_THRESHOLD_MHZ,
};
use crate::models::{ModuleRecord, StartMode};

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "kiosk-watch.toml";

/// Placeholder replaced by the directory of the supervisor executable.
const WS_DIR_PLACEHOLDER: &str = "{ws_dir}";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default)]
    pub supervisor: SupervisorSettings,
    #[serde(default, rename = "module")]
    pub modules: Vec<ModuleDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    pub check_interval_ms: u64,
    pub bus_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
    /// Watch for system time changes.
    pub clock_watch: bool,
    pub pid_file: Option<PathBuf>,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            check_interval_ms: CHECK_INTERVAL_MS,
            bus_dir: PathBuf::from("/tmp/kiosk-watch"),
            log_dir: None,
            clock_watch: true,
            pid_file: None,
        }
    }
}

impl SupervisorSettings {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms.max(1))
    }
}

/// One `[[module]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub start_mode: StartMode,
    #[serde(default)]
    pub autostart: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub close_priority: i32,
    /// Milliseconds.
    #[serde(default)]
    pub after_start_delay: u64,
    #[serde(default)]
    pub max_start_count: u32,
    #[serde(default)]
    pub gui: bool,
    /// Seconds.
    #[serde(default = "default_first_ping_timeout")]
    pub first_ping_timeout: u64,
    /// Seconds. Never lower than the host default.
    #[serde(default)]
    pub kill_timeout: Option<u64>,
}

fn default_first_ping_timeout() -> u64 {
    FIRST_PING_TIMEOUT_DEFAULT_SECS
}

impl ModuleDefinition {
    pub fn new(name: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            working_directory: None,
            start_mode: StartMode::Normal,
            autostart: false,
            priority: 0,
            close_priority: 0,
            after_start_delay: 0,
            max_start_count: 0,
            gui: false,
            first_ping_timeout: FIRST_PING_TIMEOUT_DEFAULT_SECS,
            kill_timeout: None,
        }
    }

    fn to_record(
        &self,
        app_dir: &Path,
        default_kill_timeout: u64,
        now: DateTime<Utc>,
    ) -> ModuleRecord {
        let mut record = ModuleRecord::new(
            self.name.clone(),
            PathBuf::from(expand_ws_dir(&self.file, app_dir)),
            now,
        );
        record.working_directory = self
            .working_directory
            .as_deref()
            .filter(|dir| !dir.trim().is_empty())
            .map(|dir| PathBuf::from(expand_ws_dir(dir, app_dir)));
        record.start_mode = self.start_mode;
        record.auto_start = self.autostart;
        record.need_to_start = self.autostart;
        record.start_priority = self.priority;
        record.close_priority = self.close_priority;
        record.after_start_delay = Duration::from_millis(self.after_start_delay);
        record.max_start_count = self.max_start_count;
        record.gui = self.gui;
        record.first_ping_timeout_base_secs = self.first_ping_timeout;
        record.kill_timeout_secs = self
            .kill_timeout
            .unwrap_or(default_kill_timeout)
            .max(default_kill_timeout);
        record
    }
}

impl WatchConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: WatchConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Build the module table.
    ///
    /// Entries without a name or file are skipped; a later entry with the same
    /// name replaces an earlier one. `launch_args` are attached by module name.
    pub fn build_records(
        &self,
        app_dir: &Path,
        default_kill_timeout: u64,
        launch_args: Option<&HashMap<String, String>>,
        now: DateTime<Utc>,
    ) -> BTreeMap<String, ModuleRecord> {
        let mut records = BTreeMap::new();

        for definition in &self.modules {
            if definition.name.trim().is_empty() || definition.file.trim().is_empty() {
                tracing::warn!(
                    "Skipping module entry without name or file (name '{}', file '{}')",
                    definition.name,
                    definition.file
                );
                continue;
            }

            let mut record = definition.to_record(app_dir, default_kill_timeout, now);
            record.launch_arguments = launch_args.and_then(|args| args.get(&record.name).cloned());

            tracing::info!(
                "Module with name {} ({}) has been added to the watch service list.",
                record.name,
                record.executable.display()
            );

            if let Some(previous) = records.insert(record.name.clone(), record) {
                tracing::warn!(
                    "Module {} is defined more than once, the last definition wins",
                    previous.name
                );
            }
        }

        records
    }
}

/// Replace `{WS_DIR}` (any case) with `app_dir`.
pub fn expand_ws_dir(value: &str, app_dir: &Path) -> String {
    let replacement = app_dir.to_string_lossy();
    // ASCII lowercasing keeps byte offsets intact
    let lowered = value.to_ascii_lowercase();

    let mut result = String::with_capacity(value.len());
    let mut rest = 0;
    for (start, _) in lowered.match_indices(WS_DIR_PLACEHOLDER) {
        result.push_str(&value[rest..start]);
        result.push_str(&replacement);
        rest = start + WS_DIR_PLACEHOLDER.len();
    }
    result.push_str(&value[rest..]);
    result
}

/// Kill timeout floor for this host: slow machines get more time.
///
/// An unknown CPU speed counts as fast.
pub fn default_kill_timeout(cpu_mhz: Option<u64>) -> u64 {
    match cpu_mhz {
        Some(mhz) if mhz < SLOW_PC_THRESHOLD_MHZ => SLOW_PC_KILL_MODULE_TIMEOUT_SECS,
        _ => KILL_MODULE_TIMEOUT_SECS,
    }
}

/// Parse a `NAME=ARGS` command-line module option.
pub fn parse_module_option(raw: &str) -> Result<(String, String)> {
    let Some((name, args)) = raw.split_once('=') else {
        bail!("Expected NAME=ARGS, got '{raw}'");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("Module name is empty in '{raw}'");
    }
    Ok((name.to_string(), args.to_string()))
}

/// Directory of the running executable, used for `{WS_DIR}`.
pub fn executable_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Where the module table comes from. Reloaded on every (re)initialization.
pub trait ModuleSource: Send {
    /// Load the module table. `first_load` is true only for the very first
    /// initialization of the process.
    fn load(
        &mut self,
        first_load: bool,
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<String, ModuleRecord>>;
}

#[derive(Debug, Clone)]
enum ConfigOrigin {
    File(PathBuf),
    Inline(WatchConfig),
}

/// Module table backed by a [`WatchConfig`].
#[derive(Debug, Clone)]
pub struct ConfigModuleSource {
    origin: ConfigOrigin,
    app_dir: PathBuf,
    launch_args: HashMap<String, String>,
    default_kill_timeout: u64,
}

impl ConfigModuleSource {
    /// Re-read `path` on every load.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self::with_origin(ConfigOrigin::File(path.into()))
    }

    pub fn from_config(config: WatchConfig) -> Self {
        Self::with_origin(ConfigOrigin::Inline(config))
    }

    fn with_origin(origin: ConfigOrigin) -> Self {
        Self {
            origin,
            app_dir: executable_dir(),
            launch_args: HashMap::new(),
            default_kill_timeout: KILL_MODULE_TIMEOUT_SECS,
        }
    }

    pub fn with_app_dir(mut self, app_dir: impl Into<PathBuf>) -> Self {
        self.app_dir = app_dir.into();
        self
    }

    /// One-shot arguments by module name, applied on the first load only.
    pub fn with_launch_args(mut self, launch_args: HashMap<String, String>) -> Self {
        self.launch_args = launch_args;
        self
    }

    pub fn with_default_kill_timeout(mut self, secs: u64) -> Self {
        self.default_kill_timeout = secs;
        self
    }
}

impl ModuleSource for ConfigModuleSource {
    fn load(
        &mut self,
        first_load: bool,
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<String, ModuleRecord>> {
        let loaded;
        let config = match &self.origin {
            ConfigOrigin::File(path) => {
                loaded = WatchConfig::load(path)?;
                &loaded
            }
            ConfigOrigin::Inline(config) => config,
        };

        let launch_args = first_load.then_some(&self.launch_args);
        Ok(config.build_records(&self.app_dir, self.default_kill_timeout, launch_args, now))
    }
}
