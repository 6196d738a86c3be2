/// Name the supervisor uses as `sender` on the bus.
pub const SUPERVISOR_NAME: &str = "watch_service";

/// Sender name the supervisor uses for close passes it starts on its own behalf.
pub const SUPERVISOR_MODULE: &str = "watchdog";

/// The updater module. It gets a fixed close timeout and special close broadcasts.
pub const UPDATER_MODULE: &str = "updater";

/// Sender name used when the operating system asks the supervisor to stop.
pub const SYSTEM_SENDER: &str = "SYSTEM";

/// Interval between reconcile ticks in milliseconds.
pub const CHECK_INTERVAL_MS: u64 = 3_000;

/// Default kill timeout in seconds.
pub const KILL_MODULE_TIMEOUT_SECS: u64 = 30;

/// Hosts below this CPU speed (MHz) are treated as slow hardware.
pub const SLOW_PC_THRESHOLD_MHZ: u64 = 1_400;

/// Kill timeout in seconds on slow hardware, and for the updater everywhere.
pub const SLOW_PC_KILL_MODULE_TIMEOUT_SECS: u64 = 180;

/// Default time a freshly spawned module gets to send its first message.
pub const FIRST_PING_TIMEOUT_DEFAULT_SECS: u64 = 60;

/// Added to the first ping timeout each time a module is killed before its first message.
pub const FIRST_PING_TIMEOUT_INCREMENT_SECS: u64 = 10;

/// Upper bound for the first ping timeout.
pub const FIRST_PING_TIMEOUT_MAX_SECS: u64 = 600;

/// Grace window between SIGTERM and SIGKILL when killing a module.
pub const KILL_GRACE_PERIOD_MS: u64 = 3_000;

/// Exit code a module uses to say "I exited on purpose, do not announce it".
pub const CONTINUE_EXECUTION_EXIT_CODE: i32 = 54_321;

/// Delay before a failed bus initialization is retried.
pub const REINITIALIZE_TIMEOUT_MS: u64 = 7_000;

/// Consecutive bus initialization failures tolerated before rebooting the host.
pub const REINITIALIZE_FAIL_MAX_COUNT: u32 = 85;

/// Delay between close orchestration passes.
pub const CLOSE_RETRY_MS: u64 = 1_000;

/// After a plain `close`, modules are started again after this delay.
pub const RESTART_AFTER_CLOSE_SECS: u64 = 5 * 60;

/// An auto-start module closed with `close_module` is re-enabled after this delay.
pub const AUTO_START_RECOVERY_SECS: u64 = 10 * 60;

/// Delay between a module start and its first memory sample.
pub const MEMORY_SAMPLE_AFTER_START_SECS: u64 = 2 * 60;

/// Interval of the periodic memory report.
pub const MEMORY_REPORT_INTERVAL_SECS: u64 = 60 * 60;

/// A memory difference at or above this share of the baseline is logged as a warning.
pub const MEMORY_WARNING_PERCENT: f64 = 25.0;

/// Clicks on the lock screen older than this are forgotten.
pub const SCREEN_ACTIVITY_TIMEOUT_MS: u64 = 5_000;

/// Valid click zones on the lock screen.
pub const SCREEN_ZONES: std::ops::RangeInclusive<u8> = 1..=5;

/// Sampling period of the clock watcher.
pub const CLOCK_SAMPLE_INTERVAL_MS: u64 = 100;

/// Minimum wall-clock discontinuity reported as a clock change.
pub const CLOCK_JUMP_THRESHOLD_MS: i64 = 1_000;

/// A second clock change within this window of the first one is suppressed.
pub const CLOCK_JUMP_DEBOUNCE_MS: u64 = 2_000;

/// Longest the event loop blocks before it looks for exited children again.
pub const EXIT_POLL_INTERVAL_MS: u64 = 100;
