//! Process capability used by the supervisor
//!
//! The supervisor never talks to the OS directly. It asks a [`ProcessLauncher`]
//! for a fresh [`ProcessHandle`] per start attempt and drives the handle through
//! start, liveness checks, kill and exit reporting.

mod os;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

use crate::error::SpawnError;

pub use os::{OsLauncher, OsProcess};

/// Everything needed to spawn one module process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub arguments: Vec<String>,
    pub working_directory: Option<PathBuf>,
}

impl LaunchSpec {
    /// Build a spec, splitting `arguments` the way a shell would.
    pub fn new(
        program: PathBuf,
        arguments: &str,
        working_directory: Option<PathBuf>,
    ) -> Result<Self, SpawnError> {
        let arguments = shlex::split(arguments).ok_or_else(|| SpawnError::InvalidArguments {
            arguments: arguments.to_string(),
        })?;

        Ok(Self {
            program,
            arguments,
            working_directory,
        })
    }

    /// Command line as it would be typed, for logging.
    pub fn command_line(&self) -> String {
        let mut line = format!("\"{}\"", self.program.display());
        for arg in &self.arguments {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// How a module process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, when the process exited on its own.
    pub code: Option<i32>,
    /// Terminating signal, when the process was killed or crashed.
    pub signal: Option<i32>,
}

impl ProcessExit {
    pub fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn signaled(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    /// A process terminated by a signal counts as crashed.
    pub fn crashed(&self) -> bool {
        self.signal.is_some()
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => write!(f, "unknown status"),
        }
    }
}

/// One OS process owned by one module record.
///
/// A handle is used for a single process lifetime and dropped afterwards.
pub trait ProcessHandle: Send {
    /// Spawn the process. Returns once the OS confirmed the spawn.
    fn start(&mut self, spec: &LaunchSpec) -> Result<(), SpawnError>;

    /// Whether the process was started and has not been seen exiting.
    fn is_running(&self) -> bool;

    /// Look for an exit and report it. Each exit is reported exactly once,
    /// including exits observed by [`ProcessHandle::kill`].
    fn poll_exit(&mut self) -> Option<ProcessExit>;

    /// Ask the process to terminate, force it after `grace`, and wait for it.
    /// Returns `true` once the process is gone.
    fn kill(&mut self, grace: Duration) -> bool;

    fn pid(&self) -> Option<u32>;
}

/// Factory for process handles.
pub trait ProcessLauncher: Send {
    fn create(&self, module: &str) -> Box<dyn ProcessHandle>;
}

/// Check if a process with the given PID is alive
///
/// Uses the null signal to probe the process. `EPERM` means the process
/// exists but belongs to someone else, which still counts as alive.
pub fn is_process_alive(pid: u32) -> bool {
    let pid_i32 = match i32::try_from(pid) {
        Ok(v) => v,
        Err(_) => return false,
    };

    match kill(Pid::from_raw(pid_i32), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(Errno::ESRCH) => false,
        Err(_) => false,
    }
}
