//! Process handles backed by real OS processes.

use std::os::unix::process::ExitStatusExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use wait_timeout::ChildExt;

use super::{LaunchSpec, ProcessExit, ProcessHandle, ProcessLauncher};
use crate::error::SpawnError;

/// Launcher producing [`OsProcess`] handles.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsLauncher;

impl ProcessLauncher for OsLauncher {
    fn create(&self, _module: &str) -> Box<dyn ProcessHandle> {
        Box::new(OsProcess::default())
    }
}

/// A child process spawned with `std::process`.
#[derive(Debug, Default)]
pub struct OsProcess {
    child: Option<Child>,
    exit: Option<ProcessExit>,
    reported: bool,
}

impl ProcessHandle for OsProcess {
    fn start(&mut self, spec: &LaunchSpec) -> Result<(), SpawnError> {
        if self.is_running() {
            return Err(SpawnError::AlreadyRunning {
                pid: self.pid().unwrap_or_default(),
            });
        }

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.arguments).stdin(Stdio::null());

        if let Some(dir) = &spec.working_directory {
            if !dir.as_os_str().is_empty() {
                cmd.current_dir(dir);
            }
        }

        // spawn() only returns after exec succeeded or failed in the child
        let child = cmd
            .spawn()
            .map_err(|e| SpawnError::from_io(spec.program.clone(), e))?;

        self.child = Some(child);
        self.exit = None;
        self.reported = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.child.is_some() && self.exit.is_none()
    }

    fn poll_exit(&mut self) -> Option<ProcessExit> {
        if self.exit.is_none() {
            if let Some(child) = self.child.as_mut() {
                match child.try_wait() {
                    Ok(Some(status)) => self.exit = Some(to_process_exit(status)),
                    Ok(None) => {}
                    Err(e) => tracing::debug!("Failed to poll child {}: {e}", child.id()),
                }
            }
        }

        match self.exit {
            Some(exit) if !self.reported => {
                self.reported = true;
                Some(exit)
            }
            _ => None,
        }
    }

    fn kill(&mut self, grace: Duration) -> bool {
        if self.exit.is_some() {
            return true;
        }
        let Some(child) = self.child.as_mut() else {
            return true;
        };

        if let Ok(Some(status)) = child.try_wait() {
            self.exit = Some(to_process_exit(status));
            return true;
        }

        if let Ok(pid) = i32::try_from(child.id()) {
            // ESRCH means it is already gone; wait() below collects it
            let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
        }

        match child.wait_timeout(grace) {
            Ok(Some(status)) => {
                self.exit = Some(to_process_exit(status));
                return true;
            }
            Ok(None) => {}
            Err(e) => tracing::debug!("Failed to wait for child {}: {e}", child.id()),
        }

        let _ = child.kill();
        match child.wait() {
            Ok(status) => {
                self.exit = Some(to_process_exit(status));
                true
            }
            Err(e) => {
                tracing::warn!("Failed to reap child {}: {e}", child.id());
                false
            }
        }
    }

    fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }
}

fn to_process_exit(status: ExitStatus) -> ProcessExit {
    match status.code() {
        Some(code) => ProcessExit::exited(code),
        None => ProcessExit::signaled(status.signal().unwrap_or_default()),
    }
}
