//! Single-instance guard
//!
//! `run` holds an exclusive `fs2` advisory lock on the pid file for its whole
//! lifetime. A second supervisor fails to take the lock and refuses to start.

use anyhow::{bail, Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::process::is_process_alive;

/// Locked pid file. Unlocked and removed on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
    file: File,
}

impl PidFile {
    /// Lock `path` and write the current pid into it.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        // Truncate only after the lock is held, the running instance's pid must stay readable
        #[allow(clippy::suspicious_open_options)]
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .with_context(|| format!("Failed to open PID file: {}", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            match read_pid(path) {
                Some(pid) => bail!("Watch service is already running (pid {pid})"),
                None => bail!("Watch service is already running ({})", path.display()),
            }
        }

        file.set_len(0)
            .with_context(|| format!("Failed to truncate PID file: {}", path.display()))?;
        write!(file, "{}", std::process::id())
            .with_context(|| format!("Failed to write PID file: {}", path.display()))?;
        file.flush()
            .with_context(|| format!("Failed to flush PID file: {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!("Failed to remove PID file {}: {e}", self.path.display());
            }
        }
        let _ = FileExt::unlock(&self.file);
    }
}

/// Pid stored in `path`, if the file exists and holds a number.
pub fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok())
}

/// Pid of a live supervisor recorded in `path`.
pub fn running_pid(path: &Path) -> Option<u32> {
    read_pid(path).filter(|&pid| is_process_alive(pid))
}
