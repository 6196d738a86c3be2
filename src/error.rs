//! Typed errors for the failures the supervisor reacts to.
//!
//! Everything else (configuration, CLI, host actions) uses `anyhow` with context.

use std::io;
use std::path::PathBuf;

/// A module process could not be started.
///
/// The messages carry the translated OS error so the log line alone tells an
/// operator what to fix.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error(
        "The process failed to start. The invoked program is missing: {}",
        program.display()
    )]
    NotFound { program: PathBuf },

    #[error(
        "The process failed to start. Insufficient permissions to invoke the program: {}",
        program.display()
    )]
    PermissionDenied { program: PathBuf },

    #[error("The process failed to start ({}): {source}", program.display())]
    Io {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("The arguments could not be parsed: {arguments}")]
    InvalidArguments { arguments: String },

    #[error("The process is already running with pid {pid}")]
    AlreadyRunning { pid: u32 },
}

impl SpawnError {
    /// Translate an OS spawn error into the matching variant.
    pub fn from_io(program: PathBuf, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => SpawnError::NotFound { program },
            io::ErrorKind::PermissionDenied => SpawnError::PermissionDenied { program },
            _ => SpawnError::Io { program, source },
        }
    }
}

/// The message bus could not be brought up or used.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Failed to prepare bus directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to bind bus socket {}: {source}", path.display())]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to send bus message: {0}")]
    Send(#[source] io::Error),

    #[error("Bus is unavailable: {0}")]
    Unavailable(String),
}
