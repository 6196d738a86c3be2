//! Tracing setup and the rotatable log file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use chrono::Local;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_STEM: &str = "kiosk-watch";

#[derive(Debug)]
struct LogFile {
    path: PathBuf,
    file: File,
}

/// Handle to the supervisor's log file. Clones share the file.
///
/// A disabled handle swallows everything; rotation is then a no-op.
#[derive(Debug, Clone, Default)]
pub struct LogHandle {
    inner: Option<Arc<Mutex<LogFile>>>,
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

impl LogHandle {
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Open (or create) `<dir>/kiosk-watch.log`.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
        let path = dir.join(format!("{LOG_STEM}.log"));
        let file = open_append(&path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;

        Ok(Self {
            inner: Some(Arc::new(Mutex::new(LogFile { path, file }))),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.inner.as_ref().map(|inner| lock(inner).path.clone())
    }

    /// Move the current file aside and continue in a fresh one.
    ///
    /// Returns the path the old file was moved to.
    pub fn rotate(&self) -> Result<Option<PathBuf>> {
        let Some(inner) = &self.inner else {
            return Ok(None);
        };
        let mut log = lock(inner);
        let _ = log.file.flush();

        let dir = log.path.parent().map(Path::to_path_buf).unwrap_or_default();
        let stamp = Local::now().format("%Y%m%d-%H%M%S");
        let mut archived = dir.join(format!("{LOG_STEM}.{stamp}.log"));
        let mut suffix = 1;
        while archived.exists() {
            archived = dir.join(format!("{LOG_STEM}.{stamp}-{suffix}.log"));
            suffix += 1;
        }

        fs::rename(&log.path, &archived)
            .with_context(|| format!("Failed to archive log file: {}", log.path.display()))?;
        log.file = open_append(&log.path)
            .with_context(|| format!("Failed to reopen log file: {}", log.path.display()))?;

        Ok(Some(archived))
    }
}

fn lock(inner: &Mutex<LogFile>) -> MutexGuard<'_, LogFile> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Writer handed to the fmt layer for each event.
pub struct LogWriter {
    inner: Option<Arc<Mutex<LogFile>>>,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &self.inner {
            Some(inner) => lock(inner).file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &self.inner {
            Some(inner) => lock(inner).file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for LogHandle {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            inner: self.inner.clone(),
        }
    }
}

/// Install the global subscriber: stderr always, the log file when `log_dir` is set.
///
/// `RUST_LOG` overrides the default `info` filter.
pub fn init(log_dir: Option<&Path>) -> Result<LogHandle> {
    let handle = match log_dir {
        Some(dir) => LogHandle::open(dir)?,
        None => LogHandle::disabled(),
    };

    let file_layer = handle.is_enabled().then(|| {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(handle.clone())
    });

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(handle)
}
