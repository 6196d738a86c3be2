//! Unix datagram transport.
//!
//! Every participant binds `<bus_dir>/<name>.sock`. Publishing sends the
//! datagram to every other socket in the directory; modules filter on `target`.

use std::fs::{self, Permissions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{Bus, BusConnector, BusMessage};
use crate::error::BusError;
use crate::models::constants::SUPERVISOR_NAME;
use crate::supervisor::Event;

/// Largest datagram the receiver accepts.
const MAX_DATAGRAM: usize = 64 * 1024;

const RECEIVE_TIMEOUT: Duration = Duration::from_millis(100);

/// Path of the supervisor's socket inside a bus directory.
pub fn supervisor_socket_path(bus_dir: &Path) -> PathBuf {
    bus_dir.join(format!("{SUPERVISOR_NAME}.sock"))
}

/// Send one message to a running supervisor.
pub fn send_to_supervisor(bus_dir: &Path, message: &BusMessage) -> Result<(), BusError> {
    let socket = UnixDatagram::unbound().map_err(BusError::Send)?;
    socket
        .send_to(message.encode().as_bytes(), supervisor_socket_path(bus_dir))
        .map_err(BusError::Send)?;
    Ok(())
}

/// Binds the supervisor's socket in a bus directory.
#[derive(Debug, Clone)]
pub struct SocketBusConnector {
    bus_dir: PathBuf,
    name: String,
}

impl SocketBusConnector {
    pub fn new(bus_dir: impl Into<PathBuf>) -> Self {
        Self {
            bus_dir: bus_dir.into(),
            name: SUPERVISOR_NAME.to_string(),
        }
    }

    /// Bind under a different participant name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl BusConnector for SocketBusConnector {
    fn connect(&mut self, inbound: Sender<Event>) -> Result<Box<dyn Bus>, BusError> {
        fs::create_dir_all(&self.bus_dir).map_err(|source| BusError::Directory {
            path: self.bus_dir.clone(),
            source,
        })?;

        let path = self.bus_dir.join(format!("{}.sock", self.name));
        let bind_error = |source: io::Error| BusError::Bind {
            path: path.clone(),
            source,
        };

        // Remove stale socket if it exists (ignore NotFound)
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != io::ErrorKind::NotFound {
                return Err(bind_error(e));
            }
        }

        let socket = UnixDatagram::bind(&path).map_err(bind_error)?;
        fs::set_permissions(&path, Permissions::from_mode(0o660)).map_err(bind_error)?;
        socket
            .set_read_timeout(Some(RECEIVE_TIMEOUT))
            .map_err(bind_error)?;
        let receiver = socket.try_clone().map_err(bind_error)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("bus-receiver".to_string())
            .spawn(move || receive_loop(receiver, inbound, flag))
            .map_err(bind_error)?;

        tracing::debug!("Bus socket bound at {}", path.display());

        Ok(Box::new(SocketBus {
            socket,
            path,
            bus_dir: self.bus_dir.clone(),
            shutdown,
            receiver: Some(handle),
        }))
    }
}

fn receive_loop(socket: UnixDatagram, inbound: Sender<Event>, shutdown: Arc<AtomicBool>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    while !shutdown.load(Ordering::Relaxed) {
        match socket.recv(&mut buf) {
            Ok(len) => {
                if inbound.send(Event::Message(buf[..len].to_vec())).is_err() {
                    break;
                }
            }
            Err(ref e)
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(e) => {
                tracing::error!("Bus receive error: {e}");
                break;
            }
        }
    }
}

struct SocketBus {
    socket: UnixDatagram,
    path: PathBuf,
    bus_dir: PathBuf,
    shutdown: Arc<AtomicBool>,
    receiver: Option<JoinHandle<()>>,
}

impl SocketBus {
    fn peers(&self) -> io::Result<Vec<PathBuf>> {
        let mut peers = Vec::new();
        for entry in fs::read_dir(&self.bus_dir)? {
            let path = entry?.path();
            if path != self.path && path.extension().is_some_and(|ext| ext == "sock") {
                peers.push(path);
            }
        }
        Ok(peers)
    }
}

impl Bus for SocketBus {
    fn publish(&mut self, message: &BusMessage) -> Result<(), BusError> {
        if self.receiver.is_none() {
            return Err(BusError::Unavailable("bus stopped".to_string()));
        }

        let encoded = message.encode();
        let peers = self.peers().map_err(BusError::Send)?;
        for peer in peers {
            // A module that went away leaves its socket file behind; skip it
            if let Err(e) = self.socket.send_to(encoded.as_bytes(), &peer) {
                tracing::debug!("Skipping bus peer {}: {e}", peer.display());
            }
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.receiver.take() {
            let _ = handle.join();
            if let Err(e) = fs::remove_file(&self.path) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!("Failed to remove bus socket {}: {e}", self.path.display());
                }
            }
        }
    }
}

impl Drop for SocketBus {
    fn drop(&mut self) {
        self.stop();
    }
}
