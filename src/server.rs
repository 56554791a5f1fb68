//! Unix socket server for the running admin session
//!
//! Listens on `$TMPDIR/medguard.sock` for newline-delimited JSON messages.
//! Each message is deserialized as a `SessionEvent` and forwarded to the timer.
//! `subscribe` turns the connection into a signal stream.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, trace, warn};

use crate::activity::ActivityMonitor;
use crate::event::SessionEvent;
use crate::timer::SessionHandle;

/// Removes the socket file when the server goes away.
struct SocketGuard(PathBuf);

impl Drop for SocketGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

/// Start the Unix socket server.
///
/// Removes any stale socket file, binds to the path, and accepts connections
/// until the session timer stops.
pub async fn start(path: PathBuf, monitor: Arc<Mutex<ActivityMonitor>>) {
    // Remove stale socket if it exists
    if path.exists()
        && let Err(e) = std::fs::remove_file(&path)
    {
        warn!("Failed to remove stale socket {}: {}", path.display(), e);
        return;
    }

    let listener = match UnixListener::bind(&path) {
        Ok(l) => l,
        Err(e) => {
            warn!("Failed to bind Unix socket {}: {}", path.display(), e);
            return;
        }
    };
    let _guard = SocketGuard(path.clone());

    info!("IPC server listening on {}", path.display());

    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let monitor = Arc::clone(&monitor);
                tokio::spawn(serve_connection(stream, monitor));
            }
            Err(e) => {
                warn!("Failed to accept socket connection: {}", e);
            }
        }
    }
}

async fn serve_connection(stream: UnixStream, monitor: Arc<Mutex<ActivityMonitor>>) {
    let (read, write) = stream.into_split();
    let mut write = Some(write);
    let mut lines = BufReader::new(read).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if line.is_empty() {
            continue;
        }
        let event = match serde_json::from_str::<SessionEvent>(&line) {
            Ok(event) => event,
            Err(e) => {
                trace!("Failed to parse IPC message: {} (line: {})", e, line);
                continue;
            }
        };
        debug!(?event, "ipc event");

        match event {
            SessionEvent::Activity { kind } => {
                if let Ok(mut monitor) = monitor.lock() {
                    monitor.observe(kind);
                }
            }
            SessionEvent::StayLoggedIn => {
                if let Ok(monitor) = monitor.lock() {
                    monitor.handle().stay_logged_in();
                }
            }
            SessionEvent::Subscribe => {
                let handle = match monitor.lock() {
                    Ok(monitor) => monitor.handle().clone(),
                    Err(_) => continue,
                };
                if let Some(write) = write.take() {
                    tokio::spawn(forward_signals(handle, write));
                }
            }
        }
    }
}

async fn forward_signals(handle: SessionHandle, mut write: OwnedWriteHalf) {
    let mut signals = handle.subscribe();
    drop(handle);

    while let Some(signal) = signals.recv().await {
        let Ok(mut json) = serde_json::to_string(&signal) else {
            continue;
        };
        json.push('\n');
        if let Err(e) = write.write_all(json.as_bytes()).await {
            debug!("subscriber went away: {}", e);
            return;
        }
    }
}
