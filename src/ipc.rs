//! IPC utilities for Unix socket communication
//!
//! `medguard session` listens on the socket; other `medguard` invocations (and
//! any other local UI) post newline-delimited JSON `SessionEvent`s to it. A
//! connection that sends `subscribe` receives `SessionSignal` lines back.

use crate::event::{SessionEvent, SessionSignal};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

/// Default socket path for the running session.
pub fn socket_path() -> PathBuf {
    std::env::temp_dir().join("medguard.sock")
}

/// Post events to the running session.
pub fn send(path: &Path, events: &[SessionEvent]) -> std::io::Result<()> {
    let mut stream = UnixStream::connect(path)?;
    for event in events {
        let json = serde_json::to_string(event).map_err(std::io::Error::other)?;
        writeln!(stream, "{json}")?;
    }
    stream.flush()
}

/// Subscribe and block until the session signals expiry or goes away.
///
/// Returns the signal received, or `None` if the session closed without one.
pub fn wait_for_signal(path: &Path) -> std::io::Result<Option<SessionSignal>> {
    let mut stream = UnixStream::connect(path)?;
    let json = serde_json::to_string(&SessionEvent::Subscribe).map_err(std::io::Error::other)?;
    writeln!(stream, "{json}")?;
    stream.flush()?;

    for line in BufReader::new(stream).lines() {
        let line = line?;
        if let Ok(signal) = serde_json::from_str::<SessionSignal>(&line) {
            return Ok(Some(signal));
        }
    }
    Ok(None)
}
