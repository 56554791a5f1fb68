//! Activity monitor
//!
//! Forwards user interaction to the session timer as resets. With the default
//! zero debounce every occurrence is forwarded. A non-zero debounce drops events
//! that arrive within the window of the last forwarded one, but only while no
//! tick has landed since that forward, so the countdown reads the same as it
//! would without debouncing.
//!
//! Terminal input is read on its own thread and handed over a channel, so a
//! pending read never holds the process open after the session ends.

use std::io::BufRead;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::config::SessionSettings;
use crate::event::ActivityKind;
use crate::timer::SessionHandle;

/// Terminal input lines that choose "stay logged in" in the warning modal
const STAY_COMMANDS: &[&str] = &["stay", "s", "y", "yes"];

#[derive(Debug)]
pub struct ActivityMonitor {
    handle: SessionHandle,
    debounce: Duration,
    /// When the last reset was sent, and the tick count it was sent at
    last_forwarded: Option<(Instant, u64)>,
}

impl ActivityMonitor {
    pub fn new(handle: SessionHandle, settings: &SessionSettings) -> Self {
        Self {
            handle,
            debounce: settings.activity_debounce().min(settings.tick_interval()),
            last_forwarded: None,
        }
    }

    /// Record one occurrence of user activity.
    ///
    /// Returns true if a reset was sent to the timer.
    pub fn observe(&mut self, kind: ActivityKind) -> bool {
        let now = Instant::now();
        let ticks = self.handle.snapshot().ticks;
        if let Some((at, at_ticks)) = self.last_forwarded
            && at_ticks == ticks
            && now.saturating_duration_since(at) < self.debounce
        {
            trace!(?kind, "activity debounced");
            return false;
        }
        if self.handle.activity(kind) {
            self.last_forwarded = Some((now, ticks));
            true
        } else {
            false
        }
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }
}

/// What a line typed into the session terminal means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    /// Any keypress: reset the countdown
    Activity,
    /// Keypress that also answers the warning modal
    StayLoggedIn,
}

/// Classify a terminal input line. "stay" only counts while the warning is shown.
pub fn classify_input(line: &str, modal_visible: bool) -> InputAction {
    let answer = line.trim().to_ascii_lowercase();
    if modal_visible && STAY_COMMANDS.contains(&answer.as_str()) {
        InputAction::StayLoggedIn
    } else {
        InputAction::Activity
    }
}

/// Read lines from `reader` on a dedicated thread.
///
/// The channel closes at end of input. The thread is detached: a read still
/// blocked when the session ends is abandoned with the process.
pub fn spawn_line_reader<R>(reader: R) -> mpsc::UnboundedReceiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let spawned = std::thread::Builder::new()
        .name("medguard-input".into())
        .spawn(move || {
            for line in reader.lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        warn!("Failed to start input reader: {}", e);
    }
    rx
}

/// Feed typed lines into the session: every line is a keypress, and "stay"
/// also answers the warning. Returns when input closes or the session stops.
pub async fn forward_input(
    mut lines: mpsc::UnboundedReceiver<String>,
    monitor: Arc<Mutex<ActivityMonitor>>,
) {
    while let Some(line) = lines.recv().await {
        let Ok(mut monitor) = monitor.lock() else {
            return;
        };
        if monitor.handle().is_closed() {
            break;
        }
        let modal_visible = monitor.handle().snapshot().modal_visible;
        monitor.observe(ActivityKind::Keypress);
        if classify_input(&line, modal_visible) == InputAction::StayLoggedIn {
            monitor.handle().stay_logged_in();
        }
    }
    debug!("terminal input closed");
}
