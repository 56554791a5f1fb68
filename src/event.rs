//! Session event vocabulary
//!
//! `SessionEvent`s are posted by anything that interacts with the admin session
//! (terminal input, other processes over the IPC socket). `SessionSignal`s flow
//! the other way, to observers that want to react to the session ending.

use serde::{Deserialize, Serialize};

/// Kind of user interaction that counts as activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Click,
    Keypress,
    Mousemove,
    Scroll,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 4] = [
        ActivityKind::Click,
        ActivityKind::Keypress,
        ActivityKind::Mousemove,
        ActivityKind::Scroll,
    ];
}

/// Result of a keep-alive ping. Both variants reset the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeepAliveOutcome {
    Success,
    Failure(String),
}

impl KeepAliveOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Message accepted by a running session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// User interaction occurred
    Activity { kind: ActivityKind },
    /// "Stay logged in" was chosen in the warning modal
    StayLoggedIn,
    /// Ask to receive `SessionSignal`s on this connection
    Subscribe,
}

/// Broadcast emitted by a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionSignal {
    /// Countdown reached zero; the client is navigating to the login page
    SessionExpired,
}
