//! Terminal rendering of the session countdown and user notices

use std::io::Write;

use crate::session::{SessionPhase, TimerSnapshot, UrgencyTier};

/// Receives the timer state after every tick and every reset.
pub trait TimerView: Send {
    fn render(&mut self, snapshot: &TimerSnapshot);
}

/// Discards every frame.
#[derive(Debug, Default)]
pub struct NullView;

impl TimerView for NullView {
    fn render(&mut self, _snapshot: &TimerSnapshot) {}
}

/// Single status line, rewritten in place with a carriage return.
pub struct TerminalView<W: Write + Send> {
    out: W,
    /// Width of the previous line, so shorter lines fully overwrite it
    last_width: usize,
}

impl<W: Write + Send> TerminalView<W> {
    pub fn new(out: W) -> Self {
        Self { out, last_width: 0 }
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.out
    }
}

impl TerminalView<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

/// Text of the status line for a snapshot.
pub fn status_line(snapshot: &TimerSnapshot) -> String {
    if snapshot.phase == SessionPhase::Expired {
        return "Session expired. Redirecting to login...".to_string();
    }
    let marker = match snapshot.urgency {
        UrgencyTier::Normal => "",
        UrgencyTier::Urgent => "!",
    };
    let mut line = format!("Session time left: {}{}", snapshot.clock, marker);
    if let Some(secs) = snapshot.modal_secs {
        line.push_str(&format!(
            "  | Your session expires in {secs}s. Type 'stay' to stay logged in."
        ));
    }
    line
}

impl<W: Write + Send> TimerView for TerminalView<W> {
    fn render(&mut self, snapshot: &TimerSnapshot) {
        let line = status_line(snapshot);
        let width = line.chars().count();
        let pad = self.last_width.saturating_sub(width);
        self.last_width = width;

        let _ = write!(self.out, "\r{line}{}", " ".repeat(pad));
        if snapshot.phase == SessionPhase::Expired {
            let _ = writeln!(self.out);
        }
        let _ = self.out.flush();
    }
}

/// Severity of a user-visible message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// Message shown to the operator or end user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.level {
            NoticeLevel::Success => write!(f, "[ok] {}", self.text),
            NoticeLevel::Error => write!(f, "[error] {}", self.text),
        }
    }
}
