//! Admin session countdown state

use crate::config::SessionSettings;
use crate::modal::WarningModal;
use serde::{Deserialize, Serialize};

/// Full session length in seconds (5 minutes).
pub const SESSION_DURATION_SECS: u32 = 300;
/// Remaining time at which the warning modal appears.
pub const WARNING_THRESHOLD_SECS: u32 = 30;
/// At or below this many seconds the countdown is rendered as urgent.
pub const URGENT_THRESHOLD_SECS: u32 = 60;

/// Lifecycle phase of a session timer instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Counting down
    #[default]
    Active,
    /// Countdown reached zero (terminal)
    Expired,
}

/// Visual urgency of the countdown display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyTier {
    Normal,
    Urgent,
}

impl UrgencyTier {
    /// Tier for a remaining time, given the urgent threshold.
    pub fn for_remaining(remaining: u32, urgent_secs: u32) -> Self {
        if remaining <= urgent_secs {
            Self::Urgent
        } else {
            Self::Normal
        }
    }

    /// Hex background color of the timer panel
    pub fn background(&self) -> &'static str {
        match self {
            Self::Normal => "#FFEB3B", // Yellow
            Self::Urgent => "#F8D7DA", // Pale red
        }
    }

    /// Hex accent (left border) color of the timer panel
    pub fn accent(&self) -> &'static str {
        match self {
            Self::Normal => "#F57C00", // Orange
            Self::Urgent => "#DC3545", // Red
        }
    }
}

/// Result of advancing the countdown by one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Still counting down
    Ticked { remaining: u32 },
    /// The warning modal was just shown
    WarningShown { remaining: u32 },
    /// This tick reached zero
    Expired,
    /// The session had already expired; nothing changed
    Ignored,
}

/// Read-only view of the timer, published after every mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    pub remaining_secs: u32,
    /// `MM:SS`
    pub clock: String,
    pub urgency: UrgencyTier,
    pub modal_visible: bool,
    /// Countdown shown in the modal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modal_secs: Option<u32>,
    pub phase: SessionPhase,
    /// Ticks applied since the timer started; unchanged by resets
    #[serde(default)]
    pub ticks: u64,
}

/// Format seconds as zero-padded `MM:SS`.
pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Countdown state for one admin session.
///
/// Mutated only through [`tick`](Self::tick) and [`reset`](Self::reset).
#[derive(Debug, Clone)]
pub struct SessionTimerState {
    settings: SessionSettings,
    remaining: u32,
    modal: WarningModal,
    phase: SessionPhase,
    ticks: u64,
}

impl Default for SessionTimerState {
    fn default() -> Self {
        Self::new(SessionSettings::default())
    }
}

impl SessionTimerState {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            remaining: settings.duration_secs,
            settings,
            modal: WarningModal::new(),
            phase: SessionPhase::Active,
            ticks: 0,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn modal(&self) -> &WarningModal {
        &self.modal
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn is_expired(&self) -> bool {
        self.phase == SessionPhase::Expired
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn urgency(&self) -> UrgencyTier {
        UrgencyTier::for_remaining(self.remaining, self.settings.urgent_secs)
    }

    /// True when the next tick would reach zero.
    pub fn expires_on_next_tick(&self) -> bool {
        !self.is_expired() && self.remaining <= 1
    }

    /// Advance the countdown by one second.
    ///
    /// Rules are applied in order: show the modal when crossing the warning
    /// threshold, mirror the countdown into a visible modal, then expire at zero.
    pub fn tick(&mut self) -> TickOutcome {
        if self.is_expired() {
            return TickOutcome::Ignored;
        }

        self.ticks += 1;
        self.remaining = self.remaining.saturating_sub(1);

        let mut warning_shown = false;
        if self.remaining == self.settings.warning_secs {
            self.modal.show(self.remaining);
            warning_shown = true;
        }
        self.modal.sync(self.remaining);

        if self.remaining == 0 {
            self.phase = SessionPhase::Expired;
            self.modal.hide();
            return TickOutcome::Expired;
        }

        if warning_shown {
            TickOutcome::WarningShown {
                remaining: self.remaining,
            }
        } else {
            TickOutcome::Ticked {
                remaining: self.remaining,
            }
        }
    }

    /// Restore the full duration and hide the modal.
    ///
    /// Returns false (and changes nothing) once the session has expired.
    pub fn reset(&mut self) -> bool {
        if self.is_expired() {
            return false;
        }
        self.remaining = self.settings.duration_secs;
        self.modal.hide();
        true
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            remaining_secs: self.remaining,
            clock: format_clock(self.remaining),
            urgency: self.urgency(),
            modal_visible: self.modal.is_visible(),
            modal_secs: self.modal.displayed(),
            phase: self.phase,
            ticks: self.ticks,
        }
    }
}
