//! Session timeout warning modal

/// Warning shown while the session is about to expire.
///
/// The modal has no close button: it only disappears when the session is reset
/// (activity or keep-alive) or when the countdown reaches zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarningModal {
    visible: bool,
    displayed: u32,
}

impl WarningModal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the modal visible with an initial countdown value.
    pub fn show(&mut self, seconds: u32) {
        self.visible = true;
        self.displayed = seconds;
    }

    /// Mirror the live countdown. No-op while hidden.
    pub fn sync(&mut self, seconds: u32) {
        if self.visible {
            self.displayed = seconds;
        }
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Countdown value shown in the modal, `None` while hidden.
    pub fn displayed(&self) -> Option<u32> {
        self.visible.then_some(self.displayed)
    }
}
