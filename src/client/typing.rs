use std::time::Duration;

use tokio::time::Instant;

pub const DEFAULT_TYPING_IDLE: Duration = Duration::from_millis(1200);

/// Keystroke debounce for the typing indicator of one input field.
///
/// Holds at most one deadline; every keystroke replaces it. Methods return
/// the flag to emit, if any.
#[derive(Debug, Clone)]
pub struct TypingDebounce {
    idle: Duration,
    active: bool,
    deadline: Option<Instant>,
}

impl Default for TypingDebounce {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_IDLE)
    }
}

impl TypingDebounce {
    pub fn new(idle: Duration) -> Self {
        Self {
            idle,
            active: false,
            deadline: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn keystroke(&mut self, now: Instant) -> Option<bool> {
        self.deadline = Some(now + self.idle);
        if self.active {
            None
        } else {
            self.active = true;
            Some(true)
        }
    }

    /// Fires once the deadline has passed with no further input.
    pub fn expire(&mut self, now: Instant) -> Option<bool> {
        match self.deadline {
            Some(deadline) if deadline <= now => self.stop(),
            _ => None,
        }
    }

    /// Send or blur: stop immediately and cancel the timer.
    pub fn stop(&mut self) -> Option<bool> {
        self.deadline = None;
        if self.active {
            self.active = false;
            Some(false)
        } else {
            None
        }
    }
}
