//! Capture trigger debouncing
//!
//! Button clicks, keyboard shortcuts and the microscope's touch sensor all
//! funnel into one [`TriggerDebouncer`], so a click and a near-simultaneous
//! hardware press can never produce two captures.

use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

/// Default minimum time between two accepted captures
pub const DEFAULT_CAPTURE_COOLDOWN: Duration = Duration::from_secs(1);

/// Where a capture request came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    Button,
    Key,
    Hardware,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSource::Button => write!(f, "button"),
            TriggerSource::Key => write!(f, "key"),
            TriggerSource::Hardware => write!(f, "hardware"),
        }
    }
}

/// A single capture request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerEvent {
    pub source: TriggerSource,
    pub at: Instant,
}

impl TriggerEvent {
    pub fn new(source: TriggerSource, at: Instant) -> Self {
        Self { source, at }
    }

    /// A request raised right now
    pub fn now(source: TriggerSource) -> Self {
        Self::new(source, Instant::now())
    }
}

/// Collapses bursts of capture requests into one accepted capture per
/// cooldown window
#[derive(Debug, Clone)]
pub struct TriggerDebouncer {
    cooldown: Duration,
    last_accepted: Option<Instant>,
}

impl TriggerDebouncer {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_accepted: None,
        }
    }

    /// Whether `event` may capture, without recording it.
    ///
    /// Passes only when the cooldown has elapsed since the last committed
    /// event and `capture_ready` (session open and not full) holds.
    pub fn check(&self, event: &TriggerEvent, capture_ready: bool) -> bool {
        if !capture_ready {
            return false;
        }

        match self.last_accepted {
            Some(last) => event.at.saturating_duration_since(last) >= self.cooldown,
            None => true,
        }
    }

    /// Start a new cooldown window at `event`
    pub fn commit(&mut self, event: &TriggerEvent) {
        self.last_accepted = Some(event.at);
    }

    /// Forget the last accepted capture
    pub fn reset(&mut self) {
        self.last_accepted = None;
    }
}

impl Default for TriggerDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPTURE_COOLDOWN)
    }
}
