//! Degraded-mode state machine with exit debouncing.
//!
//! [`DegradedMode`] turns the health monitor's instantaneous verdicts into
//! stable mode transitions: entry is immediate, but exit requires the
//! verdict to stay healthy for a debounce period so a flapping signal does
//! not spam the display layer with mode changes.

use std::time::Duration;

use crate::health::HealthVerdict;
use crate::types::Timestamp;

/// Current mode of the pipeline as seen by the display layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedModeState {
    Healthy,
    Degraded,
}

impl DegradedModeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DegradedModeState::Healthy => "healthy",
            DegradedModeState::Degraded => "degraded",
        }
    }
}

/// A mode change produced by [`DegradedMode::observe`]. Emitted at most
/// once per actual transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeTransition {
    Entered,
    Exited,
}

/// Debounced Healthy/Degraded state machine.
pub struct DegradedMode {
    state: DegradedModeState,
    debounce: chrono::Duration,
    /// Start of the current healthy streak while in degraded mode.
    healthy_since: Option<Timestamp>,
}

impl DegradedMode {
    /// Create the state machine in the healthy state.
    pub fn new(debounce: Duration) -> Self {
        Self {
            state: DegradedModeState::Healthy,
            debounce: chrono::Duration::from_std(debounce).unwrap_or(chrono::Duration::MAX),
            healthy_since: None,
        }
    }

    pub fn state(&self) -> DegradedModeState {
        self.state
    }

    /// Feed one verdict observation and return the transition it caused,
    /// if any.
    ///
    /// - Healthy state + degraded verdict: enter degraded mode immediately.
    /// - Degraded state + healthy verdict: exit only once the verdict has
    ///   remained healthy for the full debounce period.
    /// - Degraded state + degraded verdict: reset the healthy streak.
    pub fn observe(&mut self, verdict: HealthVerdict, now: Timestamp) -> Option<ModeTransition> {
        match (self.state, verdict) {
            (DegradedModeState::Healthy, HealthVerdict::Degraded) => {
                self.state = DegradedModeState::Degraded;
                self.healthy_since = None;
                Some(ModeTransition::Entered)
            }
            (DegradedModeState::Degraded, HealthVerdict::Healthy) => {
                let since = *self.healthy_since.get_or_insert(now);
                if now - since >= self.debounce {
                    self.state = DegradedModeState::Healthy;
                    self.healthy_since = None;
                    Some(ModeTransition::Exited)
                } else {
                    None
                }
            }
            (DegradedModeState::Degraded, HealthVerdict::Degraded) => {
                self.healthy_since = None;
                None
            }
            (DegradedModeState::Healthy, HealthVerdict::Healthy) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
