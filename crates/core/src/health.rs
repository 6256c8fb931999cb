//! Rolling-window health classification for the generation pipeline.
//!
//! [`HealthMonitor`] keeps the most recent processing outcomes and derives
//! a [`HealthVerdict`] from two signals: current queue depth relative to a
//! threshold, and the failure (timeout + error) ratio over the window. The
//! verdict is a pure function of the window contents and the depth passed
//! in; recording and eviction are the only mutations.

use std::collections::VecDeque;
use std::time::Duration;

use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Outcome / verdict types
// ---------------------------------------------------------------------------

/// Terminal result of one processed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Success,
    Timeout,
    Error,
}

impl OutcomeKind {
    /// String representation for logs and event payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::Timeout => "timeout",
            OutcomeKind::Error => "error",
        }
    }

    /// Whether this outcome counts toward the failure ratio.
    pub fn is_failure(&self) -> bool {
        !matches!(self, OutcomeKind::Success)
    }
}

/// The monitor's current Healthy/Degraded classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthVerdict {
    Healthy,
    Degraded,
}

impl HealthVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthVerdict::Healthy => "healthy",
            HealthVerdict::Degraded => "degraded",
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, HealthVerdict::Degraded)
    }
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Tunable classification thresholds. All values are configuration, not
/// hard-coded policy.
#[derive(Debug, Clone)]
pub struct HealthThresholds {
    /// Queue depth at or above which the verdict is degraded.
    pub depth_threshold: usize,
    /// Failure ratio above which the verdict is degraded.
    pub error_ratio_threshold: f64,
    /// Outcomes older than this are evicted from the window.
    pub window: Duration,
    /// Minimum number of windowed outcomes before the ratio signal is
    /// trusted, avoiding cold-start noise.
    pub min_samples: usize,
    /// Hard cap on window length regardless of age.
    pub max_entries: usize,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            depth_threshold: 8,
            error_ratio_threshold: 0.3,
            window: Duration::from_secs(300),
            min_samples: 3,
            max_entries: 256,
        }
    }
}

// ---------------------------------------------------------------------------
// HealthMonitor
// ---------------------------------------------------------------------------

/// One recorded outcome with its timestamp.
#[derive(Debug, Clone, Copy)]
struct OutcomeRecord {
    kind: OutcomeKind,
    at: Timestamp,
}

/// Rolling record of recent outcomes plus verdict derivation.
pub struct HealthMonitor {
    thresholds: HealthThresholds,
    window: VecDeque<OutcomeRecord>,
}

impl HealthMonitor {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self {
            thresholds,
            window: VecDeque::new(),
        }
    }

    /// Append an outcome, evicting entries older than the window duration
    /// or beyond the maximum count.
    pub fn record_outcome(&mut self, kind: OutcomeKind, at: Timestamp) {
        self.window.push_back(OutcomeRecord { kind, at });

        let horizon = chrono::Duration::from_std(self.thresholds.window)
            .unwrap_or(chrono::Duration::MAX);
        while let Some(front) = self.window.front() {
            if at - front.at > horizon {
                self.window.pop_front();
            } else {
                break;
            }
        }

        while self.window.len() > self.thresholds.max_entries {
            self.window.pop_front();
        }
    }

    /// Classify current health given the queue depth.
    ///
    /// Degraded when the depth reaches the depth threshold OR the windowed
    /// failure ratio exceeds the error-ratio threshold (with at least
    /// `min_samples` outcomes recorded). Deterministic: the same window
    /// contents and depth always produce the same verdict.
    pub fn verdict(&self, current_depth: usize) -> HealthVerdict {
        if current_depth >= self.thresholds.depth_threshold {
            return HealthVerdict::Degraded;
        }

        if let Some(ratio) = self.failure_ratio() {
            if ratio > self.thresholds.error_ratio_threshold {
                return HealthVerdict::Degraded;
            }
        }

        HealthVerdict::Healthy
    }

    /// Failure ratio over the window, or `None` below the minimum sample
    /// count.
    pub fn failure_ratio(&self) -> Option<f64> {
        if self.window.len() < self.thresholds.min_samples {
            return None;
        }
        let failures = self.window.iter().filter(|r| r.kind.is_failure()).count();
        Some(failures as f64 / self.window.len() as f64)
    }

    /// Number of outcomes currently in the window.
    pub fn sample_count(&self) -> usize {
        self.window.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
