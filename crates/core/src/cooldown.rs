//! Per-submitter cooldown tracking.
//!
//! [`CooldownTracker`] remembers the last accepted submission time for each
//! submitter and answers admission queries against a fixed cooldown window.
//! All timestamps are passed in by the caller, so behaviour is fully
//! deterministic under test.
//!
//! The tracker itself is not synchronised; the queue controller guards it
//! with the admission lock so that check and record are atomic for a given
//! submitter even under concurrent submissions.

use std::collections::HashMap;
use std::time::Duration;

use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Entries idle for this many cooldown windows are considered stale and
/// eligible for eviction.
pub const STALE_WINDOW_MULTIPLIER: i32 = 4;

/// Eviction is only attempted once the map holds at least this many
/// entries, keeping the common small-audience case sweep-free.
pub const EVICTION_SWEEP_THRESHOLD: usize = 256;

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

/// Outcome of a cooldown admission query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    /// The submitter is outside their cooldown window.
    Allowed,
    /// The submitter must wait `retry_after` before the next accepted
    /// submission.
    Rejected { retry_after: Duration },
}

// ---------------------------------------------------------------------------
// CooldownTracker
// ---------------------------------------------------------------------------

/// Tracks the last accepted submission time per submitter.
pub struct CooldownTracker {
    window: chrono::Duration,
    last_accepted: HashMap<String, Timestamp>,
}

impl CooldownTracker {
    /// Create a tracker with the given cooldown window.
    pub fn new(window: Duration) -> Self {
        Self {
            window: chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX),
            last_accepted: HashMap::new(),
        }
    }

    /// Check whether `submitter_id` may submit at `now`, without recording.
    ///
    /// Allowed when no entry exists or the elapsed time since the last
    /// accepted submission is at least the cooldown window.
    pub fn check(&self, submitter_id: &str, now: Timestamp) -> Admission {
        let last = match self.last_accepted.get(submitter_id) {
            Some(last) => *last,
            None => return Admission::Allowed,
        };

        let elapsed = now - last;
        if elapsed >= self.window {
            return Admission::Allowed;
        }

        let retry_after = (self.window - elapsed).to_std().unwrap_or_default();
        Admission::Rejected { retry_after }
    }

    /// Record an accepted submission at `now`, resetting the submitter's
    /// cooldown window. Triggers a stale-entry sweep once the map grows
    /// past [`EVICTION_SWEEP_THRESHOLD`].
    pub fn record_accepted(&mut self, submitter_id: &str, now: Timestamp) {
        self.last_accepted.insert(submitter_id.to_string(), now);
        if self.last_accepted.len() >= EVICTION_SWEEP_THRESHOLD {
            self.evict_stale(now);
        }
    }

    /// Combined check-and-record: on [`Admission::Allowed`] the submission
    /// time is recorded as a side effect.
    pub fn check_and_record(&mut self, submitter_id: &str, now: Timestamp) -> Admission {
        let admission = self.check(submitter_id, now);
        if admission == Admission::Allowed {
            self.record_accepted(submitter_id, now);
        }
        admission
    }

    /// Drop entries whose last accepted submission is at least
    /// [`STALE_WINDOW_MULTIPLIER`] cooldown windows in the past.
    pub fn evict_stale(&mut self, now: Timestamp) {
        let stale_after = self.window * STALE_WINDOW_MULTIPLIER;
        self.last_accepted.retain(|_, last| now - *last < stale_after);
    }

    /// Number of submitters currently tracked.
    pub fn tracked_submitters(&self) -> usize {
        self.last_accepted.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
