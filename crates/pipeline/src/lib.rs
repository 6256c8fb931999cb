//! Queue controller and worker loop for the clipstream pipeline.
//!
//! [`QueueController`] is the composition root: it owns the bounded
//! queue, cooldown tracker, health monitor, and degraded-mode state, and
//! runs the single sequential worker task that dispatches requests to the
//! compute backend.

pub mod controller;
pub mod worker;

pub use controller::{QueueController, SubmitResult};
