//! Domain logic for the clipstream generation pipeline.
//!
//! Pure state machines and in-memory structures with zero internal
//! dependencies: cooldown tracking, the bounded request queue, health
//! classification, the degraded-mode state machine, and the shared
//! configuration surface. Orchestration lives in `clipstream-pipeline`.

pub mod config;
pub mod cooldown;
pub mod degraded;
pub mod error;
pub mod health;
pub mod queue;
pub mod request;
pub mod types;
