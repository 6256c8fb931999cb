//! Lifecycle event types and the in-process event bus.
//!
//! The pipeline core never calls a display or notification API directly;
//! it publishes typed [`PipelineEvent`]s on an [`EventBus`] and external
//! subscribers (overlay renderer, scene switcher, telemetry exporter)
//! translate them into whatever transport they need.

pub mod bus;

pub use bus::{EventBus, PipelineEvent};
