//! Compute backend client for the clipstream pipeline.
//!
//! Defines the [`ComputeClient`] seam the worker dispatches through, the
//! wire schemas of the Modal-style generation service, and a [`reqwest`]
//! HTTP implementation of both.

pub mod api;
pub mod client;
pub mod schemas;

pub use api::{ModalApi, ModalApiError};
pub use client::{ComputeClient, ComputeError, GenerationOutput};
