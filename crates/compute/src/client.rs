//! The compute client seam.
//!
//! The worker treats the GPU backend as a black box behind
//! [`ComputeClient`]: one prompt in, one opaque artifact reference out,
//! within a deadline. Model names, resolutions, and transport details
//! never cross this boundary.

use std::time::Duration;

use async_trait::async_trait;

/// Result of a successful generation call.
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    /// Opaque reference to the generated clip (signed URL, file path,
    /// encoded blob — the pipeline never interprets it).
    pub artifact_ref: String,
    /// Backend-reported wall time for the generation, in seconds.
    pub generation_time_seconds: f64,
}

/// Failure modes of a compute call, distinguished for health
/// classification.
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    /// The backend did not respond within the deadline the caller set.
    #[error("Compute call exceeded its deadline")]
    DeadlineExceeded,

    /// The request never completed (network, DNS, TLS, connection reset).
    #[error("Compute request failed: {0}")]
    Transport(String),

    /// The backend answered with an explicit failure.
    #[error("Compute backend error ({status}): {detail}")]
    Backend { status: u16, detail: String },
}

/// A generation backend the worker can dispatch to.
///
/// Implementations must be safe to share behind an `Arc` and call from
/// the single worker task. `timeout` is the caller's deadline budget for
/// the whole call; the worker additionally enforces a hard ceiling, so
/// exceeding it here is advisory, not load-bearing.
#[async_trait]
pub trait ComputeClient: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        timeout: Duration,
    ) -> Result<GenerationOutput, ComputeError>;
}
