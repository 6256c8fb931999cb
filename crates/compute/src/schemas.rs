//! Wire schemas for the Modal-style generation service.
//!
//! Field names and constraints mirror the service's published contract:
//! `POST /generate` takes a prompt with clip settings and returns a signed
//! output URL plus generation telemetry; `GET /health` reports model and
//! GPU status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Supported video output resolutions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    #[default]
    #[serde(rename = "480p")]
    Res480p,
    #[serde(rename = "720p")]
    Res720p,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Res480p => "480p",
            Resolution::Res720p => "720p",
        }
    }

    /// Parse from a string, defaulting to 480p for unknown values.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "720p" => Resolution::Res720p,
            _ => Resolution::Res480p,
        }
    }
}

/// Request body for `POST /generate`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequestBody {
    pub prompt: String,
    /// Clip length in seconds.
    pub duration: u32,
    pub resolution: Resolution,
}

/// Telemetry and provenance for a completed generation.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationMetadata {
    pub prompt: String,
    pub duration: u32,
    pub resolution: String,
    pub generation_time_seconds: f64,
    pub model: String,
    pub request_id: String,
}

/// Response body from a successful `POST /generate`.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponseBody {
    pub status: String,
    /// Signed URL for the generated MP4.
    pub output_url: String,
    /// When the signed URL stops being valid.
    pub expires_at: DateTime<Utc>,
    pub metadata: GenerationMetadata,
}

/// Response body from `GET /health`.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub gpu: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
