//! REST client for the Modal-style generation endpoints.
//!
//! Wraps the generation service's HTTP API (`POST /generate`,
//! `GET /health`) using [`reqwest`], and adapts it to the
//! [`ComputeClient`] seam the worker dispatches through.

use std::time::Duration;

use async_trait::async_trait;

use crate::client::{ComputeClient, ComputeError, GenerationOutput};
use crate::schemas::{GenerateRequestBody, GenerateResponseBody, HealthResponse, Resolution};

/// Default clip length sent with each generation request, in seconds.
const DEFAULT_CLIP_DURATION_SECS: u32 = 5;

/// HTTP client for a single generation endpoint.
pub struct ModalApi {
    client: reqwest::Client,
    endpoint_url: String,
    clip_duration_secs: u32,
    resolution: Resolution,
}

/// Errors from the generation REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ModalApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The endpoint returned a non-2xx status code.
    #[error("Generation API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl ModalApi {
    /// Create a new client for a generation endpoint.
    ///
    /// * `endpoint_url` - Base HTTP URL, e.g.
    ///   `https://my-app--generate.modal.run`.
    pub fn new(endpoint_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint_url,
            clip_duration_secs: DEFAULT_CLIP_DURATION_SECS,
            resolution: Resolution::default(),
        }
    }

    /// Override the clip settings sent with each generation request.
    pub fn with_clip_settings(mut self, duration_secs: u32, resolution: Resolution) -> Self {
        self.clip_duration_secs = duration_secs;
        self.resolution = resolution;
        self
    }

    /// Submit a prompt for generation.
    ///
    /// Sends a `POST /generate` request with the configured clip settings
    /// and waits up to `timeout` for the response.
    pub async fn generate_clip(
        &self,
        prompt: &str,
        timeout: Duration,
    ) -> Result<GenerateResponseBody, ModalApiError> {
        let body = GenerateRequestBody {
            prompt: prompt.to_string(),
            duration: self.clip_duration_secs,
            resolution: self.resolution,
        };

        let response = self
            .client
            .post(format!("{}/generate", self.endpoint_url))
            .timeout(timeout)
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Query the endpoint's health status.
    ///
    /// Sends a `GET /health` request. Used at startup to verify the model
    /// is loaded before the pipeline starts accepting submissions.
    pub async fn check_health(&self) -> Result<HealthResponse, ModalApiError> {
        let response = self
            .client
            .get(format!("{}/health", self.endpoint_url))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ModalApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ModalApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ModalApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ModalApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl ComputeClient for ModalApi {
    async fn generate(
        &self,
        prompt: &str,
        timeout: Duration,
    ) -> Result<GenerationOutput, ComputeError> {
        match self.generate_clip(prompt, timeout).await {
            Ok(response) => Ok(GenerationOutput {
                artifact_ref: response.output_url,
                generation_time_seconds: response.metadata.generation_time_seconds,
            }),
            Err(ModalApiError::Request(e)) if e.is_timeout() => {
                Err(ComputeError::DeadlineExceeded)
            }
            Err(ModalApiError::Request(e)) => Err(ComputeError::Transport(e.to_string())),
            Err(ModalApiError::ApiError { status, body }) => Err(ComputeError::Backend {
                status,
                detail: body,
            }),
        }
    }
}
