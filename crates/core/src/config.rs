//! Pipeline configuration surface.
//!
//! Every tunable named in the degraded-mode and admission policies lives
//! here with its documented default. Environment parsing is the binary's
//! concern; this module only defines the typed surface and validation.

use std::time::Duration;

use crate::error::CoreError;
use crate::health::HealthThresholds;

/// Tunables for the queue, cooldown, worker, and health subsystems.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum number of pending requests (default 10).
    pub queue_capacity: usize,
    /// Minimum time between accepted submissions per submitter (default 30s).
    pub cooldown_window: Duration,
    /// Hard ceiling on a single compute call (default 90s).
    pub generation_timeout: Duration,
    /// Queue depth at or above which health is degraded (default 8).
    pub degraded_depth_threshold: usize,
    /// Windowed failure ratio above which health is degraded (default 0.3).
    pub degraded_error_ratio_threshold: f64,
    /// Rolling outcome window duration (default 300s).
    pub health_window: Duration,
    /// How long the verdict must stay healthy before degraded mode is
    /// exited (default 30s).
    pub degraded_debounce: Duration,
    /// Minimum windowed outcomes before the failure ratio is trusted
    /// (default 3).
    pub min_health_samples: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10,
            cooldown_window: Duration::from_secs(30),
            generation_timeout: Duration::from_secs(90),
            degraded_depth_threshold: 8,
            degraded_error_ratio_threshold: 0.3,
            health_window: Duration::from_secs(300),
            degraded_debounce: Duration::from_secs(30),
            min_health_samples: 3,
        }
    }
}

impl PipelineConfig {
    /// Validate the configuration before the pipeline is constructed.
    ///
    /// Rules:
    /// - `queue_capacity` must be at least 1.
    /// - `degraded_depth_threshold` must be at least 1 and no more than
    ///   `queue_capacity` (a larger value could never trigger).
    /// - `degraded_error_ratio_threshold` must be within `[0.0, 1.0]`.
    /// - `generation_timeout` and `health_window` must be non-zero.
    /// - `min_health_samples` must be at least 1.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.queue_capacity == 0 {
            return Err(CoreError::Validation(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.degraded_depth_threshold == 0 {
            return Err(CoreError::Validation(
                "degraded_depth_threshold must be at least 1".to_string(),
            ));
        }
        if self.degraded_depth_threshold > self.queue_capacity {
            return Err(CoreError::Validation(format!(
                "degraded_depth_threshold ({}) must not exceed queue_capacity ({})",
                self.degraded_depth_threshold, self.queue_capacity
            )));
        }
        if !(0.0..=1.0).contains(&self.degraded_error_ratio_threshold) {
            return Err(CoreError::Validation(format!(
                "degraded_error_ratio_threshold must be within [0.0, 1.0], got {}",
                self.degraded_error_ratio_threshold
            )));
        }
        if self.generation_timeout.is_zero() {
            return Err(CoreError::Validation(
                "generation_timeout must be non-zero".to_string(),
            ));
        }
        if self.health_window.is_zero() {
            return Err(CoreError::Validation(
                "health_window must be non-zero".to_string(),
            ));
        }
        if self.min_health_samples == 0 {
            return Err(CoreError::Validation(
                "min_health_samples must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Health-monitor thresholds derived from this configuration.
    pub fn health_thresholds(&self) -> HealthThresholds {
        HealthThresholds {
            depth_threshold: self.degraded_depth_threshold,
            error_ratio_threshold: self.degraded_error_ratio_threshold,
            window: self.health_window,
            min_samples: self.min_health_samples,
            ..HealthThresholds::default()
        }
    }
}
