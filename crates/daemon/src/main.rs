//! `clipstream-daemon` -- interactive generation pipeline daemon.
//!
//! Wires the queue controller to a Modal-style compute endpoint and reads
//! generation requests from stdin, one per line, in the form
//! `<submitter> <prompt...>`. Lifecycle events are logged as they are
//! published so an operator can follow the pipeline state. Chat-protocol
//! frontends and display integrations subscribe to the same event bus
//! and are wired up separately.
//!
//! # Environment variables
//!
//! | Variable                   | Required | Default | Description                                 |
//! |----------------------------|----------|---------|---------------------------------------------|
//! | `MODAL_ENDPOINT_URL`       | yes      | --      | Base URL of the generation endpoint         |
//! | `QUEUE_CAPACITY`           | no       | `10`    | Maximum pending requests                    |
//! | `COOLDOWN_SECONDS`         | no       | `30`    | Per-submitter cooldown window               |
//! | `GENERATION_TIMEOUT_SECS`  | no       | `90`    | Hard ceiling on one compute call            |
//! | `DEGRADED_DEPTH_THRESHOLD` | no       | `8`     | Queue depth that degrades health            |
//! | `DEGRADED_ERROR_RATIO`     | no       | `0.3`   | Failure ratio that degrades health          |
//! | `HEALTH_WINDOW_SECS`       | no       | `300`   | Rolling outcome window duration             |
//! | `DEGRADED_DEBOUNCE_SECS`   | no       | `30`    | Healthy streak required to exit degraded    |
//! | `HEALTH_MIN_SAMPLES`       | no       | `3`     | Outcomes needed before the ratio is trusted |
//! | `CLIP_DURATION_SECS`       | no       | `5`     | Clip length requested per generation        |
//! | `CLIP_RESOLUTION`          | no       | `480p`  | Output resolution (`480p` or `720p`)        |

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clipstream_compute::api::ModalApi;
use clipstream_compute::schemas::Resolution;
use clipstream_core::config::PipelineConfig;
use clipstream_events::bus::{EventBus, PipelineEvent};
use clipstream_pipeline::{QueueController, SubmitResult};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clipstream=info,clipstream_daemon=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let endpoint_url = std::env::var("MODAL_ENDPOINT_URL").unwrap_or_else(|_| {
        tracing::error!("MODAL_ENDPOINT_URL environment variable is required");
        std::process::exit(1);
    });

    let config = PipelineConfig {
        queue_capacity: env_parse("QUEUE_CAPACITY", 10),
        cooldown_window: Duration::from_secs(env_parse("COOLDOWN_SECONDS", 30)),
        generation_timeout: Duration::from_secs(env_parse("GENERATION_TIMEOUT_SECS", 90)),
        degraded_depth_threshold: env_parse("DEGRADED_DEPTH_THRESHOLD", 8),
        degraded_error_ratio_threshold: env_parse("DEGRADED_ERROR_RATIO", 0.3),
        health_window: Duration::from_secs(env_parse("HEALTH_WINDOW_SECS", 300)),
        degraded_debounce: Duration::from_secs(env_parse("DEGRADED_DEBOUNCE_SECS", 30)),
        min_health_samples: env_parse("HEALTH_MIN_SAMPLES", 3),
    };

    let clip_duration: u32 = env_parse("CLIP_DURATION_SECS", 5);
    let resolution = Resolution::from_str_lossy(
        &std::env::var("CLIP_RESOLUTION").unwrap_or_else(|_| "480p".to_string()),
    );

    let compute = Arc::new(
        ModalApi::new(endpoint_url.clone()).with_clip_settings(clip_duration, resolution),
    );

    match compute.check_health().await {
        Ok(health) => tracing::info!(
            status = %health.status,
            model_loaded = health.model_loaded,
            gpu = %health.gpu,
            "Compute endpoint health",
        ),
        Err(e) => tracing::warn!(
            endpoint = %endpoint_url,
            error = %e,
            "Compute endpoint health check failed -- continuing anyway",
        ),
    }

    let bus = Arc::new(EventBus::default());
    let event_rx = bus.subscribe();
    tokio::spawn(log_events(event_rx));

    let controller = match QueueController::start(config, compute, bus) {
        Ok(controller) => controller,
        Err(e) => {
            tracing::error!(error = %e, "Invalid pipeline configuration");
            std::process::exit(1);
        }
    };

    tracing::info!("Reading submissions from stdin (`<submitter> <prompt...>`)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_line(&controller, &line),
                Ok(None) => {
                    tracing::info!("Input closed");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
    }

    controller.shutdown().await;
}

/// Parse one stdin line and submit it, logging the decision.
fn handle_line(controller: &QueueController, line: &str) {
    let Some((submitter, prompt)) = parse_line(line) else {
        return;
    };

    match controller.submit(submitter, prompt, chrono::Utc::now()) {
        SubmitResult::Accepted { request_id } => {
            tracing::info!(%request_id, submitter, "Accepted");
        }
        SubmitResult::RejectedCooldown { retry_after } => {
            tracing::info!(
                submitter,
                retry_after_secs = retry_after.as_secs_f64(),
                "Rejected: cooldown",
            );
        }
        SubmitResult::RejectedQueueFull => {
            tracing::info!(submitter, "Rejected: queue full");
        }
        SubmitResult::RejectedInvalidPrompt { reason } => {
            tracing::info!(submitter, %reason, "Rejected: invalid prompt");
        }
        SubmitResult::RejectedShutdown => {
            tracing::info!(submitter, "Rejected: shutting down");
        }
    }
}

/// Split a line into `(submitter, prompt)`. Returns `None` for blank
/// lines or lines with no prompt after the submitter.
fn parse_line(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim();
    let (submitter, prompt) = trimmed.split_once(char::is_whitespace)?;
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return None;
    }
    Some((submitter, prompt))
}

/// Read an environment variable and parse it, falling back to a default
/// on absence or parse failure.
fn env_parse<T: FromStr + Copy>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Log every pipeline event until the bus closes.
async fn log_events(mut rx: broadcast::Receiver<PipelineEvent>) {
    loop {
        match rx.recv().await {
            Ok(PipelineEvent::GenerationStarted {
                request_id,
                submitter_id,
                ..
            }) => {
                tracing::info!(%request_id, submitter_id = %submitter_id, "Generating");
            }
            Ok(PipelineEvent::GenerationSucceeded {
                request_id,
                artifact_ref,
            }) => {
                tracing::info!(%request_id, artifact_ref = %artifact_ref, "Clip ready");
            }
            Ok(PipelineEvent::GenerationFailed { request_id, reason }) => {
                tracing::warn!(%request_id, %reason, "Generation failed");
            }
            Ok(PipelineEvent::DegradedModeEntered) => {
                tracing::warn!("Degraded mode entered");
            }
            Ok(PipelineEvent::DegradedModeExited) => {
                tracing::info!("Degraded mode exited");
            }
            Ok(PipelineEvent::QueueDepthChanged { depth, capacity }) => {
                tracing::debug!(depth, capacity, "Queue depth changed");
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "Event logger lagged behind the bus");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
