//! Sequential generation worker.
//!
//! One long-lived task drains the bounded queue in FIFO order and calls
//! the compute backend with a hard deadline, so at most one compute call
//! is ever in flight. Outcomes feed the health monitor; lifecycle events
//! go out on the bus. A plain loop with a cancellation exit — shutdown
//! stops new dequeues but lets the in-flight call run to its own
//! timeout or completion.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use clipstream_compute::client::{ComputeClient, ComputeError};
use clipstream_core::degraded::{DegradedMode, ModeTransition};
use clipstream_core::health::{HealthMonitor, HealthVerdict, OutcomeKind};
use clipstream_core::queue::BoundedQueue;
use clipstream_core::request::GenerationRequest;
use clipstream_core::types::Timestamp;
use clipstream_events::bus::{EventBus, PipelineEvent};

/// Everything the worker loop needs, bundled so the controller can hand
/// it to a spawned task in one move.
pub(crate) struct WorkerContext {
    pub queue: Arc<BoundedQueue>,
    pub compute: Arc<dyn ComputeClient>,
    pub health: Arc<Mutex<HealthMonitor>>,
    pub degraded: Arc<Mutex<DegradedMode>>,
    pub bus: Arc<EventBus>,
    pub generation_timeout: Duration,
    pub cancel: CancellationToken,
}

/// Run the worker until the cancellation token fires.
///
/// The only suspension points are the empty-queue wait (raced against
/// cancellation) and the bounded compute await.
pub(crate) async fn run_worker_loop(ctx: WorkerContext) {
    loop {
        let request = tokio::select! {
            // Biased so a pending shutdown always wins over a non-empty
            // queue; leftover items are dropped with the process.
            biased;
            _ = ctx.cancel.cancelled() => break,
            request = ctx.queue.dequeue() => request,
        };

        process_request(&ctx, request).await;

        if ctx.cancel.is_cancelled() {
            break;
        }
    }
    tracing::debug!("Worker loop exited");
}

/// Process a single request end to end: dispatch, await with deadline,
/// record the outcome, emit lifecycle events. Never propagates a failure
/// out of the loop — one bad request must not stall the stream.
async fn process_request(ctx: &WorkerContext, request: GenerationRequest) {
    let request_id = request.id;

    ctx.bus.publish(PipelineEvent::QueueDepthChanged {
        depth: ctx.queue.len(),
        capacity: ctx.queue.capacity(),
    });
    ctx.bus.publish(PipelineEvent::GenerationStarted {
        request_id,
        prompt_text: request.prompt_text.clone(),
        submitter_id: request.submitter_id.clone(),
    });

    tracing::info!(
        %request_id,
        submitter_id = %request.submitter_id,
        "Dispatching generation",
    );

    let result = tokio::time::timeout(
        ctx.generation_timeout,
        ctx.compute
            .generate(&request.prompt_text, ctx.generation_timeout),
    )
    .await;

    let outcome = match result {
        Ok(Ok(output)) => {
            tracing::info!(
                %request_id,
                generation_time_seconds = output.generation_time_seconds,
                "Generation succeeded",
            );
            ctx.bus.publish(PipelineEvent::GenerationSucceeded {
                request_id,
                artifact_ref: output.artifact_ref,
            });
            OutcomeKind::Success
        }
        Ok(Err(ComputeError::DeadlineExceeded)) => {
            tracing::warn!(%request_id, "Compute client reported deadline exceeded");
            ctx.bus.publish(PipelineEvent::GenerationFailed {
                request_id,
                reason: "timeout".to_string(),
            });
            OutcomeKind::Timeout
        }
        Ok(Err(e)) => {
            tracing::warn!(%request_id, error = %e, "Generation failed");
            ctx.bus.publish(PipelineEvent::GenerationFailed {
                request_id,
                reason: e.to_string(),
            });
            OutcomeKind::Error
        }
        // Hard ceiling hit; the compute future was dropped, which is the
        // best-effort cancellation signal the contract promises.
        Err(_elapsed) => {
            tracing::warn!(
                %request_id,
                timeout_secs = ctx.generation_timeout.as_secs(),
                "Generation timed out",
            );
            ctx.bus.publish(PipelineEvent::GenerationFailed {
                request_id,
                reason: "timeout".to_string(),
            });
            OutcomeKind::Timeout
        }
    };

    let now = Utc::now();
    let verdict = {
        let mut health = lock(&ctx.health);
        health.record_outcome(outcome, now);
        health.verdict(ctx.queue.len())
    };
    publish_mode_transition(&ctx.degraded, verdict, now, &ctx.bus);
}

/// Feed a verdict observation into the degraded-mode state machine and
/// publish the resulting transition, if any. Shared by the worker (after
/// every outcome) and the controller (after every accepted submission),
/// which is what keeps transitions exactly-once. `now` comes from the
/// caller, so the debounce clock follows the same injected timestamps as
/// the rest of the admission path.
pub(crate) fn publish_mode_transition(
    degraded: &Mutex<DegradedMode>,
    verdict: HealthVerdict,
    now: Timestamp,
    bus: &EventBus,
) {
    let transition = lock(degraded).observe(verdict, now);
    match transition {
        Some(ModeTransition::Entered) => {
            tracing::warn!("Entering degraded mode");
            bus.publish(PipelineEvent::DegradedModeEntered);
        }
        Some(ModeTransition::Exited) => {
            tracing::info!("Exiting degraded mode");
            bus.publish(PipelineEvent::DegradedModeExited);
        }
        None => {}
    }
}

/// Recover from lock poisoning instead of propagating the panic; the
/// guarded state machines stay structurally valid either way.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}


