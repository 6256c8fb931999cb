//! Queue controller: the pipeline's composition root.
//!
//! [`QueueController`] is the only surface the external command source
//! talks to. It runs the admission path (shutdown gate → prompt
//! validation → cooldown → capacity, in that fixed order), owns the
//! worker task for its entire operating lifetime, and exposes the
//! read-only status accessors polled by telemetry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use clipstream_compute::client::ComputeClient;
use clipstream_core::config::PipelineConfig;
use clipstream_core::cooldown::{Admission, CooldownTracker};
use clipstream_core::degraded::{DegradedMode, DegradedModeState};
use clipstream_core::error::CoreError;
use clipstream_core::health::{HealthMonitor, HealthVerdict};
use clipstream_core::queue::BoundedQueue;
use clipstream_core::request::{validate_prompt, GenerationRequest};
use clipstream_core::types::{RequestId, Timestamp};
use clipstream_events::bus::{EventBus, PipelineEvent};

use crate::worker::{lock, publish_mode_transition, run_worker_loop, WorkerContext};

// ---------------------------------------------------------------------------
// SubmitResult
// ---------------------------------------------------------------------------

/// Outcome of a submission attempt. Rejections are routine, expected
/// results returned to the command source — never logged as faults.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitResult {
    /// Admitted; the request will be processed in FIFO order.
    Accepted { request_id: RequestId },
    /// The submitter is inside their cooldown window.
    RejectedCooldown { retry_after: Duration },
    /// The queue is at capacity.
    RejectedQueueFull,
    /// The prompt failed validation (empty or too long).
    RejectedInvalidPrompt { reason: String },
    /// The controller is shutting down and no longer accepts submissions.
    RejectedShutdown,
}

// ---------------------------------------------------------------------------
// QueueController
// ---------------------------------------------------------------------------

/// Composition root for the generation pipeline.
///
/// Created once via [`QueueController::start`], which spawns the worker
/// task; the returned `Arc` can be cheaply cloned into whatever serves
/// the command source. All state is owned here — no process-wide
/// singletons, so tests can run multiple independent controllers.
pub struct QueueController {
    config: PipelineConfig,
    queue: Arc<BoundedQueue>,
    cooldowns: Mutex<CooldownTracker>,
    health: Arc<Mutex<HealthMonitor>>,
    degraded: Arc<Mutex<DegradedMode>>,
    bus: Arc<EventBus>,
    accepting: AtomicBool,
    cancel: CancellationToken,
    worker_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl QueueController {
    /// Validate the configuration, construct all pipeline state, and
    /// spawn the worker task.
    pub fn start(
        config: PipelineConfig,
        compute: Arc<dyn ComputeClient>,
        bus: Arc<EventBus>,
    ) -> Result<Arc<Self>, CoreError> {
        config.validate()?;

        let queue = Arc::new(BoundedQueue::new(config.queue_capacity));
        let health = Arc::new(Mutex::new(HealthMonitor::new(config.health_thresholds())));
        let degraded = Arc::new(Mutex::new(DegradedMode::new(config.degraded_debounce)));
        let cancel = CancellationToken::new();

        let ctx = WorkerContext {
            queue: Arc::clone(&queue),
            compute,
            health: Arc::clone(&health),
            degraded: Arc::clone(&degraded),
            bus: Arc::clone(&bus),
            generation_timeout: config.generation_timeout,
            cancel: cancel.clone(),
        };
        let worker_handle = tokio::spawn(run_worker_loop(ctx));

        tracing::info!(
            queue_capacity = config.queue_capacity,
            cooldown_secs = config.cooldown_window.as_secs(),
            generation_timeout_secs = config.generation_timeout.as_secs(),
            "Queue controller started",
        );

        Ok(Arc::new(Self {
            cooldowns: Mutex::new(CooldownTracker::new(config.cooldown_window)),
            config,
            queue,
            health,
            degraded,
            bus,
            accepting: AtomicBool::new(true),
            cancel,
            worker_handle: Mutex::new(Some(worker_handle)),
        }))
    }

    /// Admit or reject a generation request. Synchronous: every check is
    /// an in-memory operation.
    ///
    /// Check order is fixed (shutdown → prompt → cooldown → capacity) so
    /// behaviour stays deterministic under concurrent submissions. The
    /// cooldown is only recorded once the request actually lands in the
    /// queue, so a capacity rejection does not burn the submitter's slot;
    /// the admission lock is held across check and record, keeping the
    /// pair atomic per submitter.
    pub fn submit(&self, submitter_id: &str, prompt_text: &str, now: Timestamp) -> SubmitResult {
        if !self.accepting.load(Ordering::SeqCst) {
            return SubmitResult::RejectedShutdown;
        }

        if let Err(e) = validate_prompt(prompt_text) {
            return SubmitResult::RejectedInvalidPrompt {
                reason: e.to_string(),
            };
        }

        let mut cooldowns = lock(&self.cooldowns);
        if let Admission::Rejected { retry_after } = cooldowns.check(submitter_id, now) {
            return SubmitResult::RejectedCooldown { retry_after };
        }

        let request = GenerationRequest::new(submitter_id, prompt_text.trim(), now);
        let request_id = request.id;
        let depth = match self.queue.try_enqueue(request) {
            Ok(depth) => depth,
            Err(_) => return SubmitResult::RejectedQueueFull,
        };
        cooldowns.record_accepted(submitter_id, now);
        drop(cooldowns);

        self.bus.publish(PipelineEvent::QueueDepthChanged {
            depth,
            capacity: self.config.queue_capacity,
        });

        // A rising depth can trip the depth threshold before any outcome
        // exists, so the degraded state is re-evaluated on admission too.
        let verdict = lock(&self.health).verdict(depth);
        publish_mode_transition(&self.degraded, verdict, now, &self.bus);

        tracing::debug!(%request_id, submitter_id = %submitter_id, depth, "Request admitted");
        SubmitResult::Accepted { request_id }
    }

    /// Current number of pending requests. Side-effect-free.
    pub fn current_depth(&self) -> usize {
        self.queue.len()
    }

    /// Current health classification. Side-effect-free.
    pub fn health_verdict(&self) -> HealthVerdict {
        lock(&self.health).verdict(self.queue.len())
    }

    /// Current degraded-mode state as the display layer sees it.
    pub fn degraded_state(&self) -> DegradedModeState {
        lock(&self.degraded).state()
    }

    /// Stop accepting submissions immediately, let any in-flight job run
    /// to its own completion or timeout, then join the worker task.
    ///
    /// Requests still queued once the worker has exited (including any
    /// that raced the `accepting` flip) are failed on the bus, so every
    /// accepted request reaches a terminal lifecycle event.
    ///
    /// Safe to call more than once; later calls find no handle, an empty
    /// queue, and return after the first join completes.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down queue controller");
        self.accepting.store(false, Ordering::SeqCst);
        self.cancel.cancel();

        let handle = lock(&self.worker_handle).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task panicked during shutdown");
            }
        }

        while let Some(request) = self.queue.try_dequeue() {
            tracing::info!(request_id = %request.id, "Failing request left queued at shutdown");
            self.bus.publish(PipelineEvent::GenerationFailed {
                request_id: request.id,
                reason: "shutdown".to_string(),
            });
        }

        tracing::info!("Queue controller shut down complete");
    }
}
