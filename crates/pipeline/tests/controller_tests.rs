//! End-to-end tests for the queue controller and worker loop.
//!
//! Uses a scriptable in-memory compute client and a paused tokio clock,
//! so timeout behaviour runs in virtual time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::broadcast;

use clipstream_compute::client::{ComputeClient, ComputeError, GenerationOutput};
use clipstream_core::config::PipelineConfig;
use clipstream_core::degraded::DegradedModeState;
use clipstream_core::health::HealthVerdict;
use clipstream_core::types::Timestamp;
use clipstream_events::bus::{EventBus, PipelineEvent};
use clipstream_pipeline::{QueueController, SubmitResult};

// ---------------------------------------------------------------------------
// Scriptable compute client
// ---------------------------------------------------------------------------

/// In-memory compute backend: sleeps for a fixed delay, fails the first
/// `fail_first` calls, and records dispatch order plus the maximum number
/// of concurrent calls it ever observed.
struct MockCompute {
    delay: Duration,
    fail_first: usize,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    dispatched: Mutex<Vec<String>>,
}

impl MockCompute {
    fn new(delay: Duration) -> Arc<Self> {
        Self::with_failures(delay, 0)
    }

    fn failing(delay: Duration) -> Arc<Self> {
        Self::with_failures(delay, usize::MAX)
    }

    fn with_failures(delay: Duration, fail_first: usize) -> Arc<Self> {
        Arc::new(Self {
            delay,
            fail_first,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            dispatched: Mutex::new(Vec::new()),
        })
    }

    fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn dispatch_order(&self) -> Vec<String> {
        self.dispatched.lock().unwrap().clone()
    }
}

/// Decrements the in-flight counter even when the worker's hard timeout
/// drops the generate future mid-call.
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ComputeClient for MockCompute {
    async fn generate(
        &self,
        prompt: &str,
        _timeout: Duration,
    ) -> Result<GenerationOutput, ComputeError> {
        let concurrent = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(concurrent, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.dispatched.lock().unwrap().push(prompt.to_string());

        tokio::time::sleep(self.delay).await;

        if call < self.fail_first {
            Err(ComputeError::Backend {
                status: 503,
                detail: "backend unavailable".to_string(),
            })
        } else {
            Ok(GenerationOutput {
                artifact_ref: format!("https://clips.example/{}.mp4", prompt.replace(' ', "-")),
                generation_time_seconds: 1.5,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn at(secs: i64) -> Timestamp {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn start(
    config: PipelineConfig,
    compute: Arc<MockCompute>,
) -> (Arc<QueueController>, broadcast::Receiver<PipelineEvent>) {
    let bus = Arc::new(EventBus::default());
    let rx = bus.subscribe();
    let controller =
        QueueController::start(config, compute, bus).expect("config should be valid");
    (controller, rx)
}

/// Receive the next event, failing the test if none arrives within five
/// virtual minutes.
async fn recv_event(rx: &mut broadcast::Receiver<PipelineEvent>) -> PipelineEvent {
    tokio::time::timeout(Duration::from_secs(300), rx.recv())
        .await
        .expect("timed out waiting for a pipeline event")
        .expect("event bus closed")
}

/// Receive the next non-depth event.
async fn next_lifecycle(rx: &mut broadcast::Receiver<PipelineEvent>) -> PipelineEvent {
    loop {
        match recv_event(rx).await {
            PipelineEvent::QueueDepthChanged { .. } => continue,
            event => return event,
        }
    }
}

/// Drain everything currently buffered without waiting.
fn drain(rx: &mut broadcast::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ---------------------------------------------------------------------------
// Admission: capacity and cooldown
// ---------------------------------------------------------------------------

/// Capacity 2, worker held busy by not yielding: A and B are accepted,
/// C is rejected with queue-full.
#[tokio::test(start_paused = true)]
async fn third_submission_beyond_capacity_is_rejected() {
    let config = PipelineConfig {
        queue_capacity: 2,
        degraded_depth_threshold: 2,
        ..Default::default()
    };
    let compute = MockCompute::new(Duration::from_secs(1));
    let (controller, _rx) = start(config, Arc::clone(&compute));

    // No awaits between submits, so the worker cannot drain the queue.
    assert_matches!(
        controller.submit("u1", "prompt a", at(0)),
        SubmitResult::Accepted { .. }
    );
    assert_matches!(
        controller.submit("u2", "prompt b", at(0)),
        SubmitResult::Accepted { .. }
    );
    assert_matches!(
        controller.submit("u3", "prompt c", at(0)),
        SubmitResult::RejectedQueueFull
    );
    assert_eq!(controller.current_depth(), 2);

    controller.shutdown().await;
}

/// Cooldown window 30s: accepted at t=0, rejected at t=10 with a 20s
/// retry hint, accepted again at t=31.
#[tokio::test(start_paused = true)]
async fn cooldown_rejections_carry_exact_retry_after() {
    let compute = MockCompute::new(Duration::from_secs(1));
    let (controller, _rx) = start(PipelineConfig::default(), Arc::clone(&compute));

    assert_matches!(
        controller.submit("u1", "first", at(0)),
        SubmitResult::Accepted { .. }
    );

    assert_eq!(
        controller.submit("u1", "too soon", at(10)),
        SubmitResult::RejectedCooldown {
            retry_after: Duration::from_secs(20)
        }
    );

    assert_matches!(
        controller.submit("u1", "after the window", at(31)),
        SubmitResult::Accepted { .. }
    );

    controller.shutdown().await;
}

/// A queue-full rejection must not burn the submitter's cooldown.
#[tokio::test(start_paused = true)]
async fn queue_full_rejection_leaves_cooldown_untouched() {
    let config = PipelineConfig {
        queue_capacity: 1,
        degraded_depth_threshold: 1,
        ..Default::default()
    };
    let compute = MockCompute::new(Duration::from_secs(1));
    let (controller, _rx) = start(config, Arc::clone(&compute));

    assert_matches!(
        controller.submit("u1", "fills the queue", at(0)),
        SubmitResult::Accepted { .. }
    );
    assert_matches!(
        controller.submit("u2", "bounces off capacity", at(1)),
        SubmitResult::RejectedQueueFull
    );

    // Let the worker drain the queue, then u2 must be admittable
    // immediately — no cooldown was recorded for the bounced attempt.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_matches!(
        controller.submit("u2", "second try", at(2)),
        SubmitResult::Accepted { .. }
    );

    controller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn invalid_prompts_are_rejected_before_cooldown() {
    let compute = MockCompute::new(Duration::from_secs(1));
    let (controller, _rx) = start(PipelineConfig::default(), Arc::clone(&compute));

    assert_matches!(
        controller.submit("u1", "   ", at(0)),
        SubmitResult::RejectedInvalidPrompt { .. }
    );
    let oversized = "a".repeat(501);
    assert_matches!(
        controller.submit("u1", &oversized, at(0)),
        SubmitResult::RejectedInvalidPrompt { .. }
    );

    // Rejected prompts must not have started u1's cooldown.
    assert_matches!(
        controller.submit("u1", "a real prompt", at(1)),
        SubmitResult::Accepted { .. }
    );

    controller.shutdown().await;
}

// ---------------------------------------------------------------------------
// Worker: ordering, concurrency, timeouts
// ---------------------------------------------------------------------------

/// Admitted requests are dispatched in exact submission order, one at a
/// time.
#[tokio::test(start_paused = true)]
async fn worker_processes_fifo_with_at_most_one_in_flight() {
    let compute = MockCompute::new(Duration::from_secs(5));
    let (controller, mut rx) = start(PipelineConfig::default(), Arc::clone(&compute));

    let prompts = ["first clip", "second clip", "third clip", "fourth clip"];
    for (i, prompt) in prompts.iter().enumerate() {
        let submitter = format!("u{i}");
        assert_matches!(
            controller.submit(&submitter, prompt, at(0)),
            SubmitResult::Accepted { .. }
        );
    }

    let mut succeeded = 0;
    while succeeded < prompts.len() {
        if let PipelineEvent::GenerationSucceeded { .. } = next_lifecycle(&mut rx).await {
            succeeded += 1;
        }
    }

    assert_eq!(compute.dispatch_order(), prompts);
    assert_eq!(compute.max_concurrency(), 1);

    controller.shutdown().await;
}

/// A compute call that never returns is cut off at the hard timeout,
/// surfaced as a failed generation, and the worker moves on.
#[tokio::test(start_paused = true)]
async fn timeout_is_recorded_and_frees_the_worker() {
    let config = PipelineConfig {
        generation_timeout: Duration::from_secs(90),
        ..Default::default()
    };
    // Far beyond the hard cap — effectively never responds.
    let compute = MockCompute::new(Duration::from_secs(100_000));
    let (controller, mut rx) = start(config, Arc::clone(&compute));

    let stuck_id = match controller.submit("u1", "stuck prompt", at(0)) {
        SubmitResult::Accepted { request_id } => request_id,
        other => panic!("submission should be accepted, got {other:?}"),
    };

    assert_matches!(
        next_lifecycle(&mut rx).await,
        PipelineEvent::GenerationStarted { .. }
    );
    match next_lifecycle(&mut rx).await {
        PipelineEvent::GenerationFailed { request_id, reason } => {
            assert_eq!(request_id, stuck_id);
            assert_eq!(reason, "timeout");
        }
        other => panic!("expected a timeout failure, got {other:?}"),
    }

    // The worker must be free for the next item.
    assert_matches!(
        controller.submit("u2", "next prompt", at(0)),
        SubmitResult::Accepted { .. }
    );
    assert_matches!(
        next_lifecycle(&mut rx).await,
        PipelineEvent::GenerationStarted { .. }
    );

    controller.shutdown().await;
}

// ---------------------------------------------------------------------------
// Health and degraded mode
// ---------------------------------------------------------------------------

/// Depth alone trips degraded mode, with zero recorded failures, and the
/// entered event fires exactly once.
#[tokio::test(start_paused = true)]
async fn depth_threshold_enters_degraded_mode_on_admission() {
    let config = PipelineConfig {
        degraded_depth_threshold: 3,
        ..Default::default()
    };
    let compute = MockCompute::new(Duration::from_secs(100_000));
    let (controller, mut rx) = start(config, Arc::clone(&compute));

    for i in 0..5 {
        let submitter = format!("u{i}");
        assert_matches!(
            controller.submit(&submitter, "pile it on", at(0)),
            SubmitResult::Accepted { .. }
        );
    }

    let entered = drain(&mut rx)
        .iter()
        .filter(|e| matches!(e, PipelineEvent::DegradedModeEntered))
        .count();
    assert_eq!(entered, 1);
    assert_eq!(controller.health_verdict(), HealthVerdict::Degraded);
    assert_eq!(controller.degraded_state(), DegradedModeState::Degraded);

    controller.shutdown().await;
}

/// Failure ratio above threshold trips degraded mode independent of
/// depth.
#[tokio::test(start_paused = true)]
async fn failure_ratio_enters_degraded_mode() {
    let compute = MockCompute::failing(Duration::from_secs(1));
    let (controller, mut rx) = start(PipelineConfig::default(), Arc::clone(&compute));

    for i in 0..3 {
        let submitter = format!("u{i}");
        assert_matches!(
            controller.submit(&submitter, "doomed prompt", at(0)),
            SubmitResult::Accepted { .. }
        );
    }

    let mut failed = 0;
    let mut entered = 0;
    while entered == 0 {
        match next_lifecycle(&mut rx).await {
            PipelineEvent::GenerationFailed { reason, .. } => {
                assert!(reason.contains("backend unavailable"));
                failed += 1;
            }
            PipelineEvent::DegradedModeEntered => entered += 1,
            PipelineEvent::GenerationStarted { .. } => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }

    // min_samples is 3, so the verdict flips on the third failure.
    assert_eq!(failed, 3);
    assert_eq!(controller.health_verdict(), HealthVerdict::Degraded);

    controller.shutdown().await;
}

/// After the failure burst ages into a majority of successes, degraded
/// mode exits — once.
#[tokio::test(start_paused = true)]
async fn recovery_exits_degraded_mode_once() {
    let config = PipelineConfig {
        // Exit on the first healthy verdict; debounce behaviour itself is
        // covered by the state-machine unit tests.
        degraded_debounce: Duration::ZERO,
        ..Default::default()
    };
    // Two failures, then successes: 2 failures of 7 outcomes = ~29%,
    // back under the 30% threshold.
    let compute = MockCompute::with_failures(Duration::from_secs(1), 2);
    let (controller, mut rx) = start(config, Arc::clone(&compute));

    for i in 0..7 {
        let submitter = format!("u{i}");
        assert_matches!(
            controller.submit(&submitter, "recovering prompt", at(i)),
            SubmitResult::Accepted { .. }
        );
    }

    let mut entered = 0;
    let mut exited = 0;
    let mut outcomes = 0;
    while outcomes < 7 {
        match next_lifecycle(&mut rx).await {
            PipelineEvent::GenerationFailed { .. } | PipelineEvent::GenerationSucceeded { .. } => {
                outcomes += 1;
            }
            PipelineEvent::DegradedModeEntered => entered += 1,
            PipelineEvent::DegradedModeExited => exited += 1,
            PipelineEvent::GenerationStarted { .. } => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }

    assert_eq!(entered, 1);
    assert_eq!(exited, 1);
    assert_eq!(controller.degraded_state(), DegradedModeState::Healthy);

    controller.shutdown().await;
}

/// The degraded-mode debounce clock follows the timestamps threaded
/// through `submit`, not an internal wall-clock read.
#[tokio::test(start_paused = true)]
async fn submit_timestamps_drive_the_degraded_exit_debounce() {
    let config = PipelineConfig {
        degraded_depth_threshold: 2,
        ..Default::default()
    };
    let compute = MockCompute::new(Duration::from_secs(1));
    let (controller, mut rx) = start(config, Arc::clone(&compute));

    let t0 = Utc::now();
    assert_matches!(
        controller.submit("u1", "first clip", t0),
        SubmitResult::Accepted { .. }
    );
    assert_matches!(
        controller.submit("u2", "second clip", t0),
        SubmitResult::Accepted { .. }
    );
    assert_eq!(controller.degraded_state(), DegradedModeState::Degraded);

    // Let the worker drain both. Its healthy observations start the
    // recovery streak, but virtual sleep does not move the wall clock,
    // so the 30s debounce cannot complete on its own.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(controller.current_depth(), 0);
    assert_eq!(controller.degraded_state(), DegradedModeState::Degraded);

    // A submission stamped a minute later completes the debounce.
    assert_matches!(
        controller.submit("u3", "third clip", t0 + chrono::Duration::seconds(60)),
        SubmitResult::Accepted { .. }
    );
    assert_eq!(controller.degraded_state(), DegradedModeState::Healthy);

    let exited = drain(&mut rx)
        .iter()
        .filter(|e| matches!(e, PipelineEvent::DegradedModeExited))
        .count();
    assert_eq!(exited, 1);

    controller.shutdown().await;
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

/// Shutdown stops admissions immediately, lets the in-flight job finish,
/// and joins the worker. Nothing is abandoned mid-call.
#[tokio::test(start_paused = true)]
async fn shutdown_drains_in_flight_job_then_rejects() {
    let compute = MockCompute::new(Duration::from_secs(30));
    let (controller, mut rx) = start(PipelineConfig::default(), Arc::clone(&compute));

    let in_flight_id = match controller.submit("u1", "last clip", at(0)) {
        SubmitResult::Accepted { request_id } => request_id,
        other => panic!("submission should be accepted, got {other:?}"),
    };

    // Wait for the worker to actually pick the job up.
    assert_matches!(
        next_lifecycle(&mut rx).await,
        PipelineEvent::GenerationStarted { .. }
    );

    controller.shutdown().await;

    // New submissions are rejected after shutdown.
    assert_matches!(
        controller.submit("u2", "too late", at(1)),
        SubmitResult::RejectedShutdown
    );

    // The in-flight job ran to completion before the worker exited.
    let succeeded = drain(&mut rx).into_iter().any(|e| {
        matches!(e, PipelineEvent::GenerationSucceeded { request_id, .. } if request_id == in_flight_id)
    });
    assert!(succeeded, "in-flight job should have completed during shutdown");

    // A second shutdown is a no-op.
    controller.shutdown().await;
}

/// Requests accepted but never picked up by the worker are failed on the
/// bus during shutdown, so no accepted request silently vanishes.
#[tokio::test(start_paused = true)]
async fn shutdown_fails_requests_left_in_the_queue() {
    let compute = MockCompute::new(Duration::from_secs(1));
    let (controller, mut rx) = start(PipelineConfig::default(), Arc::clone(&compute));

    // No awaits between submits and shutdown: the worker task never gets
    // polled before cancellation, so both requests stay queued.
    let ids: Vec<_> = (0..2)
        .map(|i| {
            let submitter = format!("u{i}");
            match controller.submit(&submitter, "never picked up", at(0)) {
                SubmitResult::Accepted { request_id } => request_id,
                other => panic!("submission should be accepted, got {other:?}"),
            }
        })
        .collect();

    controller.shutdown().await;

    let failed: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            PipelineEvent::GenerationFailed { request_id, reason } => {
                assert_eq!(reason, "shutdown");
                Some(request_id)
            }
            _ => None,
        })
        .collect();
    assert_eq!(failed, ids);
    assert!(compute.dispatch_order().is_empty());
    assert_eq!(controller.current_depth(), 0);
}
