//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`PipelineEvent`]s. It is
//! designed to be shared via `Arc<EventBus>` between the queue controller,
//! the worker, and any number of display/telemetry subscribers.

use serde::Serialize;
use tokio::sync::broadcast;

use clipstream_core::types::RequestId;

// ---------------------------------------------------------------------------
// PipelineEvent
// ---------------------------------------------------------------------------

/// A lifecycle event describing a state change in request processing or
/// pipeline health.
///
/// The event vocabulary is the complete surface the display layer sees;
/// nothing else leaks out of the pipeline.
#[derive(Debug, Clone, Serialize)]
pub enum PipelineEvent {
    /// The worker began processing a request.
    GenerationStarted {
        request_id: RequestId,
        prompt_text: String,
        submitter_id: String,
    },

    /// A request completed successfully. `artifact_ref` is an opaque
    /// reference to the generated clip; its interpretation belongs to the
    /// compute client and display layer.
    GenerationSucceeded {
        request_id: RequestId,
        artifact_ref: String,
    },

    /// A request failed (compute error or timeout). No automatic retry;
    /// the submitter must resubmit.
    GenerationFailed { request_id: RequestId, reason: String },

    /// Health flipped to degraded. Emitted once per transition.
    DegradedModeEntered,

    /// Health recovered and stayed healthy through the debounce period.
    /// Emitted once per transition.
    DegradedModeExited,

    /// The number of pending requests changed.
    QueueDepthChanged { depth: usize, capacity: usize },
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`PipelineEvent`].
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed events are dropped
    /// and slow receivers observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped;
    /// events are notifications, not commands.
    pub fn publish(&self, event: PipelineEvent) {
        // Ignore the SendError — it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(PipelineEvent::QueueDepthChanged {
            depth: 3,
            capacity: 10,
        });

        match rx.recv().await.expect("should receive the event") {
            PipelineEvent::QueueDepthChanged { depth, capacity } => {
                assert_eq!(depth, 3);
                assert_eq!(capacity, 10);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(PipelineEvent::DegradedModeEntered);

        assert!(matches!(
            rx1.recv().await.expect("subscriber 1 should receive"),
            PipelineEvent::DegradedModeEntered
        ));
        assert!(matches!(
            rx2.recv().await.expect("subscriber 2 should receive"),
            PipelineEvent::DegradedModeEntered
        ));
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(PipelineEvent::DegradedModeExited);
    }

    #[test]
    fn events_serialize_with_variant_tags() {
        let event = PipelineEvent::GenerationFailed {
            request_id: RequestId::nil(),
            reason: "timeout".to_string(),
        };
        let json = serde_json::to_value(&event).expect("serialization should succeed");
        assert_eq!(json["GenerationFailed"]["reason"], "timeout");
    }
}
