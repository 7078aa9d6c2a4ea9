//! Event types for the TPhysio event system
//!
//! Provides the job lifecycle events and the EventBus that carries them to
//! SSE subscribers.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// TPhysio event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TphysioEvent {
    /// Analysis job accepted and pipeline spawned
    JobCreated {
        job_id: Uuid,
        /// Number of points in the submitted series
        point_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Job status, progress or message changed
    JobProgress {
        job_id: Uuid,
        /// Lower-case job status (e.g. "enriching")
        status: String,
        /// 0-100
        progress: u8,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Job reached `completed`
    JobCompleted {
        job_id: Uuid,
        /// Total pipeline duration in milliseconds
        duration_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Job reached `failed`
    JobFailed {
        job_id: Uuid,
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Job reached `cancelled`
    JobCancelled {
        job_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl TphysioEvent {
    /// Event type name, used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            TphysioEvent::JobCreated { .. } => "JobCreated",
            TphysioEvent::JobProgress { .. } => "JobProgress",
            TphysioEvent::JobCompleted { .. } => "JobCompleted",
            TphysioEvent::JobFailed { .. } => "JobFailed",
            TphysioEvent::JobCancelled { .. } => "JobCancelled",
        }
    }

    /// Job the event belongs to
    pub fn job_id(&self) -> Uuid {
        match self {
            TphysioEvent::JobCreated { job_id, .. }
            | TphysioEvent::JobProgress { job_id, .. }
            | TphysioEvent::JobCompleted { job_id, .. }
            | TphysioEvent::JobFailed { job_id, .. }
            | TphysioEvent::JobCancelled { job_id, .. } => *job_id,
        }
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use tphysio_common::events::{EventBus, TphysioEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(TphysioEvent::JobCancelled {
///     job_id: uuid::Uuid::new_v4(),
///     timestamp: chrono::Utc::now(),
/// });
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TphysioEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<TphysioEvent> {
        self.tx.subscribe()
    }

    /// Emit an event; fails if there are no subscribers
    pub fn emit(
        &self,
        event: TphysioEvent,
    ) -> Result<usize, broadcast::error::SendError<TphysioEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: TphysioEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_is_error_but_lossy_is_not() {
        let bus = EventBus::new(10);
        let event = TphysioEvent::JobCancelled {
            job_id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
        };
        assert!(bus.emit(event.clone()).is_err());
        bus.emit_lossy(event);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        let job_id = Uuid::new_v4();

        bus.emit(TphysioEvent::JobProgress {
            job_id,
            status: "enriching".to_string(),
            progress: 10,
            message: "Enriching".to_string(),
            timestamp: chrono::Utc::now(),
        })
        .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.job_id(), job_id);
        assert_eq!(received.event_type(), "JobProgress");
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = TphysioEvent::JobFailed {
            job_id: Uuid::nil(),
            error: "boom".to_string(),
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "JobFailed");
        assert_eq!(json["error"], "boom");
    }
}
