//! Transcode event system.
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel with a bounded
//! ring-buffer of recent events so that late subscribers can catch up on
//! what a session has been doing.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::ids::{OperationId, SessionId};

/// Maximum number of events retained in the ring buffer.
const MAX_RECENT_EVENTS: usize = 100;

// ---------------------------------------------------------------------------
// TranscodeEvent
// ---------------------------------------------------------------------------

/// What happened to an operation. Produced from the engine log so callers
/// never have to look at log text themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscodeEvent {
    Started {
        operation_id: OperationId,
        args: Vec<String>,
    },
    Progress {
        operation_id: OperationId,
        ratio: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<f64>,
    },
    Completed {
        operation_id: OperationId,
    },
    Failed {
        operation_id: OperationId,
        reason: String,
    },
}

impl TranscodeEvent {
    /// The operation this event belongs to.
    pub fn operation_id(&self) -> OperationId {
        match self {
            TranscodeEvent::Started { operation_id, .. }
            | TranscodeEvent::Progress { operation_id, .. }
            | TranscodeEvent::Completed { operation_id }
            | TranscodeEvent::Failed { operation_id, .. } => *operation_id,
        }
    }

    /// Whether the operation is finished after this event.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TranscodeEvent::Completed { .. } | TranscodeEvent::Failed { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A timestamped event ready for broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Session that produced the event.
    pub session_id: SessionId,
    /// What happened.
    pub payload: TranscodeEvent,
}

impl Event {
    /// Create a new event with a fresh UUID and the current timestamp.
    pub fn new(session_id: SessionId, payload: TranscodeEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            session_id,
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast channel with a bounded ring buffer of recent events.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    recent: RwLock<VecDeque<Event>>,
}

impl EventBus {
    /// Create a new event bus.
    ///
    /// `capacity` controls the broadcast channel buffer size (not the ring
    /// buffer, which is always [`MAX_RECENT_EVENTS`]).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            recent: RwLock::new(VecDeque::with_capacity(MAX_RECENT_EVENTS)),
        }
    }

    /// Subscribe to the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Broadcast an event to all current subscribers and store it in the
    /// ring buffer.
    pub fn broadcast(&self, session_id: SessionId, payload: TranscodeEvent) {
        let event = Event::new(session_id, payload);

        {
            let mut recent = self.recent.write();
            if recent.len() >= MAX_RECENT_EVENTS {
                recent.pop_back();
            }
            recent.push_front(event.clone());
        }

        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    /// Return the `n` most recent events (newest first).
    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        let recent = self.recent.read();
        recent.iter().take(n).cloned().collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let session = SessionId::new();
        let op = OperationId::new();
        bus.broadcast(session, TranscodeEvent::Completed { operation_id: op });

        let event = rx.try_recv().unwrap();
        assert_eq!(event.session_id, session);
        assert_eq!(event.payload.operation_id(), op);
        assert!(event.payload.is_terminal());
    }

    #[test]
    fn recent_events_capped() {
        let bus = EventBus::new(256);
        let session = SessionId::new();
        let op = OperationId::new();

        for i in 0..150 {
            bus.broadcast(
                session,
                TranscodeEvent::Progress {
                    operation_id: op,
                    ratio: i as f64 / 150.0,
                    time: None,
                    duration: None,
                },
            );
        }

        assert_eq!(bus.recent_events(200).len(), MAX_RECENT_EVENTS);
    }

    #[test]
    fn recent_events_newest_first() {
        let bus = EventBus::default();
        let session = SessionId::new();
        let op = OperationId::new();
        bus.broadcast(
            session,
            TranscodeEvent::Started {
                operation_id: op,
                args: vec!["-i".into(), "in.mp4".into()],
            },
        );
        bus.broadcast(
            session,
            TranscodeEvent::Failed {
                operation_id: op,
                reason: "engine exited".into(),
            },
        );

        let recent = bus.recent_events(1);
        assert!(matches!(recent[0].payload, TranscodeEvent::Failed { .. }));
    }

    #[test]
    fn no_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.broadcast(
            SessionId::new(),
            TranscodeEvent::Completed {
                operation_id: OperationId::new(),
            },
        );
    }

    #[test]
    fn progress_serializes_tagged() {
        let op = OperationId::new();
        let json = serde_json::to_value(TranscodeEvent::Progress {
            operation_id: op,
            ratio: 0.5,
            time: Some(50.0),
            duration: None,
        })
        .unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["ratio"], 0.5);
        assert!(json.get("duration").is_none());
    }
}
