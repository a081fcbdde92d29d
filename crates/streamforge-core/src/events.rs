//! Stream lifecycle event system.
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel with a bounded
//! ring-buffer of recent events so that late-joining clients can catch up.
//! The supervisor is the only publisher; metrics, SSE and health consume.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::stream::StreamKey;

/// Maximum number of events retained in the ring buffer.
const MAX_RECENT_EVENTS: usize = 100;

// ---------------------------------------------------------------------------
// EventCategory
// ---------------------------------------------------------------------------

/// Coarse grouping used for SSE filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    /// Started, ended and error transitions.
    Lifecycle,
    /// High-frequency encoder progress.
    Progress,
}

// ---------------------------------------------------------------------------
// EventPayload
// ---------------------------------------------------------------------------

/// Payload describing what happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    StreamStarted {
        stream_key: StreamKey,
        profile: String,
    },
    StreamProgress {
        stream_key: StreamKey,
        fps: Option<u32>,
        bitrate: Option<String>,
    },
    StreamEnded {
        stream_key: StreamKey,
        /// Encoder exit code, if it exited on its own.
        code: Option<i32>,
        /// Terminating signal number, if any.
        signal: Option<i32>,
        /// Seconds the stream was up.
        duration_secs: f64,
    },
    StreamError {
        stream_key: StreamKey,
        error: String,
        duration_secs: f64,
    },
}

impl EventPayload {
    /// The stream this event refers to.
    pub fn stream_key(&self) -> &StreamKey {
        match self {
            EventPayload::StreamStarted { stream_key, .. }
            | EventPayload::StreamProgress { stream_key, .. }
            | EventPayload::StreamEnded { stream_key, .. }
            | EventPayload::StreamError { stream_key, .. } => stream_key,
        }
    }

    /// Category this payload is broadcast under.
    pub fn category(&self) -> EventCategory {
        match self {
            EventPayload::StreamProgress { .. } => EventCategory::Progress,
            _ => EventCategory::Lifecycle,
        }
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A timestamped, categorised event ready for broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    pub category: EventCategory,
    /// What happened.
    pub payload: EventPayload,
}

impl Event {
    /// Create a new event with a fresh UUID and the current timestamp.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            category: payload.category(),
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

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Broadcast an event to all current subscribers and store it in the
    /// ring buffer. Progress events are not retained for replay.
    pub fn publish(&self, payload: EventPayload) {
        let event = Event::new(payload);

        if event.category == EventCategory::Lifecycle {
            let mut recent = self.recent.write();
            if recent.len() >= MAX_RECENT_EVENTS {
                recent.pop_back();
            }
            recent.push_front(event.clone());
        }

        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    /// Subscribe, then snapshot the `n` most recent lifecycle events
    /// (newest first). An event published in between shows up in both, so
    /// callers replaying the snapshot should skip live events by id.
    pub fn subscribe_with_replay(&self, n: usize) -> (Vec<Event>, broadcast::Receiver<Event>) {
        let rx = self.subscribe();
        (self.recent_events(n), rx)
    }

    /// Return the `n` most recent lifecycle events (newest first).
    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        let recent = self.recent.read();
        recent.iter().take(n).cloned().collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
