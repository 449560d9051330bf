//! Event buffer state machine
//!
//! The buffer holds events between flushes. It does no I/O: the collector
//! driver decides when to claim a batch and reports failures back through
//! [`EventBuffer::requeue`].
//!
//! A flush first *claims* the buffer (swapping it for an empty one) and only
//! then starts delivery, so events tracked while a delivery is in flight land
//! in the new buffer and never in the in-flight batch.

use crate::types::Event;

use super::events::EventDraft;

/// What happened to a tracked event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    /// Tracking is disabled; the event was discarded
    Ignored,
    /// Event buffered, threshold not reached
    Buffered,
    /// Event buffered and the batch size threshold was reached
    FlushDue,
}

/// Per-session event buffer
#[derive(Debug)]
pub struct EventBuffer {
    session_id: String,
    user_id: Option<String>,
    enabled: bool,
    events: Vec<Event>,
    batch_size: usize,
    max_events: usize,
}

impl EventBuffer {
    /// Create a buffer for `session_id`.
    ///
    /// `max_events` is clamped to at least `batch_size`.
    pub fn new(
        session_id: impl Into<String>,
        batch_size: usize,
        max_events: usize,
        enabled: bool,
    ) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            session_id: session_id.into(),
            user_id: None,
            enabled,
            events: Vec::with_capacity(batch_size),
            batch_size,
            max_events: max_events.max(batch_size),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Buffered events, oldest first
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// User ID stamped on events tracked from now on
    pub fn set_user_id(&mut self, user_id: Option<String>) {
        self.user_id = user_id;
    }

    /// Enable or disable tracking. Disabling clears the buffer.
    ///
    /// Returns the number of events discarded.
    pub fn set_enabled(&mut self, enabled: bool) -> usize {
        self.enabled = enabled;
        if enabled {
            return 0;
        }
        let cleared = self.events.len();
        self.events.clear();
        cleared
    }

    /// Stamp and buffer an event.
    ///
    /// Also returns the number of older events evicted to respect the cap.
    pub fn track(&mut self, draft: EventDraft, now_ms: i64) -> (TrackOutcome, usize) {
        if !self.enabled {
            return (TrackOutcome::Ignored, 0);
        }

        let event = draft.stamp(now_ms, &self.session_id, self.user_id.as_deref());
        self.events.push(event);
        let dropped = self.enforce_cap();

        let outcome = if self.events.len() >= self.batch_size {
            TrackOutcome::FlushDue
        } else {
            TrackOutcome::Buffered
        };
        (outcome, dropped)
    }

    /// Take every buffered event, leaving an empty buffer.
    ///
    /// Returns `None` when there is nothing to send.
    pub fn claim(&mut self) -> Option<Vec<Event>> {
        if self.events.is_empty() {
            return None;
        }
        Some(std::mem::replace(
            &mut self.events,
            Vec::with_capacity(self.batch_size),
        ))
    }

    /// Put events from a failed delivery back at the front of the buffer.
    ///
    /// Events tracked since the claim stay behind the requeued ones. When
    /// tracking has been disabled in the meantime the events are discarded.
    /// Returns the number of events dropped to respect the cap.
    pub fn requeue(&mut self, mut failed: Vec<Event>) -> usize {
        if !self.enabled {
            return failed.len();
        }
        failed.append(&mut self.events);
        self.events = failed;
        self.enforce_cap()
    }

    /// Drop the oldest events past `max_events`.
    fn enforce_cap(&mut self) -> usize {
        let overflow = self.events.len().saturating_sub(self.max_events);
        if overflow > 0 {
            self.events.drain(..overflow);
            tracing::warn!(
                session_id = %self.session_id,
                dropped = overflow,
                max_events = self.max_events,
                "Event buffer full, dropped oldest events"
            );
        }
        overflow
    }
}
