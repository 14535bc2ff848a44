//! Lifecycle events for a playback session
//!
//! Events travel over a `tokio::sync::mpsc` unbounded channel so the emitter
//! never blocks and no event is ever dropped. The receiving half is wrapped
//! in [`EventStream`], usable from async code (`recv().await`) and from plain
//! threads (`blocking_recv()`, `try_recv()`).

use crate::error::ErrorKind;
use crate::format::AudioFormat;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;

/// Lifecycle event emitted by a playback session
///
/// Per session the sequence is `Opened`, zero or more `Flush`, then exactly
/// one terminal `Closed` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlaybackEvent {
    /// Device opened, session accepting writes
    Opened { format: AudioFormat },

    /// All data buffered so far has been handed to the device
    Flush {
        /// Total bytes delivered to the device since open
        bytes_delivered: u64,
    },

    /// Drain completed and the device is closed
    Closed,

    /// Session failed; no further events follow
    Error { kind: ErrorKind, message: String },
}

impl PlaybackEvent {
    /// Whether this event ends the session's event sequence
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlaybackEvent::Closed | PlaybackEvent::Error { .. })
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            PlaybackEvent::Opened { .. } => "opened",
            PlaybackEvent::Flush { .. } => "flush",
            PlaybackEvent::Closed => "closed",
            PlaybackEvent::Error { .. } => "error",
        }
    }
}

/// Create a connected sender / stream pair
pub fn event_channel() -> (EventSender, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventStream { rx })
}

/// Sending half of a session event channel
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<PlaybackEvent>,
}

impl EventSender {
    /// Send an event; a dropped receiver is not an error
    pub fn send(&self, event: PlaybackEvent) {
        if self.tx.send(event).is_err() {
            trace!("Event receiver dropped, event discarded");
        }
    }
}

/// Receiving half of a session event channel
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<PlaybackEvent>,
}

impl EventStream {
    /// Wait for the next event; `None` once the session is gone and all
    /// events were consumed
    pub async fn recv(&mut self) -> Option<PlaybackEvent> {
        self.rx.recv().await
    }

    /// Blocking variant of [`recv`](Self::recv) for non-async callers
    ///
    /// Must not be called from within an async runtime.
    pub fn blocking_recv(&mut self) -> Option<PlaybackEvent> {
        self.rx.blocking_recv()
    }

    /// Next event if one is ready
    pub fn try_recv(&mut self) -> Option<PlaybackEvent> {
        self.rx.try_recv().ok()
    }

    /// All events that are ready right now
    pub fn drain_ready(&mut self) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }

    /// Block until a terminal event arrives, returning every event seen
    pub fn collect_until_terminal(&mut self) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.blocking_recv() {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }
}
