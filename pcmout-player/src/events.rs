//! Session event emission
//!
//! Re-exports the shared event types and wraps the sending half in an
//! emitter that enforces the session's event grammar: `Opened`, zero or
//! more `Flush`, exactly one terminal `Closed` or `Error`. Anything emitted
//! after the terminal event is discarded, so callers never observe `flush`
//! after `closed` or both `closed` and `error`.

pub use pcmout_common::events::{event_channel, EventSender, EventStream, PlaybackEvent};

use pcmout_common::{AudioFormat, Error};
use tracing::{debug, error, info, trace};

/// Ordered, at-most-one-terminal event emitter
#[derive(Debug)]
pub struct EventEmitter {
    sender: EventSender,
    opened: bool,
    terminated: bool,
}

impl EventEmitter {
    pub fn new(sender: EventSender) -> Self {
        Self {
            sender,
            opened: false,
            terminated: false,
        }
    }

    /// Whether a terminal event has been emitted
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn opened(&mut self, format: AudioFormat) {
        if self.opened || self.terminated {
            trace!("Duplicate opened event suppressed");
            return;
        }
        self.opened = true;
        info!("Session opened: {}", format);
        self.sender.send(PlaybackEvent::Opened { format });
    }

    pub fn flush(&mut self, bytes_delivered: u64) {
        if self.terminated {
            trace!("Flush after terminal event suppressed");
            return;
        }
        debug!("Flush: {} bytes delivered", bytes_delivered);
        self.sender.send(PlaybackEvent::Flush { bytes_delivered });
    }

    /// Emit `Closed`; returns false if a terminal event was already sent
    pub fn closed(&mut self) -> bool {
        if self.terminated {
            return false;
        }
        self.terminated = true;
        info!("Session closed");
        self.sender.send(PlaybackEvent::Closed);
        true
    }

    /// Emit `Error`; returns false if a terminal event was already sent
    pub fn error(&mut self, err: &Error) -> bool {
        if self.terminated {
            return false;
        }
        self.terminated = true;
        error!("Session failed: {}", err);
        self.sender.send(PlaybackEvent::Error {
            kind: err.kind(),
            message: err.to_string(),
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcmout_common::ErrorKind;

    #[test]
    fn test_nothing_after_terminal() {
        let (tx, mut rx) = event_channel();
        let mut emitter = EventEmitter::new(tx);

        emitter.opened(AudioFormat::cd_quality());
        emitter.flush(4);
        assert!(emitter.closed());
        emitter.flush(8);
        assert!(!emitter.error(&Error::DeviceIo("late".into())));
        assert!(!emitter.closed());

        let names: Vec<_> = rx.drain_ready().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["opened", "flush", "closed"]);
    }

    #[test]
    fn test_error_carries_kind_and_message() {
        let (tx, mut rx) = event_channel();
        let mut emitter = EventEmitter::new(tx);
        emitter.opened(AudioFormat::cd_quality());
        emitter.opened(AudioFormat::cd_quality());
        assert!(emitter.error(&Error::Cancelled));
        assert!(emitter.is_terminated());

        let events = rx.drain_ready();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            PlaybackEvent::Error {
                kind: ErrorKind::Cancelled,
                message: "Cancelled by concurrent close".to_string(),
            }
        );
    }
}
