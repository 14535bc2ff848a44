//! Drain thread
//!
//! Moves data from the ring buffer to the device sink in chunks. The
//! thread owns the sink for the whole session. It holds at most one chunk
//! outside the ring, retrying it while the device pushes back, and only
//! takes the next chunk once the current one is fully delivered.
//!
//! Once the session is draining and nothing is left to deliver, it closes
//! the device with the remaining shutdown budget and reports the outcome
//! as the terminal event.

use crate::session::Shared;
use crate::sink::DeviceSink;
use crate::state::SessionState;
use pcmout_common::Error;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

pub(crate) struct DrainContext {
    pub shared: Arc<Shared>,
    pub chunk_bytes: usize,
    pub poll_interval: Duration,
}

enum Step {
    /// A chunk of this many bytes was taken from the ring
    Deliver(usize),
    /// Draining with nothing left; close with this budget
    Close(Duration),
    Abort,
}

/// Sink on its way to the drain thread
///
/// Released with a zero timeout if dropped before the thread takes it, as
/// happens when the thread fails to spawn.
pub(crate) struct UnstartedSink<S: DeviceSink>(Option<S>);

impl<S: DeviceSink> UnstartedSink<S> {
    pub fn new(sink: S) -> Self {
        Self(Some(sink))
    }

    pub fn take(mut self) -> Option<S> {
        self.0.take()
    }
}

impl<S: DeviceSink> Drop for UnstartedSink<S> {
    fn drop(&mut self) {
        if let Some(mut sink) = self.0.take() {
            debug!("Releasing {} without starting playback", sink.name());
            release(&mut sink);
        }
    }
}

/// Marks the drain thread as exited, including on panic
struct ExitGuard<'a> {
    shared: &'a Shared,
}

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        if !inner.state.is_terminal() {
            inner.fail(Error::DeviceIo("drain thread exited unexpectedly".to_string()));
        }
        inner.drain_exited = true;
        drop(inner);
        self.shared.notify_all();
    }
}

pub(crate) fn run<S: DeviceSink>(context: DrainContext, mut sink: S) {
    let _exit = ExitGuard {
        shared: &context.shared,
    };
    debug!("Drain thread started for {}", sink.name());

    let mut chunk = vec![0u8; context.chunk_bytes];
    let mut filled = 0;
    let mut offset = 0;

    loop {
        if offset == filled {
            match next_chunk(&context, &mut chunk) {
                Step::Deliver(n) => {
                    filled = n;
                    offset = 0;
                }
                Step::Close(budget) => {
                    close_device(&context.shared, &mut sink, budget);
                    return;
                }
                Step::Abort => {
                    release(&mut sink);
                    return;
                }
            }
        }

        match sink.deliver(&chunk[offset..filled]) {
            Ok(0) => {
                if context.shared.lock().abort {
                    release(&mut sink);
                    return;
                }
                thread::sleep(context.poll_interval);
            }
            Ok(accepted) => {
                let accepted = accepted.min(filled - offset);
                offset += accepted;
                let mut inner = context.shared.lock();
                inner.bytes_delivered += accepted as u64;
                inner.pending_bytes = filled - offset;
                trace!("Delivered {} bytes ({} total)", accepted, inner.bytes_delivered);
                if inner.abort {
                    drop(inner);
                    release(&mut sink);
                    return;
                }
            }
            Err(err) => {
                let err = match err {
                    Error::DeviceIo(_) => err,
                    other => Error::DeviceIo(other.to_string()),
                };
                context.shared.lock().fail(err);
                context.shared.notify_all();
                release(&mut sink);
                return;
            }
        }
    }
}

/// Wait for the next chunk, emitting `flush` whenever the ring runs dry
/// after a delivery
fn next_chunk(context: &DrainContext, chunk: &mut [u8]) -> Step {
    let mut guard = context.shared.lock();
    loop {
        let inner = &mut *guard;
        if inner.abort {
            return Step::Abort;
        }
        let Some(ring) = inner.ring.as_mut() else {
            return Step::Abort;
        };

        let n = ring.read_into(chunk);
        if n > 0 {
            inner.pending_bytes = n;
            inner.unflushed = true;
            context.shared.notify_space();
            return Step::Deliver(n);
        }

        if inner.unflushed {
            inner.unflushed = false;
            let delivered = inner.bytes_delivered;
            inner.emitter.flush(delivered);
        }

        if inner.state == SessionState::Draining {
            inner.closing_device = true;
            let budget = inner
                .shutdown_deadline
                .map(|deadline| deadline.saturating_duration_since(Instant::now()))
                .unwrap_or(Duration::ZERO);
            return Step::Close(budget);
        }

        guard = context.shared.wait_for_data(guard, context.poll_interval);
    }
}

fn close_device<S: DeviceSink>(shared: &Shared, sink: &mut S, budget: Duration) {
    let playout = sink.drain_latency_estimate();
    debug!(
        "Closing {} ({:?} playout estimated, {:?} of shutdown budget left)",
        sink.name(),
        playout,
        budget
    );
    if playout > budget {
        warn!("Device playout {:?} exceeds the remaining shutdown budget {:?}", playout, budget);
    }
    let result = sink.close(budget);

    let mut inner = shared.lock();
    inner.closing_device = false;
    match result {
        Ok(()) => {
            inner.finish();
        }
        Err(err) => {
            inner.fail(err);
        }
    }
}

/// Release the device without waiting for playout
fn release<S: DeviceSink>(sink: &mut S) {
    if let Err(e) = sink.close(Duration::ZERO) {
        debug!("Device release after abort: {}", e);
    }
}
