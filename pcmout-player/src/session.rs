//! Playback session
//!
//! A [`Session`] is one open stream: the producer side of the ring buffer,
//! plus the lifecycle the drain thread advances. All mutable session state
//! lives behind one mutex; three condition variables wake writers blocked on
//! space, the drain thread waiting for data, and `end` waiting for the drain
//! thread to finish.
//!
//! Every terminal transition goes through [`Inner::fail`] or
//! [`Inner::finish`], which move the state, release the ring buffer and emit
//! the single terminal event together under the lock.

use crate::drain::{self, DrainContext, UnstartedSink};
use crate::events::{event_channel, EventEmitter, EventStream};
use crate::ring_buffer::{PcmRingBuffer, RingBufferStats};
use crate::sink::DeviceSink;
use crate::state::SessionState;
use pcmout_common::{AudioFormat, Error, Result};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How long end/drop wait for the drain thread past the shutdown deadline
const DRAIN_EXIT_GRACE: Duration = Duration::from_millis(250);

/// Timing bounds for one session
#[derive(Debug, Clone, Copy)]
pub(crate) struct SessionTimings {
    pub write_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub poll_interval: Duration,
}

/// Mutable session state, guarded by [`Shared::inner`]
pub(crate) struct Inner {
    pub state: SessionState,
    /// Released (set to `None`) on entering a terminal state
    pub ring: Option<PcmRingBuffer>,
    pub emitter: EventEmitter,
    pub last_error: Option<Error>,
    pub bytes_accepted: u64,
    pub bytes_delivered: u64,
    /// Bytes the drain thread has taken from the ring but not yet delivered
    pub pending_bytes: usize,
    /// Data has been delivered since the last flush event
    pub unflushed: bool,
    pub shutdown_deadline: Option<Instant>,
    /// Drain thread is inside `DeviceSink::close`
    pub closing_device: bool,
    /// Drain thread must release the device and exit
    pub abort: bool,
    pub drain_exited: bool,
}

impl Inner {
    fn new(ring: PcmRingBuffer, emitter: EventEmitter) -> Self {
        Self {
            state: SessionState::Idle,
            ring: Some(ring),
            emitter,
            last_error: None,
            bytes_accepted: 0,
            bytes_delivered: 0,
            pending_bytes: 0,
            unflushed: false,
            shutdown_deadline: None,
            closing_device: false,
            abort: false,
            drain_exited: false,
        }
    }

    /// Bytes written but not yet handed to the device
    pub fn undelivered_bytes(&self) -> usize {
        self.ring.as_ref().map_or(0, PcmRingBuffer::available_to_read) + self.pending_bytes
    }

    /// Enter `Error` and emit the error event; no-op once terminal
    pub fn fail(&mut self, err: Error) -> bool {
        if self.state.is_terminal() {
            debug!("Ignoring {} after terminal state {}", err, self.state);
            return false;
        }
        self.state = SessionState::Error;
        self.ring = None;
        self.abort = true;
        self.emitter.error(&err);
        self.last_error = Some(err);
        true
    }

    /// Enter `Closed` and emit the closed event; no-op once terminal
    pub fn finish(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = SessionState::Closed;
        self.ring = None;
        self.emitter.closed();
        true
    }
}

/// State shared between the session handle and its drain thread
pub(crate) struct Shared {
    inner: Mutex<Inner>,
    /// Ring space freed or state changed
    space: Condvar,
    /// Data arrived or state changed
    data: Condvar,
    /// Drain thread exited or state changed
    finished: Condvar,
}

impl Shared {
    fn new(inner: Inner) -> Self {
        Self {
            inner: Mutex::new(inner),
            space: Condvar::new(),
            data: Condvar::new(),
            finished: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn notify_space(&self) {
        self.space.notify_all();
    }

    pub fn notify_data(&self) {
        self.data.notify_one();
    }

    /// Wake every waiter after a state change
    pub fn notify_all(&self) {
        self.space.notify_all();
        self.data.notify_all();
        self.finished.notify_all();
    }

    fn wait_for_space<'a>(&'a self, guard: MutexGuard<'a, Inner>, timeout: Duration) -> MutexGuard<'a, Inner> {
        wait_timeout(&self.space, guard, timeout)
    }

    pub fn wait_for_data<'a>(&'a self, guard: MutexGuard<'a, Inner>, timeout: Duration) -> MutexGuard<'a, Inner> {
        wait_timeout(&self.data, guard, timeout)
    }

    fn wait_for_exit<'a>(&'a self, mut guard: MutexGuard<'a, Inner>, deadline: Instant) -> MutexGuard<'a, Inner> {
        loop {
            let now = Instant::now();
            if guard.drain_exited || now >= deadline {
                return guard;
            }
            guard = wait_timeout(&self.finished, guard, deadline - now);
        }
    }
}

fn wait_timeout<'a>(condvar: &Condvar, guard: MutexGuard<'a, Inner>, timeout: Duration) -> MutexGuard<'a, Inner> {
    match condvar.wait_timeout(guard, timeout) {
        Ok((guard, _)) => guard,
        Err(poisoned) => poisoned.into_inner().0,
    }
}

/// Point-in-time session statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub state: SessionState,
    /// Ring buffer occupancy; zeroed once the buffer is released
    pub buffer: RingBufferStats,
    /// Bytes accepted by `write`
    pub bytes_accepted: u64,
    /// Bytes accepted by the device
    pub bytes_delivered: u64,
}

/// One open PCM stream
///
/// `Session` is `Send + Sync`; share it behind an `Arc` to write from one
/// thread and end from another. Dropping a session that has not reached a
/// terminal state aborts it with `error(Cancelled)`.
pub struct Session {
    shared: Arc<Shared>,
    format: AudioFormat,
    timings: SessionTimings,
    drain: Mutex<Option<JoinHandle<()>>>,
    events: Mutex<Option<EventStream>>,
}

impl Session {
    /// Start the drain thread for an already opened sink and emit `opened`
    pub(crate) fn start<S>(
        format: AudioFormat,
        sink: S,
        ring: PcmRingBuffer,
        chunk_bytes: usize,
        timings: SessionTimings,
    ) -> Result<Self>
    where
        S: DeviceSink + 'static,
    {
        let (sender, events) = event_channel();
        let shared = Arc::new(Shared::new(Inner::new(ring, EventEmitter::new(sender))));
        shared.lock().state = SessionState::Open;

        let context = DrainContext {
            shared: Arc::clone(&shared),
            chunk_bytes,
            poll_interval: timings.poll_interval,
        };
        let sink = UnstartedSink::new(sink);
        let handle = std::thread::Builder::new()
            .name("pcmout-drain".to_string())
            .spawn(move || {
                if let Some(sink) = sink.take() {
                    drain::run(context, sink);
                }
            })
            .map_err(|e| Error::DeviceUnavailable(format!("Failed to spawn drain thread: {}", e)))?;

        // Nothing reaches the drain thread before start returns, so opened
        // is still the first event.
        shared.lock().emitter.opened(format);

        Ok(Self {
            shared,
            format,
            timings,
            drain: Mutex::new(Some(handle)),
            events: Mutex::new(Some(events)),
        })
    }

    /// Enqueue interleaved PCM, blocking while the buffer is full
    ///
    /// Returns when every byte has been accepted. The wait is bounded by the
    /// write timeout, which restarts whenever the drain thread frees space.
    ///
    /// # Errors
    /// - `NotOpen` unless the session is open
    /// - `FrameMisaligned` if `bytes` is not whole frames (the session fails)
    /// - `BackpressureTimeout` if no progress is made within the write
    ///   timeout (the session fails)
    /// - `Cancelled` if the session is ended, fails, or is dropped while
    ///   this call waits
    pub fn write(&self, bytes: &[u8]) -> Result<usize> {
        let mut inner = self.shared.lock();
        if inner.state != SessionState::Open {
            return Err(Error::NotOpen);
        }

        if !self.format.is_aligned(bytes.len()) {
            let err = Error::FrameMisaligned {
                len: bytes.len(),
                bytes_per_frame: self.format.bytes_per_frame(),
            };
            inner.fail(err.clone());
            self.shared.notify_all();
            return Err(err);
        }
        if bytes.is_empty() {
            return Ok(0);
        }

        let timeout = self.timings.write_timeout;
        let mut written = 0;
        let mut last_progress = Instant::now();
        loop {
            let state = inner.state;
            let ring = match inner.ring.as_mut() {
                Some(ring) if state == SessionState::Open => ring,
                _ => {
                    debug!("Write cancelled after {} bytes: session {}", written, state);
                    return Err(Error::Cancelled);
                }
            };

            let accepted = ring.write(&bytes[written..])?;
            if accepted > 0 {
                written += accepted;
                inner.bytes_accepted += accepted as u64;
                last_progress = Instant::now();
                self.shared.notify_data();
            }
            if written == bytes.len() {
                return Ok(written);
            }

            let stalled_for = last_progress.elapsed();
            if stalled_for >= timeout {
                let err = Error::BackpressureTimeout {
                    written,
                    requested: bytes.len(),
                    timeout_ms: timeout.as_millis() as u64,
                };
                inner.fail(err.clone());
                self.shared.notify_all();
                return Err(err);
            }
            inner = self.shared.wait_for_space(inner, timeout - stalled_for);
        }
    }

    /// Stop accepting data, deliver everything buffered, then close
    ///
    /// Blocks until the device has played out or the shutdown timeout
    /// elapses. Writers still waiting get `Cancelled`.
    ///
    /// # Errors
    /// - `NotOpen` unless the session is open
    /// - `ForcedClose` when data was still undelivered at the deadline
    /// - the terminal error if the session failed while draining
    pub fn end(&self) -> Result<()> {
        let mut inner = self.shared.lock();
        if inner.state != SessionState::Open {
            return Err(Error::NotOpen);
        }

        let deadline = Instant::now() + self.timings.shutdown_timeout;
        inner.state = SessionState::Draining;
        inner.shutdown_deadline = Some(deadline);
        info!(
            "Draining {} buffered bytes (shutdown timeout {:?})",
            inner.undelivered_bytes(),
            self.timings.shutdown_timeout
        );
        self.shared.notify_all();

        // Past the deadline, closure is forced only while data is still
        // undelivered. With nothing left, the drain thread gets a short grace
        // period to close the device and report its own outcome.
        let hard_deadline = deadline + DRAIN_EXIT_GRACE;
        loop {
            if inner.drain_exited {
                break;
            }
            let now = Instant::now();
            let undelivered_bytes = inner.undelivered_bytes();
            if now >= deadline
                && !inner.state.is_terminal()
                && ((undelivered_bytes > 0 && !inner.closing_device) || now >= hard_deadline)
            {
                warn!(
                    "Shutdown timeout exceeded with {} bytes undelivered",
                    undelivered_bytes
                );
                inner.fail(Error::ForcedClose { undelivered_bytes });
                self.shared.notify_all();
            }
            if now >= hard_deadline {
                break;
            }
            let until = if now < deadline { deadline } else { hard_deadline };
            inner = wait_timeout(&self.shared.finished, inner, until - now);
        }

        let outcome = match inner.state {
            SessionState::Closed => Ok(()),
            _ => Err(inner.last_error.clone().unwrap_or(Error::Cancelled)),
        };
        let exited = inner.drain_exited;
        drop(inner);

        self.join_drain(exited);
        outcome
    }

    /// Same as [`Session::end`]
    pub fn close(&self) -> Result<()> {
        self.end()
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    /// Error that moved the session to `Error`, if any
    pub fn last_error(&self) -> Option<Error> {
        self.shared.lock().last_error.clone()
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn stats(&self) -> SessionStats {
        let inner = self.shared.lock();
        SessionStats {
            state: inner.state,
            buffer: inner.ring.as_ref().map(PcmRingBuffer::stats).unwrap_or_default(),
            bytes_accepted: inner.bytes_accepted,
            bytes_delivered: inner.bytes_delivered,
        }
    }

    /// Take the event stream; `None` if it was already taken
    pub fn take_events(&self) -> Option<EventStream> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    fn join_drain(&self, exited: bool) {
        let handle = self.drain.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(handle) = handle else {
            return;
        };
        if exited {
            if handle.join().is_err() {
                warn!("Drain thread panicked");
            }
        } else {
            warn!("Drain thread still busy inside the device; detaching it");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        if !inner.state.is_terminal() {
            warn!("Session dropped while {}; aborting", inner.state);
            inner.fail(Error::Cancelled);
            self.shared.notify_all();
        }
        let inner = self.shared.wait_for_exit(inner, Instant::now() + DRAIN_EXIT_GRACE);
        let exited = inner.drain_exited;
        drop(inner);
        self.join_drain(exited);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("format", &self.format)
            .field("state", &self.state())
            .finish()
    }
}
