//! Output device abstraction
//!
//! A [`DeviceSink`] is the terminal consumer of the PCM stream. The drain
//! thread owns the sink after open and is the only caller of `deliver` and
//! `close`.
//!
//! Implementations:
//! - [`CpalSink`]: system audio output via cpal
//! - [`WavSink`]: writes the stream to a WAV file
//! - [`NullSink`]: discards everything
//! - [`MemorySink`]: records deliveries for verification, with scripted
//!   backpressure, stalls and failures

mod cpal_output;
mod memory;
mod wav;

pub use self::cpal_output::CpalSink;
pub use self::memory::{MemorySink, NullSink, SinkProbe};
pub use self::wav::WavSink;

use pcmout_common::{AudioFormat, Result};
use std::time::Duration;

/// Output device capability set
pub trait DeviceSink: Send {
    /// Human-readable device name for logs
    fn name(&self) -> String;

    /// Acquire the device for `format`
    ///
    /// # Errors
    /// `DeviceUnavailable` when the device is busy, missing, or cannot play
    /// this channels/bit depth/sample rate combination.
    fn open(&mut self, format: &AudioFormat) -> Result<()>;

    /// Offer a frame-aligned chunk; returns the bytes accepted
    ///
    /// Accepting fewer bytes than offered (including zero) is device
    /// backpressure and the caller retries the remainder. Accepted counts
    /// are always whole frames.
    ///
    /// # Errors
    /// `DeviceIo` on delivery failure.
    fn deliver(&mut self, chunk: &[u8]) -> Result<usize>;

    /// Block until accepted data has been output or `timeout` elapses,
    /// then release the device
    ///
    /// The device is released even when this returns an error. Calling
    /// close on a closed sink is a no-op.
    ///
    /// # Errors
    /// `ForcedClose` if accepted data was still unplayed at the deadline.
    fn close(&mut self, timeout: Duration) -> Result<()>;

    /// Estimated time for currently accepted data to finish playing
    fn drain_latency_estimate(&self) -> Duration {
        Duration::ZERO
    }

    /// Chunk size the device prefers, in frames
    fn preferred_chunk_frames(&self) -> Option<usize> {
        None
    }
}

impl<S: DeviceSink + ?Sized> DeviceSink for Box<S> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn open(&mut self, format: &AudioFormat) -> Result<()> {
        (**self).open(format)
    }

    fn deliver(&mut self, chunk: &[u8]) -> Result<usize> {
        (**self).deliver(chunk)
    }

    fn close(&mut self, timeout: Duration) -> Result<()> {
        (**self).close(timeout)
    }

    fn drain_latency_estimate(&self) -> Duration {
        (**self).drain_latency_estimate()
    }

    fn preferred_chunk_frames(&self) -> Option<usize> {
        (**self).preferred_chunk_frames()
    }
}
