//! Playback controller
//!
//! Opens sessions: validates the format, acquires the device, sizes the
//! ring buffer and starts the drain thread.

use crate::ring_buffer::PcmRingBuffer;
use crate::session::{Session, SessionTimings};
use crate::sink::DeviceSink;
use pcmout_common::config::PlaybackConfig;
use pcmout_common::{AudioFormat, Error, Result};
use tracing::{debug, info};

pub struct PlaybackController {
    config: PlaybackConfig,
}

impl PlaybackController {
    /// # Errors
    /// `Config` if any timing or size in `config` is zero.
    pub fn new(config: PlaybackConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Open a session on `sink`
    ///
    /// The device is acquired before this returns; the session starts in
    /// `Open` with `opened` already emitted.
    ///
    /// # Errors
    /// - `InvalidFormat` for an unsupported channels/bit depth/rate combination
    /// - `DeviceUnavailable` if the device cannot be acquired
    pub fn open<S>(&self, format: AudioFormat, mut sink: S) -> Result<Session>
    where
        S: DeviceSink + 'static,
    {
        format.validate()?;

        sink.open(&format).map_err(|e| match e {
            Error::InvalidFormat(_) | Error::DeviceUnavailable(_) => e,
            other => Error::DeviceUnavailable(other.to_string()),
        })?;

        let chunk_frames = sink
            .preferred_chunk_frames()
            .filter(|&frames| frames > 0)
            .unwrap_or(self.config.chunk_frames);
        let buffer_frames = format
            .frames_for(self.config.buffer_duration())
            .max(chunk_frames);
        let capacity = format.bytes_for_frames(buffer_frames);
        let chunk_bytes = format.bytes_for_frames(chunk_frames);

        debug!(
            "Ring buffer: {} frames ({} bytes), chunk {} frames",
            buffer_frames, capacity, chunk_frames
        );

        let ring = PcmRingBuffer::new(capacity, format.bytes_per_frame())?;
        let timings = SessionTimings {
            write_timeout: self.config.write_timeout(),
            shutdown_timeout: self.config.shutdown_timeout(),
            poll_interval: self.config.drain_poll_interval(),
        };

        info!("Opening {} on {}", format, sink.name());
        Session::start(format, sink, ring, chunk_bytes, timings)
    }
}
