//! # pcmout playback core (pcmout-player)
//!
//! Streams raw interleaved PCM to an audio output device.
//!
//! **Architecture:** the caller writes into a frame-aligned ring buffer; a
//! dedicated drain thread moves chunks from the ring into a [`DeviceSink`]
//! at the device's pace and reports lifecycle events (`opened`, `flush`,
//! `closed`, `error`) on an ordered event stream.
//!
//! ```no_run
//! use pcmout_common::config::PlaybackConfig;
//! use pcmout_common::AudioFormat;
//! use pcmout_player::{CpalSink, PlaybackController, SampleSource, SineSource};
//! use std::time::Duration;
//!
//! # fn main() -> pcmout_common::Result<()> {
//! let format = AudioFormat::cd_quality();
//! let controller = PlaybackController::new(PlaybackConfig::default())?;
//! let session = controller.open(format, CpalSink::new())?;
//!
//! let mut tone = SineSource::new(format, 440.0, 0.5, Duration::from_secs(2))?;
//! while let Some(chunk) = tone.next_chunk(4096) {
//!     session.write(&chunk)?;
//! }
//! session.end()?;
//! # Ok(())
//! # }
//! ```

pub mod controller;
mod drain;
pub mod events;
pub mod ring_buffer;
pub mod session;
pub mod sink;
pub mod source;
pub mod state;

pub use controller::PlaybackController;
pub use events::{EventStream, PlaybackEvent};
pub use ring_buffer::{PcmRingBuffer, RingBufferStats};
pub use session::{Session, SessionStats};
pub use sink::{CpalSink, DeviceSink, MemorySink, NullSink, SinkProbe, WavSink};
pub use source::{SampleSource, SineSource};
pub use state::SessionState;
