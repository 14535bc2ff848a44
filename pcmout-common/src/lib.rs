//! # pcmout Common Library
//!
//! Shared code for the PCM playback core and its callers:
//! - Audio format model and PCM sample codec
//! - Error types (Error enum, ErrorKind)
//! - Lifecycle event types (PlaybackEvent, EventStream)
//! - Configuration loading (TOML + config file resolution)

pub mod config;
pub mod error;
pub mod events;
pub mod format;

pub use error::{Error, ErrorKind, Result};
pub use events::{EventStream, PlaybackEvent};
pub use format::{AudioFormat, BitDepth};
