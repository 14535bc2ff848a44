//! Audio format model and PCM sample codec
//!
//! A frame is one sample per channel; samples are little-endian integers.
//! 16, 24 and 32-bit samples are signed two's complement, 8-bit samples are
//! unsigned with a 128 offset. 24-bit samples are packed into 3 bytes.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Highest accepted channel count
pub const MAX_CHANNELS: u16 = 32;

/// Highest accepted sample rate (frames per second)
pub const MAX_SAMPLE_RATE: u32 = 768_000;

/// Sample resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum BitDepth {
    Eight,
    Sixteen,
    TwentyFour,
    ThirtyTwo,
}

impl BitDepth {
    /// Bits per sample
    pub fn bits(self) -> u16 {
        match self {
            BitDepth::Eight => 8,
            BitDepth::Sixteen => 16,
            BitDepth::TwentyFour => 24,
            BitDepth::ThirtyTwo => 32,
        }
    }

    /// Bytes per sample
    pub fn bytes(self) -> usize {
        self.bits() as usize / 8
    }

    /// Largest positive sample value
    pub fn max_amplitude(self) -> i64 {
        (1i64 << (self.bits() - 1)) - 1
    }

    /// Most negative sample value
    pub fn min_amplitude(self) -> i64 {
        -(1i64 << (self.bits() - 1))
    }
}

impl TryFrom<u16> for BitDepth {
    type Error = Error;

    fn try_from(bits: u16) -> Result<Self> {
        match bits {
            8 => Ok(BitDepth::Eight),
            16 => Ok(BitDepth::Sixteen),
            24 => Ok(BitDepth::TwentyFour),
            32 => Ok(BitDepth::ThirtyTwo),
            other => Err(Error::InvalidFormat(format!(
                "unsupported bit depth {} (expected 8, 16, 24 or 32)",
                other
            ))),
        }
    }
}

impl From<BitDepth> for u16 {
    fn from(depth: BitDepth) -> Self {
        depth.bits()
    }
}

impl std::fmt::Display for BitDepth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}

/// Interleaved PCM stream format
///
/// Immutable once a session is opened with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Track count
    pub channels: u16,

    /// Sample resolution
    pub bit_depth: BitDepth,

    /// Frames per second
    pub sample_rate: u32,
}

impl AudioFormat {
    /// Build and validate a format from raw parameters
    pub fn new(channels: u16, bit_depth: u16, sample_rate: u32) -> Result<Self> {
        let format = Self {
            channels,
            bit_depth: BitDepth::try_from(bit_depth)?,
            sample_rate,
        };
        format.validate()?;
        Ok(format)
    }

    /// CD-quality stereo: 2 channels, 16-bit, 44.1kHz
    pub fn cd_quality() -> Self {
        Self {
            channels: 2,
            bit_depth: BitDepth::Sixteen,
            sample_rate: 44_100,
        }
    }

    /// Check channel count and sample rate bounds
    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(Error::InvalidFormat(format!(
                "channel count {} outside 1..={}",
                self.channels, MAX_CHANNELS
            )));
        }
        if self.sample_rate == 0 || self.sample_rate > MAX_SAMPLE_RATE {
            return Err(Error::InvalidFormat(format!(
                "sample rate {} outside 1..={}",
                self.sample_rate, MAX_SAMPLE_RATE
            )));
        }
        Ok(())
    }

    /// Bytes per frame: channels × bit_depth / 8
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.bit_depth.bytes()
    }

    /// Bytes per second of audio
    pub fn bytes_per_second(&self) -> usize {
        self.bytes_per_frame() * self.sample_rate as usize
    }

    /// Whether a payload length is a whole number of frames
    pub fn is_aligned(&self, len: usize) -> bool {
        len % self.bytes_per_frame() == 0
    }

    /// Byte length of `frames` frames
    pub fn bytes_for_frames(&self, frames: usize) -> usize {
        frames * self.bytes_per_frame()
    }

    /// Frame count covering `duration`, rounded to the nearest frame
    pub fn frames_for(&self, duration: Duration) -> usize {
        (duration.as_secs_f64() * self.sample_rate as f64).round() as usize
    }

    /// Playback duration of `bytes` bytes of audio
    pub fn duration_of(&self, bytes: usize) -> Duration {
        let frames = bytes / self.bytes_per_frame();
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }

    /// Append one integer sample, clamped to the bit depth's range
    pub fn encode_sample(&self, value: i64, out: &mut Vec<u8>) {
        let depth = self.bit_depth;
        let v = value.clamp(depth.min_amplitude(), depth.max_amplitude());
        match depth {
            BitDepth::Eight => out.push((v + 128) as u8),
            BitDepth::Sixteen => out.extend_from_slice(&(v as i16).to_le_bytes()),
            BitDepth::TwentyFour => out.extend_from_slice(&(v as i32).to_le_bytes()[..3]),
            BitDepth::ThirtyTwo => out.extend_from_slice(&(v as i32).to_le_bytes()),
        }
    }

    /// Read one integer sample from the start of `bytes`
    ///
    /// `bytes` must hold at least one sample.
    pub fn decode_sample(&self, bytes: &[u8]) -> i64 {
        match self.bit_depth {
            BitDepth::Eight => bytes[0] as i64 - 128,
            BitDepth::Sixteen => i16::from_le_bytes([bytes[0], bytes[1]]) as i64,
            BitDepth::TwentyFour => {
                // Sign-extend by placing the 3 bytes in the top of an i32
                (i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8) as i64
            }
            BitDepth::ThirtyTwo => {
                i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64
            }
        }
    }

    /// Read one sample normalized to [-1.0, 1.0]
    pub fn decode_sample_f32(&self, bytes: &[u8]) -> f32 {
        let v = self.decode_sample(bytes) as f64;
        (v / (self.bit_depth.max_amplitude() as f64 + 1.0)) as f32
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}ch {} {}Hz",
            self.channels, self.bit_depth, self.sample_rate
        )
    }
}
