//! PCM sample sources
//!
//! A [`SampleSource`] lazily produces frame-aligned PCM chunks for one
//! [`AudioFormat`]. [`SineSource`] is the reference tone generator.

use pcmout_common::{AudioFormat, Error, Result};
use std::f64::consts::PI;
use std::time::Duration;

/// Producer of interleaved PCM frames
pub trait SampleSource {
    /// Format of every chunk this source yields
    fn format(&self) -> AudioFormat;

    /// Next chunk of at most `max_frames` frames; `None` when exhausted
    fn next_chunk(&mut self, max_frames: usize) -> Option<Vec<u8>>;

    /// Frames left to produce; `None` for an endless source
    fn remaining_frames(&self) -> Option<u64>;
}

/// Sine tone generator
///
/// Frame `n` holds `channels` copies of
/// `round(sin(2π·frequency·n/sample_rate) × max × amplitude)`, clamped to
/// `±floor(max × amplitude)`, where `max` is the bit depth's largest positive
/// sample.
#[derive(Debug, Clone)]
pub struct SineSource {
    format: AudioFormat,
    frequency: f64,
    amplitude: f64,
    total_frames: Option<u64>,
    position: u64,
}

impl SineSource {
    /// Finite tone of `duration` (rounded to the nearest frame)
    ///
    /// # Errors
    /// `InvalidFormat` for an invalid format, a negative or non-finite
    /// frequency, or an amplitude outside [0, 1].
    pub fn new(format: AudioFormat, frequency: f64, amplitude: f64, duration: Duration) -> Result<Self> {
        let mut source = Self::endless(format, frequency, amplitude)?;
        source.total_frames = Some(format.frames_for(duration) as u64);
        Ok(source)
    }

    /// Tone that never ends
    pub fn endless(format: AudioFormat, frequency: f64, amplitude: f64) -> Result<Self> {
        format.validate()?;
        if !frequency.is_finite() || frequency < 0.0 {
            return Err(Error::InvalidFormat(format!("invalid frequency {}", frequency)));
        }
        if !(0.0..=1.0).contains(&amplitude) {
            return Err(Error::InvalidFormat(format!(
                "amplitude {} outside [0, 1]",
                amplitude
            )));
        }
        Ok(Self {
            format,
            frequency,
            amplitude,
            total_frames: None,
            position: 0,
        })
    }

    /// Total frames for a finite tone
    pub fn total_frames(&self) -> Option<u64> {
        self.total_frames
    }

    /// Sample value of frame `n` (same on every channel)
    pub fn sample_at(&self, n: u64) -> i64 {
        let max = self.format.bit_depth.max_amplitude() as f64;
        let peak = (max * self.amplitude).floor();
        let phase = 2.0 * PI * self.frequency * n as f64 / self.format.sample_rate as f64;
        (phase.sin() * max * self.amplitude).round().clamp(-peak, peak) as i64
    }

    /// Render the whole finite tone into one buffer
    ///
    /// # Errors
    /// `InvalidFormat` for an endless source.
    pub fn render_all(mut self) -> Result<Vec<u8>> {
        let total = self
            .total_frames
            .ok_or_else(|| Error::InvalidFormat("cannot render an endless source".to_string()))?;
        let frames = total.saturating_sub(self.position) as usize;
        Ok(self.next_chunk(frames).unwrap_or_default())
    }
}

impl SampleSource for SineSource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn next_chunk(&mut self, max_frames: usize) -> Option<Vec<u8>> {
        let frames = match self.remaining_frames() {
            Some(0) => return None,
            Some(left) => (max_frames as u64).min(left) as usize,
            None => max_frames,
        };
        if frames == 0 {
            return None;
        }

        let mut out = Vec::with_capacity(self.format.bytes_for_frames(frames));
        for n in self.position..self.position + frames as u64 {
            let value = self.sample_at(n);
            for _ in 0..self.format.channels {
                self.format.encode_sample(value, &mut out);
            }
        }
        self.position += frames as u64;
        Some(out)
    }

    fn remaining_frames(&self) -> Option<u64> {
        self.total_frames.map(|total| total.saturating_sub(self.position))
    }
}
