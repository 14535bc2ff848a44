//! WAV file sink
//!
//! Writes the delivered stream to a WAV file using hound. The WAV header
//! takes channels, bit depth and sample rate from the format given to open.

use super::DeviceSink;
use hound::{SampleFormat, WavSpec, WavWriter};
use pcmout_common::{AudioFormat, BitDepth, Error, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub struct WavSink {
    path: PathBuf,
    format: Option<AudioFormat>,
    writer: Option<WavWriter<BufWriter<File>>>,
    bytes_written: u64,
}

impl WavSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            format: None,
            writer: None,
            bytes_written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DeviceSink for WavSink {
    fn name(&self) -> String {
        format!("wav:{}", self.path.display())
    }

    fn open(&mut self, format: &AudioFormat) -> Result<()> {
        if self.writer.is_some() {
            return Err(Error::DeviceUnavailable(format!(
                "{} is already open",
                self.path.display()
            )));
        }

        let spec = WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: format.bit_depth.bits(),
            sample_format: SampleFormat::Int,
        };

        let writer = WavWriter::create(&self.path, spec).map_err(|e| {
            Error::DeviceUnavailable(format!("Failed to create {}: {}", self.path.display(), e))
        })?;

        info!("Writing {} to {}", format, self.path.display());
        self.writer = Some(writer);
        self.format = Some(*format);
        self.bytes_written = 0;
        Ok(())
    }

    fn deliver(&mut self, chunk: &[u8]) -> Result<usize> {
        let (Some(writer), Some(format)) = (self.writer.as_mut(), self.format) else {
            return Err(Error::DeviceIo("WAV sink is not open".to_string()));
        };

        let sample_bytes = format.bit_depth.bytes();
        for raw in chunk.chunks_exact(sample_bytes) {
            let value = format.decode_sample(raw);
            let written = match format.bit_depth {
                BitDepth::Eight => writer.write_sample(value as i8),
                BitDepth::Sixteen => writer.write_sample(value as i16),
                BitDepth::TwentyFour | BitDepth::ThirtyTwo => writer.write_sample(value as i32),
            };
            written.map_err(|e| Error::DeviceIo(format!("WAV write failed: {}", e)))?;
        }

        self.bytes_written += chunk.len() as u64;
        Ok(chunk.len())
    }

    fn close(&mut self, _timeout: Duration) -> Result<()> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        writer
            .finalize()
            .map_err(|e| Error::DeviceIo(format!("Failed to finalize WAV file: {}", e)))?;
        info!(
            "Wrote {} bytes of PCM to {}",
            self.bytes_written,
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wav_round_trip_16_bit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let format = AudioFormat::cd_quality();

        let mut sink = WavSink::new(&path);
        sink.open(&format).unwrap();
        let mut pcm = Vec::new();
        for v in [0i64, 1000, -1000, 32767] {
            format.encode_sample(v, &mut pcm);
        }
        assert_eq!(sink.deliver(&pcm).unwrap(), 8);
        sink.close(Duration::ZERO).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().bits_per_sample, 16);
        assert_eq!(reader.spec().sample_rate, 44_100);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 1000, -1000, 32767]);
    }

    #[test]
    fn test_wav_eight_bit_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out8.wav");
        let format = AudioFormat::new(1, 8, 8_000).unwrap();

        let mut sink = WavSink::new(&path);
        sink.open(&format).unwrap();
        let mut pcm = Vec::new();
        for v in [-100i64, 0, 100] {
            format.encode_sample(v, &mut pcm);
        }
        sink.deliver(&pcm).unwrap();
        sink.close(Duration::ZERO).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let samples: Vec<i8> = reader.samples::<i8>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![-100, 0, 100]);
    }

    #[test]
    fn test_deliver_before_open() {
        let mut sink = WavSink::new("/nonexistent/never.wav");
        assert!(matches!(sink.deliver(&[0; 4]), Err(Error::DeviceIo(_))));
        assert!(sink.close(Duration::ZERO).is_ok());
    }

    #[test]
    fn test_open_in_missing_directory_is_unavailable() {
        let mut sink = WavSink::new("/nonexistent-dir-pcmout/out.wav");
        let err = sink.open(&AudioFormat::cd_quality()).unwrap_err();
        assert!(matches!(err, Error::DeviceUnavailable(_)));
    }
}
