//! Audio output using cpal
//!
//! Delivered PCM is decoded to f32 and queued in a lock-free sample ring;
//! the cpal output callback pops from it and converts to the device sample
//! format, writing silence on underrun.
//!
//! `cpal::Stream` is not `Send`, so the stream is built, played and dropped
//! on a dedicated `pcmout-output` thread. The sink itself only holds the
//! producer half of the sample ring and a shutdown channel.

use super::DeviceSink;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SizedSample, StreamConfig};
use pcmout_common::{AudioFormat, Error, Result};
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Default size of the internal sample queue
const DEFAULT_QUEUE_DURATION: Duration = Duration::from_millis(100);

/// Poll interval while close waits for the sample queue to empty
const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Stream parameters negotiated on the output thread
struct StreamInfo {
    device_name: String,
    sample_format: SampleFormat,
    buffer_frames: Option<u32>,
}

/// State that exists only while the device is open
struct OpenStream {
    format: AudioFormat,
    producer: HeapProd<f32>,
    shutdown_tx: mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
    device_name: String,
    buffer_frames: Option<u32>,
    /// Stream error flag - set by the error callback
    error_flag: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<String>>>,
    underruns: Arc<AtomicU64>,
}

impl OpenStream {
    fn queued_frames(&self) -> usize {
        self.producer.occupied_len() / self.format.channels as usize
    }

    fn shutdown(&mut self) {
        // Receiver may already be gone if the stream thread exited early
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!("Audio output thread panicked");
            }
        }
        let underruns = self.underruns.load(Ordering::Relaxed);
        if underruns > 0 {
            debug!("Output callback underruns during session: {}", underruns);
        }
        info!("Audio device '{}' released", self.device_name);
    }
}

/// System audio output sink
pub struct CpalSink {
    /// Device name requested (None = default)
    requested_device: Option<String>,
    /// Fixed callback buffer size in frames (None = device default)
    buffer_frames: Option<u32>,
    queue_duration: Duration,
    stream: Option<OpenStream>,
}

impl CpalSink {
    /// Sink for the default output device
    pub fn new() -> Self {
        Self::with_device(None)
    }

    /// Sink for a named output device (None = default device)
    pub fn with_device(device_name: Option<String>) -> Self {
        Self {
            requested_device: device_name,
            buffer_frames: None,
            queue_duration: DEFAULT_QUEUE_DURATION,
            stream: None,
        }
    }

    /// Request a fixed device callback buffer size in frames
    pub fn buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_frames = Some(frames);
        self
    }

    /// Size of the internal sample queue between deliver and the callback
    pub fn queue_duration(mut self, duration: Duration) -> Self {
        self.queue_duration = duration;
        self
    }

    /// List available audio output devices.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::DeviceUnavailable(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Find the requested device, or the default one
    ///
    /// A named device that is missing is an error: silently playing on a
    /// different device is not what the caller asked for.
    fn find_device(requested: Option<&str>) -> Result<Device> {
        let host = cpal::default_host();

        match requested {
            Some(name) => {
                let mut devices = host.output_devices().map_err(|e| {
                    Error::DeviceUnavailable(format!("Failed to enumerate devices: {}", e))
                })?;
                devices
                    .find(|d| d.name().ok().as_deref() == Some(name))
                    .ok_or_else(|| {
                        Error::DeviceUnavailable(format!("Output device '{}' not found", name))
                    })
            }
            None => host
                .default_output_device()
                .ok_or_else(|| Error::DeviceUnavailable("No default output device found".to_string())),
        }
    }

    /// Get a stream configuration that plays `format` without conversion
    /// of rate or channel count.
    ///
    /// Prefers f32, then i16, then u16 device samples.
    fn get_config(device: &Device, format: &AudioFormat) -> Result<(StreamConfig, SampleFormat)> {
        let rate = cpal::SampleRate(format.sample_rate);
        let candidates: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| Error::DeviceUnavailable(format!("Failed to get device configs: {}", e)))?
            .filter(|config| {
                config.channels() == format.channels
                    && config.min_sample_rate().0 <= format.sample_rate
                    && config.max_sample_rate().0 >= format.sample_rate
            })
            .collect();

        for preferred in [SampleFormat::F32, SampleFormat::I16, SampleFormat::U16] {
            if let Some(range) = candidates.iter().find(|c| c.sample_format() == preferred) {
                let config = range.clone().with_sample_rate(rate).config();
                return Ok((config, preferred));
            }
        }

        Err(Error::DeviceUnavailable(format!(
            "Device does not support {} channels at {} Hz",
            format.channels, format.sample_rate
        )))
    }

    /// Body of the output thread: build and play the stream, report the
    /// outcome, then hold the stream until shutdown.
    #[allow(clippy::too_many_arguments)]
    fn run_output_thread(
        requested: Option<String>,
        format: AudioFormat,
        buffer_frames: Option<u32>,
        consumer: HeapCons<f32>,
        error_flag: Arc<AtomicBool>,
        last_error: Arc<Mutex<Option<String>>>,
        underruns: Arc<AtomicU64>,
        ready_tx: mpsc::Sender<Result<StreamInfo>>,
        shutdown_rx: mpsc::Receiver<()>,
    ) {
        let started = (|| -> Result<(cpal::Stream, StreamInfo)> {
            let device = Self::find_device(requested.as_deref())?;
            let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            let (mut config, sample_format) = Self::get_config(&device, &format)?;

            if let Some(size) = buffer_frames {
                config.buffer_size = cpal::BufferSize::Fixed(size);
                debug!("Using requested buffer size: {} frames", size);
            }

            debug!(
                "Audio config: sample_rate={}, channels={}, format={:?}, buffer_size={:?}",
                config.sample_rate.0, config.channels, sample_format, config.buffer_size
            );

            let err_flag = Arc::clone(&error_flag);
            let err_text = Arc::clone(&last_error);
            let on_error = move |err: cpal::StreamError| {
                error!("Audio stream error: {}", err);
                *err_text.lock().unwrap_or_else(PoisonError::into_inner) = Some(err.to_string());
                err_flag.store(true, Ordering::SeqCst);
            };

            let stream = match sample_format {
                SampleFormat::F32 => build_stream(&device, &config, consumer, |s| s, 0.0f32, underruns, on_error)?,
                SampleFormat::I16 => build_stream(
                    &device,
                    &config,
                    consumer,
                    |s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16,
                    0i16,
                    underruns,
                    on_error,
                )?,
                SampleFormat::U16 => build_stream(
                    &device,
                    &config,
                    consumer,
                    // Convert from [-1.0, 1.0] to [0, 65535]
                    |s| ((s.clamp(-1.0, 1.0) + 1.0) * 32767.5) as u16,
                    32768u16,
                    underruns,
                    on_error,
                )?,
                other => {
                    return Err(Error::DeviceUnavailable(format!(
                        "Unsupported sample format: {:?}",
                        other
                    )))
                }
            };

            stream
                .play()
                .map_err(|e| Error::DeviceUnavailable(format!("Failed to start stream: {}", e)))?;

            Ok((
                stream,
                StreamInfo {
                    device_name,
                    sample_format,
                    buffer_frames,
                },
            ))
        })();

        match started {
            Ok((stream, info)) => {
                if ready_tx.send(Ok(info)).is_err() {
                    return;
                }
                // Hold the stream until the sink closes (or is dropped)
                let _ = shutdown_rx.recv();
                if let Err(e) = stream.pause() {
                    warn!("Failed to pause stream: {}", e);
                }
                drop(stream);
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
            }
        }
    }
}

impl Default for CpalSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Build an output stream for device sample type `T`
fn build_stream<T, C, E>(
    device: &Device,
    config: &StreamConfig,
    mut consumer: HeapCons<f32>,
    convert: C,
    silence: T,
    underruns: Arc<AtomicU64>,
    on_error: E,
) -> Result<cpal::Stream>
where
    T: SizedSample + Send + 'static,
    C: Fn(f32) -> T + Send + 'static,
    E: FnMut(cpal::StreamError) + Send + 'static,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut starved = false;
                for sample in data.iter_mut() {
                    *sample = match consumer.try_pop() {
                        Some(s) => convert(s),
                        None => {
                            starved = true;
                            silence
                        }
                    };
                }
                if starved {
                    underruns.fetch_add(1, Ordering::Relaxed);
                }
            },
            on_error,
            None, // No timeout
        )
        .map_err(|e| Error::DeviceUnavailable(format!("Failed to build stream: {}", e)))
}

impl DeviceSink for CpalSink {
    fn name(&self) -> String {
        match &self.stream {
            Some(open) => open.device_name.clone(),
            None => self
                .requested_device
                .clone()
                .unwrap_or_else(|| "default".to_string()),
        }
    }

    fn open(&mut self, format: &AudioFormat) -> Result<()> {
        if self.stream.is_some() {
            return Err(Error::DeviceUnavailable("device already open".to_string()));
        }

        let queue_frames = format.frames_for(self.queue_duration).max(1);
        let (producer, consumer) = HeapRb::<f32>::new(queue_frames * format.channels as usize).split();

        let error_flag = Arc::new(AtomicBool::new(false));
        let last_error = Arc::new(Mutex::new(None));
        let underruns = Arc::new(AtomicU64::new(0));
        let (ready_tx, ready_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel();

        let thread = {
            let requested = self.requested_device.clone();
            let format = *format;
            let buffer_frames = self.buffer_frames;
            let error_flag = Arc::clone(&error_flag);
            let last_error = Arc::clone(&last_error);
            let underruns = Arc::clone(&underruns);
            std::thread::Builder::new()
                .name("pcmout-output".to_string())
                .spawn(move || {
                    Self::run_output_thread(
                        requested,
                        format,
                        buffer_frames,
                        consumer,
                        error_flag,
                        last_error,
                        underruns,
                        ready_tx,
                        shutdown_rx,
                    )
                })
                .map_err(|e| Error::DeviceUnavailable(format!("Failed to spawn output thread: {}", e)))?
        };

        let info = match ready_rx.recv() {
            Ok(Ok(info)) => info,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(Error::DeviceUnavailable(
                    "Audio output thread exited during open".to_string(),
                ));
            }
        };

        info!(
            "Audio device '{}' opened: {} ({:?} device samples)",
            info.device_name, format, info.sample_format
        );

        self.stream = Some(OpenStream {
            format: *format,
            producer,
            shutdown_tx,
            thread: Some(thread),
            device_name: info.device_name,
            buffer_frames: info.buffer_frames,
            error_flag,
            last_error,
            underruns,
        });
        Ok(())
    }

    fn deliver(&mut self, chunk: &[u8]) -> Result<usize> {
        let open = self
            .stream
            .as_mut()
            .ok_or_else(|| Error::DeviceIo("device is not open".to_string()))?;

        if open.error_flag.load(Ordering::SeqCst) {
            let reason = open
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
                .unwrap_or_else(|| "stream error".to_string());
            return Err(Error::DeviceIo(reason));
        }

        let format = open.format;
        let bytes_per_frame = format.bytes_per_frame();
        let sample_bytes = format.bit_depth.bytes();
        let channels = format.channels as usize;

        let vacant_frames = open.producer.vacant_len() / channels;
        let frames = (chunk.len() / bytes_per_frame).min(vacant_frames);
        if frames == 0 {
            return Ok(0);
        }

        let accepted = frames * bytes_per_frame;
        for sample in chunk[..accepted].chunks_exact(sample_bytes) {
            // Space for whole frames was checked above
            let _ = open.producer.try_push(format.decode_sample_f32(sample));
        }
        Ok(accepted)
    }

    fn close(&mut self, timeout: Duration) -> Result<()> {
        let Some(mut open) = self.stream.take() else {
            return Ok(());
        };

        let deadline = Instant::now() + timeout;
        while open.queued_frames() > 0 && !open.error_flag.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(CLOSE_POLL_INTERVAL.min(deadline - now));
        }

        // Let the device play out its own callback buffer
        let device_latency = open
            .buffer_frames
            .map(|frames| open.format.duration_of(open.format.bytes_for_frames(frames as usize)))
            .unwrap_or(Duration::ZERO);
        let remaining = deadline.saturating_duration_since(Instant::now());
        std::thread::sleep(device_latency.min(remaining));

        let unplayed_frames = open.queued_frames();
        open.shutdown();

        if unplayed_frames > 0 {
            warn!(
                "Closing audio device with {} frames still queued",
                unplayed_frames
            );
            return Err(Error::ForcedClose {
                undelivered_bytes: open.format.bytes_for_frames(unplayed_frames),
            });
        }
        Ok(())
    }

    fn drain_latency_estimate(&self) -> Duration {
        match &self.stream {
            Some(open) => {
                let queued = open.queued_frames() + open.buffer_frames.unwrap_or(0) as usize;
                open.format.duration_of(open.format.bytes_for_frames(queued))
            }
            None => Duration::ZERO,
        }
    }

    fn preferred_chunk_frames(&self) -> Option<usize> {
        self.stream
            .as_ref()
            .and_then(|open| open.buffer_frames)
            .map(|frames| frames as usize)
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        // Ensure the output thread is stopped on drop
        if let Some(mut open) = self.stream.take() {
            open.shutdown();
        }
    }
}
