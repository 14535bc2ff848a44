//! In-process sinks: discard or record
//!
//! [`MemorySink`] shares a [`SinkProbe`] with the test that created it so the
//! test can inspect what was delivered and steer the sink while the drain
//! thread owns it.

use super::DeviceSink;
use pcmout_common::{AudioFormat, Error, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Sink that accepts and discards everything
#[derive(Debug, Default)]
pub struct NullSink {
    format: Option<AudioFormat>,
    bytes_accepted: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes accepted since creation
    pub fn bytes_accepted(&self) -> u64 {
        self.bytes_accepted
    }
}

impl DeviceSink for NullSink {
    fn name(&self) -> String {
        "null".to_string()
    }

    fn open(&mut self, format: &AudioFormat) -> Result<()> {
        self.format = Some(*format);
        Ok(())
    }

    fn deliver(&mut self, chunk: &[u8]) -> Result<usize> {
        if self.format.is_none() {
            return Err(Error::DeviceIo("null sink is not open".to_string()));
        }
        self.bytes_accepted += chunk.len() as u64;
        Ok(chunk.len())
    }

    fn close(&mut self, _timeout: Duration) -> Result<()> {
        self.format = None;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ProbeState {
    format: Option<AudioFormat>,
    data: Vec<u8>,
    open: bool,
    open_calls: usize,
    close_calls: usize,
    deliveries: usize,
    stalled: bool,
    stall_after: Option<usize>,
    fail_after: Option<usize>,
    fail_open: Option<String>,
    max_accept: Option<usize>,
    deliver_delay: Duration,
    close_latency: Duration,
}

/// Shared view into a [`MemorySink`]
#[derive(Debug, Clone, Default)]
pub struct SinkProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl SinkProbe {
    fn lock(&self) -> MutexGuard<'_, ProbeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bytes delivered so far, in order
    pub fn data(&self) -> Vec<u8> {
        self.lock().data.clone()
    }

    pub fn bytes_delivered(&self) -> usize {
        self.lock().data.len()
    }

    /// Number of deliver calls that accepted at least one byte
    pub fn deliveries(&self) -> usize {
        self.lock().deliveries
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    pub fn open_calls(&self) -> usize {
        self.lock().open_calls
    }

    pub fn close_calls(&self) -> usize {
        self.lock().close_calls
    }

    /// Format passed to the most recent open
    pub fn format(&self) -> Option<AudioFormat> {
        self.lock().format
    }

    /// Stop or resume accepting data
    pub fn set_stalled(&self, stalled: bool) {
        let mut state = self.lock();
        state.stalled = stalled;
        state.stall_after = None;
    }
}

/// Recording sink with scriptable device behavior
#[derive(Debug, Default)]
pub struct MemorySink {
    probe: SinkProbe,
}

impl MemorySink {
    /// Create a sink and the probe that observes it
    pub fn new() -> (Self, SinkProbe) {
        let sink = Self::default();
        let probe = sink.probe.clone();
        (sink, probe)
    }

    /// Fail `open` with `DeviceUnavailable`
    pub fn fail_open(self, reason: &str) -> Self {
        self.probe.lock().fail_open = Some(reason.to_string());
        self
    }

    /// Accept at most `bytes` per delivery (rounded down to whole frames)
    pub fn max_accept_per_delivery(self, bytes: usize) -> Self {
        self.probe.lock().max_accept = Some(bytes);
        self
    }

    /// Accept nothing until [`SinkProbe::set_stalled`] releases it
    pub fn stalled(self) -> Self {
        self.probe.lock().stalled = true;
        self
    }

    /// Accept `bytes` in total, then stall
    pub fn stall_after(self, bytes: usize) -> Self {
        self.probe.lock().stall_after = Some(bytes);
        self
    }

    /// Fail with `DeviceIo` once `bytes` have been delivered
    pub fn fail_after(self, bytes: usize) -> Self {
        self.probe.lock().fail_after = Some(bytes);
        self
    }

    /// Sleep this long in every deliver call
    pub fn deliver_delay(self, delay: Duration) -> Self {
        self.probe.lock().deliver_delay = delay;
        self
    }

    /// Simulated output latency that close waits for
    pub fn close_latency(self, latency: Duration) -> Self {
        self.probe.lock().close_latency = latency;
        self
    }

    pub fn probe(&self) -> SinkProbe {
        self.probe.clone()
    }
}

impl DeviceSink for MemorySink {
    fn name(&self) -> String {
        "memory".to_string()
    }

    fn open(&mut self, format: &AudioFormat) -> Result<()> {
        let mut state = self.probe.lock();
        state.open_calls += 1;
        if let Some(reason) = state.fail_open.clone() {
            return Err(Error::DeviceUnavailable(reason));
        }
        state.format = Some(*format);
        state.open = true;
        debug!("Memory sink opened: {}", format);
        Ok(())
    }

    fn deliver(&mut self, chunk: &[u8]) -> Result<usize> {
        let delay = self.probe.lock().deliver_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut state = self.probe.lock();
        let format = match (state.open, state.format) {
            (true, Some(format)) => format,
            _ => return Err(Error::DeviceIo("memory sink is not open".to_string())),
        };

        if let Some(limit) = state.fail_after {
            if state.data.len() >= limit {
                return Err(Error::DeviceIo(format!(
                    "simulated device failure after {} bytes",
                    state.data.len()
                )));
            }
        }

        if state.stalled {
            return Ok(0);
        }

        let mut accept = chunk.len();
        if let Some(max) = state.max_accept {
            accept = accept.min(max);
        }
        if let Some(limit) = state.stall_after {
            accept = accept.min(limit.saturating_sub(state.data.len()));
        }
        if let Some(limit) = state.fail_after {
            accept = accept.min(limit.saturating_sub(state.data.len()));
        }
        accept -= accept % format.bytes_per_frame();

        if accept > 0 {
            state.data.extend_from_slice(&chunk[..accept]);
            state.deliveries += 1;
        }
        Ok(accept)
    }

    fn close(&mut self, timeout: Duration) -> Result<()> {
        let (was_open, latency, format) = {
            let mut state = self.probe.lock();
            let was_open = state.open;
            state.close_calls += 1;
            (was_open, state.close_latency, state.format)
        };
        if !was_open {
            return Ok(());
        }

        let started = Instant::now();
        std::thread::sleep(latency.min(timeout));
        self.probe.lock().open = false;

        if latency > timeout {
            let unplayed = latency.saturating_sub(started.elapsed());
            let undelivered_bytes = format
                .map(|f| f.bytes_for_frames(f.frames_for(unplayed)))
                .unwrap_or_default();
            return Err(Error::ForcedClose { undelivered_bytes });
        }
        Ok(())
    }

    fn drain_latency_estimate(&self) -> Duration {
        self.probe.lock().close_latency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sink_counts_bytes() {
        let mut sink = NullSink::new();
        assert!(sink.deliver(&[0; 4]).is_err());
        sink.open(&AudioFormat::cd_quality()).unwrap();
        assert_eq!(sink.deliver(&[0; 8]).unwrap(), 8);
        assert_eq!(sink.bytes_accepted(), 8);
        sink.close(Duration::ZERO).unwrap();
    }

    #[test]
    fn test_memory_sink_records_in_order() {
        let (mut sink, probe) = MemorySink::new();
        sink.open(&AudioFormat::cd_quality()).unwrap();
        sink.deliver(&[1, 2, 3, 4]).unwrap();
        sink.deliver(&[5, 6, 7, 8]).unwrap();
        assert_eq!(probe.data(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(probe.deliveries(), 2);
        sink.close(Duration::from_secs(1)).unwrap();
        assert!(!probe.is_open());
        assert_eq!(probe.close_calls(), 1);
    }

    #[test]
    fn test_partial_acceptance_is_frame_aligned() {
        let (sink, probe) = MemorySink::new();
        let mut sink = sink.max_accept_per_delivery(6);
        sink.open(&AudioFormat::cd_quality()).unwrap();
        assert_eq!(sink.deliver(&[0; 16]).unwrap(), 4);
        assert_eq!(probe.bytes_delivered(), 4);
    }

    #[test]
    fn test_stall_and_release() {
        let (sink, probe) = MemorySink::new();
        let mut sink = sink.stall_after(4);
        sink.open(&AudioFormat::cd_quality()).unwrap();
        assert_eq!(sink.deliver(&[0; 8]).unwrap(), 4);
        assert_eq!(sink.deliver(&[0; 8]).unwrap(), 0);
        probe.set_stalled(false);
        assert_eq!(sink.deliver(&[0; 8]).unwrap(), 8);
    }

    #[test]
    fn test_fail_after() {
        let (sink, _probe) = MemorySink::new();
        let mut sink = sink.fail_after(4);
        sink.open(&AudioFormat::cd_quality()).unwrap();
        assert_eq!(sink.deliver(&[0; 8]).unwrap(), 4);
        assert!(matches!(sink.deliver(&[0; 4]), Err(Error::DeviceIo(_))));
    }

    #[test]
    fn test_fail_open() {
        let (sink, probe) = MemorySink::new();
        let mut sink = sink.fail_open("busy");
        assert_eq!(
            sink.open(&AudioFormat::cd_quality()),
            Err(Error::DeviceUnavailable("busy".to_string()))
        );
        assert!(!probe.is_open());
        assert_eq!(probe.open_calls(), 1);
    }

    #[test]
    fn test_close_latency_beyond_timeout_is_forced() {
        let (sink, probe) = MemorySink::new();
        let mut sink = sink.close_latency(Duration::from_millis(500));
        sink.open(&AudioFormat::cd_quality()).unwrap();
        let err = sink.close(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, Error::ForcedClose { undelivered_bytes } if undelivered_bytes > 0));
        assert!(!probe.is_open());

        // Second close is a no-op
        sink.close(Duration::ZERO).unwrap();
    }
}
