/// Frame-Aligned PCM Byte Ring Buffer
///
/// Fixed-capacity byte queue between the caller's writes and the drain
/// thread's device deliveries.
///
/// Design:
/// - Producer (caller): copies whole frames in, as many as fit
/// - Consumer (drain thread): takes whole frames out, up to a chunk size
/// - Never blocks: waiting policy belongs to the session
/// - Capacity is a multiple of the frame size, so a read never splits a frame
///
/// The buffer itself is not synchronized; the session serializes producer
/// and consumer access behind its state mutex.

use pcmout_common::{Error, Result};
use ringbuf::{traits::*, HeapRb};
use tracing::{debug, trace};

/// Byte ring buffer holding whole PCM frames
pub struct PcmRingBuffer {
    /// Backing storage (read/write cursors and fill count live inside)
    buffer: HeapRb<u8>,

    /// Frame size every write and read is aligned to
    bytes_per_frame: usize,

    /// Total bytes accepted since creation
    total_written: u64,

    /// Total bytes removed since creation
    total_read: u64,
}

impl std::fmt::Debug for PcmRingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcmRingBuffer")
            .field("capacity", &self.capacity())
            .field("bytes_per_frame", &self.bytes_per_frame)
            .field("available_to_read", &self.available_to_read())
            .field("total_written", &self.total_written)
            .field("total_read", &self.total_read)
            .finish()
    }
}

impl PcmRingBuffer {
    /// Create a ring buffer of `capacity_bytes`
    ///
    /// # Errors
    /// `InvalidFormat` if the frame size is zero or the capacity is not a
    /// non-zero multiple of it.
    pub fn new(capacity_bytes: usize, bytes_per_frame: usize) -> Result<Self> {
        if bytes_per_frame == 0 {
            return Err(Error::InvalidFormat("frame size must be > 0".to_string()));
        }
        if capacity_bytes == 0 || capacity_bytes % bytes_per_frame != 0 {
            return Err(Error::InvalidFormat(format!(
                "ring buffer capacity {} is not a non-zero multiple of {} bytes per frame",
                capacity_bytes, bytes_per_frame
            )));
        }

        debug!(
            "Creating PCM ring buffer: {} bytes ({} frames of {} bytes)",
            capacity_bytes,
            capacity_bytes / bytes_per_frame,
            bytes_per_frame
        );

        Ok(Self {
            buffer: HeapRb::new(capacity_bytes),
            bytes_per_frame,
            total_written: 0,
            total_read: 0,
        })
    }

    /// Copy as many whole frames of `bytes` as fit
    ///
    /// Returns the number of bytes written; the caller retries the rest.
    ///
    /// # Errors
    /// `FrameMisaligned` if `bytes.len()` is not a whole number of frames.
    /// The buffer is left untouched in that case.
    pub fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        if bytes.len() % self.bytes_per_frame != 0 {
            return Err(Error::FrameMisaligned {
                len: bytes.len(),
                bytes_per_frame: self.bytes_per_frame,
            });
        }

        let fit = self.align_down(self.available_to_write().min(bytes.len()));
        if fit == 0 {
            return Ok(0);
        }

        let written = self.buffer.push_slice(&bytes[..fit]);
        self.total_written += written as u64;
        trace!("ring write: {} of {} bytes", written, bytes.len());
        Ok(written)
    }

    /// Remove up to `max_bytes` (rounded down to whole frames)
    ///
    /// Returns fewer bytes when less is buffered, an empty vector when empty.
    pub fn read(&mut self, max_bytes: usize) -> Vec<u8> {
        let take = self.align_down(max_bytes.min(self.available_to_read()));
        let mut out = vec![0u8; take];
        let read = self.read_into(&mut out);
        out.truncate(read);
        out
    }

    /// Remove up to `out.len()` bytes (rounded down to whole frames) into `out`
    pub fn read_into(&mut self, out: &mut [u8]) -> usize {
        let take = self.align_down(out.len().min(self.available_to_read()));
        if take == 0 {
            return 0;
        }
        let read = self.buffer.pop_slice(&mut out[..take]);
        self.total_read += read as u64;
        read
    }

    /// Free space in bytes
    pub fn available_to_write(&self) -> usize {
        self.buffer.vacant_len()
    }

    /// Buffered bytes
    pub fn available_to_read(&self) -> usize {
        self.buffer.occupied_len()
    }

    /// Capacity in bytes
    pub fn capacity(&self) -> usize {
        self.buffer.capacity().into()
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_frame
    }

    pub fn is_empty(&self) -> bool {
        self.available_to_read() == 0
    }

    pub fn is_full(&self) -> bool {
        self.available_to_write() == 0
    }

    /// Discard all buffered data, returning the number of bytes dropped
    pub fn clear(&mut self) -> usize {
        let dropped = self.available_to_read();
        self.buffer = HeapRb::new(self.capacity());
        dropped
    }

    /// Get statistics
    pub fn stats(&self) -> RingBufferStats {
        RingBufferStats {
            capacity: self.capacity(),
            occupied: self.available_to_read(),
            total_written: self.total_written,
            total_read: self.total_read,
        }
    }

    fn align_down(&self, len: usize) -> usize {
        len - len % self.bytes_per_frame
    }
}

/// Ring buffer statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RingBufferStats {
    /// Buffer capacity in bytes
    pub capacity: usize,

    /// Currently buffered bytes
    pub occupied: usize,

    /// Total bytes written since creation
    pub total_written: u64,

    /// Total bytes read since creation
    pub total_read: u64,
}

impl RingBufferStats {
    /// Get buffer fill percentage (0.0 to 1.0)
    pub fn fill_percent(&self) -> f32 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.occupied as f32 / self.capacity as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    #[test]
    fn test_ring_buffer_basic() {
        let mut rb = PcmRingBuffer::new(16, 4).unwrap();
        assert!(rb.is_empty());
        assert_eq!(rb.available_to_write(), 16);

        assert_eq!(rb.write(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap(), 8);
        assert_eq!(rb.available_to_read(), 8);
        assert_eq!(rb.available_to_write(), 8);

        assert_eq!(rb.read(4), vec![1, 2, 3, 4]);
        assert_eq!(rb.read(100), vec![5, 6, 7, 8]);

        // Buffer should be empty now
        assert!(rb.read(4).is_empty());
    }

    #[test]
    fn test_capacity_must_be_frame_multiple() {
        assert!(matches!(PcmRingBuffer::new(10, 4), Err(Error::InvalidFormat(_))));
        assert!(matches!(PcmRingBuffer::new(0, 4), Err(Error::InvalidFormat(_))));
        assert!(matches!(PcmRingBuffer::new(8, 0), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_misaligned_write_leaves_state_unchanged() {
        let mut rb = PcmRingBuffer::new(16, 4).unwrap();
        rb.write(&[9; 4]).unwrap();
        let before = rb.stats();

        let err = rb.write(&[1, 2, 3]).unwrap_err();
        assert_eq!(err, Error::FrameMisaligned { len: 3, bytes_per_frame: 4 });
        assert_eq!(rb.stats(), before);
        assert_eq!(rb.read(16), vec![9; 4]);
    }

    #[test]
    fn test_partial_write_when_nearly_full() {
        let mut rb = PcmRingBuffer::new(8, 4).unwrap();
        assert_eq!(rb.write(&[1; 12]).unwrap(), 8);
        assert!(rb.is_full());
        assert_eq!(rb.write(&[2; 4]).unwrap(), 0);
    }

    #[test]
    fn test_read_rounds_down_to_frames() {
        let mut rb = PcmRingBuffer::new(16, 4).unwrap();
        rb.write(&pattern(12, 0)).unwrap();
        assert_eq!(rb.read(7).len(), 4);
        assert_eq!(rb.read(3).len(), 0);
        assert_eq!(rb.available_to_read(), 8);
    }

    #[test]
    fn test_wraparound_round_trip() {
        // Every split of writes and reads across the capacity boundary must
        // return the bytes written, in order
        let frame = 4;
        let capacity = 5 * frame;
        for offset_frames in 0..5 {
            for chunk_frames in 1..=5 {
                let mut rb = PcmRingBuffer::new(capacity, frame).unwrap();

                // Move the cursors to the chosen offset
                let skip = pattern(offset_frames * frame, 200);
                rb.write(&skip).unwrap();
                assert_eq!(rb.read(skip.len()), skip);

                let data = pattern(capacity, offset_frames as u8);
                let mut written = 0;
                while written < data.len() {
                    let end = (written + chunk_frames * frame).min(data.len());
                    written += rb.write(&data[written..end]).unwrap();
                }
                assert!(rb.is_full());

                let mut out = Vec::new();
                while !rb.is_empty() {
                    out.extend(rb.read(chunk_frames * frame));
                }
                assert_eq!(out, data, "offset {} chunk {}", offset_frames, chunk_frames);
            }
        }
    }

    #[test]
    fn test_interleaved_producer_consumer() {
        let mut rb = PcmRingBuffer::new(12, 2).unwrap();
        let data = pattern(100, 7);
        let mut out = Vec::new();
        let mut written = 0;
        let mut buf = [0u8; 6];

        while out.len() < data.len() {
            if written < data.len() {
                let end = (written + 4).min(data.len());
                written += rb.write(&data[written..end]).unwrap();
            }
            let n = rb.read_into(&mut buf);
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, data);

        let stats = rb.stats();
        assert_eq!(stats.total_written, 100);
        assert_eq!(stats.total_read, 100);
        assert_eq!(stats.occupied, 0);
    }

    #[test]
    fn test_clear() {
        let mut rb = PcmRingBuffer::new(8, 2).unwrap();
        rb.write(&[1; 6]).unwrap();
        assert_eq!(rb.clear(), 6);
        assert!(rb.is_empty());
        assert_eq!(rb.available_to_write(), 8);
    }

    #[test]
    fn test_fill_percent() {
        let mut rb = PcmRingBuffer::new(8, 2).unwrap();
        rb.write(&[0; 4]).unwrap();
        assert_eq!(rb.stats().fill_percent(), 0.5);
        assert_eq!(RingBufferStats::default().fill_percent(), 0.0);
    }
}
