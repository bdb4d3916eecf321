//! Lock-free SPSC ring buffer for the capture -> playback handoff
//!
//! Single producer (the capture callback), single consumer (the playback
//! callback). Both operations are wait-free and all-or-nothing: a write
//! that does not fit is rejected whole (the caller drops the block) and a
//! read that cannot be satisfied leaves the buffer untouched (the caller
//! must zero-fill its output).
//!
//! Positions are monotonically increasing 64-bit counters over a
//! power-of-two capacity; the producer release-stores `write_pos` after
//! copying so the consumer's acquire-load observes the samples, and
//! symmetrically for `read_pos`.

use std::sync::atomic::{AtomicU64, Ordering};

use lfx_core::Sample;

#[repr(align(64))]
pub struct CircularBuffer {
    buffer: Box<[Sample]>,
    capacity: u64,
    mask: u64,
    write_pos: AtomicU64,
    read_pos: AtomicU64,
}

impl CircularBuffer {
    /// Create a buffer holding at least `min_capacity` samples (rounded up
    /// to the next power of two). No allocation happens after this.
    pub fn new(min_capacity: usize) -> Self {
        let capacity = min_capacity.next_power_of_two() as u64;
        let buffer = vec![0.0; capacity as usize].into_boxed_slice();

        Self {
            buffer,
            capacity,
            mask: capacity - 1,
            write_pos: AtomicU64::new(0),
            read_pos: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Samples available for reading
    #[inline]
    pub fn read_available(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Relaxed);
        (write - read) as usize
    }

    /// Space available for writing
    #[inline]
    pub fn write_available(&self) -> usize {
        let write = self.write_pos.load(Ordering::Relaxed);
        let read = self.read_pos.load(Ordering::Acquire);
        (self.capacity - (write - read)) as usize
    }

    /// Write all of `data`, or nothing. Producer side only.
    pub fn write(&self, data: &[Sample]) -> bool {
        let count = data.len() as u64;
        let write = self.write_pos.load(Ordering::Relaxed);
        let read = self.read_pos.load(Ordering::Acquire);

        if count > self.capacity - (write - read) {
            return false;
        }

        let write_masked = (write & self.mask) as usize;
        let first_chunk = (self.capacity as usize) - write_masked;

        // SAFETY: we are the only producer and the region [write, write+count)
        // is unreachable by the consumer until the release store below
        unsafe {
            let ptr = self.buffer.as_ptr() as *mut Sample;
            if data.len() <= first_chunk {
                std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(write_masked), data.len());
            } else {
                std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(write_masked), first_chunk);
                std::ptr::copy_nonoverlapping(
                    data.as_ptr().add(first_chunk),
                    ptr,
                    data.len() - first_chunk,
                );
            }
        }

        self.write_pos.store(write + count, Ordering::Release);
        true
    }

    /// Read exactly `data.len()` samples, or nothing. Consumer side only.
    /// On failure the caller must zero-fill its output.
    pub fn read(&self, data: &mut [Sample]) -> bool {
        let count = data.len() as u64;
        let read = self.read_pos.load(Ordering::Relaxed);
        let write = self.write_pos.load(Ordering::Acquire);

        if count > write - read {
            return false;
        }

        let read_masked = (read & self.mask) as usize;
        let first_chunk = (self.capacity as usize) - read_masked;

        if data.len() <= first_chunk {
            data.copy_from_slice(&self.buffer[read_masked..read_masked + data.len()]);
        } else {
            let remainder = data.len() - first_chunk;
            data[..first_chunk].copy_from_slice(&self.buffer[read_masked..]);
            data[first_chunk..].copy_from_slice(&self.buffer[..remainder]);
        }

        self.read_pos.store(read + count, Ordering::Release);
        true
    }

    /// Reset both positions. Only valid while neither side is running.
    pub fn reset(&self) {
        self.write_pos.store(0, Ordering::Relaxed);
        self.read_pos.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_basic_write_read() {
        let buffer = CircularBuffer::new(1024);
        assert_eq!(buffer.capacity(), 1024);

        let samples = [1.0, 2.0, 3.0, 4.0];
        assert!(buffer.write(&samples));
        assert_eq!(buffer.read_available(), 4);

        let mut output = [0.0; 4];
        assert!(buffer.read(&mut output));
        assert_eq!(output, samples);
        assert_eq!(buffer.read_available(), 0);
    }

    #[test]
    fn test_capacity_rounds_up_to_power_of_two() {
        let buffer = CircularBuffer::new(1000);
        assert_eq!(buffer.capacity(), 1024);
    }

    #[test]
    fn test_write_rejected_when_full() {
        let buffer = CircularBuffer::new(8);

        let samples = [1.0; 8];
        assert!(buffer.write(&samples));
        // Full: any further write is rejected whole and data is preserved
        assert!(!buffer.write(&[9.0]));

        let mut output = [0.0; 8];
        assert!(buffer.read(&mut output));
        assert_eq!(output, samples);
    }

    #[test]
    fn test_read_underrun_leaves_buffer_untouched() {
        let buffer = CircularBuffer::new(4096);

        let samples = [0.5; 1024];
        assert!(buffer.write(&samples));

        let mut output = [1.0; 2048];
        assert!(!buffer.read(&mut output));
        // Failed read consumed nothing
        assert_eq!(buffer.read_available(), 1024);

        let mut exact = [0.0; 1024];
        assert!(buffer.read(&mut exact));
        assert_eq!(exact[0], 0.5);
    }

    #[test]
    fn test_wraparound_preserves_order() {
        let buffer = CircularBuffer::new(8);

        let first: Vec<Sample> = (0..8).map(|i| i as f32).collect();
        assert!(buffer.write(&first));

        let mut output = [0.0; 4];
        assert!(buffer.read(&mut output));
        assert_eq!(output, [0.0, 1.0, 2.0, 3.0]);

        // This write wraps across the end of the storage
        assert!(buffer.write(&[10.0, 11.0, 12.0, 13.0]));

        let mut all = [0.0; 8];
        assert!(buffer.read(&mut all));
        assert_eq!(all, [4.0, 5.0, 6.0, 7.0, 10.0, 11.0, 12.0, 13.0]);
    }

    #[test]
    fn test_reset_empties_buffer() {
        let buffer = CircularBuffer::new(64);
        assert!(buffer.write(&[1.0; 32]));
        buffer.reset();
        assert_eq!(buffer.read_available(), 0);
        assert_eq!(buffer.write_available(), 64);
    }

    #[test]
    fn test_fifo_order_across_threads() {
        let buffer = Arc::new(CircularBuffer::new(256));
        let producer = Arc::clone(&buffer);

        const TOTAL: usize = 100_000;

        let writer = std::thread::spawn(move || {
            let mut next = 0usize;
            while next < TOTAL {
                let chunk_len = 64.min(TOTAL - next);
                let chunk: Vec<Sample> = (next..next + chunk_len).map(|i| i as f32).collect();
                if producer.write(&chunk) {
                    next += chunk_len;
                } else {
                    std::thread::yield_now();
                }
            }
        });

        let mut received = 0usize;
        let mut chunk = [0.0; 64];
        while received < TOTAL {
            let want = 64.min(TOTAL - received);
            if buffer.read(&mut chunk[..want]) {
                for (offset, &value) in chunk[..want].iter().enumerate() {
                    assert_eq!(value, (received + offset) as f32);
                }
                received += want;
            } else {
                std::thread::yield_now();
            }
        }

        writer.join().unwrap();
    }
}
