//! Sample buffers
//!
//! [`ChannelBuffer`] is the per-channel sliding window used by the analyzer.
//! [`DeviceRingBuffer`] is the lock-free SPSC ring that carries samples
//! between a realtime device callback and a pipeline stage.

use ringbuf::{HeapConsumer, HeapProducer, HeapRb};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Fixed-capacity sliding window over one channel's samples
///
/// Pre-filled with zeros, so its length always equals its capacity. Appending
/// past capacity evicts the oldest samples.
#[derive(Debug, Clone)]
pub struct ChannelBuffer {
    data: Vec<f64>,
    /// Index of the oldest sample
    head: usize,
}

impl ChannelBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0.0; capacity],
            head: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Always equal to [`capacity`](Self::capacity)
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append samples, discarding the oldest ones beyond capacity
    pub fn extend(&mut self, samples: &[f64]) {
        let capacity = self.data.len();
        if capacity == 0 {
            return;
        }

        // Only the newest `capacity` samples can survive
        let samples = &samples[samples.len().saturating_sub(capacity)..];
        for &sample in samples {
            self.data[self.head] = sample;
            self.head = (self.head + 1) % capacity;
        }
    }

    /// Copy `out.len()` samples in arrival order, starting `offset` samples
    /// after the oldest one
    ///
    /// # Panics
    /// If `offset + out.len()` exceeds the capacity.
    pub fn copy_window(&self, offset: usize, out: &mut [f64]) {
        let capacity = self.data.len();
        assert!(
            offset + out.len() <= capacity,
            "window [{}, {}) exceeds buffer capacity {}",
            offset,
            offset + out.len(),
            capacity
        );

        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.data[(self.head + offset + i) % capacity];
        }
    }

    /// Contents in arrival order
    pub fn to_vec(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.data.len()];
        self.copy_window(0, &mut out);
        out
    }
}

/// Lock-free ring between a device callback and a stage thread
pub struct DeviceRingBuffer {
    producer: HeapProducer<f64>,
    consumer: HeapConsumer<f64>,
    level: RingLevel,
}

impl DeviceRingBuffer {
    /// Create new ring buffer with given capacity in samples
    pub fn new(capacity: usize) -> Self {
        let rb = HeapRb::<f64>::new(capacity);
        let (producer, consumer) = rb.split();
        Self {
            producer,
            consumer,
            level: RingLevel::default(),
        }
    }

    /// Handle reporting how many samples the ring holds, usable from a third
    /// thread after the ends have moved away
    pub fn level(&self) -> RingLevel {
        self.level.clone()
    }

    /// Split into producer and consumer ends
    pub fn split(self) -> (RingProducer, RingConsumer) {
        (
            RingProducer {
                producer: self.producer,
                level: self.level.clone(),
            },
            RingConsumer {
                consumer: self.consumer,
                level: self.level,
            },
        )
    }
}

/// Shared sample count of a [`DeviceRingBuffer`]
///
/// Raised before samples are pushed and lowered after they are popped, so it
/// never reads lower than the ring's true occupancy.
#[derive(Debug, Clone, Default)]
pub struct RingLevel(Arc<AtomicUsize>);

impl RingLevel {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    fn raise(&self, n: usize) {
        self.0.fetch_add(n, Ordering::AcqRel);
    }

    fn lower(&self, n: usize) {
        self.0.fetch_sub(n, Ordering::AcqRel);
    }
}

/// Writing end of a [`DeviceRingBuffer`]
pub struct RingProducer {
    producer: HeapProducer<f64>,
    level: RingLevel,
}

impl RingProducer {
    /// Write samples, returning how many fit
    pub fn write(&mut self, samples: &[f64]) -> usize {
        self.level.raise(samples.len());
        let n = self.producer.push_slice(samples);
        self.level.lower(samples.len() - n);
        n
    }

    /// Write every sample, waiting for the reader to make room
    ///
    /// Gives up after `timeout` without progress and returns the count written.
    pub fn write_all(&mut self, samples: &[f64], timeout: Duration) -> usize {
        let mut written = 0;
        let mut last_progress = Instant::now();
        while written < samples.len() {
            let n = self.write(&samples[written..]);
            if n > 0 {
                written += n;
                last_progress = Instant::now();
            } else if last_progress.elapsed() >= timeout {
                break;
            } else {
                std::thread::sleep(Duration::from_micros(100));
            }
        }
        written
    }

    pub fn free_len(&self) -> usize {
        self.producer.free_len()
    }
}

/// Reading end of a [`DeviceRingBuffer`]
pub struct RingConsumer {
    consumer: HeapConsumer<f64>,
    level: RingLevel,
}

impl RingConsumer {
    /// Read available samples, returning how many were read
    pub fn read(&mut self, buffer: &mut [f64]) -> usize {
        let n = self.consumer.pop_slice(buffer);
        self.level.lower(n);
        n
    }

    /// Wait until `buffer.len()` samples are available, then read them
    ///
    /// Returns 0 without consuming anything if the deadline passes first, so
    /// callers never see a partial chunk.
    pub fn read_exact_timeout(&mut self, buffer: &mut [f64], timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        while self.consumer.len() < buffer.len() {
            if Instant::now() >= deadline {
                return 0;
            }
            // 100µs keeps latency low without a hot spin
            std::thread::sleep(Duration::from_micros(100));
        }
        self.read(buffer)
    }

    pub fn len(&self) -> usize {
        self.consumer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_buffer_starts_full_of_zeros() {
        let buffer = ChannelBuffer::new(4);
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.to_vec(), vec![0.0; 4]);
    }

    #[test]
    fn test_channel_buffer_length_is_constant() {
        let mut buffer = ChannelBuffer::new(5);
        for n in 0..12 {
            let samples: Vec<f64> = (0..n).map(|x| x as f64).collect();
            buffer.extend(&samples);
            assert_eq!(buffer.len(), 5);
        }
    }

    #[test]
    fn test_channel_buffer_slides() {
        let mut buffer = ChannelBuffer::new(4);
        buffer.extend(&[1.0, 2.0]);
        assert_eq!(buffer.to_vec(), vec![0.0, 0.0, 1.0, 2.0]);

        buffer.extend(&[3.0, 4.0, 5.0]);
        assert_eq!(buffer.to_vec(), vec![2.0, 3.0, 4.0, 5.0]);

        // Longer than capacity: only the newest samples remain
        buffer.extend(&[6.0, 7.0, 8.0, 9.0, 10.0, 11.0]);
        assert_eq!(buffer.to_vec(), vec![8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn test_copy_window_offset() {
        let mut buffer = ChannelBuffer::new(6);
        buffer.extend(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);

        let mut window = [0.0; 4];
        buffer.copy_window(1, &mut window);
        assert_eq!(window, [3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    #[should_panic(expected = "exceeds buffer capacity")]
    fn test_copy_window_out_of_range() {
        let buffer = ChannelBuffer::new(4);
        let mut window = [0.0; 4];
        buffer.copy_window(1, &mut window);
    }

    #[test]
    fn test_ring_buffer_write_read() {
        let (mut producer, mut consumer) = DeviceRingBuffer::new(1024).split();

        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(producer.write(&data), 5);

        let mut output = vec![0.0; 5];
        assert_eq!(consumer.read(&mut output), 5);
        assert_eq!(output, data);
    }

    #[test]
    fn test_ring_buffer_overflow() {
        let (mut producer, mut consumer) = DeviceRingBuffer::new(10).split();

        let written = producer.write(&[1.0; 20]);
        assert!(written <= 10);
        assert_eq!(producer.free_len(), 0);

        let mut output = vec![0.0; 20];
        assert_eq!(consumer.read(&mut output), written);
    }

    #[test]
    fn test_level_tracks_occupancy() {
        let ring = DeviceRingBuffer::new(8);
        let level = ring.level();
        let (mut producer, mut consumer) = ring.split();
        assert_eq!(level.get(), 0);

        // Only 8 of 12 fit
        assert_eq!(producer.write(&[1.0; 12]), 8);
        assert_eq!(level.get(), 8);

        let mut out = [0.0; 5];
        consumer.read(&mut out);
        assert_eq!(level.get(), 3);

        let mut rest = [0.0; 3];
        assert_eq!(consumer.read_exact_timeout(&mut rest, Duration::from_millis(5)), 3);
        assert_eq!(level.get(), 0);
    }

    #[test]
    fn test_read_exact_times_out_without_consuming() {
        let (mut producer, mut consumer) = DeviceRingBuffer::new(16).split();
        producer.write(&[1.0, 2.0]);

        let mut chunk = [0.0; 4];
        assert_eq!(consumer.read_exact_timeout(&mut chunk, Duration::from_millis(5)), 0);
        assert_eq!(consumer.len(), 2);

        producer.write(&[3.0, 4.0]);
        assert_eq!(consumer.read_exact_timeout(&mut chunk, Duration::from_millis(5)), 4);
        assert_eq!(chunk, [1.0, 2.0, 3.0, 4.0]);
        assert!(consumer.is_empty());
    }

    #[test]
    fn test_write_all_gives_up_when_reader_stalls() {
        let (mut producer, _consumer) = DeviceRingBuffer::new(4).split();
        let written = producer.write_all(&[1.0; 8], Duration::from_millis(5));
        assert!(written > 0 && written < 8);
    }
}
