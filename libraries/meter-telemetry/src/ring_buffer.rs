//! Lock-free stereo ring buffer
//!
//! Single producer (audio thread), single consumer (observer). Each side
//! owns its own cursor; the `ringbuf` crate publishes cursor updates with
//! release/acquire ordering, so a frame is only visible to the consumer
//! after it has been fully written.
//!
//! A ring built for `capacity` frames holds at most `capacity - 1` of them,
//! keeping one slot free to tell full from empty.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Minimum history the goniometer ring holds, in seconds
const MIN_RING_SECONDS: f32 = 0.25;

type Frame = [f32; 2];

/// Ring size for a goniometer at `sample_rate`: at least a quarter second,
/// rounded up to a power of two
pub fn capacity_for(sample_rate: u32) -> usize {
    let frames = (sample_rate as f32 * MIN_RING_SECONDS).ceil() as usize;
    (frames + 1).next_power_of_two()
}

/// Create a connected producer/consumer pair
///
/// `capacity` is clamped to at least 2 (one usable slot).
pub fn stereo_ring(capacity: usize) -> (StereoProducer, StereoConsumer) {
    let capacity = capacity.max(2);
    let (producer, consumer) = HeapRb::<Frame>::new(capacity - 1).split();
    (
        StereoProducer {
            inner: producer,
            capacity,
            dropped: 0,
        },
        StereoConsumer {
            inner: consumer,
            capacity,
        },
    )
}

/// Audio-thread half
pub struct StereoProducer {
    inner: HeapProd<Frame>,
    capacity: usize,
    dropped: u64,
}

impl StereoProducer {
    /// Frames that can be written without overwriting unread data
    pub fn write_space(&self) -> usize {
        self.inner.vacant_len()
    }

    /// Write a block of frames, all or nothing
    ///
    /// Returns `false` without writing anything when the channels differ in
    /// length or there is not enough space. Never blocks.
    pub fn write(&mut self, left: &[f32], right: &[f32]) -> bool {
        if !self.reserve(left.len(), right.len()) {
            return false;
        }
        let pushed = self
            .inner
            .push_iter(left.iter().zip(right).map(|(&l, &r)| [l, r]));
        debug_assert_eq!(pushed, left.len());
        true
    }

    /// [`write`](Self::write) with every sample multiplied by `gain`
    pub fn write_scaled(&mut self, left: &[f32], right: &[f32], gain: f32) -> bool {
        if !self.reserve(left.len(), right.len()) {
            return false;
        }
        let pushed = self
            .inner
            .push_iter(left.iter().zip(right).map(|(&l, &r)| [l * gain, r * gain]));
        debug_assert_eq!(pushed, left.len());
        true
    }

    /// Whether a whole block of `n` frames fits; counts it as dropped if not
    fn reserve(&mut self, n: usize, right_len: usize) -> bool {
        if right_len != n {
            return false;
        }
        if n > self.write_space() {
            self.dropped += n as u64;
            return false;
        }
        true
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames rejected by [`write`](Self::write) for lack of space
    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }
}

/// Observer half
pub struct StereoConsumer {
    inner: HeapCons<Frame>,
    capacity: usize,
}

impl StereoConsumer {
    /// Frames waiting to be read
    pub fn read_space(&self) -> usize {
        self.inner.occupied_len()
    }

    /// Oldest unread frame
    pub fn read_one(&mut self) -> Option<(f32, f32)> {
        self.inner.try_pop().map(|[l, r]| (l, r))
    }

    /// Read up to `left.len().min(right.len())` frames, returns the count
    pub fn read_into(&mut self, left: &mut [f32], right: &mut [f32]) -> usize {
        let mut count = 0;
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let Some([a, b]) = self.inner.try_pop() else {
                break;
            };
            *l = a;
            *r = b;
            count += 1;
        }
        count
    }

    /// Discard everything unread
    pub fn clear(&mut self) -> usize {
        self.inner.clear()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for StereoProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StereoProducer")
            .field("capacity", &self.capacity)
            .field("write_space", &self.write_space())
            .field("dropped", &self.dropped)
            .finish()
    }
}

impl std::fmt::Debug for StereoConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StereoConsumer")
            .field("capacity", &self.capacity)
            .field("read_space", &self.read_space())
            .finish()
    }
}
