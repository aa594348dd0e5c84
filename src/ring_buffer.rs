//! Fixed-capacity ring of interleaved samples.
//!
//! [`SampleRing`] stores audio written at one cadence and read at another. Positions are
//! tracked with two monotonically increasing logical indices; the physical offset of an
//! index is `index % capacity`. Copies that cross the end of the backing array are split
//! into a tail segment and a head segment.
//!
//! The ring is not synchronized on its own. [`AudioBridge`](crate::AudioBridge) guards it
//! with a single mutex shared by the producer and the consumer.

use crate::error::{BridgeError, Result};

/// Result of a write into the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The chunk was stored and is available for reading
    Written,
    /// The write pushed the ring past capacity (or overflowed an index); both indices were
    /// reset to zero and `discarded` unread samples were dropped
    OverflowReset { discarded: u64 },
}

impl WriteOutcome {
    pub fn is_reset(&self) -> bool {
        matches!(self, Self::OverflowReset { .. })
    }
}

#[derive(Debug)]
pub struct SampleRing {
    samples: Vec<f32>,
    write_index: u64,
    read_index: u64,
}

impl SampleRing {
    /// Creates a zeroed ring holding `capacity` samples.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(BridgeError::Configuration(
                "Ring capacity must be non-zero".into(),
            ));
        }
        Ok(Self {
            samples: vec![0.0; capacity],
            write_index: 0,
            read_index: 0,
        })
    }

    /// Creates a ring with no storage. Every read on it comes back empty.
    pub(crate) fn empty() -> Self {
        Self {
            samples: Vec::new(),
            write_index: 0,
            read_index: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Samples written but not yet read.
    pub fn available(&self) -> u64 {
        self.write_index - self.read_index
    }

    /// Samples that can be written without an overflow reset.
    pub fn free(&self) -> u64 {
        (self.capacity() as u64).saturating_sub(self.available())
    }

    pub fn write_index(&self) -> u64 {
        self.write_index
    }

    pub fn read_index(&self) -> u64 {
        self.read_index
    }

    /// Backing storage in physical order.
    pub fn raw(&self) -> &[f32] {
        &self.samples
    }

    /// Copies `chunk` in at the current write position and advances the write index.
    ///
    /// A chunk that crosses the end of the backing array is split: the first part fills
    /// the tail, the remainder continues at offset zero. If the write leaves more than
    /// `capacity` samples unread, or the write index would overflow, both indices are
    /// reset to zero and the unread data is discarded.
    pub fn write(&mut self, chunk: &[f32]) -> Result<WriteOutcome> {
        let capacity = self.capacity();
        if chunk.len() > capacity {
            return Err(BridgeError::ChunkTooLarge {
                len: chunk.len(),
                capacity,
            });
        }
        if chunk.is_empty() {
            return Ok(WriteOutcome::Written);
        }

        let begin = (self.write_index % capacity as u64) as usize;
        let tail_len = chunk.len().min(capacity - begin);
        let (tail, head) = chunk.split_at(tail_len);
        self.samples[begin..begin + tail_len].copy_from_slice(tail);
        self.samples[..head.len()].copy_from_slice(head);

        let Some(write_index) = self.write_index.checked_add(chunk.len() as u64) else {
            return Ok(self.overflow_reset());
        };
        self.write_index = write_index;

        if self.available() > capacity as u64 {
            return Ok(self.overflow_reset());
        }
        Ok(WriteOutcome::Written)
    }

    /// Copies up to `dest.len()` available samples into `dest` and advances the read
    /// index by the number copied.
    ///
    /// Returns the count copied. Elements of `dest` past that count are left as they were.
    pub fn read_into(&mut self, dest: &mut [f32]) -> usize {
        let capacity = self.capacity();
        let count = (self.available().min(dest.len() as u64)) as usize;
        if count == 0 {
            return 0;
        }

        let begin = (self.read_index % capacity as u64) as usize;
        let tail_len = count.min(capacity - begin);
        let (tail, head) = dest[..count].split_at_mut(tail_len);
        tail.copy_from_slice(&self.samples[begin..begin + tail_len]);
        head.copy_from_slice(&self.samples[..head.len()]);

        // read_index never passes write_index, so this cannot overflow.
        self.read_index += count as u64;
        count
    }

    /// Marks the ring empty. Stored samples are left in place.
    pub fn reset(&mut self) {
        self.write_index = 0;
        self.read_index = 0;
    }

    /// Replaces the storage with `capacity` zeroed samples and resets both indices.
    pub fn reallocate(&mut self, capacity: usize) -> Result<()> {
        *self = Self::new(capacity)?;
        Ok(())
    }

    /// Drops the storage entirely.
    pub(crate) fn release(&mut self) {
        *self = Self::empty();
    }

    fn overflow_reset(&mut self) -> WriteOutcome {
        let discarded = self.write_index.saturating_sub(self.read_index);
        log::warn!(
            "Ring overflow at write index {} / read index {}, discarding {} samples",
            self.write_index,
            self.read_index,
            discarded
        );
        self.reset();
        WriteOutcome::OverflowReset { discarded }
    }

    #[cfg(test)]
    pub(crate) fn set_indices(&mut self, write_index: u64, read_index: u64) {
        assert!(write_index >= read_index);
        self.write_index = write_index;
        self.read_index = read_index;
    }
}
