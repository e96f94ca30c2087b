//! Slot storage shared by producers and the consumer.

use std::cell::UnsafeCell;

use crate::disruptor::{ RingBufferEntry, Sequence };
use crate::error::{ PipelineError, Result };

pub struct RingBufferCore<T: RingBufferEntry> {
    buffer: Box<[UnsafeCell<T>]>,
    mask: usize,
}

impl<T: RingBufferEntry> RingBufferCore<T> {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 || !size.is_power_of_two() {
            return Err(PipelineError::config("Size must be power of 2"));
        }
        let buffer = (0..size)
            .map(|_| UnsafeCell::new(T::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Ok(Self {
            buffer,
            mask: size - 1,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[inline]
    fn index(&self, sequence: Sequence) -> usize {
        (sequence as usize) & self.mask
    }

    /// # Safety: caller has claimed `sequence` and not yet published it, or is
    /// the consumer and `sequence` is published but not yet released
    #[allow(clippy::mut_from_ref)]
    #[inline]
    pub unsafe fn slot_mut(&self, sequence: Sequence) -> &mut T {
        &mut *self.buffer[self.index(sequence)].get()
    }

    /// # Safety: slot must be published and not yet released by the consumer
    #[inline]
    pub unsafe fn slot(&self, sequence: Sequence) -> &T {
        &*self.buffer[self.index(sequence)].get()
    }
}

// Access to each cell is serialised by the claim/publish protocol.
unsafe impl<T: RingBufferEntry> Send for RingBufferCore<T> {}
unsafe impl<T: RingBufferEntry> Sync for RingBufferCore<T> {}
