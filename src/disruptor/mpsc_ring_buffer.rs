//! MPSC (Multi-Producer Single Consumer) Ring Buffer
//!
//! Lock-free slot claiming for any number of producers, drained by exactly
//! one consumer.
//!
//! ## Memory Ordering (Sequence Barrier Pattern)
//!
//! - **claim_cursor**: CAS-based claiming, tells producers where to write
//! - **available[]**: Per-slot bits indicating write completion
//! - **consumer_cursor**: everything below it has been processed and may be
//!   overwritten
//!
//! A producer that finishes late never lets the consumer skip over its slot:
//! the consumer only advances across sequences whose bit is individually
//! set for the current round.

use std::sync::atomic::{ AtomicBool, AtomicU64, Ordering };
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::utils::{ Backoff, CachePadded };

use crate::disruptor::{ RingBufferEntry, RingBufferCore, Sequence, SequenceBarrier, WaitStrategy };
use crate::error::{ PipelineError, Result };

pub struct MpscRingBuffer<T: RingBufferEntry> {
    core: RingBufferCore<T>,
    claim_cursor: CachePadded<AtomicU64>,
    consumer_cursor: CachePadded<AtomicU64>,
    /// Bitfield tracking published slots. Each AtomicU64 tracks 64 slots.
    /// Bits encode even/odd rounds via XOR flipping (LMAX Disruptor technique)
    available: Box<[AtomicU64]>,
    index_mask: usize,
    index_shift: usize,
    wait_strategy: Arc<dyn WaitStrategy>,
    halted: AtomicBool,
}

impl<T: RingBufferEntry> MpscRingBuffer<T> {
    pub fn new(size: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Result<Self> {
        if size < 64 {
            return Err(PipelineError::config("MPSC ring buffer must be at least 64 slots"));
        }

        let core = RingBufferCore::new(size)?;
        let u64_needed = size / 64;
        // Initialize with all 1s (nothing published yet, round 0 is even)
        let available = (0..u64_needed)
            .map(|_| AtomicU64::new(!0))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            core,
            claim_cursor: CachePadded::new(AtomicU64::new(0)),
            consumer_cursor: CachePadded::new(AtomicU64::new(0)),
            available,
            index_mask: size - 1,
            index_shift: size.trailing_zeros() as usize,
            wait_strategy,
            halted: AtomicBool::new(false),
        })
    }

    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.core.len()
    }

    pub fn wait_strategy(&self) -> &Arc<dyn WaitStrategy> {
        &self.wait_strategy
    }

    /// Try to claim `count` contiguous slots without waiting.
    pub fn try_claim(&self, count: usize) -> Option<Sequence> {
        let capacity = self.buffer_size() as u64;
        if count == 0 || (count as u64) > capacity {
            return None;
        }
        loop {
            let current = self.claim_cursor.load(Ordering::Relaxed);
            let next = current + (count as u64);

            let consumer_seq = self.consumer_cursor.load(Ordering::Acquire);
            // a stale `current` can trail the consumer; the CAS below rejects it
            if next.saturating_sub(consumer_seq) > capacity {
                return None;
            }

            match
                self.claim_cursor.compare_exchange_weak(
                    current,
                    next,
                    Ordering::AcqRel,
                    Ordering::Relaxed
                )
            {
                Ok(_) => {
                    return Some(current);
                }
                Err(_) => std::hint::spin_loop(),
            }
        }
    }

    /// Claim `count` slots, waiting for the consumer to free capacity.
    ///
    /// Fails with `PipelineError::Alerted` once the buffer has been halted so
    /// a producer racing with shutdown cannot hang.
    pub fn claim(&self, count: usize) -> Result<Sequence> {
        if count == 0 || count > self.buffer_size() {
            return Err(PipelineError::config("Claim count must be between 1 and the buffer size"));
        }
        let backoff = Backoff::new();
        loop {
            if self.is_halted() {
                return Err(PipelineError::Alerted);
            }
            if let Some(sequence) = self.try_claim(count) {
                return Ok(sequence);
            }
            if backoff.is_completed() {
                thread::sleep(Duration::from_micros(1));
            } else {
                backoff.snooze();
            }
        }
    }

    /// # Safety: exclusive access via claim/publish, valid sequence
    #[allow(clippy::mut_from_ref)]
    #[inline]
    pub unsafe fn slot_mut(&self, sequence: Sequence) -> &mut T {
        self.core.slot_mut(sequence)
    }

    /// # Safety: slot must be published and not yet released
    #[inline]
    pub unsafe fn slot(&self, sequence: Sequence) -> &T {
        self.core.slot(sequence)
    }

    /// Calculate which AtomicU64 and bit index for a sequence
    #[inline]
    fn calculate_indices(&self, sequence: Sequence) -> (usize, usize) {
        let slot_index = (sequence as usize) & self.index_mask;
        let availability_index = slot_index >> 6; // divide by 64
        let bit_index = slot_index & 63; // mod 64
        (availability_index, bit_index)
    }

    /// Calculate even (0) or odd (1) round
    #[inline]
    fn calculate_flag(&self, sequence: Sequence) -> u64 {
        let round = sequence >> self.index_shift;
        round & 1
    }

    /// Publish a sequence - flips the bit to mark as published, then wakes the
    /// consumer if it is blocked. Must be the producer's last touch of the slot.
    pub fn publish(&self, sequence: Sequence) {
        let (avail_idx, bit_idx) = self.calculate_indices(sequence);
        let mask = 1u64 << bit_idx;
        // XOR flips the bit - encoding even/odd round publication
        self.available[avail_idx].fetch_xor(mask, Ordering::AcqRel);
        self.wait_strategy.signal_all_when_blocking();
    }

    pub fn is_available(&self, sequence: Sequence) -> bool {
        let (avail_idx, bit_idx) = self.calculate_indices(sequence);
        let word = self.available[avail_idx].load(Ordering::Acquire);
        ((word >> bit_idx) & 1) == self.calculate_flag(sequence)
    }

    /// Exclusive end of the contiguous published run in `[lower, upper)`.
    pub fn highest_published(&self, lower: Sequence, upper: Sequence) -> Sequence {
        let mut sequence = lower;
        while sequence < upper {
            let (avail_idx, mut bit_idx) = self.calculate_indices(sequence);
            // a word never straddles a round boundary
            let flag = self.calculate_flag(sequence);
            let word = self.available[avail_idx].load(Ordering::Acquire);
            while bit_idx < 64 && sequence < upper {
                if ((word >> bit_idx) & 1) != flag {
                    return sequence;
                }
                bit_idx += 1;
                sequence += 1;
            }
        }
        upper
    }

    /// Next sequence a producer would claim
    #[inline]
    pub fn cursor(&self) -> Sequence {
        self.claim_cursor.load(Ordering::Acquire)
    }

    /// Report that every sequence below `sequence` has been processed.
    pub fn update_consumer(&self, sequence: Sequence) {
        self.consumer_cursor.store(sequence, Ordering::Release);
    }

    #[inline]
    pub fn consumer_sequence(&self) -> Sequence {
        self.consumer_cursor.load(Ordering::Acquire)
    }

    pub fn remaining_capacity(&self) -> usize {
        let consumed = self.consumer_sequence();
        let claimed = self.cursor();
        let in_flight = claimed.saturating_sub(consumed) as usize;
        self.buffer_size().saturating_sub(in_flight)
    }

    /// `true` while claimed events are still waiting to be processed
    pub fn has_backlog(&self) -> bool {
        self.remaining_capacity() < self.buffer_size()
    }

    /// Stop the consumer and fail pending claims.
    pub fn halt(&self) {
        self.halted.store(true, Ordering::Release);
        self.wait_strategy.signal_all_when_blocking();
    }

    #[inline]
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }
}

impl<T: RingBufferEntry> SequenceBarrier for MpscRingBuffer<T> {
    fn available_sequence(&self, from: Sequence) -> Sequence {
        self.highest_published(from, self.cursor())
    }

    fn is_alerted(&self) -> bool {
        self.is_halted()
    }
}
