//! Multi-producer ring buffer based on the LMAX Disruptor pattern.
//!
//! - `RingBufferCore<T>` - pre-allocated, reusable slots
//! - `MpscRingBuffer<T>` - CAS claim, per-sequence publication, single consumer
//! - `WaitStrategy` - how the consumer waits for published sequences
//!
//! ## Safety
//!
//! Slots are handed out through `unsafe` accessors. Callers must respect the
//! claim -> populate -> publish -> consume protocol: a producer touches a slot
//! only between claim and publish, the consumer only after the slot's
//! sequence is published and before it reports progress past it.

pub mod ring_buffer_core;
pub mod mpsc_ring_buffer;
pub mod wait_strategy;

pub use ring_buffer_core::RingBufferCore;
pub use mpsc_ring_buffer::MpscRingBuffer;
pub use wait_strategy::{
    WaitStrategy,
    SequenceBarrier,
    BlockingWaitStrategy,
    SleepingWaitStrategy,
    YieldingWaitStrategy,
    BusySpinWaitStrategy,
    TimeoutBlockingWaitStrategy,
};

/// Sequence number type for ring buffer positions
pub type Sequence = u64;

/// Trait for objects that can be stored in the ring buffer
pub trait RingBufferEntry: Default + Send + 'static {
    /// Release everything the entry references so the slot can be reused
    fn clear(&mut self);
}
