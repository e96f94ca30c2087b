//! Wait strategies for the ring buffer consumer
//!
//! This module provides different wait strategies that control how the
//! consumer waits for newly published sequences. Each strategy offers
//! different trade-offs between latency and CPU usage. Every strategy
//! re-checks availability and the alert flag on each iteration, so none of
//! them can sleep through new work or through a halt request.

use std::fmt;
use std::sync::atomic::{ fence, AtomicBool, Ordering };
use std::thread;
use std::time::Duration;

use parking_lot::{ Condvar, Mutex };

use crate::constants::{
    DEFAULT_SLEEP_RETRIES,
    DEFAULT_SLEEP_TIME_NS,
    DEFAULT_WAIT_TIMEOUT_MS,
    YIELD_SPIN_TRIES,
};
use crate::disruptor::Sequence;
use crate::error::{ PipelineError, Result };

/// What a wait strategy observes while waiting.
pub trait SequenceBarrier: Send + Sync {
    /// Exclusive end of the contiguous published run starting at `from`
    fn available_sequence(&self, from: Sequence) -> Sequence;

    /// `true` once the consumer has been asked to halt
    fn is_alerted(&self) -> bool;
}

/// Trait for wait strategies that determine how the consumer waits for data
pub trait WaitStrategy: Send + Sync {
    /// Wait until `sequence` is published.
    ///
    /// Returns the exclusive end of the available run (always `> sequence`),
    /// `PipelineError::Alerted` if the barrier was alerted, or
    /// `PipelineError::Timeout` for strategies with a deadline.
    fn wait_for(&self, sequence: Sequence, barrier: &dyn SequenceBarrier) -> Result<Sequence>;

    /// Signal that new data is available
    fn signal_all_when_blocking(&self);

    /// Short name used in diagnostics
    fn name(&self) -> &'static str;
}

impl fmt::Debug for dyn WaitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returns the available bound if `sequence` is ready, or the alert error.
#[inline]
fn check(sequence: Sequence, barrier: &dyn SequenceBarrier) -> Option<Result<Sequence>> {
    let available = barrier.available_sequence(sequence);
    if available > sequence {
        return Some(Ok(available));
    }
    if barrier.is_alerted() {
        return Some(Err(PipelineError::Alerted));
    }
    None
}

/// Busy spin wait strategy - lowest latency, highest CPU usage.
/// Consumes a full core while waiting.
pub struct BusySpinWaitStrategy;

impl BusySpinWaitStrategy {
    /// Create a new busy spin wait strategy
    pub fn new() -> Self {
        Self
    }
}

impl Default for BusySpinWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for BusySpinWaitStrategy {
    fn wait_for(&self, sequence: Sequence, barrier: &dyn SequenceBarrier) -> Result<Sequence> {
        loop {
            if let Some(result) = check(sequence, barrier) {
                return result;
            }
            std::hint::spin_loop();
        }
    }

    fn signal_all_when_blocking(&self) {
        // No-op for busy spin - no blocking threads to signal
    }

    fn name(&self) -> &'static str {
        "BusySpinWaitStrategy"
    }
}

/// Blocking wait strategy - lowest CPU usage, highest latency.
///
/// The consumer parks on a condition variable. Producers only take the lock
/// when the consumer announced that it is about to block, so an uncontended
/// publish stays lock-free. The condition wait is bounded by `timeout` and
/// availability is re-checked after every wake-up.
pub struct BlockingWaitStrategy {
    mutex: Mutex<()>,
    condition: Condvar,
    signal_needed: AtomicBool,
    timeout: Duration,
}

impl BlockingWaitStrategy {
    /// Create a new blocking wait strategy
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_millis(DEFAULT_WAIT_TIMEOUT_MS))
    }

    /// Create a blocking strategy re-checking at least every `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            mutex: Mutex::new(()),
            condition: Condvar::new(),
            signal_needed: AtomicBool::new(false),
            timeout,
        }
    }

    /// Blocks once; returns `Ok(None)` when the wait timed out with no data.
    fn block_once(
        &self,
        sequence: Sequence,
        barrier: &dyn SequenceBarrier
    ) -> Result<Option<Sequence>> {
        if let Some(result) = check(sequence, barrier) {
            return result.map(Some);
        }

        let mut guard = self.mutex.lock();
        self.signal_needed.store(true, Ordering::SeqCst);
        fence(Ordering::SeqCst);
        if let Some(result) = check(sequence, barrier) {
            return result.map(Some);
        }
        let _ = self.condition.wait_for(&mut guard, self.timeout);
        drop(guard);

        check(sequence, barrier).transpose()
    }

    fn signal(&self) {
        fence(Ordering::SeqCst);
        if self.signal_needed.swap(false, Ordering::SeqCst) {
            let _guard = self.mutex.lock();
            self.condition.notify_all();
        }
    }
}

impl Default for BlockingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for BlockingWaitStrategy {
    fn wait_for(&self, sequence: Sequence, barrier: &dyn SequenceBarrier) -> Result<Sequence> {
        loop {
            if let Some(available) = self.block_once(sequence, barrier)? {
                return Ok(available);
            }
        }
    }

    fn signal_all_when_blocking(&self) {
        self.signal();
    }

    fn name(&self) -> &'static str {
        "BlockingWaitStrategy"
    }
}

/// Timeout wait strategy - blocks like `BlockingWaitStrategy` but returns
/// `PipelineError::Timeout` when nothing arrived within the timeout, letting
/// the consumer run periodic work.
pub struct TimeoutBlockingWaitStrategy {
    inner: BlockingWaitStrategy,
}

impl TimeoutBlockingWaitStrategy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: BlockingWaitStrategy::with_timeout(timeout),
        }
    }
}

impl Default for TimeoutBlockingWaitStrategy {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_WAIT_TIMEOUT_MS))
    }
}

impl WaitStrategy for TimeoutBlockingWaitStrategy {
    fn wait_for(&self, sequence: Sequence, barrier: &dyn SequenceBarrier) -> Result<Sequence> {
        match self.inner.block_once(sequence, barrier)? {
            Some(available) => Ok(available),
            None => Err(PipelineError::Timeout),
        }
    }

    fn signal_all_when_blocking(&self) {
        self.inner.signal();
    }

    fn name(&self) -> &'static str {
        "TimeoutBlockingWaitStrategy"
    }
}

/// Sleeping wait strategy - balanced latency and CPU usage.
/// Spins, then yields, then falls back to short sleeps until data shows up.
pub struct SleepingWaitStrategy {
    retries: u32,
    sleep_duration: Duration,
}

impl SleepingWaitStrategy {
    /// Create a new sleeping wait strategy with custom parameters
    pub fn new(retries: u32, sleep_duration: Duration) -> Self {
        Self {
            retries,
            sleep_duration,
        }
    }
}

impl Default for SleepingWaitStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_SLEEP_RETRIES, Duration::from_nanos(DEFAULT_SLEEP_TIME_NS))
    }
}

impl WaitStrategy for SleepingWaitStrategy {
    fn wait_for(&self, sequence: Sequence, barrier: &dyn SequenceBarrier) -> Result<Sequence> {
        let mut counter = self.retries;
        loop {
            if let Some(result) = check(sequence, barrier) {
                return result;
            }

            if counter > 100 {
                counter -= 1;
                std::hint::spin_loop();
            } else if counter > 0 {
                counter -= 1;
                thread::yield_now();
            } else {
                thread::sleep(self.sleep_duration);
            }
        }
    }

    fn signal_all_when_blocking(&self) {
        // No-op for sleeping - threads will wake up naturally
    }

    fn name(&self) -> &'static str {
        "SleepingWaitStrategy"
    }
}

/// Yielding wait strategy - low latency, high CPU usage.
/// Spins briefly, then yields the CPU on every further check.
pub struct YieldingWaitStrategy {
    spin_tries: u32,
}

impl YieldingWaitStrategy {
    /// Create a new yielding wait strategy
    pub fn new() -> Self {
        Self::with_tries(YIELD_SPIN_TRIES)
    }

    /// Create a new yielding wait strategy with custom spin count
    pub fn with_tries(spin_tries: u32) -> Self {
        Self { spin_tries }
    }
}

impl Default for YieldingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for YieldingWaitStrategy {
    fn wait_for(&self, sequence: Sequence, barrier: &dyn SequenceBarrier) -> Result<Sequence> {
        let mut counter = self.spin_tries;
        loop {
            if let Some(result) = check(sequence, barrier) {
                return result;
            }

            if counter > 0 {
                counter -= 1;
                std::hint::spin_loop();
            } else {
                thread::yield_now();
            }
        }
    }

    fn signal_all_when_blocking(&self) {
        // No-op for yielding - threads will wake up naturally
    }

    fn name(&self) -> &'static str {
        "YieldingWaitStrategy"
    }
}
