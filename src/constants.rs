//! Pipeline tuning constants
//!
//! Defaults used when the configuration does not override them.

/// Default ring buffer size (must be power of 2)
pub const DEFAULT_RING_BUFFER_SIZE: usize = 256 * 1024; // 256K slots

/// Smallest ring buffer the pipeline accepts
pub const MIN_RING_BUFFER_SIZE: usize = 128;

/// Largest ring buffer the pipeline accepts
pub const MAX_RING_BUFFER_SIZE: usize = 1 << 30;

/// Events processed between two consumer progress reports
pub const DEFAULT_PROGRESS_INTERVAL: usize = 50;

/// Shutdown polls before giving up on draining
pub const DEFAULT_DRAIN_ATTEMPTS: u32 = 200;

/// Sleep between two shutdown polls, in milliseconds
pub const DEFAULT_DRAIN_INTERVAL_MS: u64 = 50;

/// Condition wait timeout for the blocking strategies, in milliseconds
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 10;

/// Sleep used by the sleeping strategy once it stops spinning, in nanoseconds
pub const DEFAULT_SLEEP_TIME_NS: u64 = 100;

/// Spin/yield retries of the sleeping strategy before it sleeps
pub const DEFAULT_SLEEP_RETRIES: u32 = 200;

/// Spins of the yielding strategy before it yields
pub const YIELD_SPIN_TRIES: u32 = 100;
