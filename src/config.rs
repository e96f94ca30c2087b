//! Pipeline configuration.
//!
//! Configuration problems never abort startup: [`PipelineConfig::resolve`]
//! substitutes a safe value for anything out of range and reports every
//! substitution as a warning.

use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{ Deserialize, Serialize };

use crate::clock::ClockType;
use crate::constants::{
    DEFAULT_DRAIN_ATTEMPTS,
    DEFAULT_DRAIN_INTERVAL_MS,
    DEFAULT_PROGRESS_INTERVAL,
    DEFAULT_RING_BUFFER_SIZE,
    DEFAULT_SLEEP_RETRIES,
    DEFAULT_SLEEP_TIME_NS,
    DEFAULT_WAIT_TIMEOUT_MS,
    MAX_RING_BUFFER_SIZE,
    MIN_RING_BUFFER_SIZE,
};
use crate::disruptor::{
    BlockingWaitStrategy,
    BusySpinWaitStrategy,
    SleepingWaitStrategy,
    TimeoutBlockingWaitStrategy,
    WaitStrategy,
    YieldingWaitStrategy,
};
use crate::error::PipelineError;
use crate::event::Level;
use crate::queue_full::QueueFullPolicyType;

/// Available wait strategies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStrategyType {
    /// Block on a condition variable - lowest CPU
    Block,
    /// Spin, yield, then sleep - balanced
    #[default]
    Sleep,
    /// Spin then yield - lowest latency
    Yield,
    /// Busy spin - pins a core
    BusySpin,
    /// Block with a timeout reported back to the consumer
    Timeout,
}

impl WaitStrategyType {
    pub fn create(self, config: &PipelineConfig) -> Arc<dyn WaitStrategy> {
        let timeout = Duration::from_millis(config.wait_timeout_ms);
        match self {
            WaitStrategyType::Block => Arc::new(BlockingWaitStrategy::with_timeout(timeout)),
            WaitStrategyType::Sleep => {
                Arc::new(
                    SleepingWaitStrategy::new(
                        config.sleep_retries,
                        Duration::from_nanos(config.sleep_time_ns)
                    )
                )
            }
            WaitStrategyType::Yield => Arc::new(YieldingWaitStrategy::new()),
            WaitStrategyType::BusySpin => Arc::new(BusySpinWaitStrategy::new()),
            WaitStrategyType::Timeout => Arc::new(TimeoutBlockingWaitStrategy::new(timeout)),
        }
    }
}

impl FromStr for WaitStrategyType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" | "blocking" => Ok(WaitStrategyType::Block),
            "sleep" | "sleeping" => Ok(WaitStrategyType::Sleep),
            "yield" | "yielding" => Ok(WaitStrategyType::Yield),
            "busyspin" | "busy_spin" => Ok(WaitStrategyType::BusySpin),
            "timeout" => Ok(WaitStrategyType::Timeout),
            other => Err(crate::config_error!("Unknown wait strategy '{}'", other)),
        }
    }
}

/// How producer threads obtain the thread name stored in each event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadNameStrategy {
    /// Look the name up once per thread
    #[default]
    Cached,
    /// Look the name up on every log call
    Uncached,
}

impl FromStr for ThreadNameStrategy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cached" => Ok(ThreadNameStrategy::Cached),
            "uncached" => Ok(ThreadNameStrategy::Uncached),
            other => Err(crate::config_error!("Unknown thread name strategy '{}'", other)),
        }
    }
}

/// Configuration for the async logging pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of slots; rounded up to a power of two on resolve
    pub ring_buffer_size: usize,
    pub wait_strategy: WaitStrategyType,
    /// Condition wait bound for `Block` and `Timeout`
    pub wait_timeout_ms: u64,
    pub sleep_time_ns: u64,
    pub sleep_retries: u32,
    /// Registered name of the exception handler; `None` is log-and-continue
    pub exception_handler: Option<String>,
    /// Capture the call site of every log call
    pub include_location: bool,
    pub clock: ClockType,
    pub thread_name_strategy: ThreadNameStrategy,
    pub queue_full_policy: QueueFullPolicyType,
    pub discard_threshold: Level,
    /// Serialise producers that have to wait for a full buffer
    pub synchronize_enqueue_when_full: bool,
    /// Events between two consumer progress reports
    pub progress_interval: usize,
    pub drain_attempts: u32,
    pub drain_interval_ms: u64,
    /// Pin the consumer thread to this CPU
    pub consumer_cpu: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ring_buffer_size: DEFAULT_RING_BUFFER_SIZE,
            wait_strategy: WaitStrategyType::Sleep,
            wait_timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            sleep_time_ns: DEFAULT_SLEEP_TIME_NS,
            sleep_retries: DEFAULT_SLEEP_RETRIES,
            exception_handler: None,
            include_location: false,
            clock: ClockType::System,
            thread_name_strategy: ThreadNameStrategy::Cached,
            queue_full_policy: QueueFullPolicyType::Default,
            discard_threshold: Level::Info,
            synchronize_enqueue_when_full: true,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            drain_attempts: DEFAULT_DRAIN_ATTEMPTS,
            drain_interval_ms: DEFAULT_DRAIN_INTERVAL_MS,
            consumer_cpu: None,
        }
    }
}

/// Effective configuration plus the substitutions made to reach it
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: PipelineConfig,
    pub warnings: Vec<String>,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ring_buffer_size(mut self, size: usize) -> Self {
        self.ring_buffer_size = size;
        self
    }

    /// Set the wait strategy
    pub fn with_wait_strategy(mut self, strategy: WaitStrategyType) -> Self {
        self.wait_strategy = strategy;
        self
    }

    pub fn with_exception_handler(mut self, name: impl Into<String>) -> Self {
        self.exception_handler = Some(name.into());
        self
    }

    pub fn with_include_location(mut self, include: bool) -> Self {
        self.include_location = include;
        self
    }

    pub fn with_clock(mut self, clock: ClockType) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_thread_name_strategy(mut self, strategy: ThreadNameStrategy) -> Self {
        self.thread_name_strategy = strategy;
        self
    }

    pub fn with_queue_full_policy(mut self, policy: QueueFullPolicyType, threshold: Level) -> Self {
        self.queue_full_policy = policy;
        self.discard_threshold = threshold;
        self
    }

    pub fn with_synchronize_enqueue_when_full(mut self, synchronize: bool) -> Self {
        self.synchronize_enqueue_when_full = synchronize;
        self
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Set the bounded shutdown drain: `attempts` polls `interval` apart
    pub fn with_drain(mut self, attempts: u32, interval: Duration) -> Self {
        self.drain_attempts = attempts;
        self.drain_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_consumer_cpu(mut self, cpu: usize) -> Self {
        self.consumer_cpu = Some(cpu);
        self
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    /// Build a configuration from `AsyncLogger.*` properties.
    ///
    /// Unknown keys are ignored; values that fail to parse keep their
    /// default and produce a warning.
    pub fn from_properties(properties: &HashMap<String, String>) -> (Self, Vec<String>) {
        let mut config = Self::default();
        let mut warnings = Vec::new();
        let read = |key: &str| properties.get(key).map(|v| v.trim().to_string());

        if let Some(value) = read("AsyncLogger.RingBufferSize") {
            parse_value(&value, "AsyncLogger.RingBufferSize", &mut config.ring_buffer_size, &mut warnings);
        }
        if let Some(value) = read("AsyncLogger.WaitStrategy") {
            parse_value(&value, "AsyncLogger.WaitStrategy", &mut config.wait_strategy, &mut warnings);
        }
        if let Some(value) = read("AsyncLogger.Timeout") {
            parse_value(&value, "AsyncLogger.Timeout", &mut config.wait_timeout_ms, &mut warnings);
        }
        if let Some(value) = read("AsyncLogger.SleepTimeNs") {
            parse_value(&value, "AsyncLogger.SleepTimeNs", &mut config.sleep_time_ns, &mut warnings);
        }
        if let Some(value) = read("AsyncLogger.Retries") {
            parse_value(&value, "AsyncLogger.Retries", &mut config.sleep_retries, &mut warnings);
        }
        if let Some(value) = read("AsyncLogger.ExceptionHandler") {
            if !value.is_empty() {
                config.exception_handler = Some(value);
            }
        }
        if let Some(value) = read("AsyncLogger.IncludeLocation") {
            parse_value(&value, "AsyncLogger.IncludeLocation", &mut config.include_location, &mut warnings);
        }
        if let Some(value) = read("AsyncLogger.Clock") {
            parse_value(&value, "AsyncLogger.Clock", &mut config.clock, &mut warnings);
        }
        if let Some(value) = read("AsyncLogger.ThreadNameStrategy") {
            parse_value(
                &value,
                "AsyncLogger.ThreadNameStrategy",
                &mut config.thread_name_strategy,
                &mut warnings
            );
        }
        if let Some(value) = read("AsyncLogger.QueueFullPolicy") {
            parse_value(&value, "AsyncLogger.QueueFullPolicy", &mut config.queue_full_policy, &mut warnings);
        }
        if let Some(value) = read("AsyncLogger.DiscardThreshold") {
            parse_value(&value, "AsyncLogger.DiscardThreshold", &mut config.discard_threshold, &mut warnings);
        }
        if let Some(value) = read("AsyncLogger.SynchronizeEnqueueWhenQueueFull") {
            parse_value(
                &value,
                "AsyncLogger.SynchronizeEnqueueWhenQueueFull",
                &mut config.synchronize_enqueue_when_full,
                &mut warnings
            );
        }
        if let Some(value) = read("AsyncLogger.ProgressInterval") {
            parse_value(&value, "AsyncLogger.ProgressInterval", &mut config.progress_interval, &mut warnings);
        }
        if let Some(value) = read("AsyncLogger.DrainAttempts") {
            parse_value(&value, "AsyncLogger.DrainAttempts", &mut config.drain_attempts, &mut warnings);
        }
        if let Some(value) = read("AsyncLogger.DrainIntervalMillis") {
            parse_value(&value, "AsyncLogger.DrainIntervalMillis", &mut config.drain_interval_ms, &mut warnings);
        }
        if let Some(value) = read("AsyncLogger.ConsumerCpu") {
            let mut cpu = 0usize;
            if parse_value(&value, "AsyncLogger.ConsumerCpu", &mut cpu, &mut warnings) {
                config.consumer_cpu = Some(cpu);
            }
        }

        (config, warnings)
    }

    /// Clamp every value into its valid range.
    pub fn resolve(&self) -> ResolvedConfig {
        let mut config = self.clone();
        let mut warnings = Vec::new();

        let requested = config.ring_buffer_size;
        let mut size = requested;
        if size < MIN_RING_BUFFER_SIZE {
            size = MIN_RING_BUFFER_SIZE;
            warnings.push(
                format!("Invalid RingBufferSize {}, using minimum size {}", requested, MIN_RING_BUFFER_SIZE)
            );
        } else if size > MAX_RING_BUFFER_SIZE {
            size = MAX_RING_BUFFER_SIZE;
            warnings.push(
                format!("Invalid RingBufferSize {}, using maximum size {}", requested, MAX_RING_BUFFER_SIZE)
            );
        } else if !size.is_power_of_two() {
            size = size.next_power_of_two();
            warnings.push(
                format!("RingBufferSize {} is not a power of two, using {}", requested, size)
            );
        }
        config.ring_buffer_size = size;

        if config.progress_interval == 0 {
            config.progress_interval = 1;
            warnings.push("ProgressInterval 0 is invalid, reporting after every event".to_string());
        }
        if config.wait_timeout_ms == 0 {
            config.wait_timeout_ms = DEFAULT_WAIT_TIMEOUT_MS;
            warnings.push(
                format!("Wait timeout 0 is invalid, using {} ms", DEFAULT_WAIT_TIMEOUT_MS)
            );
        }

        for warning in &warnings {
            tracing::warn!("{}", warning);
        }

        ResolvedConfig { config, warnings }
    }
}

/// Parse `value` into `target`; on failure keep `target` and record a warning.
fn parse_value<T>(value: &str, key: &str, target: &mut T, warnings: &mut Vec<String>) -> bool
    where T: FromStr + Display, T::Err: Display
{
    match value.parse::<T>() {
        Ok(parsed) => {
            *target = parsed;
            true
        }
        Err(err) => {
            let warning = format!("Invalid {} '{}' ({}), using default {}", key, value, err, target);
            tracing::warn!("{}", warning);
            warnings.push(warning);
            false
        }
    }
}

impl std::fmt::Display for WaitStrategyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WaitStrategyType::Block => "Block",
            WaitStrategyType::Sleep => "Sleep",
            WaitStrategyType::Yield => "Yield",
            WaitStrategyType::BusySpin => "BusySpin",
            WaitStrategyType::Timeout => "Timeout",
        };
        f.write_str(name)
    }
}

impl std::fmt::Display for ThreadNameStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ThreadNameStrategy::Cached => "Cached",
            ThreadNameStrategy::Uncached => "Uncached",
        })
    }
}
