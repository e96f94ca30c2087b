//! What a producer does when the ring buffer has no free slot.

use std::sync::atomic::{ AtomicU64, Ordering };
use std::thread::{ self, ThreadId };

use serde::{ Deserialize, Serialize };

use crate::event::Level;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventRoute {
    /// Wait for a free slot and publish
    Enqueue,
    /// Bypass the buffer and run the append chain on the calling thread
    Synchronous,
    /// Drop the event
    Discard,
}

pub trait AsyncQueueFullPolicy: Send + Sync {
    /// `background_thread` is the consumer thread of the full buffer
    fn route(&self, background_thread: Option<ThreadId>, level: Level) -> EventRoute;

    /// Events dropped so far
    fn discard_count(&self) -> u64 {
        0
    }
}

/// Enqueue, except on the consumer thread itself: it would wait for slots
/// only it can free.
#[derive(Debug, Default)]
pub struct DefaultAsyncQueueFullPolicy;

impl AsyncQueueFullPolicy for DefaultAsyncQueueFullPolicy {
    fn route(&self, background_thread: Option<ThreadId>, _level: Level) -> EventRoute {
        if background_thread == Some(thread::current().id()) {
            return EventRoute::Synchronous;
        }
        EventRoute::Enqueue
    }
}

/// Drops events at or below `threshold` severity while the buffer is full.
#[derive(Debug)]
pub struct DiscardingAsyncQueueFullPolicy {
    threshold: Level,
    discarded: AtomicU64,
}

impl DiscardingAsyncQueueFullPolicy {
    pub fn new(threshold: Level) -> Self {
        Self {
            threshold,
            discarded: AtomicU64::new(0),
        }
    }

    pub fn threshold(&self) -> Level {
        self.threshold
    }
}

impl AsyncQueueFullPolicy for DiscardingAsyncQueueFullPolicy {
    fn route(&self, background_thread: Option<ThreadId>, level: Level) -> EventRoute {
        if level.is_less_specific_than(self.threshold) {
            if self.discarded.fetch_add(1, Ordering::Relaxed) == 0 {
                tracing::warn!(
                    threshold = %self.threshold,
                    "ring buffer full, discarding events at or below threshold"
                );
            }
            return EventRoute::Discard;
        }
        DefaultAsyncQueueFullPolicy.route(background_thread, level)
    }

    fn discard_count(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueFullPolicyType {
    #[default]
    Default,
    Discard,
}

impl QueueFullPolicyType {
    pub fn create(self, discard_threshold: Level) -> Box<dyn AsyncQueueFullPolicy> {
        match self {
            QueueFullPolicyType::Default => Box::new(DefaultAsyncQueueFullPolicy),
            QueueFullPolicyType::Discard => {
                Box::new(DiscardingAsyncQueueFullPolicy::new(discard_threshold))
            }
        }
    }
}

impl std::fmt::Display for QueueFullPolicyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            QueueFullPolicyType::Default => "Default",
            QueueFullPolicyType::Discard => "Discard",
        })
    }
}

impl std::str::FromStr for QueueFullPolicyType {
    type Err = crate::error::PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" | "enqueue" => Ok(QueueFullPolicyType::Default),
            "discard" => Ok(QueueFullPolicyType::Discard),
            other => {
                Err(crate::config_error!("Unknown queue full policy '{}'", other))
            }
        }
    }
}
