//! Timestamp sources for published events.

use std::sync::atomic::{ AtomicI64, Ordering };
use std::sync::Arc;
use std::thread;
use std::time::{ Duration, SystemTime, UNIX_EPOCH };

use once_cell::sync::Lazy;
use serde::{ Deserialize, Serialize };

pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch
    fn current_time_millis(&self) -> i64;
}

fn system_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Reads the OS clock on every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn current_time_millis(&self) -> i64 {
        system_millis()
    }
}

/// Coarse clock: a single daemon thread refreshes a shared atomic every
/// millisecond, so reading the time is one relaxed load.
pub struct CachedClock {
    millis: AtomicI64,
}

static CACHED_CLOCK: Lazy<Arc<CachedClock>> = Lazy::new(|| {
    let clock = Arc::new(CachedClock {
        millis: AtomicI64::new(system_millis()),
    });
    let updater = clock.clone();
    let spawned = thread::Builder::new()
        .name("ringlog-clock".into())
        .spawn(move || loop {
            updater.millis.store(system_millis(), Ordering::Relaxed);
            thread::sleep(Duration::from_millis(1));
        });
    if let Err(err) = spawned {
        tracing::warn!(error = %err, "cached clock updater failed to start, timestamps will not advance");
    }
    clock
});

impl CachedClock {
    /// Shared process-wide instance
    pub fn instance() -> Arc<CachedClock> {
        CACHED_CLOCK.clone()
    }
}

impl Clock for CachedClock {
    fn current_time_millis(&self) -> i64 {
        self.millis.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockType {
    #[default]
    System,
    Cached,
}

impl ClockType {
    pub fn create(self) -> Arc<dyn Clock> {
        match self {
            ClockType::System => Arc::new(SystemClock),
            ClockType::Cached => CachedClock::instance(),
        }
    }
}

impl std::fmt::Display for ClockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ClockType::System => "System",
            ClockType::Cached => "Cached",
        })
    }
}

impl std::str::FromStr for ClockType {
    type Err = crate::error::PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" | "systemclock" => Ok(ClockType::System),
            "cached" | "cachedclock" | "coarse" => Ok(ClockType::Cached),
            other => Err(crate::config_error!("Unknown clock '{}'", other)),
        }
    }
}
