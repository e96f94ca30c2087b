//! Log event model: the reusable slot and the values stored in it.

pub mod level;
pub mod message;
pub mod log_event;

pub use level::Level;
pub use message::Message;
pub use log_event::LogEvent;

use std::fmt;
use std::sync::Arc;

/// Error attached to an event
pub type Thrown = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Named tag used by filters and layouts downstream.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Marker(Arc<str>);

impl Marker {
    pub fn new(name: impl AsRef<str>) -> Self {
        Marker(Arc::from(name.as_ref()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Marker({})", self.0)
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Static `name=value` pair configured on a logger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    name: String,
    value: String,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}
