//! Pipeline errors

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Spawning the consumer thread failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        message: String,
    },

    /// The pipeline was shut down; the event was not accepted
    #[error("[{context}] pipeline has been shut down, log event rejected")]
    ShutDown {
        /// Logging context the pipeline belongs to
        context: String,
    },

    #[error("[{context}] pipeline has not been started")]
    NotStarted {
        context: String,
    },

    /// Halt requested while waiting on the ring buffer
    #[error("Sequence barrier alerted")]
    Alerted,

    #[error("CPU affinity error: {0}")]
    CpuAffinity(#[from] nix::Error),

    /// A deadline wait strategy saw nothing published in time
    #[error("Wait timed out")]
    Timeout,

    #[error("Unexpected error: {message}")]
    Unexpected {
        message: String,
    },
}

impl PipelineError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig { message: message.into() }
    }

    pub fn shut_down(context: impl Into<String>) -> Self {
        Self::ShutDown { context: context.into() }
    }

    pub fn not_started(context: impl Into<String>) -> Self {
        Self::NotStarted { context: context.into() }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected { message: message.into() }
    }

    /// Retrying the same operation may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout | Self::NotStarted { .. })
    }

    /// The pipeline no longer accepts events
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::ShutDown { .. } | Self::Alerted)
    }
}

/// `PipelineError::InvalidConfig` from a format string
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::error::PipelineError::config(format!($($arg)*))
    };
}
