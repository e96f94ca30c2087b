//! Exception barrier for the consumer thread.
//!
//! Everything the append chain raises for one event, an `Err` or a panic,
//! ends up in an [`ExceptionHandler`] and the consumer moves on to the next
//! sequence. Handlers are chosen by name at startup from a process-wide
//! registry of factories; an unknown name falls back to
//! [`LoggingExceptionHandler`].

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::disruptor::Sequence;
use crate::event::LogEvent;

/// Name of the built-in log-and-continue handler
pub const LOGGING_HANDLER: &str = "log";

/// Name of the built-in handler that drops failures silently
pub const IGNORE_HANDLER: &str = "ignore";

/// What went wrong while appending one event.
#[derive(Debug)]
pub enum HandlerFailure {
    Error(anyhow::Error),
    Panic(String),
}

impl HandlerFailure {
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        HandlerFailure::Panic(message)
    }
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerFailure::Error(err) => write!(f, "{:#}", err),
            HandlerFailure::Panic(message) => write!(f, "panicked: {}", message),
        }
    }
}

pub trait ExceptionHandler: Send + Sync {
    /// Called on the consumer thread for a failed event; processing continues
    /// with the next sequence afterwards.
    fn handle_event_exception(&self, failure: &HandlerFailure, sequence: Sequence, event: &LogEvent);

    fn handle_on_start_exception(&self, failure: &HandlerFailure) {
        tracing::warn!(error = %failure, "exception during event handler start");
    }

    fn handle_on_shutdown_exception(&self, failure: &HandlerFailure) {
        tracing::warn!(error = %failure, "exception during event handler shutdown");
    }

    fn name(&self) -> &str;
}

impl fmt::Debug for dyn ExceptionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Default handler: a warning through `tracing`, then carry on.
#[derive(Debug, Default)]
pub struct LoggingExceptionHandler;

impl ExceptionHandler for LoggingExceptionHandler {
    fn handle_event_exception(&self, failure: &HandlerFailure, sequence: Sequence, event: &LogEvent) {
        tracing::warn!(
            sequence,
            logger = event.logger_name(),
            level = %event.level(),
            message = %event.formatted_message(),
            error = %failure,
            "error handling log event"
        );
    }

    fn name(&self) -> &str {
        LOGGING_HANDLER
    }
}

#[derive(Debug, Default)]
pub struct IgnoreExceptionHandler;

impl ExceptionHandler for IgnoreExceptionHandler {
    fn handle_event_exception(&self, failure: &HandlerFailure, sequence: Sequence, _event: &LogEvent) {
        tracing::trace!(sequence, error = %failure, "ignoring log event failure");
    }

    fn name(&self) -> &str {
        IGNORE_HANDLER
    }
}

pub type ExceptionHandlerFactory = fn() -> Arc<dyn ExceptionHandler>;

static REGISTRY: Lazy<RwLock<HashMap<String, ExceptionHandlerFactory>>> = Lazy::new(|| {
    let mut factories: HashMap<String, ExceptionHandlerFactory> = HashMap::new();
    factories.insert(LOGGING_HANDLER.into(), || Arc::new(LoggingExceptionHandler));
    factories.insert(IGNORE_HANDLER.into(), || Arc::new(IgnoreExceptionHandler));
    RwLock::new(factories)
});

/// Make a handler selectable by `name` in the pipeline configuration.
/// Returns `true` if an earlier registration was replaced.
pub fn register_exception_handler(name: impl Into<String>, factory: ExceptionHandlerFactory) -> bool {
    REGISTRY.write().insert(name.into(), factory).is_some()
}

/// Look up a handler by name.
///
/// `None` selects the default. An unknown name also yields the default,
/// together with a warning describing the substitution.
pub fn resolve_exception_handler(name: Option<&str>) -> (Arc<dyn ExceptionHandler>, Option<String>) {
    let default = || -> Arc<dyn ExceptionHandler> { Arc::new(LoggingExceptionHandler) };
    let Some(name) = name else {
        return (default(), None);
    };
    let found = REGISTRY.read().get(name).copied();
    match found {
        Some(factory) => (factory(), None),
        None => {
            let warning = format!(
                "Unknown exception handler '{}', using default '{}'",
                name,
                LOGGING_HANDLER
            );
            (default(), Some(warning))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NamedHandler;

    impl ExceptionHandler for NamedHandler {
        fn handle_event_exception(&self, _: &HandlerFailure, _: Sequence, _: &LogEvent) {}

        fn name(&self) -> &str {
            "named-test-handler"
        }
    }

    #[test]
    fn test_default_when_unset() {
        let (handler, warning) = resolve_exception_handler(None);
        assert_eq!(handler.name(), LOGGING_HANDLER);
        assert!(warning.is_none());
    }

    #[test]
    fn test_builtin_lookup() {
        let (handler, warning) = resolve_exception_handler(Some(IGNORE_HANDLER));
        assert_eq!(handler.name(), IGNORE_HANDLER);
        assert!(warning.is_none());
    }

    #[test]
    fn test_unknown_name_degrades_with_warning() {
        let (handler, warning) = resolve_exception_handler(Some("com.example.Missing"));
        assert_eq!(handler.name(), LOGGING_HANDLER);
        assert!(warning.unwrap().contains("com.example.Missing"));
    }

    #[test]
    fn test_registered_factory() {
        assert!(!register_exception_handler("named-test-handler", || Arc::new(NamedHandler)));
        let (handler, warning) = resolve_exception_handler(Some("named-test-handler"));
        assert_eq!(handler.name(), "named-test-handler");
        assert!(warning.is_none());
    }

    #[test]
    fn test_panic_payload_extraction() {
        let failure = HandlerFailure::from_panic(Box::new("static"));
        assert_eq!(failure.to_string(), "panicked: static");
        let failure = HandlerFailure::from_panic(Box::new(String::from("owned")));
        assert_eq!(failure.to_string(), "panicked: owned");
        let failure = HandlerFailure::from_panic(Box::new(7u32));
        assert_eq!(failure.to_string(), "panicked: non-string panic payload");
    }
}
