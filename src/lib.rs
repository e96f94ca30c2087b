//! # ringlog
//!
//! Asynchronous logging core. Producer threads translate log calls into
//! pre-allocated slots of a multi-producer ring buffer; one dedicated
//! consumer thread drains the slots in sequence order into an append chain.
//!
//! ## Quick start
//!
//! ```no_run
//! use ringlog::{ LogEvent, PipelineBuilder, Sequence };
//!
//! let pipeline = PipelineBuilder::new("app")
//!     .with_handler(|event: &LogEvent, _: Sequence, end_of_batch: bool| -> anyhow::Result<()> {
//!         println!("{} {}", event.level(), event.formatted_message());
//!         if end_of_batch {
//!             // flush buffered output here
//!         }
//!         Ok(())
//!     })
//!     .build()?;
//! pipeline.start()?;
//!
//! let logger = pipeline.logger("app.main");
//! logger.info("started")?;
//!
//! pipeline.stop()?;
//! # Ok::<(), ringlog::PipelineError>(())
//! ```

pub mod clock;
pub mod config;
pub mod constants;
pub mod consumer;
pub mod context;
pub mod cpu;
pub mod disruptor;
pub mod error;
pub mod event;
pub mod exception;
pub mod lifecycle;
pub mod metrics;
pub mod publisher;
pub mod queue_full;

pub use clock::{ CachedClock, Clock, ClockType, SystemClock };
pub use config::{ PipelineConfig, ResolvedConfig, ThreadNameStrategy, WaitStrategyType };
pub use consumer::{ BatchEventProcessor, EventHandler, SYNCHRONOUS_SEQUENCE };
pub use context::{ ContextData, ContextDataInjector, ContextStack, ThreadContext, ThreadContextInjector };
pub use disruptor::{ MpscRingBuffer, Sequence, WaitStrategy };
pub use error::{ PipelineError, Result };
pub use event::{ Level, LogEvent, Marker, Message, Property, Thrown };
pub use exception::{
    register_exception_handler,
    resolve_exception_handler,
    ExceptionHandler,
    HandlerFailure,
    IgnoreExceptionHandler,
    LoggingExceptionHandler,
};
pub use lifecycle::{ AsyncLoggerDisruptor, LifecycleState, PipelineBuilder, ShutdownReport };
pub use metrics::{ MetricsSnapshot, PipelineMetrics };
pub use publisher::AsyncLogger;
pub use queue_full::{
    AsyncQueueFullPolicy,
    DefaultAsyncQueueFullPolicy,
    DiscardingAsyncQueueFullPolicy,
    EventRoute,
    QueueFullPolicyType,
};

static_assertions::assert_impl_all!(AsyncLogger: Send, Sync, Clone);
static_assertions::assert_impl_all!(AsyncLoggerDisruptor: Send, Sync);
static_assertions::assert_impl_all!(MpscRingBuffer<LogEvent>: Send, Sync);
static_assertions::assert_impl_all!(LogEvent: Send, Sync);
static_assertions::assert_impl_all!(PipelineError: Send, Sync);
