//! Producer side: loggers that translate log calls into ring buffer slots.
//!
//! The hot path claims a slot without waiting, fills it from a reusable
//! per-thread translator and publishes it. Only a full buffer takes the
//! slower routes chosen by the queue-full policy.

use std::cell::RefCell;
use std::panic::Location;
use std::sync::atomic::{ AtomicU64, Ordering };
use std::sync::Arc;
use std::thread;

use crate::config::ThreadNameStrategy;
use crate::consumer::SYNCHRONOUS_SEQUENCE;
use crate::context::{ ContextData, ContextStack };
use crate::error::{ PipelineError, Result };
use crate::event::{ Level, LogEvent, Marker, Message, Property, Thrown };
use crate::lifecycle::{ AsyncLoggerDisruptor, LifecycleState, RunningPipeline };
use crate::queue_full::EventRoute;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

const EXITING_THREAD_NAME: &str = "<exiting>";

/// Identity of a producer thread, created on its first log call.
struct ProducerInfo {
    thread_id: u64,
    thread_name: Arc<str>,
}

impl ProducerInfo {
    fn current() -> Self {
        let thread_id = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            thread_id,
            thread_name: current_thread_name(thread_id),
        }
    }
}

fn current_thread_name(thread_id: u64) -> Arc<str> {
    match thread::current().name() {
        Some(name) => Arc::from(name),
        None => Arc::from(format!("thread-{}", thread_id)),
    }
}

/// Values of one log call on their way into a slot.
#[derive(Default)]
struct EventTranslator {
    level: Option<Level>,
    logger_name: Option<Arc<str>>,
    marker: Option<Marker>,
    message: Message,
    thrown: Option<Thrown>,
    context_data: ContextData,
    context_stack: ContextStack,
    thread_id: u64,
    thread_name: Option<Arc<str>>,
    location: Option<&'static Location<'static>>,
    timestamp_millis: i64,
    properties: Option<Arc<[Property]>>,
}

impl EventTranslator {
    /// Move everything into `event`, leaving the translator empty.
    fn translate_to(&mut self, event: &mut LogEvent) {
        event.level = self.level.take().unwrap_or(Level::Off);
        if let Some(name) = self.logger_name.take() {
            event.logger_name = name;
        }
        event.marker = self.marker.take();
        event.message = std::mem::take(&mut self.message);
        event.thrown = self.thrown.take();
        event.context_data = std::mem::take(&mut self.context_data);
        event.context_stack = std::mem::take(&mut self.context_stack);
        event.thread_id = self.thread_id;
        if let Some(name) = self.thread_name.take() {
            event.thread_name = name;
        }
        event.location = self.location.take();
        event.timestamp_millis = self.timestamp_millis;
        event.end_of_batch = false;
        event.properties = self.properties.take();
        event.populated = true;
    }

    fn clear(&mut self) {
        *self = EventTranslator::default();
    }
}

thread_local! {
    static PRODUCER: ProducerInfo = ProducerInfo::current();
    static TRANSLATOR: RefCell<EventTranslator> = RefCell::new(EventTranslator::default());
}

/// Named logger publishing into a shared [`AsyncLoggerDisruptor`].
#[derive(Clone)]
pub struct AsyncLogger {
    name: Arc<str>,
    level: Level,
    include_location: bool,
    properties: Option<Arc<[Property]>>,
    pipeline: Arc<AsyncLoggerDisruptor>,
}

impl AsyncLogger {
    pub(crate) fn new(name: &str, pipeline: Arc<AsyncLoggerDisruptor>) -> Self {
        Self {
            name: Arc::from(name),
            level: Level::All,
            include_location: pipeline.config().include_location,
            properties: None,
            pipeline,
        }
    }

    /// Only events at least as severe as `level` are published
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_include_location(mut self, include: bool) -> Self {
        self.include_location = include;
        self
    }

    /// Properties merged into each event's context data on the consumer
    pub fn with_properties(mut self, properties: Vec<Property>) -> Self {
        self.properties = if properties.is_empty() { None } else { Some(Arc::from(properties)) };
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn includes_location(&self) -> bool {
        self.include_location
    }

    pub fn pipeline(&self) -> &Arc<AsyncLoggerDisruptor> {
        &self.pipeline
    }

    pub fn is_enabled(&self, level: Level) -> bool {
        level != Level::Off && level.is_more_specific_than(self.level)
    }

    /// Publish one event.
    ///
    /// Fails with `PipelineError::ShutDown` once the pipeline has stopped
    /// and `PipelineError::NotStarted` before it started; the event is
    /// dropped in both cases.
    #[track_caller]
    pub fn log(
        &self,
        level: Level,
        marker: Option<&Marker>,
        message: impl Into<Message>,
        thrown: Option<Thrown>
    ) -> Result<()> {
        if !self.is_enabled(level) {
            return Ok(());
        }
        let location = if self.include_location { Some(Location::caller()) } else { None };
        let message = message.into();

        let mut call = Some((message, thrown));
        let reused = TRANSLATOR.try_with(|cell| {
            let mut translator = cell.try_borrow_mut().ok()?;
            let (message, thrown) = call.take()?;
            let result = self.publish(&mut translator, level, marker, message, thrown, location);
            translator.clear();
            Some(result)
        });
        if let Ok(Some(result)) = reused {
            return result;
        }
        // reentrant call from inside a synchronous append, or thread-local teardown
        match call {
            Some((message, thrown)) => {
                let mut translator = EventTranslator::default();
                self.publish(&mut translator, level, marker, message, thrown, location)
            }
            None => Err(PipelineError::unexpected("log call consumed without a result")),
        }
    }

    #[track_caller]
    pub fn trace(&self, message: impl Into<Message>) -> Result<()> {
        self.log(Level::Trace, None, message, None)
    }

    #[track_caller]
    pub fn debug(&self, message: impl Into<Message>) -> Result<()> {
        self.log(Level::Debug, None, message, None)
    }

    #[track_caller]
    pub fn info(&self, message: impl Into<Message>) -> Result<()> {
        self.log(Level::Info, None, message, None)
    }

    #[track_caller]
    pub fn warn(&self, message: impl Into<Message>) -> Result<()> {
        self.log(Level::Warn, None, message, None)
    }

    #[track_caller]
    pub fn error(&self, message: impl Into<Message>) -> Result<()> {
        self.log(Level::Error, None, message, None)
    }

    #[track_caller]
    pub fn fatal(&self, message: impl Into<Message>) -> Result<()> {
        self.log(Level::Fatal, None, message, None)
    }

    fn publish(
        &self,
        translator: &mut EventTranslator,
        level: Level,
        marker: Option<&Marker>,
        message: Message,
        thrown: Option<Thrown>,
        location: Option<&'static Location<'static>>
    ) -> Result<()> {
        let guard = self.pipeline.running.read();
        let Some(running) = guard.as_ref() else {
            drop(guard);
            return Err(self.rejected());
        };
        self.fill(translator, running, level, marker, message, thrown, location);

        if let Some(sequence) = running.ring.try_claim(1) {
            // SAFETY: the claimed slot belongs to this producer until published
            unsafe {
                translator.translate_to(running.ring.slot_mut(sequence));
            }
            running.ring.publish(sequence);
            self.pipeline.metrics.record_publish();
            return Ok(());
        }

        // never wait while holding the guard: stop() needs the write lock
        let running = running.clone();
        drop(guard);
        self.publish_when_full(&running, translator, level)
    }

    fn publish_when_full(
        &self,
        running: &RunningPipeline,
        translator: &mut EventTranslator,
        level: Level
    ) -> Result<()> {
        let metrics = &self.pipeline.metrics;
        metrics.record_backpressure();
        match running.queue_full.route(Some(running.background_thread), level) {
            EventRoute::Enqueue => {
                let _serialized = running.enqueue_lock.as_ref().map(|lock| lock.lock());
                let sequence = match running.ring.claim(1) {
                    Ok(sequence) => sequence,
                    Err(PipelineError::Alerted) => {
                        return Err(self.rejected());
                    }
                    Err(err) => {
                        return Err(err);
                    }
                };
                // SAFETY: as in the fast path
                unsafe {
                    translator.translate_to(running.ring.slot_mut(sequence));
                }
                running.ring.publish(sequence);
                metrics.record_publish();
                Ok(())
            }
            EventRoute::Synchronous => {
                if running.first_synchronous_append() {
                    let warning = format!(
                        "Ring buffer full, logging synchronously on the consumer thread; events from {} may be out of order",
                        self.pipeline.context_name()
                    );
                    tracing::warn!(context = self.pipeline.context_name(), logger = %self.name, "{}", warning);
                    self.pipeline.push_warning(warning);
                }
                let mut event = LogEvent::default();
                translator.translate_to(&mut event);
                event.finalize_properties();
                running.chain.append(&event, SYNCHRONOUS_SEQUENCE, false);
                metrics.record_synchronous();
                Ok(())
            }
            EventRoute::Discard => {
                metrics.record_discard();
                Ok(())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn fill(
        &self,
        translator: &mut EventTranslator,
        running: &RunningPipeline,
        level: Level,
        marker: Option<&Marker>,
        message: Message,
        thrown: Option<Thrown>,
        location: Option<&'static Location<'static>>
    ) {
        let producer = PRODUCER.try_with(|producer| {
            let name = match running.thread_name_strategy {
                ThreadNameStrategy::Cached => producer.thread_name.clone(),
                ThreadNameStrategy::Uncached => current_thread_name(producer.thread_id),
            };
            (producer.thread_id, name)
        });
        // thread::current() is unavailable once thread-locals are torn down
        let (thread_id, thread_name) = producer.unwrap_or_else(|_| (0, Arc::from(EXITING_THREAD_NAME)));

        translator.level = Some(level);
        translator.logger_name = Some(self.name.clone());
        translator.marker = marker.cloned();
        translator.message = message;
        translator.thrown = thrown;
        translator.context_data = self.pipeline.injector.snapshot_map();
        translator.context_stack = self.pipeline.injector.snapshot_stack();
        translator.thread_id = thread_id;
        translator.thread_name = Some(thread_name);
        translator.location = location;
        translator.timestamp_millis = running.clock.current_time_millis();
        translator.properties = self.properties.clone();
    }

    fn rejected(&self) -> PipelineError {
        let context = self.pipeline.context_name();
        self.pipeline.metrics.record_rejected();
        match self.pipeline.state() {
            LifecycleState::Uninitialized => {
                tracing::warn!(context, logger = %self.name, "pipeline not started, log event dropped");
                PipelineError::not_started(context)
            }
            _ => {
                tracing::warn!(context, logger = %self.name, "pipeline has been shut down, log event rejected");
                PipelineError::shut_down(context)
            }
        }
    }
}

impl std::fmt::Debug for AsyncLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncLogger")
            .field("name", &self.name)
            .field("level", &self.level)
            .field("include_location", &self.include_location)
            .field("context", &self.pipeline.context_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ PipelineConfig, WaitStrategyType };
    use crate::context::ThreadContext;
    use crate::disruptor::Sequence;
    use crate::lifecycle::PipelineBuilder;
    use parking_lot::Mutex;

    type Captured = Arc<Mutex<Vec<LogEvent>>>;

    fn capture(config: PipelineConfig) -> (Captured, Arc<AsyncLoggerDisruptor>) {
        let events: Captured = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let pipeline = PipelineBuilder::new("publisher-test")
            .with_config(config)
            .with_handler(move |event: &LogEvent, _: Sequence, _: bool| -> anyhow::Result<()> {
                sink.lock().push(event.clone());
                Ok(())
            })
            .build()
            .unwrap();
        pipeline.start().unwrap();
        (events, pipeline)
    }

    fn config() -> PipelineConfig {
        PipelineConfig::new().with_ring_buffer_size(128).with_wait_strategy(WaitStrategyType::Yield)
    }

    #[test]
    fn test_event_carries_call_data() {
        let (events, pipeline) = capture(config());
        let logger = pipeline.logger("app.service");
        let thrown: Thrown = Arc::new(std::io::Error::other("disk"));
        let marker = Marker::new("AUDIT");

        ThreadContext::clear_all();
        ThreadContext::put("request", "42");
        ThreadContext::push("outer");
        logger
            .log(Level::Error, Some(&marker), Message::parameterized("{} failed", vec!["write".to_string()]), Some(thrown))
            .unwrap();
        ThreadContext::clear_all();
        pipeline.stop().unwrap();

        let events = events.lock();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.level(), Level::Error);
        assert_eq!(event.logger_name(), "app.service");
        assert_eq!(event.marker().map(Marker::name), Some("AUDIT"));
        assert_eq!(event.formatted_message(), "write failed");
        assert_eq!(event.thrown().unwrap().to_string(), "disk");
        assert_eq!(event.context_data().get("request"), Some("42"));
        assert_eq!(event.context_stack().peek(), Some("outer"));
        assert!(event.thread_id() > 0);
        assert!(event.location().is_none());
        assert!(event.timestamp_millis() > 0);
    }

    #[test]
    fn test_location_captured_when_enabled() {
        let (events, pipeline) = capture(config().with_include_location(true));
        let logger = pipeline.logger("located");
        assert!(logger.includes_location());
        let line = line!() + 1;
        logger.info("here").unwrap();
        pipeline.stop().unwrap();

        let events = events.lock();
        let location = events[0].location().unwrap();
        assert_eq!(location.file(), file!());
        assert_eq!(location.line(), line);
    }

    #[test]
    fn test_level_threshold() {
        let (events, pipeline) = capture(config());
        let logger = pipeline.logger("quiet").with_level(Level::Warn);
        logger.debug("dropped").unwrap();
        logger.info("dropped").unwrap();
        logger.warn("kept").unwrap();
        logger.fatal("kept").unwrap();
        logger.log(Level::Off, None, "never", None).unwrap();
        pipeline.stop().unwrap();
        assert_eq!(events.lock().len(), 2);
    }

    #[test]
    fn test_thread_name_recorded() {
        let (events, pipeline) = capture(config());
        let logger = pipeline.logger("named");
        thread::Builder
            ::new()
            .name("producer-a".into())
            .spawn(move || logger.info("from a").unwrap())
            .unwrap()
            .join()
            .unwrap();
        let unnamed = pipeline.logger("named");
        thread::spawn(move || unnamed.info("from unnamed").unwrap()).join().unwrap();
        pipeline.stop().unwrap();

        let events = events.lock();
        assert_eq!(events[0].thread_name(), "producer-a");
        assert!(events[1].thread_name().starts_with("thread-"));
        assert_ne!(events[0].thread_id(), events[1].thread_id());
    }

    struct LogOnExit {
        logger: RefCell<Option<AsyncLogger>>,
        logged: RefCell<Option<Arc<std::sync::atomic::AtomicBool>>>,
    }

    impl Drop for LogOnExit {
        fn drop(&mut self) {
            if let Some(logger) = self.logger.borrow_mut().take() {
                let ok = logger.info("thread exiting").is_ok();
                if let Some(logged) = self.logged.borrow_mut().take() {
                    logged.store(ok, Ordering::SeqCst);
                }
            }
        }
    }

    thread_local! {
        static LOG_ON_EXIT: LogOnExit = LogOnExit {
            logger: RefCell::new(None),
            logged: RefCell::new(None),
        };
    }

    #[test]
    fn test_log_during_thread_local_teardown() {
        let (events, pipeline) = capture(config());
        let logged = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let logger = pipeline.logger("teardown");
        let flag = logged.clone();
        thread::Builder
            ::new()
            .name("exiting".into())
            .spawn(move || {
                // registered before the logger's own thread-locals, so dropped after them
                LOG_ON_EXIT.with(|exit| {
                    *exit.logger.borrow_mut() = Some(logger.clone());
                    *exit.logged.borrow_mut() = Some(flag);
                });
                ThreadContext::put("request", "7");
                logger.info("working").unwrap();
            })
            .unwrap()
            .join()
            .unwrap();
        pipeline.stop().unwrap();

        assert!(logged.load(Ordering::SeqCst));
        let events = events.lock();
        let messages: Vec<String> = events
            .iter()
            .map(|e| e.formatted_message().into_owned())
            .collect();
        assert_eq!(messages, ["working", "thread exiting"]);
    }

    #[test]
    fn test_rejected_before_start_and_after_stop() {
        let pipeline = PipelineBuilder::new("rejecting")
            .with_config(config())
            .with_handler(|_: &LogEvent, _: Sequence, _: bool| -> anyhow::Result<()> { Ok(()) })
            .build()
            .unwrap();
        let logger = pipeline.logger("early");
        assert!(matches!(logger.info("too early"), Err(PipelineError::NotStarted { .. })));

        pipeline.start().unwrap();
        logger.info("accepted").unwrap();
        pipeline.stop().unwrap();

        let err = logger.info("too late").unwrap_err();
        assert!(err.is_shutdown());
        assert_eq!(pipeline.metrics().rejected_after_shutdown, 2);
        assert_eq!(pipeline.metrics().published, 1);
    }
}
