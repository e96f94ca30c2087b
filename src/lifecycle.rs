//! Pipeline lifecycle: construction, start, bounded draining shutdown.
//!
//! One pipeline serves a logging context and may be shared by several
//! owners. Each `start()` takes a share and each `stop()` releases one; the
//! consumer runs until the last share is released.

use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;
use std::thread::{ self, JoinHandle, ThreadId };

use parking_lot::{ Mutex, RwLock };

use crate::clock::Clock;
use crate::config::{ PipelineConfig, ResolvedConfig, ThreadNameStrategy };
use crate::consumer::{ AppendChain, BatchEventProcessor, EventHandler };
use crate::context::{ ContextDataInjector, ThreadContextInjector };
use crate::cpu::pin_consumer;
use crate::disruptor::MpscRingBuffer;
use crate::error::{ PipelineError, Result };
use crate::event::LogEvent;
use crate::exception::{ resolve_exception_handler, ExceptionHandler };
use crate::metrics::{ MetricsSnapshot, PipelineMetrics };
use crate::publisher::AsyncLogger;
use crate::queue_full::AsyncQueueFullPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Running,
    /// Publishing is disabled and the backlog is being drained
    Draining,
    /// Terminal
    Stopped,
}

/// Outcome of the final `stop()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// `true` if the backlog was empty when the consumer was halted
    pub drained: bool,
    /// Drain polls that found a backlog
    pub attempts: u32,
    /// Events still queued when the consumer was halted
    pub remaining: usize,
}

/// State shared with producers while the pipeline accepts events.
pub(crate) struct RunningPipeline {
    pub(crate) ring: Arc<MpscRingBuffer<LogEvent>>,
    pub(crate) chain: Arc<AppendChain>,
    pub(crate) queue_full: Box<dyn AsyncQueueFullPolicy>,
    pub(crate) background_thread: ThreadId,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) enqueue_lock: Option<Mutex<()>>,
    pub(crate) thread_name_strategy: ThreadNameStrategy,
    synchronous_warned: AtomicBool,
}

impl RunningPipeline {
    /// `true` only for the first caller
    pub(crate) fn first_synchronous_append(&self) -> bool {
        !self.synchronous_warned.swap(true, Ordering::Relaxed)
    }
}

struct Lifecycle {
    state: LifecycleState,
    share_count: usize,
    consumer: Option<JoinHandle<()>>,
}

/// The async logging pipeline of one logging context.
pub struct AsyncLoggerDisruptor {
    context_name: String,
    config: PipelineConfig,
    warnings: Mutex<Vec<String>>,
    handler: Arc<dyn EventHandler>,
    pub(crate) injector: Arc<dyn ContextDataInjector>,
    exception_handler: Option<Arc<dyn ExceptionHandler>>,
    pub(crate) metrics: Arc<PipelineMetrics>,
    lifecycle: Mutex<Lifecycle>,
    /// `None` outside `Running`; producers publish under the read guard
    pub(crate) running: RwLock<Option<Arc<RunningPipeline>>>,
}

impl AsyncLoggerDisruptor {
    /// Take a share of the pipeline, starting the consumer on the first call.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        match lifecycle.state {
            LifecycleState::Running => {
                lifecycle.share_count += 1;
                tracing::trace!(
                    context = %self.context_name,
                    share_count = lifecycle.share_count,
                    "pipeline already running, sharing it"
                );
                return Ok(());
            }
            LifecycleState::Draining | LifecycleState::Stopped => {
                return Err(PipelineError::shut_down(&self.context_name));
            }
            LifecycleState::Uninitialized => {}
        }

        let config = &self.config;
        let exception_handler = match &self.exception_handler {
            Some(handler) => handler.clone(),
            None => {
                let (handler, warning) = resolve_exception_handler(config.exception_handler.as_deref());
                if let Some(warning) = warning {
                    tracing::warn!(context = %self.context_name, "{}", warning);
                    self.warnings.lock().push(warning);
                }
                handler
            }
        };

        let wait_strategy = config.wait_strategy.create(config);
        let ring = Arc::new(MpscRingBuffer::new(config.ring_buffer_size, wait_strategy)?);
        let chain = Arc::new(
            AppendChain::new(self.handler.clone(), exception_handler.clone(), self.metrics.clone())
        );
        let processor = BatchEventProcessor::new(
            ring.clone(),
            chain.clone(),
            self.metrics.clone(),
            config.progress_interval
        );

        let consumer_cpu = config.consumer_cpu;
        let consumer = thread::Builder
            ::new()
            .name(format!("AsyncLogger[{}]", self.context_name))
            .spawn(move || {
                pin_consumer(consumer_cpu);
                processor.run();
            })?;

        tracing::debug!(
            context = %self.context_name,
            ring_buffer_size = config.ring_buffer_size,
            wait_strategy = %config.wait_strategy,
            exception_handler = exception_handler.name(),
            queue_full_policy = %config.queue_full_policy,
            "starting async logger pipeline"
        );

        let running = RunningPipeline {
            ring,
            chain,
            queue_full: config.queue_full_policy.create(config.discard_threshold),
            background_thread: consumer.thread().id(),
            clock: config.clock.create(),
            enqueue_lock: config.synchronize_enqueue_when_full.then(|| Mutex::new(())),
            thread_name_strategy: config.thread_name_strategy,
            synchronous_warned: AtomicBool::new(false),
        };
        *self.running.write() = Some(Arc::new(running));

        lifecycle.state = LifecycleState::Running;
        lifecycle.share_count = 1;
        lifecycle.consumer = Some(consumer);
        Ok(())
    }

    /// Release a share. The last release drains and stops the pipeline.
    ///
    /// Returns `None` while other shares remain, or if the pipeline was not
    /// running. Running out of drain attempts is reported in the
    /// [`ShutdownReport`], not as an error.
    pub fn stop(&self) -> Result<Option<ShutdownReport>> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state != LifecycleState::Running {
            tracing::trace!(context = %self.context_name, state = ?lifecycle.state, "pipeline not running");
            return Ok(None);
        }
        lifecycle.share_count -= 1;
        if lifecycle.share_count > 0 {
            tracing::trace!(
                context = %self.context_name,
                share_count = lifecycle.share_count,
                "pipeline still shared, not stopping"
            );
            return Ok(None);
        }
        lifecycle.state = LifecycleState::Draining;
        let consumer = lifecycle.consumer.take();
        drop(lifecycle);

        // waits for producers still inside the publish fast path
        let running = self.running.write().take();
        let running = match running {
            Some(running) => running,
            None => {
                self.lifecycle.lock().state = LifecycleState::Stopped;
                return Err(PipelineError::unexpected("running pipeline state missing"));
            }
        };

        tracing::trace!(context = %self.context_name, "draining pipeline");
        let ring = &running.ring;
        let interval = self.config.drain_interval();
        let mut attempts = 0;
        while ring.has_backlog() && attempts < self.config.drain_attempts {
            thread::sleep(interval);
            attempts += 1;
        }
        let remaining = ring.buffer_size() - ring.remaining_capacity();
        if remaining > 0 {
            tracing::warn!(
                context = %self.context_name,
                remaining,
                attempts,
                "shutdown timed out with events still queued"
            );
        }

        ring.halt();
        if let Some(consumer) = consumer {
            if consumer.join().is_err() {
                tracing::error!(context = %self.context_name, "consumer thread panicked");
            }
        }

        self.lifecycle.lock().state = LifecycleState::Stopped;
        tracing::trace!(context = %self.context_name, "pipeline stopped");
        Ok(
            Some(ShutdownReport {
                drained: remaining == 0,
                attempts,
                remaining,
            })
        )
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.lock().state
    }

    pub fn share_count(&self) -> usize {
        self.lifecycle.lock().share_count
    }

    pub fn context_name(&self) -> &str {
        &self.context_name
    }

    /// Effective ring buffer size
    pub fn buffer_size(&self) -> usize {
        self.config.ring_buffer_size
    }

    /// Free slots; 0 unless running
    pub fn remaining_capacity(&self) -> usize {
        self.running
            .read()
            .as_ref()
            .map_or(0, |running| running.ring.remaining_capacity())
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Effective configuration after validation
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Substitutions made while validating configuration and selecting the
    /// exception handler
    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().clone()
    }

    pub(crate) fn push_warning(&self, warning: String) {
        self.warnings.lock().push(warning);
    }

    /// A logger publishing into this pipeline.
    pub fn logger(self: &Arc<Self>, name: &str) -> AsyncLogger {
        AsyncLogger::new(name, self.clone())
    }
}

impl Drop for AsyncLoggerDisruptor {
    fn drop(&mut self) {
        // not stopped: let the consumer thread exit without draining
        if let Some(running) = self.running.get_mut().take() {
            running.ring.halt();
        }
    }
}

/// Builder for [`AsyncLoggerDisruptor`].
pub struct PipelineBuilder {
    context_name: String,
    config: PipelineConfig,
    handler: Option<Arc<dyn EventHandler>>,
    injector: Arc<dyn ContextDataInjector>,
    exception_handler: Option<Arc<dyn ExceptionHandler>>,
}

impl PipelineBuilder {
    pub fn new(context_name: impl Into<String>) -> Self {
        Self {
            context_name: context_name.into(),
            config: PipelineConfig::default(),
            handler: None,
            injector: Arc::new(ThreadContextInjector),
            exception_handler: None,
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the append chain
    pub fn with_handler(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn with_shared_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn with_injector(mut self, injector: Arc<dyn ContextDataInjector>) -> Self {
        self.injector = injector;
        self
    }

    /// Use this handler instead of the one named in the configuration
    pub fn with_exception_handler(mut self, handler: Arc<dyn ExceptionHandler>) -> Self {
        self.exception_handler = Some(handler);
        self
    }

    pub fn build(self) -> Result<Arc<AsyncLoggerDisruptor>> {
        let handler = self.handler.ok_or_else(|| PipelineError::config("An event handler is required"))?;
        let ResolvedConfig { config, warnings } = self.config.resolve();
        Ok(
            Arc::new(AsyncLoggerDisruptor {
                context_name: self.context_name,
                config,
                warnings: Mutex::new(warnings),
                handler,
                injector: self.injector,
                exception_handler: self.exception_handler,
                metrics: Arc::new(PipelineMetrics::new()),
                lifecycle: Mutex::new(Lifecycle {
                    state: LifecycleState::Uninitialized,
                    share_count: 0,
                    consumer: None,
                }),
                running: RwLock::new(None),
            })
        )
    }
}
