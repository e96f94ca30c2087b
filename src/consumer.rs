//! Batch consumer: the single thread that drains the ring buffer into the
//! append chain.

use std::panic::{ catch_unwind, AssertUnwindSafe };
use std::sync::Arc;

use crate::disruptor::{ MpscRingBuffer, RingBufferEntry, Sequence };
use crate::error::PipelineError;
use crate::event::LogEvent;
use crate::exception::{ ExceptionHandler, HandlerFailure };
use crate::metrics::PipelineMetrics;

/// Sequence passed to the append chain for events that bypassed the ring
/// buffer on the synchronous queue-full route.
pub const SYNCHRONOUS_SEQUENCE: Sequence = Sequence::MAX;

/// The downstream append chain.
///
/// Called from the consumer thread and, on the synchronous queue-full
/// route, from producer threads, so implementations take `&self`.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &LogEvent, sequence: Sequence, end_of_batch: bool) -> anyhow::Result<()>;

    fn on_start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<F> EventHandler for F
    where F: Fn(&LogEvent, Sequence, bool) -> anyhow::Result<()> + Send + Sync
{
    fn on_event(&self, event: &LogEvent, sequence: Sequence, end_of_batch: bool) -> anyhow::Result<()> {
        self(event, sequence, end_of_batch)
    }
}

/// Handler plus the exception barrier around it.
pub(crate) struct AppendChain {
    handler: Arc<dyn EventHandler>,
    exception_handler: Arc<dyn ExceptionHandler>,
    metrics: Arc<PipelineMetrics>,
}

impl AppendChain {
    pub(crate) fn new(
        handler: Arc<dyn EventHandler>,
        exception_handler: Arc<dyn ExceptionHandler>,
        metrics: Arc<PipelineMetrics>
    ) -> Self {
        Self { handler, exception_handler, metrics }
    }

    /// Deliver one event. Never unwinds into the caller.
    pub(crate) fn append(&self, event: &LogEvent, sequence: Sequence, end_of_batch: bool) {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.handler.on_event(event, sequence, end_of_batch)));
        let failure = match outcome {
            Ok(Ok(())) => {
                return;
            }
            Ok(Err(err)) => HandlerFailure::Error(err),
            Err(payload) => HandlerFailure::from_panic(payload),
        };
        self.metrics.record_handler_failure();
        let handled = catch_unwind(
            AssertUnwindSafe(|| self.exception_handler.handle_event_exception(&failure, sequence, event))
        );
        if let Err(payload) = handled {
            tracing::error!(
                sequence,
                handler = self.exception_handler.name(),
                error = %HandlerFailure::from_panic(payload),
                original = %failure,
                "exception handler panicked"
            );
        }
    }

    fn start(&self) {
        self.lifecycle_hook(|| self.handler.on_start(), |failure| {
            self.exception_handler.handle_on_start_exception(failure)
        });
    }

    fn shutdown(&self) {
        self.lifecycle_hook(|| self.handler.on_shutdown(), |failure| {
            self.exception_handler.handle_on_shutdown_exception(failure)
        });
    }

    fn lifecycle_hook(&self, hook: impl FnOnce() -> anyhow::Result<()>, report: impl FnOnce(&HandlerFailure)) {
        let failure = match catch_unwind(AssertUnwindSafe(hook)) {
            Ok(Ok(())) => {
                return;
            }
            Ok(Err(err)) => HandlerFailure::Error(err),
            Err(payload) => HandlerFailure::from_panic(payload),
        };
        if catch_unwind(AssertUnwindSafe(|| report(&failure))).is_err() {
            tracing::error!(error = %failure, "exception handler panicked in lifecycle hook");
        }
    }
}

/// Runs on the dedicated consumer thread until the ring buffer is halted.
pub struct BatchEventProcessor {
    ring: Arc<MpscRingBuffer<LogEvent>>,
    chain: Arc<AppendChain>,
    metrics: Arc<PipelineMetrics>,
    progress_interval: usize,
}

impl BatchEventProcessor {
    pub(crate) fn new(
        ring: Arc<MpscRingBuffer<LogEvent>>,
        chain: Arc<AppendChain>,
        metrics: Arc<PipelineMetrics>,
        progress_interval: usize
    ) -> Self {
        Self {
            ring,
            chain,
            metrics,
            progress_interval: progress_interval.max(1),
        }
    }

    pub fn run(&self) {
        tracing::trace!(
            wait_strategy = self.ring.wait_strategy().name(),
            buffer_size = self.ring.buffer_size(),
            "consumer started"
        );
        self.chain.start();

        let wait_strategy = self.ring.wait_strategy().clone();
        let mut next = self.ring.consumer_sequence();
        // a halt ends processing even with a backlog
        while !self.ring.is_halted() {
            match wait_strategy.wait_for(next, &*self.ring) {
                Ok(available) => {
                    next = self.process_run(next, available);
                }
                Err(PipelineError::Timeout) => {
                    tracing::trace!(next, "consumer wait timed out");
                }
                Err(PipelineError::Alerted) => {
                    break;
                }
                Err(err) => {
                    tracing::error!(error = %err, next, "consumer wait failed, stopping");
                    break;
                }
            }
        }

        self.chain.shutdown();
        tracing::trace!(processed = next, "consumer stopped");
    }

    /// Hand `[next, available)` to the append chain; returns the new `next`.
    /// A halt abandons the rest of the run after one more event, which is
    /// flagged as the end of the batch.
    fn process_run(&self, next: Sequence, available: Sequence) -> Sequence {
        let mut sequence = next;
        let mut since_report = 0usize;
        while sequence < available {
            let halting = self.ring.is_halted();
            let end_of_batch = halting || sequence + 1 == available;
            // SAFETY: `sequence` is published and not yet reported consumed,
            // so no producer can claim this slot until update_consumer passes it.
            let event = unsafe { self.ring.slot_mut(sequence) };
            event.set_end_of_batch(end_of_batch);
            event.finalize_properties();
            self.chain.append(event, sequence, end_of_batch);
            event.clear();

            sequence += 1;
            if halting {
                break;
            }
            since_report += 1;
            if since_report == self.progress_interval && sequence < available {
                self.ring.update_consumer(sequence);
                since_report = 0;
            }
        }
        if sequence > next {
            self.ring.update_consumer(sequence);
            self.metrics.record_batch(sequence - next);
        }
        sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_PROGRESS_INTERVAL;
    use crate::disruptor::{ BlockingWaitStrategy, SleepingWaitStrategy };
    use crate::event::{ Level, Message };
    use crate::exception::LoggingExceptionHandler;
    use parking_lot::Mutex;
    use std::sync::atomic::{ AtomicUsize, Ordering };
    use std::thread;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(Sequence, String, bool)>>,
        started: AtomicUsize,
        stopped: AtomicUsize,
    }

    impl EventHandler for Recorder {
        fn on_event(&self, event: &LogEvent, sequence: Sequence, end_of_batch: bool) -> anyhow::Result<()> {
            assert_eq!(event.is_end_of_batch(), end_of_batch);
            let message = event.formatted_message().into_owned();
            if message == "fail" {
                anyhow::bail!("refused");
            }
            if message == "panic" {
                panic!("handler panic");
            }
            self.seen.lock().push((sequence, message, end_of_batch));
            Ok(())
        }

        fn on_start(&self) -> anyhow::Result<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn on_shutdown(&self) -> anyhow::Result<()> {
            self.stopped.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn publish(ring: &MpscRingBuffer<LogEvent>, messages: &[&'static str]) {
        let first = ring.try_claim(messages.len()).unwrap();
        for (i, message) in messages.iter().enumerate() {
            let sequence = first + (i as u64);
            unsafe {
                let slot = ring.slot_mut(sequence);
                slot.level = Level::Info;
                slot.message = Message::from(*message);
                slot.populated = true;
            }
        }
        // publish the tail first so the consumer sees one run
        for i in (0..messages.len()).rev() {
            ring.publish(first + (i as u64));
        }
    }

    fn processor(
        ring: &Arc<MpscRingBuffer<LogEvent>>,
        handler: Arc<Recorder>,
        metrics: &Arc<PipelineMetrics>
    ) -> BatchEventProcessor {
        let chain = Arc::new(AppendChain::new(handler, Arc::new(LoggingExceptionHandler), metrics.clone()));
        BatchEventProcessor::new(ring.clone(), chain, metrics.clone(), 2)
    }

    #[test]
    fn test_batch_end_flag_and_order() {
        let ring = Arc::new(MpscRingBuffer::new(128, Arc::new(SleepingWaitStrategy::default())).unwrap());
        let handler = Arc::new(Recorder::default());
        let metrics = Arc::new(PipelineMetrics::new());
        publish(&ring, &["a", "b", "c", "d", "e"]);

        let consumer = processor(&ring, handler.clone(), &metrics);
        let worker = thread::spawn(move || consumer.run());
        while ring.has_backlog() {
            thread::yield_now();
        }
        ring.halt();
        worker.join().unwrap();

        let seen = handler.seen.lock();
        let messages: Vec<&str> = seen.iter().map(|(_, m, _)| m.as_str()).collect();
        assert_eq!(messages, ["a", "b", "c", "d", "e"]);
        assert_eq!(seen.iter().map(|(s, _, _)| *s).collect::<Vec<_>>(), [0, 1, 2, 3, 4]);
        let flagged: Vec<bool> = seen.iter().map(|(_, _, eob)| *eob).collect();
        assert_eq!(flagged, [false, false, false, false, true]);
        assert_eq!(handler.started.load(Ordering::SeqCst), 1);
        assert_eq!(handler.stopped.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.snapshot().processed, 5);
    }

    #[test]
    fn test_failures_do_not_stop_consumer() {
        let ring = Arc::new(MpscRingBuffer::new(128, Arc::new(BlockingWaitStrategy::new())).unwrap());
        let handler = Arc::new(Recorder::default());
        let metrics = Arc::new(PipelineMetrics::new());
        let consumer = processor(&ring, handler.clone(), &metrics);
        let worker = thread::spawn(move || consumer.run());

        publish(&ring, &["one", "fail", "two", "panic", "three"]);
        while ring.has_backlog() {
            thread::yield_now();
        }
        ring.halt();
        worker.join().unwrap();

        let seen = handler.seen.lock();
        let messages: Vec<&str> = seen.iter().map(|(_, m, _)| m.as_str()).collect();
        assert_eq!(messages, ["one", "two", "three"]);
        assert_eq!(metrics.snapshot().handler_failures, 2);
    }

    #[test]
    fn test_slots_cleared_after_processing() {
        let ring = Arc::new(MpscRingBuffer::new(128, Arc::new(SleepingWaitStrategy::default())).unwrap());
        let metrics = Arc::new(PipelineMetrics::new());
        let consumer = processor(&ring, Arc::new(Recorder::default()), &metrics);
        publish(&ring, &["x", "y"]);
        let worker = thread::spawn(move || consumer.run());
        while ring.has_backlog() {
            thread::yield_now();
        }
        ring.halt();
        worker.join().unwrap();

        for sequence in 0..2 {
            let slot = unsafe { ring.slot(sequence) };
            assert!(!slot.is_populated());
            assert!(slot.message().is_empty());
        }
    }

    #[test]
    fn test_progress_frees_capacity_within_run() {
        let ring = Arc::new(MpscRingBuffer::new(128, Arc::new(SleepingWaitStrategy::default())).unwrap());
        let messages = vec!["fill"; 128];
        publish(&ring, &messages);
        assert_eq!(ring.remaining_capacity(), 0);

        let capacity_at: Arc<Mutex<Vec<(Sequence, usize)>>> = Arc::new(Mutex::new(Vec::new()));
        let handler = {
            let ring = ring.clone();
            let capacity_at = capacity_at.clone();
            move |_: &LogEvent, sequence: Sequence, _: bool| -> anyhow::Result<()> {
                if sequence == 10 || sequence == 110 {
                    capacity_at.lock().push((sequence, ring.remaining_capacity()));
                }
                Ok(())
            }
        };
        let metrics = Arc::new(PipelineMetrics::new());
        let chain = Arc::new(AppendChain::new(Arc::new(handler), Arc::new(LoggingExceptionHandler), metrics.clone()));
        let consumer = BatchEventProcessor::new(ring.clone(), chain, metrics.clone(), DEFAULT_PROGRESS_INTERVAL);
        let worker = thread::spawn(move || consumer.run());
        while ring.has_backlog() {
            thread::yield_now();
        }
        ring.halt();
        worker.join().unwrap();

        // progress is reported at sequences 50 and 100 of the single run
        assert_eq!(*capacity_at.lock(), [(10, 0), (110, 100)]);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.batches, 1);
        assert_eq!(snapshot.processed, 128);
    }

    #[test]
    fn test_halt_flags_last_delivered_event() {
        let ring = Arc::new(MpscRingBuffer::new(128, Arc::new(BlockingWaitStrategy::new())).unwrap());
        let messages = vec!["queued"; 20];
        publish(&ring, &messages);

        let flags: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(Vec::new()));
        let handler = {
            let ring = ring.clone();
            let flags = flags.clone();
            move |_: &LogEvent, sequence: Sequence, end_of_batch: bool| -> anyhow::Result<()> {
                flags.lock().push(end_of_batch);
                if sequence == 4 {
                    ring.halt();
                }
                Ok(())
            }
        };
        let metrics = Arc::new(PipelineMetrics::new());
        let chain = Arc::new(AppendChain::new(Arc::new(handler), Arc::new(LoggingExceptionHandler), metrics.clone()));
        let consumer = BatchEventProcessor::new(ring.clone(), chain, metrics.clone(), DEFAULT_PROGRESS_INTERVAL);
        thread::spawn(move || consumer.run()).join().unwrap();

        // the event after the halt is delivered with the flag, the rest are abandoned
        assert_eq!(*flags.lock(), [false, false, false, false, false, true]);
        assert_eq!(ring.consumer_sequence(), 6);
        assert_eq!(metrics.snapshot().batches, 1);
    }

    #[test]
    fn test_closure_handler() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let handler = move |_: &LogEvent, _: Sequence, _: bool| -> anyhow::Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };
        let chain = AppendChain::new(
            Arc::new(handler),
            Arc::new(LoggingExceptionHandler),
            Arc::new(PipelineMetrics::new())
        );
        chain.append(&LogEvent::default(), SYNCHRONOUS_SEQUENCE, false);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
