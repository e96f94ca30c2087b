//! Async Logging - Batched Appender Example
//!
//! Four worker threads log through one pipeline. The appender buffers
//! formatted lines and flushes only when the consumer reports the end of a
//! batch, so each burst costs one write.
//!
//! Run: cargo run --example async_logging

use std::io::{ BufWriter, Write };
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;
use ringlog::{
    EventHandler,
    LogEvent,
    Message,
    PipelineBuilder,
    PipelineConfig,
    Property,
    Sequence,
    ThreadContext,
    WaitStrategyType,
};

const WORKERS: usize = 4;
const EVENTS_PER_WORKER: usize = 25_000;

struct BufferedAppender {
    out: Mutex<BufWriter<Vec<u8>>>,
    flushes: Mutex<u64>,
}

impl EventHandler for BufferedAppender {
    fn on_event(&self, event: &LogEvent, _sequence: Sequence, end_of_batch: bool) -> anyhow::Result<()> {
        let mut out = self.out.lock();
        write!(out, "{} {:<5} [{}] {}", event.timestamp_millis(), event.level(), event.thread_name(), event.logger_name())?;
        for (key, value) in event.context_data().iter() {
            write!(out, " {}={}", key, value)?;
        }
        writeln!(out, " - {}", event.formatted_message())?;
        if end_of_batch {
            out.flush()?;
            *self.flushes.lock() += 1;
        }
        Ok(())
    }

    fn on_shutdown(&self) -> anyhow::Result<()> {
        self.out.lock().flush()?;
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    println!("\n=== Async Logging - Batched Appender ===\n");

    let appender = Arc::new(BufferedAppender {
        out: Mutex::new(BufWriter::with_capacity(64 * 1024, Vec::new())),
        flushes: Mutex::new(0),
    });

    let config = PipelineConfig::new()
        .with_ring_buffer_size(64 * 1024)
        .with_wait_strategy(WaitStrategyType::Sleep);
    let pipeline = PipelineBuilder::new("demo").with_config(config).with_shared_handler(appender.clone()).build()?;
    pipeline.start()?;

    let start = Instant::now();
    let workers: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let logger = pipeline
                .logger("demo.worker")
                .with_properties(vec![Property::new("service", "demo")]);
            thread::Builder
                ::new()
                .name(format!("worker-{}", worker))
                .spawn(move || -> ringlog::Result<()> {
                    ThreadContext::put("worker", worker.to_string());
                    for i in 0..EVENTS_PER_WORKER {
                        logger.info(Message::parameterized("processed item {} of {}", vec![i.to_string(), EVENTS_PER_WORKER.to_string()]))?;
                    }
                    Ok(())
                })
        })
        .collect::<std::io::Result<_>>()?;

    for worker in workers {
        worker.join().map_err(|_| anyhow::anyhow!("worker thread panicked"))??;
    }
    let published = start.elapsed();

    let report = pipeline.stop()?;
    let total = start.elapsed();

    let metrics = pipeline.metrics();
    let bytes = appender.out.lock().get_ref().len();
    println!("Published:  {} events in {:?}", metrics.published, published);
    println!("Drained in: {:?}", total);
    println!("Shutdown:   {:?}", report);
    println!("Flushes:    {} (avg batch {:.1} events)", *appender.flushes.lock(), metrics.average_batch());
    println!("Output:     {} bytes", bytes);
    println!("Metrics:    {}", metrics);

    Ok(())
}
