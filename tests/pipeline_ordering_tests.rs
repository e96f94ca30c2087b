//! Ordering and delivery tests for the logging pipeline
//!
//! These tests drive the pipeline from several producer threads and verify
//! what the append chain observes on the consumer side.

use std::collections::HashSet;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use ringlog::{
    EventHandler,
    LogEvent,
    PipelineBuilder,
    PipelineConfig,
    Sequence,
    ThreadContext,
    WaitStrategyType,
};

#[derive(Debug, Clone)]
struct Record {
    message: String,
    thread_name: String,
    end_of_batch: bool,
    request: Option<String>,
}

#[derive(Default)]
struct Collector {
    records: Mutex<Vec<Record>>,
}

impl EventHandler for Collector {
    fn on_event(&self, event: &LogEvent, _sequence: Sequence, end_of_batch: bool) -> anyhow::Result<()> {
        self.records.lock().push(Record {
            message: event.formatted_message().into_owned(),
            thread_name: event.thread_name().to_string(),
            end_of_batch,
            request: event.context_data().get("request").map(str::to_owned),
        });
        Ok(())
    }
}

fn config(size: usize, wait_strategy: WaitStrategyType) -> PipelineConfig {
    PipelineConfig::new().with_ring_buffer_size(size).with_wait_strategy(wait_strategy)
}

/// Events from one thread arrive in call order
#[test]
fn test_single_producer_ordering() {
    const EVENTS: usize = 20_000;

    for wait_strategy in [WaitStrategyType::Block, WaitStrategyType::Sleep, WaitStrategyType::Yield] {
        let collector = Arc::new(Collector::default());
        let pipeline = PipelineBuilder::new("single-producer")
            .with_config(config(1024, wait_strategy))
            .with_shared_handler(collector.clone())
            .build()
            .unwrap();
        pipeline.start().unwrap();

        let logger = pipeline.logger("ordering");
        for i in 0..EVENTS {
            logger.info(i.to_string()).unwrap();
        }
        let report = pipeline.stop().unwrap().unwrap();
        assert!(report.drained);

        let records = collector.records.lock();
        assert_eq!(records.len(), EVENTS, "{}", wait_strategy);
        for (expected, record) in records.iter().enumerate() {
            assert_eq!(record.message, expected.to_string(), "{}", wait_strategy);
        }

        println!("\n=== Single Producer Ordering ({}) ===", wait_strategy);
        println!("Delivered: {}", records.len());
        println!("Metrics: {}", pipeline.metrics());
    }
}

/// P producers x M events: all delivered once, each producer in order
#[test]
fn test_concurrent_producers_no_loss() {
    const PRODUCERS: usize = 4;
    const EVENTS_PER_PRODUCER: usize = 10_000;

    let collector = Arc::new(Collector::default());
    let pipeline = PipelineBuilder::new("multi-producer")
        .with_config(config(1024, WaitStrategyType::Sleep))
        .with_shared_handler(collector.clone())
        .build()
        .unwrap();
    pipeline.start().unwrap();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let logger = pipeline.logger("producers");
            thread::Builder
                ::new()
                .name(format!("producer-{}", p))
                .spawn(move || {
                    for i in 0..EVENTS_PER_PRODUCER {
                        logger.info(format!("{}:{}", p, i)).unwrap();
                    }
                })
                .unwrap()
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }
    let report = pipeline.stop().unwrap().unwrap();
    assert!(report.drained);

    let records = collector.records.lock();
    assert_eq!(records.len(), PRODUCERS * EVENTS_PER_PRODUCER);

    let distinct: HashSet<&str> = records
        .iter()
        .map(|r| r.message.as_str())
        .collect();
    assert_eq!(distinct.len(), PRODUCERS * EVENTS_PER_PRODUCER);

    let mut next_expected = vec![0usize; PRODUCERS];
    for record in records.iter() {
        let (producer, index) = record.message.split_once(':').unwrap();
        let producer: usize = producer.parse().unwrap();
        let index: usize = index.parse().unwrap();
        assert_eq!(index, next_expected[producer], "producer {} out of order", producer);
        assert_eq!(record.thread_name, format!("producer-{}", producer));
        next_expected[producer] += 1;
    }

    let metrics = pipeline.metrics();
    println!("\n=== Concurrent Producers ===");
    println!("Producers: {} x {}", PRODUCERS, EVENTS_PER_PRODUCER);
    println!("Metrics: {}", metrics);
    println!("Average batch: {:.1}", metrics.average_batch());
    assert_eq!(metrics.published, (PRODUCERS * EVENTS_PER_PRODUCER) as u64);
    assert_eq!(metrics.processed, metrics.published);
}

/// Exactly one event per drain pass carries the end-of-batch flag, and it
/// is the last one of the pass
#[test]
fn test_end_of_batch_marks_last_event_of_each_pass() {
    let collector = Arc::new(Collector::default());
    let pipeline = PipelineBuilder::new("end-of-batch")
        .with_config(config(256, WaitStrategyType::Block))
        .with_shared_handler(collector.clone())
        .build()
        .unwrap();
    pipeline.start().unwrap();

    let logger = pipeline.logger("batches");
    for burst in 0..20 {
        for i in 0..50 {
            logger.info(format!("{}-{}", burst, i)).unwrap();
        }
        thread::sleep(Duration::from_millis(2));
    }
    pipeline.stop().unwrap();

    let records = collector.records.lock();
    let flagged = records
        .iter()
        .filter(|r| r.end_of_batch)
        .count();
    let metrics = pipeline.metrics();
    assert_eq!(records.len(), 1000);
    assert_eq!(flagged as u64, metrics.batches);
    assert!(records.last().unwrap().end_of_batch);

    println!("\n=== End Of Batch ===");
    println!("Events: {} Batches: {}", records.len(), metrics.batches);
}

/// The consumer sees the context as it was at the log call
#[test]
fn test_context_snapshot_isolation() {
    let gate = Arc::new(AtomicBool::new(false));
    let collector = Arc::new(Collector::default());

    let handler = {
        let gate = gate.clone();
        let collector = collector.clone();
        move |event: &LogEvent, sequence: Sequence, end_of_batch: bool| -> anyhow::Result<()> {
            while !gate.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(1));
            }
            collector.on_event(event, sequence, end_of_batch)
        }
    };
    let pipeline = PipelineBuilder::new("context")
        .with_config(config(128, WaitStrategyType::Sleep))
        .with_handler(handler)
        .build()
        .unwrap();
    pipeline.start().unwrap();

    let logger = pipeline.logger("context");
    ThreadContext::clear_all();
    ThreadContext::put("request", "first");
    logger.info("one").unwrap();
    ThreadContext::put("request", "second");
    logger.info("two").unwrap();
    ThreadContext::remove("request");
    logger.info("three").unwrap();

    gate.store(true, Ordering::Release);
    pipeline.stop().unwrap();

    let records = collector.records.lock();
    let requests: Vec<Option<&str>> = records
        .iter()
        .map(|r| r.request.as_deref())
        .collect();
    assert_eq!(requests, [Some("first"), Some("second"), None]);
}

/// Handler errors and panics are isolated to their own event
#[test]
fn test_consumer_survives_handler_failures() {
    const EVENTS: usize = 1_000;

    let collector = Arc::new(Collector::default());
    let handler = {
        let collector = collector.clone();
        move |event: &LogEvent, sequence: Sequence, end_of_batch: bool| -> anyhow::Result<()> {
            let index: usize = event.formatted_message().parse()?;
            if index % 7 == 0 {
                anyhow::bail!("rejecting event {}", index);
            }
            if index % 13 == 0 {
                panic!("appender crashed on event {}", index);
            }
            collector.on_event(event, sequence, end_of_batch)
        }
    };
    let pipeline = PipelineBuilder::new("resilience")
        .with_config(config(256, WaitStrategyType::Yield).with_exception_handler("ignore"))
        .with_handler(handler)
        .build()
        .unwrap();
    pipeline.start().unwrap();

    let logger = pipeline.logger("resilience");
    for i in 0..EVENTS {
        logger.info(i.to_string()).unwrap();
    }
    let report = pipeline.stop().unwrap().unwrap();
    assert!(report.drained);

    let failing = (0..EVENTS).filter(|i| i % 7 == 0 || i % 13 == 0).count();
    let records = collector.records.lock();
    assert_eq!(records.len(), EVENTS - failing);
    assert_eq!(pipeline.metrics().handler_failures, failing as u64);
    assert_eq!(pipeline.metrics().processed, EVENTS as u64);

    let expected: Vec<String> = (0..EVENTS)
        .filter(|i| i % 7 != 0 && i % 13 != 0)
        .map(|i| i.to_string())
        .collect();
    let delivered: Vec<String> = records
        .iter()
        .map(|r| r.message.clone())
        .collect();
    assert_eq!(delivered, expected);
}
