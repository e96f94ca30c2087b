//! The reusable ring buffer slot.

use std::borrow::Cow;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use crate::context::{ ContextData, ContextStack };
use crate::disruptor::RingBufferEntry;
use crate::event::{ Level, Marker, Message, Property, Thrown };

/// One log event. Slots are allocated once with the ring buffer and
/// repopulated for every sequence that maps onto them.
#[derive(Clone)]
pub struct LogEvent {
    pub(crate) level: Level,
    pub(crate) logger_name: Arc<str>,
    pub(crate) marker: Option<Marker>,
    pub(crate) message: Message,
    pub(crate) thrown: Option<Thrown>,
    pub(crate) context_data: ContextData,
    pub(crate) context_stack: ContextStack,
    pub(crate) thread_id: u64,
    pub(crate) thread_name: Arc<str>,
    pub(crate) location: Option<&'static Location<'static>>,
    pub(crate) timestamp_millis: i64,
    pub(crate) end_of_batch: bool,
    pub(crate) properties: Option<Arc<[Property]>>,
    pub(crate) populated: bool,
}

impl Default for LogEvent {
    fn default() -> Self {
        Self {
            level: Level::Off,
            logger_name: Arc::from(""),
            marker: None,
            message: Message::default(),
            thrown: None,
            context_data: ContextData::new(),
            context_stack: ContextStack::new(),
            thread_id: 0,
            thread_name: Arc::from(""),
            location: None,
            timestamp_millis: 0,
            end_of_batch: false,
            properties: None,
            populated: false,
        }
    }
}

impl LogEvent {
    pub fn level(&self) -> Level {
        self.level
    }

    pub fn logger_name(&self) -> &str {
        &self.logger_name
    }

    pub fn marker(&self) -> Option<&Marker> {
        self.marker.as_ref()
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn formatted_message(&self) -> Cow<'_, str> {
        self.message.formatted()
    }

    pub fn thrown(&self) -> Option<&Thrown> {
        self.thrown.as_ref()
    }

    pub fn context_data(&self) -> &ContextData {
        &self.context_data
    }

    pub fn context_stack(&self) -> &ContextStack {
        &self.context_stack
    }

    pub fn thread_id(&self) -> u64 {
        self.thread_id
    }

    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Call site, present only when location capture is enabled
    pub fn location(&self) -> Option<&'static Location<'static>> {
        self.location
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp_millis
    }

    /// `true` on the last event of a consumer drain pass; buffered appenders
    /// flush when they see it
    pub fn is_end_of_batch(&self) -> bool {
        self.end_of_batch
    }

    pub fn is_populated(&self) -> bool {
        self.populated
    }

    pub(crate) fn set_end_of_batch(&mut self, end_of_batch: bool) {
        self.end_of_batch = end_of_batch;
    }

    /// Merge the logger's configured properties into the context snapshot.
    /// Runs on the consumer thread, off the producer's publish path.
    pub(crate) fn finalize_properties(&mut self) {
        if let Some(properties) = self.properties.take() {
            self.context_data = self.context_data.merged_with(&properties);
        }
    }
}

impl RingBufferEntry for LogEvent {
    fn clear(&mut self) {
        self.level = Level::Off;
        self.marker = None;
        self.message = Message::default();
        self.thrown = None;
        self.context_data = ContextData::new();
        self.context_stack = ContextStack::new();
        self.location = None;
        self.end_of_batch = false;
        self.properties = None;
        self.populated = false;
        // logger and thread names are cheap `Arc`s and usually reused by
        // the next event on this slot
    }
}

impl fmt::Debug for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogEvent")
            .field("level", &self.level)
            .field("logger_name", &self.logger_name)
            .field("marker", &self.marker)
            .field("message", &self.message)
            .field("thrown", &self.thrown.as_ref().map(|t| t.to_string()))
            .field("context_data", &self.context_data)
            .field("context_stack", &self.context_stack)
            .field("thread_name", &self.thread_name)
            .field("location", &self.location)
            .field("timestamp_millis", &self.timestamp_millis)
            .field("end_of_batch", &self.end_of_batch)
            .finish()
    }
}
