//! Logger.
//!
//! `LogRecord` mirrors the packed wire struct: emitter metadata,
//! consumer metadata, then a message filling the remainder of the
//! dataport. Console/filesystem sinks are named Out-Of-Scope collaborators
//! in this module, so only the `ObserverChain` contract plus a couple of
//! test/embedding sinks ship here; a real sink lives in the ambient stack
//! (crate-level `tracing` diagnostics are a separate concern entirely).

use crate::dataport::DEFAULT_DATAPORT_SIZE;
use crate::error::{CoreError, ErrorCode, Result};
use std::sync::Mutex;

/// Emitter-side metadata size: filter level (1 B) + reserved (1 B).
const EMITTER_META_LEN: usize = 2;
/// Consumer-side metadata size: timestamp (8 B) + emitter id (4 B) + name
/// (13 chars + NUL, 14 B) + consumer filter level (1 B).
const CONSUMER_META_LEN: usize = 8 + 4 + 14 + 1;
/// Maximum emitter name length, NUL-terminated within 14 bytes.
pub const MAX_EMITTER_NAME_LEN: usize = 13;

/// Message capacity for the default dataport size, after both metadata
/// blocks. A static assertion below pins this to the exact layout
/// so a change to either metadata block size is caught at compile time.
pub const MESSAGE_CAPACITY: usize = DEFAULT_DATAPORT_SIZE - EMITTER_META_LEN - CONSUMER_META_LEN;

const _: () = assert!(EMITTER_META_LEN + CONSUMER_META_LEN + MESSAGE_CAPACITY == DEFAULT_DATAPORT_SIZE);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// One log record as it crosses the dataport: emitter metadata, consumer
/// metadata, then the message bytes. Field order is part of the wire
/// layout.
pub struct LogRecord {
    pub emitter_filter_level: LogLevel,
    pub timestamp_ns: u64,
    pub emitter_id: u32,
    pub emitter_name: String,
    pub consumer_filter_level: LogLevel,
    pub message: Vec<u8>,
}

impl LogRecord {
    pub fn encoded_len(&self) -> usize {
        EMITTER_META_LEN + CONSUMER_META_LEN + self.message.len()
    }
}

/// Sink interface an [`ObserverChain`] drives after the consumer applies
/// its own filter. Implementations must not block indefinitely.
pub trait LogObserver: Send + Sync {
    fn notify(&self, record: &LogRecord);
}

/// Discards every record. Useful as a default/no-op sink.
pub struct NullObserver;
impl LogObserver for NullObserver {
    fn notify(&self, _record: &LogRecord) {}
}

/// Collects records in memory, for tests and embedders that want to
/// inspect what was logged without standing up a real sink.
#[derive(Default)]
pub struct InMemoryObserver {
    records: Mutex<Vec<(LogLevel, String, String)>>,
}

impl InMemoryObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<(LogLevel, String, String)> {
        self.records.lock().unwrap().clone()
    }
}

impl LogObserver for InMemoryObserver {
    fn notify(&self, record: &LogRecord) {
        let message = String::from_utf8_lossy(&record.message).into_owned();
        self.records
            .lock()
            .unwrap()
            .push((record.consumer_filter_level, record.emitter_name.clone(), message));
    }
}

/// Ordered set of sinks a `Consumer` notifies after filtering.
#[derive(Default)]
pub struct ObserverChain {
    observers: Vec<std::sync::Arc<dyn LogObserver>>,
}

impl ObserverChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, observer: std::sync::Arc<dyn LogObserver>) {
        self.observers.push(observer);
    }

    pub fn detach_all(&mut self) {
        self.observers.clear();
    }

    pub fn notify(&self, record: &LogRecord) {
        for observer in &self.observers {
            observer.notify(record);
        }
    }
}

/// One emitter's view of the shared dataport. `emit`
/// fills the emitter-metadata half, zeroes the consumer-reserved region,
/// copies the message, and signals the consumer — modeled here as a direct
/// call since the handoff mechanism (semaphore/notification) is out of
/// scope.
pub struct Emitter {
    pub filter_level: LogLevel,
    pub name: String,
    pub id: u32,
}

impl Emitter {
    pub fn new(filter_level: LogLevel, name: String, id: u32) -> Result<Self> {
        if name.len() > MAX_EMITTER_NAME_LEN {
            return Err(CoreError::invalid_parameter(format!(
                "emitter name must be at most {MAX_EMITTER_NAME_LEN} characters"
            )));
        }
        Ok(Self { filter_level, name, id })
    }

    /// Construct a record for `message` at `level`, rejecting input that
    /// would not fit the default dataport's message capacity.
    pub fn emit(&self, consumer: &Consumer, level: LogLevel, timestamp_ns: u64, message: &[u8]) -> Result<()> {
        if level > self.filter_level {
            return Ok(()); // below this emitter's own filter threshold
        }
        if message.len() > MESSAGE_CAPACITY {
            return Err(CoreError::insufficient_space("log message exceeds the dataport's message capacity"));
        }
        let record = LogRecord {
            emitter_filter_level: self.filter_level,
            timestamp_ns,
            emitter_id: self.id,
            emitter_name: self.name.clone(),
            consumer_filter_level: consumer.filter_level,
            message: message.to_vec(),
        };
        consumer.accept(record);
        Ok(())
    }
}

/// Consumer side: applies its own filter, then drives the observer chain.
pub struct Consumer {
    pub filter_level: LogLevel,
    chain: ObserverChain,
}

impl Consumer {
    pub fn new(filter_level: LogLevel, chain: ObserverChain) -> Self {
        Self { filter_level, chain }
    }

    fn accept(&self, record: LogRecord) {
        if record.consumer_filter_level <= self.filter_level {
            self.chain.notify(&record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn emit_below_emitter_filter_is_dropped_silently() {
        let observer = Arc::new(InMemoryObserver::new());
        let mut chain = ObserverChain::new();
        chain.attach(observer.clone());
        let consumer = Consumer::new(LogLevel::Trace, chain);
        let emitter = Emitter::new(LogLevel::Error, "svc".to_string(), 1).unwrap();
        emitter.emit(&consumer, LogLevel::Debug, 0, b"noisy").unwrap();
        assert!(observer.snapshot().is_empty());
    }

    #[test]
    fn emit_within_filter_reaches_observer() {
        let observer = Arc::new(InMemoryObserver::new());
        let mut chain = ObserverChain::new();
        chain.attach(observer.clone());
        let consumer = Consumer::new(LogLevel::Info, chain);
        let emitter = Emitter::new(LogLevel::Info, "svc".to_string(), 1).unwrap();
        emitter.emit(&consumer, LogLevel::Info, 42, b"hello").unwrap();
        let snapshot = observer.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].2, "hello");
    }

    #[test]
    fn message_capacity_matches_dataport_layout() {
        assert_eq!(
            EMITTER_META_LEN + CONSUMER_META_LEN + MESSAGE_CAPACITY,
            DEFAULT_DATAPORT_SIZE
        );
    }

    #[test]
    fn name_too_long_is_rejected() {
        let err = Emitter::new(LogLevel::Info, "way-too-long-emitter-name".to_string(), 1).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParameter);
    }
}
