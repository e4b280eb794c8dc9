//! Worker logger
//!
//! User-facing kernel logs go two places at once:
//!
//! - a `_stream` side-channel record posted to the controller, which turns
//!   it into a `stream` message (and, for errors, an error `execute_reply`)
//!   so the text shows up under the running cell;
//! - a [`LogSink`], the feed of the host's log console.
//!
//! `log` and `warn` go to stdout, `error` to stderr.

use super::{EventSink, WorkerEvent};
use crate::protocol::{SideStream, StreamName, WorkerPost};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

/// Log console severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Critical,
}

/// One log console entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(rename = "kernelId")]
    pub kernel_id: String,
    pub payload: LogPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPayload {
    /// Always `"text"`
    #[serde(rename = "type")]
    pub kind: String,
    pub level: LogLevel,
    pub data: String,
}

/// Destination of log console entries
pub trait LogSink: Send {
    fn post(&self, record: &LogRecord);
}

/// Collects records in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryLogSink {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LogSink for MemoryLogSink {
    fn post(&self, record: &LogRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
    }
}

/// Fans kernel logs out to the controller and the log console
pub struct WorkerLogger {
    kernel_id: String,
    events: EventSink,
    sink: Box<dyn LogSink>,
    /// Attached to error records so they can be matched to a cell
    execution_count: u64,
}

impl WorkerLogger {
    pub fn new(events: EventSink, sink: Box<dyn LogSink>) -> Self {
        Self {
            kernel_id: String::new(),
            events,
            sink,
            execution_count: 0,
        }
    }

    pub fn set_kernel_id(&mut self, kernel_id: impl Into<String>) {
        self.kernel_id = kernel_id.into();
    }

    pub fn set_execution_count(&mut self, count: u64) {
        self.execution_count = count;
    }

    pub fn execution_count(&self) -> u64 {
        self.execution_count
    }

    pub fn log(&self, msg: &str) {
        tracing::info!(kernel = %self.kernel_id, "{}", msg);
        self.side_stream(SideStream {
            name: StreamName::Stdout,
            text: format!("{}\n", msg),
            ename: None,
            evalue: None,
            traceback: Vec::new(),
            execution_count: None,
        });
        self.broadcast(LogLevel::Info, msg);
    }

    pub fn warn(&self, msg: &str) {
        tracing::warn!(kernel = %self.kernel_id, "{}", msg);
        self.side_stream(SideStream {
            name: StreamName::Stdout,
            text: format!("{}\n", msg),
            ename: None,
            evalue: None,
            traceback: Vec::new(),
            execution_count: None,
        });
        self.broadcast(LogLevel::Warning, msg);
    }

    pub fn error(&self, msg: &str) {
        tracing::error!(kernel = %self.kernel_id, execution_count = self.execution_count, "{}", msg);
        self.side_stream(SideStream {
            name: StreamName::Stderr,
            text: msg.to_string(),
            ename: Some("Error".to_string()),
            evalue: Some(msg.to_string()),
            traceback: Vec::new(),
            execution_count: Some(self.execution_count),
        });
        self.broadcast(LogLevel::Critical, msg);
    }

    fn side_stream(&self, stream: SideStream) {
        let post = WorkerPost::Side { stream };
        if self.events.unbounded_send(WorkerEvent::Post(post)).is_err() {
            tracing::debug!("controller gone, dropping log stream");
        }
    }

    fn broadcast(&self, level: LogLevel, data: &str) {
        self.sink.post(&LogRecord {
            kernel_id: self.kernel_id.clone(),
            payload: LogPayload {
                kind: "text".to_string(),
                level,
                data: data.to_string(),
            },
        });
    }
}
