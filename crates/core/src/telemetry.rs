//! Structured telemetry records for the event pipeline.
//!
//! Every record passes through the sanitizer before leaving the process, so
//! policy-named fields never reach stdout with their original values.

use std::io::Write;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::{Map, Value};

use crate::sanitizer::Sanitizer;

pub trait LogSink: Send + Sync {
    fn emit(&self, record: Value);
}

pub struct StdoutJsonSink {
    sanitizer: Sanitizer,
}

impl StdoutJsonSink {
    pub fn new(sanitizer: Sanitizer) -> Self {
        Self { sanitizer }
    }

    fn render(&self, record: Value) -> String {
        let mut entries = match record {
            Value::Object(entries) => entries,
            other => Map::from_iter([("msg".to_string(), other)]),
        };
        entries.insert("ts".to_string(), Value::from(Utc::now().timestamp_millis()));
        let safe = self.sanitizer.sanitize(&Value::Object(entries));
        safe.to_string()
    }
}

impl LogSink for StdoutJsonSink {
    fn emit(&self, record: Value) {
        let line = self.render(record);
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        let _ = writeln!(handle, "{line}");
    }
}

#[derive(Clone, Default)]
pub struct InMemoryLogSink {
    records: Arc<Mutex<Vec<Value>>>,
}

impl InMemoryLogSink {
    pub fn records(&self) -> Vec<Value> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl LogSink for InMemoryLogSink {
    fn emit(&self, record: Value) {
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}
