// crates/aqualab-api/src/telemetry.rs
// ============================================================================
// Module: Service Events
// Description: Structured JSON-line events for service operations.
// Purpose: Record lifecycle and failure events without a logging framework.
// Dependencies: aqualab-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Service events are flat JSON objects with `event`, `level`, and
//! `timestamp_ms` plus event-specific fields. Sinks write one event per line
//! so deployments can route them to any log pipeline. Sink failures are
//! swallowed; logging never fails a request.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use aqualab_core::Timestamp;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Returns the current wall-clock time.
#[must_use]
pub fn now_timestamp() -> Timestamp {
    let millis = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
    Timestamp::from_unix_millis(i64::try_from(millis).unwrap_or(i64::MAX))
}

// ============================================================================
// SECTION: Events
// ============================================================================

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    /// Routine operation.
    Info,
    /// Degraded operation; the request path continued.
    Warn,
    /// Failed operation.
    Error,
}

/// Structured service event.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Severity.
    pub level: EventLevel,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Event-specific fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ServiceEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(level: EventLevel, event: &'static str) -> Self {
        Self {
            event,
            level,
            timestamp_ms: now_timestamp().as_unix_millis(),
            fields: Map::new(),
        }
    }

    /// Creates an info event.
    #[must_use]
    pub fn info(event: &'static str) -> Self {
        Self::new(EventLevel::Info, event)
    }

    /// Creates a warning event.
    #[must_use]
    pub fn warn(event: &'static str) -> Self {
        Self::new(EventLevel::Warn, event)
    }

    /// Creates an error event.
    #[must_use]
    pub fn error(event: &'static str) -> Self {
        Self::new(EventLevel::Error, event)
    }

    /// Adds a field.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Destination for service events.
pub trait EventSink: Send + Sync {
    /// Records an event.
    fn record(&self, event: &ServiceEvent);
}

/// Sink that logs JSON lines to stderr.
pub struct StderrEventSink;

impl EventSink for StderrEventSink {
    fn record(&self, event: &ServiceEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Sink that appends JSON lines to a file.
pub struct FileEventSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileEventSink {
    /// Opens the event log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl EventSink for FileEventSink {
    fn record(&self, event: &ServiceEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// Sink that discards events.
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn record(&self, _event: &ServiceEvent) {}
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use std::fs;

    use serde_json::Value;

    use super::EventSink;
    use super::FileEventSink;
    use super::ServiceEvent;

    #[test]
    fn events_flatten_fields_next_to_envelope() {
        let event = ServiceEvent::warn("audit_queue_full").with("route", "/api/muestras");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "audit_queue_full");
        assert_eq!(value["level"], "warn");
        assert_eq!(value["route"], "/api/muestras");
        assert!(value["timestamp_ms"].as_i64().unwrap() > 0);
    }

    #[test]
    fn file_sink_appends_one_line_per_event() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("events.jsonl");
        let sink = FileEventSink::new(&path).unwrap();
        sink.record(&ServiceEvent::info("server_started"));
        sink.record(&ServiceEvent::info("server_stopped"));
        let content = fs::read_to_string(&path).unwrap();
        let events: Vec<Value> =
            content.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1]["event"], "server_stopped");
    }
}
