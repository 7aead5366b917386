//! Analytics sink adapter
//!
//! The sink is the only thing the observers share. It merges the resolved
//! participant identity and a per-page-load id into every payload, forwards
//! to the external analytics backend, and swallows every backend failure:
//! tracking must never break the host page. Submissions before the backend
//! has finished initializing are dropped, not queued.

use crate::error::TrackError;
use crate::types::TrackedEvent;
use serde_json::Value;
use std::io::Write;
use uuid::Uuid;

/// Payload key under which the participant identity is merged.
pub const IDENTITY_KEY: &str = "participant_id";

/// Payload key for the per-page-load identifier.
pub const LOAD_ID_KEY: &str = "load_id";

/// External analytics collaborator (e.g. a GA4-style script).
///
/// `submit` receives the event name and a JSON object of properties. Errors
/// are reported honestly by backends and swallowed by the adapter.
pub trait AnalyticsBackend {
    fn submit(&mut self, name: &str, properties: &Value) -> Result<(), TrackError>;
}

/// Identity-merging, failure-swallowing front of the analytics backend.
pub struct SinkAdapter {
    backend: Box<dyn AnalyticsBackend>,
    identity: Option<String>,
    load_id: Uuid,
    ready: bool,
    dropped: u64,
}

impl SinkAdapter {
    /// Create an adapter in the not-yet-ready state. Events tracked before
    /// [`SinkAdapter::mark_ready`] are dropped.
    pub fn new(backend: Box<dyn AnalyticsBackend>, identity: Option<String>) -> Self {
        Self {
            backend,
            identity,
            load_id: Uuid::new_v4(),
            ready: false,
            dropped: 0,
        }
    }

    /// Signal that the backend script has finished loading.
    pub fn mark_ready(&mut self) {
        self.ready = true;
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn load_id(&self) -> Uuid {
        self.load_id
    }

    /// Number of events dropped because the backend was not ready.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Forward an event to the backend. Never fails and never panics; a
    /// backend error is logged and discarded, and the event is not retried.
    pub fn track(&mut self, event: &TrackedEvent) {
        if !self.ready {
            self.dropped += 1;
            log::debug!("sink not ready, dropping {}", event.name());
            return;
        }

        let mut properties = match serde_json::to_value(event) {
            Ok(Value::Object(mut map)) => {
                map.remove("event");
                map
            }
            _ => serde_json::Map::new(),
        };
        if let Some(id) = &self.identity {
            properties.insert(IDENTITY_KEY.to_string(), Value::String(id.clone()));
        }
        properties.insert(
            LOAD_ID_KEY.to_string(),
            Value::String(self.load_id.to_string()),
        );

        if let Err(e) = self.backend.submit(event.name(), &Value::Object(properties)) {
            log::warn!("analytics submit failed for {}: {}", event.name(), e);
        }
    }
}

/// In-memory backend capturing submissions, for tests and dry runs.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    submissions: Vec<(String, Value)>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submissions(&self) -> &[(String, Value)] {
        &self.submissions
    }

    pub fn names(&self) -> Vec<&str> {
        self.submissions.iter().map(|(n, _)| n.as_str()).collect()
    }
}

impl AnalyticsBackend for RecordingBackend {
    fn submit(&mut self, name: &str, properties: &Value) -> Result<(), TrackError> {
        self.submissions.push((name.to_string(), properties.clone()));
        Ok(())
    }
}

/// Backend that writes one JSON object per line to any writer, for
/// materializing replayed events as NDJSON.
pub struct JsonLinesBackend<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesBackend<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> AnalyticsBackend for JsonLinesBackend<W> {
    fn submit(&mut self, name: &str, properties: &Value) -> Result<(), TrackError> {
        let mut record = serde_json::Map::new();
        record.insert("event".to_string(), Value::String(name.to_string()));
        if let Value::Object(props) = properties {
            for (k, v) in props {
                record.insert(k.clone(), v.clone());
            }
        }
        let line = serde_json::to_string(&Value::Object(record))?;
        writeln!(self.writer, "{}", line).map_err(|e| TrackError::Backend(e.to_string()))
    }
}
