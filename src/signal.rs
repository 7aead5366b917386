//! adunit.signal.v1 schema definition
//!
//! The wire form of everything the host page forwards to the engine: playback
//! signals from a native media element, opaque cross-frame messages from an
//! embedded player, carousel position changes, the start-gate gesture, and
//! page-lifecycle signals. Recorded logs of these signals can be replayed
//! deterministically through an [`crate::session::AdUnitSession`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TrackError;

/// Current schema version
pub const SCHEMA_VERSION: &str = "adunit.signal.v1";

/// A raw interaction signal as observed on the host page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSignal {
    /// Schema version identifier
    pub schema_version: String,
    /// When the signal was observed on the page (UTC)
    pub timestamp: DateTime<Utc>,
    /// The signal itself
    pub signal: Signal,
}

/// Signal vocabulary of the host page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Signal {
    /// Native media element started or resumed playback. Carries the element
    /// duration when the page can read it synchronously at play time.
    VideoPlay {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_s: Option<f64>,
    },
    /// Native media element paused.
    VideoPause,
    /// Synchronous position read from a native media element.
    VideoPosition { position_s: f64, duration_s: f64 },
    /// Native media element reached its natural end.
    VideoEnded,
    /// Opaque message received from the embedded player frame. Malformed
    /// payloads are ignored downstream, never rejected here.
    FrameMessage { data: serde_json::Value },
    /// The start-gate overlay was dismissed by an explicit user gesture.
    GateDismissed,
    /// Horizontal offset of the slide container, as a percentage of the
    /// container width (0 for slide 0, -100 for slide 1, ...).
    CarouselOffset { offset_pct: f64 },
    /// Explicit index notification from a container that exposes one.
    CarouselIndex { index: usize },
    /// Page became hidden (tab switch, minimize).
    PageHidden,
    /// Page is about to unload.
    PageUnload,
}

impl Signal {
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::VideoPlay { .. } => "video_play",
            Signal::VideoPause => "video_pause",
            Signal::VideoPosition { .. } => "video_position",
            Signal::VideoEnded => "video_ended",
            Signal::FrameMessage { .. } => "frame_message",
            Signal::GateDismissed => "gate_dismissed",
            Signal::CarouselOffset { .. } => "carousel_offset",
            Signal::CarouselIndex { .. } => "carousel_index",
            Signal::PageHidden => "page_hidden",
            Signal::PageUnload => "page_unload",
        }
    }
}

impl RawSignal {
    pub fn new(timestamp: DateTime<Utc>, signal: Signal) -> Self {
        RawSignal {
            schema_version: SCHEMA_VERSION.to_string(),
            timestamp,
            signal,
        }
    }

    /// Validate the signal against the schema.
    pub fn validate(&self) -> Result<(), TrackError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(TrackError::UnsupportedSchema(self.schema_version.clone()));
        }

        match &self.signal {
            Signal::VideoPlay {
                duration_s: Some(duration_s),
            } => {
                if !duration_s.is_finite() || *duration_s < 0.0 {
                    return Err(TrackError::InvalidSignal(format!(
                        "video_play duration_s must be a non-negative number, got {}",
                        duration_s
                    )));
                }
                Ok(())
            }
            Signal::VideoPosition {
                position_s,
                duration_s,
            } => {
                if !position_s.is_finite() || *position_s < 0.0 {
                    return Err(TrackError::InvalidSignal(format!(
                        "video_position position_s must be a non-negative number, got {}",
                        position_s
                    )));
                }
                if !duration_s.is_finite() || *duration_s < 0.0 {
                    return Err(TrackError::InvalidSignal(format!(
                        "video_position duration_s must be a non-negative number, got {}",
                        duration_s
                    )));
                }
                Ok(())
            }
            Signal::CarouselOffset { offset_pct } => {
                if !offset_pct.is_finite() {
                    return Err(TrackError::InvalidSignal(
                        "carousel_offset offset_pct must be finite".to_string(),
                    ));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Parsing and validation helpers for recorded signal logs.
pub struct SignalLog;

impl SignalLog {
    /// Parse a JSON array of raw signals.
    pub fn parse_array(json: &str) -> Result<Vec<RawSignal>, TrackError> {
        let signals: Vec<RawSignal> = serde_json::from_str(json)?;
        Ok(signals)
    }

    /// Parse NDJSON (newline-delimited JSON), one signal per line.
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<RawSignal>, TrackError> {
        let mut signals = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<RawSignal>(trimmed) {
                Ok(signal) => signals.push(signal),
                Err(e) => {
                    return Err(TrackError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(signals)
    }

    /// Validate a batch of signals, reporting every failure with its index.
    pub fn validate_all(signals: &[RawSignal]) -> Vec<ValidationIssue> {
        signals
            .iter()
            .enumerate()
            .filter_map(|(index, signal)| {
                signal.validate().err().map(|error| ValidationIssue {
                    index,
                    kind: signal.signal.kind().to_string(),
                    error: error.to_string(),
                })
            })
            .collect()
    }
}

/// One failed validation in a signal log.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    pub index: usize,
    pub kind: String,
    pub error: String,
}
