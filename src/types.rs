//! Analytics event surface
//!
//! This module defines the events the engine emits through the sink adapter.
//! The serialized form is the wire contract with the external analytics sink:
//! an `event` name plus snake_case properties, with the participant identity
//! and page-load id merged in by the sink adapter at submission time.

use serde::{Deserialize, Serialize};

/// Playback surface kind, carried on every video event for provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoKind {
    /// Directly observable media element; position is read synchronously.
    Native,
    /// Cross-frame embedded player reachable only via message exchange.
    Embedded,
}

impl VideoKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoKind::Native => "native",
            VideoKind::Embedded => "embedded",
        }
    }
}

/// Direction of a slide transition, inferred from the index delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlideDirection {
    /// The initial view of slide 0 when tracking starts.
    Start,
    Next,
    Prev,
    Jump,
}

impl SlideDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlideDirection::Start => "start",
            SlideDirection::Next => "next",
            SlideDirection::Prev => "prev",
            SlideDirection::Jump => "jump",
        }
    }
}

/// An analytics event produced by one of the observers.
///
/// Serializes to `{"event": "<name>", ...properties}`; property names match
/// the analytics sink contract exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TrackedEvent {
    VideoStart {
        video_type: VideoKind,
        duration_s: f64,
    },
    VideoProgress {
        second: u32,
        duration_s: f64,
        video_type: VideoKind,
    },
    VideoComplete {
        watched_ms: i64,
        percent_watched: u32,
        max_watched_s: f64,
        duration_s: f64,
        video_type: VideoKind,
        /// Only tagged (`false`) when completion came from the unload flush
        /// rather than a natural end-of-playback.
        #[serde(skip_serializing_if = "Option::is_none")]
        completed_naturally: Option<bool>,
    },
    CarouselStart {
        total_slides: usize,
    },
    SlideView {
        slide_index: usize,
        direction: SlideDirection,
    },
    DwellEnd {
        slide_index: usize,
        dwell_ms: i64,
    },
    CarouselComplete {
        total_dwell_ms: i64,
        all_viewed: bool,
    },
}

impl TrackedEvent {
    /// Event name as submitted to the analytics sink.
    pub fn name(&self) -> &'static str {
        match self {
            TrackedEvent::VideoStart { .. } => "video_start",
            TrackedEvent::VideoProgress { .. } => "video_progress",
            TrackedEvent::VideoComplete { .. } => "video_complete",
            TrackedEvent::CarouselStart { .. } => "carousel_start",
            TrackedEvent::SlideView { .. } => "slide_view",
            TrackedEvent::DwellEnd { .. } => "dwell_end",
            TrackedEvent::CarouselComplete { .. } => "carousel_complete",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_kind_serialization() {
        let json = serde_json::to_string(&VideoKind::Embedded).unwrap();
        assert_eq!(json, "\"embedded\"");

        let parsed: VideoKind = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, VideoKind::Embedded);
    }

    #[test]
    fn test_event_tagged_with_name() {
        let event = TrackedEvent::SlideView {
            slide_index: 2,
            direction: SlideDirection::Next,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "slide_view");
        assert_eq!(value["slide_index"], 2);
        assert_eq!(value["direction"], "next");
        assert_eq!(event.name(), "slide_view");
    }

    #[test]
    fn test_completed_naturally_omitted_when_none() {
        let event = TrackedEvent::VideoComplete {
            watched_ms: 12_000,
            percent_watched: 40,
            max_watched_s: 40.0,
            duration_s: 100.0,
            video_type: VideoKind::Native,
            completed_naturally: None,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "video_complete");
        assert!(value.get("completed_naturally").is_none());
    }

    #[test]
    fn test_completed_naturally_tagged_on_unload() {
        let event = TrackedEvent::VideoComplete {
            watched_ms: 0,
            percent_watched: 0,
            max_watched_s: 0.0,
            duration_s: 0.0,
            video_type: VideoKind::Embedded,
            completed_naturally: Some(false),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["completed_naturally"], false);
    }
}
