//! Playback transports
//!
//! Two backing surfaces feed the media observer: a native media element whose
//! position is read synchronously, and an embedded player in a cross-origin
//! frame that only speaks an asynchronous message protocol. Both normalize to
//! the same `PlaybackSignal` vocabulary so the observer's emission logic is
//! identical regardless of transport.

use serde::Deserialize;

use crate::signal::Signal;
use crate::types::VideoKind;

/// Normalized playback signal consumed by the observer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackSignal {
    /// Playback began. `duration_s` is present when the surface could report
    /// its duration at play time.
    Start { duration_s: Option<f64> },
    Progress { position_s: f64, duration_s: f64 },
    Pause,
    Resume,
    End,
}

/// Translation from raw page signals to normalized playback signals.
///
/// Page signals not meant for this transport yield nothing.
pub trait PlaybackTransport {
    fn video_type(&self) -> VideoKind;

    fn normalize(&mut self, signal: &Signal) -> Vec<PlaybackSignal>;
}

/// Transport over a directly observable media element.
#[derive(Debug, Default)]
pub struct NativeTransport {
    seen_play: bool,
}

impl NativeTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlaybackTransport for NativeTransport {
    fn video_type(&self) -> VideoKind {
        VideoKind::Native
    }

    fn normalize(&mut self, signal: &Signal) -> Vec<PlaybackSignal> {
        match signal {
            Signal::VideoPlay { duration_s } => {
                if self.seen_play {
                    vec![PlaybackSignal::Resume]
                } else {
                    self.seen_play = true;
                    vec![PlaybackSignal::Start {
                        duration_s: *duration_s,
                    }]
                }
            }
            Signal::VideoPause => vec![PlaybackSignal::Pause],
            Signal::VideoPosition {
                position_s,
                duration_s,
            } => vec![PlaybackSignal::Progress {
                position_s: *position_s,
                duration_s: *duration_s,
            }],
            Signal::VideoEnded => vec![PlaybackSignal::End],
            _ => Vec::new(),
        }
    }
}

/// Inbound message vocabulary of the embedded player frame.
///
/// Parsed leniently: unknown event names and malformed payloads are ignored,
/// never surfaced as errors.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum FrameEvent {
    /// Handshake acknowledgement after our subscribe message.
    Ready,
    State {
        value: FramePlayerState,
        #[serde(default)]
        duration_s: Option<f64>,
    },
    Position { position_s: f64, duration_s: f64 },
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum FramePlayerState {
    Playing,
    Paused,
    Ended,
}

/// Transport over a cross-frame embedded player.
///
/// Position arrives via periodic callback messages after an explicit
/// subscribe handshake sent on load; see [`EmbeddedTransport::handshake`].
#[derive(Debug, Default)]
pub struct EmbeddedTransport {
    seen_play: bool,
    subscribed: bool,
}

impl EmbeddedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// The message the host page must post to the player frame on load to
    /// start the periodic position callbacks.
    pub fn handshake() -> serde_json::Value {
        serde_json::json!({
            "event": "subscribe",
            "channel": "playback",
        })
    }

    /// Whether the player frame has acknowledged the subscribe handshake.
    pub fn subscribed(&self) -> bool {
        self.subscribed
    }
}

impl PlaybackTransport for EmbeddedTransport {
    fn video_type(&self) -> VideoKind {
        VideoKind::Embedded
    }

    fn normalize(&mut self, signal: &Signal) -> Vec<PlaybackSignal> {
        let data = match signal {
            Signal::FrameMessage { data } => data,
            _ => return Vec::new(),
        };

        let event: FrameEvent = match serde_json::from_value(data.clone()) {
            Ok(event) => event,
            Err(e) => {
                log::debug!("ignoring malformed frame message: {}", e);
                return Vec::new();
            }
        };

        match event {
            FrameEvent::Ready => {
                self.subscribed = true;
                Vec::new()
            }
            FrameEvent::State { value, duration_s } => match value {
                FramePlayerState::Playing => {
                    if self.seen_play {
                        vec![PlaybackSignal::Resume]
                    } else {
                        self.seen_play = true;
                        vec![PlaybackSignal::Start { duration_s }]
                    }
                }
                FramePlayerState::Paused => vec![PlaybackSignal::Pause],
                FramePlayerState::Ended => vec![PlaybackSignal::End],
            },
            FrameEvent::Position {
                position_s,
                duration_s,
            } => vec![PlaybackSignal::Progress {
                position_s,
                duration_s,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn frame(data: serde_json::Value) -> Signal {
        Signal::FrameMessage { data }
    }

    #[test]
    fn test_native_play_then_resume() {
        let mut transport = NativeTransport::new();
        assert_eq!(
            transport.normalize(&Signal::VideoPlay { duration_s: None }),
            vec![PlaybackSignal::Start { duration_s: None }]
        );
        assert_eq!(
            transport.normalize(&Signal::VideoPause),
            vec![PlaybackSignal::Pause]
        );
        assert_eq!(
            transport.normalize(&Signal::VideoPlay { duration_s: None }),
            vec![PlaybackSignal::Resume]
        );
    }

    #[test]
    fn test_play_signals_carry_duration_when_known() {
        let mut native = NativeTransport::new();
        assert_eq!(
            native.normalize(&Signal::VideoPlay {
                duration_s: Some(30.0)
            }),
            vec![PlaybackSignal::Start {
                duration_s: Some(30.0)
            }]
        );

        let mut embedded = EmbeddedTransport::new();
        assert_eq!(
            embedded.normalize(&frame(serde_json::json!({
                "event": "state", "value": "playing", "duration_s": 30.0
            }))),
            vec![PlaybackSignal::Start {
                duration_s: Some(30.0)
            }]
        );
    }

    #[test]
    fn test_native_ignores_foreign_signals() {
        let mut transport = NativeTransport::new();
        assert!(transport.normalize(&Signal::GateDismissed).is_empty());
        assert!(transport
            .normalize(&frame(serde_json::json!({"event": "ready"})))
            .is_empty());
    }

    #[test]
    fn test_embedded_handshake_and_state_flow() {
        let mut transport = EmbeddedTransport::new();
        assert_eq!(EmbeddedTransport::handshake()["event"], "subscribe");

        assert!(transport
            .normalize(&frame(serde_json::json!({"event": "ready"})))
            .is_empty());
        assert!(transport.subscribed());

        assert_eq!(
            transport.normalize(&frame(
                serde_json::json!({"event": "state", "value": "playing"})
            )),
            vec![PlaybackSignal::Start { duration_s: None }]
        );
        assert_eq!(
            transport.normalize(&frame(serde_json::json!({
                "event": "position", "position_s": 3.5, "duration_s": 30.0
            }))),
            vec![PlaybackSignal::Progress {
                position_s: 3.5,
                duration_s: 30.0
            }]
        );
        assert_eq!(
            transport.normalize(&frame(
                serde_json::json!({"event": "state", "value": "paused"})
            )),
            vec![PlaybackSignal::Pause]
        );
        assert_eq!(
            transport.normalize(&frame(
                serde_json::json!({"event": "state", "value": "playing"})
            )),
            vec![PlaybackSignal::Resume]
        );
        assert_eq!(
            transport.normalize(&frame(
                serde_json::json!({"event": "state", "value": "ended"})
            )),
            vec![PlaybackSignal::End]
        );
    }

    #[test]
    fn test_embedded_ignores_malformed_messages() {
        let mut transport = EmbeddedTransport::new();
        assert!(transport
            .normalize(&frame(serde_json::json!("not an object")))
            .is_empty());
        assert!(transport
            .normalize(&frame(serde_json::json!({"event": "unknown_kind"})))
            .is_empty());
        assert!(transport
            .normalize(&frame(serde_json::json!({"event": "position"})))
            .is_empty());
    }

    #[test]
    fn test_video_type_per_transport() {
        assert_eq!(NativeTransport::new().video_type(), VideoKind::Native);
        assert_eq!(EmbeddedTransport::new().video_type(), VideoKind::Embedded);
    }
}
