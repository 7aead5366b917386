//! Page-load session orchestration
//!
//! One [`AdUnitSession`] exists per page load. It owns the sink adapter and
//! both observers, activates them from a [`UnitLayout`] once the sink is
//! ready (the one-shot element lookup), routes raw page signals to whichever
//! observer they belong to, and performs the terminal flush exactly once on
//! whichever of page-hidden / page-unload arrives first.
//!
//! Observers never depend on each other's state; they compose only through
//! the sink.

use chrono::{DateTime, Utc};

use crate::carousel::{CarouselConfig, CarouselObserver};
use crate::clock::{Clock, SystemClock};
use crate::error::TrackError;
use crate::media::{
    EmbeddedTransport, MediaConfig, MediaProgressObserver, NativeTransport, PlaybackTransport,
};
use crate::signal::{RawSignal, Signal};
use crate::sink::{AnalyticsBackend, RecordingBackend, SinkAdapter};
use crate::types::{TrackedEvent, VideoKind};

/// Result of the host page's one-shot element lookup: which surfaces exist
/// and how they are configured. An absent surface is not an error; its
/// observer simply never activates.
#[derive(Debug, Clone, Default)]
pub struct UnitLayout {
    pub media: Option<MediaConfig>,
    pub carousel: Option<CarouselConfig>,
}

impl UnitLayout {
    pub fn with_media(mut self, media: MediaConfig) -> Self {
        self.media = Some(media);
        self
    }

    pub fn with_carousel(mut self, carousel: CarouselConfig) -> Self {
        self.carousel = Some(carousel);
        self
    }

    fn validate(&self) -> Result<(), TrackError> {
        if let Some(carousel) = &self.carousel {
            if carousel.slide_count == 0 {
                return Err(TrackError::InvalidLayout(
                    "carousel must have at least one slide".to_string(),
                ));
            }
        }
        Ok(())
    }
}

struct MediaUnit {
    transport: Box<dyn PlaybackTransport>,
    observer: MediaProgressObserver,
}

/// Per-page-load instrumentation session.
pub struct AdUnitSession {
    sink: SinkAdapter,
    clock: Box<dyn Clock>,
    media: Option<MediaUnit>,
    carousel: Option<CarouselObserver>,
    outbound: Vec<serde_json::Value>,
    flushed: bool,
}

impl AdUnitSession {
    /// Create an idle session. No observer is active and the sink drops
    /// everything until [`AdUnitSession::sink_ready`] delivers the layout.
    pub fn new(backend: Box<dyn AnalyticsBackend>, identity: Option<String>) -> Self {
        Self {
            sink: SinkAdapter::new(backend, identity),
            clock: Box::new(SystemClock),
            media: None,
            carousel: None,
            outbound: Vec::new(),
            flushed: false,
        }
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn sink(&self) -> &SinkAdapter {
        &self.sink
    }

    /// The analytics script finished initializing: mark the sink ready and
    /// activate observers for the surfaces the layout found. An ungated
    /// carousel starts tracking immediately; a gated one waits for the
    /// gesture. An embedded player gets its subscribe handshake queued as an
    /// outbound message. Activation events are tracked through the sink and
    /// returned, like [`AdUnitSession::dispatch`].
    pub fn sink_ready(&mut self, layout: UnitLayout) -> Result<Vec<TrackedEvent>, TrackError> {
        let now = self.clock.now();
        self.sink_ready_at(layout, now)
    }

    /// Variant of [`AdUnitSession::sink_ready`] with an explicit activation
    /// timestamp, used when replaying recorded logs.
    pub fn sink_ready_at(
        &mut self,
        layout: UnitLayout,
        at: DateTime<Utc>,
    ) -> Result<Vec<TrackedEvent>, TrackError> {
        layout.validate()?;
        self.sink.mark_ready();

        if let Some(media) = layout.media {
            let transport: Box<dyn PlaybackTransport> = match media.video_type {
                VideoKind::Native => Box::new(NativeTransport::new()),
                VideoKind::Embedded => {
                    self.outbound.push(EmbeddedTransport::handshake());
                    Box::new(EmbeddedTransport::new())
                }
            };
            self.media = Some(MediaUnit {
                transport,
                observer: MediaProgressObserver::new(media),
            });
        }

        let mut events = Vec::new();
        if let Some(config) = layout.carousel {
            let gated = config.gated;
            let mut observer = CarouselObserver::new(config);
            if !gated {
                events = observer.begin(at);
                for event in &events {
                    self.sink.track(event);
                }
            }
            self.carousel = Some(observer);
        }

        Ok(events)
    }

    /// Messages the host page must post to the embedded player frame.
    pub fn take_outbound(&mut self) -> Vec<serde_json::Value> {
        std::mem::take(&mut self.outbound)
    }

    /// Handle a live page signal, stamped with the session clock.
    pub fn observe(&mut self, signal: &Signal) -> Vec<TrackedEvent> {
        let now = self.clock.now();
        self.dispatch(signal, now)
    }

    /// Handle a recorded signal at its original timestamp, validating it
    /// against the schema first.
    pub fn dispatch_raw(&mut self, raw: &RawSignal) -> Result<Vec<TrackedEvent>, TrackError> {
        raw.validate()?;
        Ok(self.dispatch(&raw.signal, raw.timestamp))
    }

    /// Route one signal to its observer. Every event emitted is also tracked
    /// through the sink; the returned copy is for callers that want to
    /// inspect or re-route them.
    pub fn dispatch(&mut self, signal: &Signal, at: DateTime<Utc>) -> Vec<TrackedEvent> {
        let events = match signal {
            Signal::PageHidden | Signal::PageUnload => self.terminal_flush(at),
            Signal::GateDismissed => match &mut self.carousel {
                Some(carousel) => carousel.begin(at),
                None => Vec::new(),
            },
            Signal::CarouselOffset { offset_pct } => match &mut self.carousel {
                Some(carousel) => carousel.offset_changed(*offset_pct, at),
                None => Vec::new(),
            },
            Signal::CarouselIndex { index } => match &mut self.carousel {
                Some(carousel) => carousel.set_index(*index, at),
                None => Vec::new(),
            },
            other => match &mut self.media {
                Some(unit) => {
                    let mut events = Vec::new();
                    for playback in unit.transport.normalize(other) {
                        events.extend(unit.observer.handle(playback, at));
                    }
                    events
                }
                None => Vec::new(),
            },
        };

        for event in &events {
            self.sink.track(event);
        }
        events
    }

    /// Best-effort final flush of both observers. The first lifecycle signal
    /// wins; later ones are no-ops.
    fn terminal_flush(&mut self, at: DateTime<Utc>) -> Vec<TrackedEvent> {
        if self.flushed {
            return Vec::new();
        }
        self.flushed = true;

        let mut events = Vec::new();
        if let Some(unit) = &mut self.media {
            events.extend(unit.observer.flush(at));
        }
        if let Some(carousel) = &mut self.carousel {
            events.extend(carousel.flush(at));
        }
        events
    }
}

/// Replay a recorded signal log through a fresh session (stateless,
/// one-shot). If the log ends without a lifecycle signal, a final flush is
/// performed at the last signal's timestamp so terminal dwell/watch data is
/// not lost.
pub fn replay_signals(
    layout: UnitLayout,
    identity: Option<String>,
    signals: &[RawSignal],
) -> Result<Vec<TrackedEvent>, TrackError> {
    let mut session = AdUnitSession::new(Box::new(RecordingBackend::new()), identity);
    let activation_at = signals
        .first()
        .map(|s| s.timestamp)
        .unwrap_or_else(Utc::now);
    let mut events = session.sink_ready_at(layout, activation_at)?;

    for raw in signals {
        events.extend(session.dispatch_raw(raw)?);
    }
    // The synthetic flush takes the same dispatch path as a live unload, so
    // the events also reach the sink. A no-op when the log ends with one.
    if let Some(last) = signals.last() {
        events.extend(session.dispatch(&Signal::PageUnload, last.timestamp));
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::ManualClock;
    use crate::signal::SCHEMA_VERSION;
    use crate::sink::{IDENTITY_KEY, LOAD_ID_KEY};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct CaptureBackend {
        submissions: Rc<RefCell<Vec<(String, Value)>>>,
    }

    impl AnalyticsBackend for CaptureBackend {
        fn submit(&mut self, name: &str, properties: &Value) -> Result<(), TrackError> {
            self.submissions
                .borrow_mut()
                .push((name.to_string(), properties.clone()));
            Ok(())
        }
    }

    fn at_ms(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + chrono::Duration::milliseconds(ms)
    }

    fn raw(ms: i64, signal: Signal) -> RawSignal {
        RawSignal::new(at_ms(ms), signal)
    }

    fn names(events: &[TrackedEvent]) -> Vec<&'static str> {
        events.iter().map(|e| e.name()).collect()
    }

    #[test]
    fn test_identity_attached_to_every_event() {
        // Identifier supplied via URL parameter, no prompt shown.
        let identity = crate::identity::resolve_identity(
            "?id=P42&variant=b",
            &mut crate::identity::NoPrompt,
        );
        let capture = CaptureBackend::default();
        let mut session = AdUnitSession::new(Box::new(capture.clone()), identity);
        session
            .sink_ready(UnitLayout::default().with_carousel(CarouselConfig::new(2)))
            .unwrap();
        session.dispatch(&Signal::CarouselOffset { offset_pct: -100.0 }, at_ms(2_500));
        session.dispatch(&Signal::PageUnload, at_ms(3_000));

        let submissions = capture.submissions.borrow();
        assert!(!submissions.is_empty());
        for (_, props) in submissions.iter() {
            assert_eq!(props[IDENTITY_KEY], "P42");
            assert!(props.get(LOAD_ID_KEY).is_some());
        }
    }

    #[test]
    fn test_absent_surfaces_never_activate() {
        let capture = CaptureBackend::default();
        let mut session = AdUnitSession::new(Box::new(capture.clone()), None);
        session.sink_ready(UnitLayout::default()).unwrap();

        assert!(session
            .dispatch(&Signal::VideoPlay { duration_s: None }, at_ms(0))
            .is_empty());
        assert!(session
            .dispatch(&Signal::CarouselOffset { offset_pct: -100.0 }, at_ms(100))
            .is_empty());
        assert!(session.dispatch(&Signal::PageUnload, at_ms(200)).is_empty());
        assert!(capture.submissions.borrow().is_empty());
    }

    #[test]
    fn test_zero_slide_layout_rejected() {
        let mut session = AdUnitSession::new(Box::new(RecordingBackend::new()), None);
        let result = session.sink_ready(UnitLayout::default().with_carousel(CarouselConfig {
            slide_count: 0,
            min_dwell_ms: 2_000,
            gated: false,
        }));
        assert!(matches!(result, Err(TrackError::InvalidLayout(_))));
    }

    #[test]
    fn test_ungated_carousel_starts_on_activation() {
        let capture = CaptureBackend::default();
        let clock = ManualClock::starting_at(at_ms(0));
        let mut session = AdUnitSession::new(Box::new(capture.clone()), None)
            .with_clock(Box::new(clock.clone()));
        session
            .sink_ready(UnitLayout::default().with_carousel(CarouselConfig::new(3)))
            .unwrap();

        let submitted: Vec<String> = capture
            .submissions
            .borrow()
            .iter()
            .map(|(n, _)| n.clone())
            .collect();
        assert_eq!(submitted, vec!["carousel_start", "slide_view"]);

        // Live signals are stamped through the session clock.
        clock.advance_ms(3_000);
        let events = session.observe(&Signal::CarouselOffset { offset_pct: -100.0 });
        match &events[0] {
            TrackedEvent::DwellEnd { dwell_ms, .. } => assert_eq!(*dwell_ms, 3_000),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_gated_carousel_waits_for_gesture() {
        let capture = CaptureBackend::default();
        let mut session = AdUnitSession::new(Box::new(capture.clone()), None);
        session
            .sink_ready(UnitLayout::default().with_carousel(CarouselConfig::new(3).gated()))
            .unwrap();
        assert!(capture.submissions.borrow().is_empty());

        // Swipes before the gate are ignored.
        assert!(session
            .dispatch(&Signal::CarouselOffset { offset_pct: -100.0 }, at_ms(100))
            .is_empty());

        let events = session.dispatch(&Signal::GateDismissed, at_ms(500));
        assert_eq!(names(&events), vec!["carousel_start", "slide_view"]);
    }

    #[test]
    fn test_embedded_handshake_queued() {
        let mut session = AdUnitSession::new(Box::new(RecordingBackend::new()), None);
        session
            .sink_ready(UnitLayout::default().with_media(MediaConfig::new(VideoKind::Embedded)))
            .unwrap();

        let outbound = session.take_outbound();
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0]["event"], "subscribe");
        assert!(session.take_outbound().is_empty());
    }

    #[test]
    fn test_native_and_embedded_emit_identical_events() {
        let milestones = vec![5u32, 10];

        // Native path.
        let mut native = AdUnitSession::new(Box::new(RecordingBackend::new()), None);
        native
            .sink_ready(UnitLayout::default().with_media(
                MediaConfig::new(VideoKind::Native).with_milestones(milestones.clone()),
            ))
            .unwrap();
        let mut native_events = Vec::new();
        native_events.extend(native.dispatch(&Signal::VideoPlay { duration_s: None }, at_ms(0)));
        native_events.extend(native.dispatch(
            &Signal::VideoPosition {
                position_s: 6.0,
                duration_s: 60.0,
            },
            at_ms(6_000),
        ));
        native_events.extend(native.dispatch(&Signal::VideoEnded, at_ms(60_000)));

        // Embedded path, same gestures through frame messages.
        let mut embedded = AdUnitSession::new(Box::new(RecordingBackend::new()), None);
        embedded
            .sink_ready(UnitLayout::default().with_media(
                MediaConfig::new(VideoKind::Embedded).with_milestones(milestones),
            ))
            .unwrap();
        let mut embedded_events = Vec::new();
        for (ms, data) in [
            (0, serde_json::json!({"event": "state", "value": "playing"})),
            (
                6_000,
                serde_json::json!({"event": "position", "position_s": 6.0, "duration_s": 60.0}),
            ),
            (60_000, serde_json::json!({"event": "state", "value": "ended"})),
        ] {
            embedded_events
                .extend(embedded.dispatch(&Signal::FrameMessage { data }, at_ms(ms)));
        }

        // Identical apart from the video_type tag.
        assert_eq!(names(&native_events), names(&embedded_events));
        assert_eq!(names(&native_events), vec![
            "video_start",
            "video_progress",
            "video_complete"
        ]);
    }

    #[test]
    fn test_terminal_flush_fires_once() {
        let capture = CaptureBackend::default();
        let mut session = AdUnitSession::new(Box::new(capture.clone()), None);
        session
            .sink_ready(
                UnitLayout::default()
                    .with_media(MediaConfig::new(VideoKind::Native))
                    .with_carousel(CarouselConfig::new(2)),
            )
            .unwrap();
        session.dispatch(&Signal::VideoPlay { duration_s: None }, at_ms(0));
        session.dispatch(
            &Signal::VideoPosition {
                position_s: 8.0,
                duration_s: 20.0,
            },
            at_ms(8_000),
        );

        let hidden = session.dispatch(&Signal::PageHidden, at_ms(9_000));
        assert_eq!(
            names(&hidden),
            vec!["video_complete", "dwell_end", "carousel_complete"]
        );

        // The unload that follows pagehide is a no-op.
        assert!(session.dispatch(&Signal::PageUnload, at_ms(9_050)).is_empty());
    }

    #[test]
    fn test_dropped_submission_does_not_alter_state() {
        struct FailingBackend;
        impl AnalyticsBackend for FailingBackend {
            fn submit(&mut self, _: &str, _: &Value) -> Result<(), TrackError> {
                Err(TrackError::Backend("network".to_string()))
            }
        }

        let mut session = AdUnitSession::new(Box::new(FailingBackend), None);
        session
            .sink_ready(UnitLayout::default().with_carousel(CarouselConfig::new(2)))
            .unwrap();
        let events = session.dispatch(&Signal::CarouselOffset { offset_pct: -100.0 }, at_ms(2_500));
        // The observer still transitioned and emitted, despite delivery failing.
        assert_eq!(names(&events), vec!["dwell_end", "slide_view"]);
    }

    #[test]
    fn test_replay_full_scenario() {
        let layout = UnitLayout::default()
            .with_media(MediaConfig::new(VideoKind::Native).with_milestones(vec![5, 10, 15]))
            .with_carousel(CarouselConfig::new(3));

        let signals = vec![
            raw(
                0,
                Signal::VideoPlay {
                    duration_s: Some(100.0),
                },
            ),
            raw(
                4_000,
                Signal::VideoPosition {
                    position_s: 4.0,
                    duration_s: 100.0,
                },
            ),
            raw(
                6_000,
                Signal::VideoPosition {
                    position_s: 6.0,
                    duration_s: 100.0,
                },
            ),
            raw(6_500, Signal::CarouselOffset { offset_pct: -100.0 }),
            raw(9_000, Signal::CarouselOffset { offset_pct: -200.0 }),
            raw(
                12_000,
                Signal::VideoPosition {
                    position_s: 12.0,
                    duration_s: 100.0,
                },
            ),
            raw(13_000, Signal::PageUnload),
        ];

        let events = replay_signals(layout, Some("P42".to_string()), &signals).unwrap();
        assert_eq!(
            names(&events),
            vec![
                "carousel_start",
                "slide_view", // slide 0, direction start
                "video_start",
                "video_progress", // second = 5, after the report of 6
                "dwell_end",
                "slide_view", // slide 1, direction next
                "dwell_end",
                "slide_view", // slide 2, direction next
                "video_progress", // second = 10, after the report of 12
                "video_complete",
                "dwell_end",
                "carousel_complete",
            ]
        );

        // Dwells of 6500ms, 2500ms and 4000ms, each above the threshold.
        match events.last().unwrap() {
            TrackedEvent::CarouselComplete {
                total_dwell_ms,
                all_viewed,
            } => {
                assert_eq!(*total_dwell_ms, 13_000);
                assert!(*all_viewed);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_replay_flushes_when_log_has_no_unload() {
        let layout = UnitLayout::default().with_carousel(CarouselConfig::new(2));
        let signals = vec![raw(2_500, Signal::CarouselOffset { offset_pct: -100.0 })];

        let events = replay_signals(layout.clone(), None, &signals).unwrap();
        assert_eq!(events.last().unwrap().name(), "carousel_complete");

        // The synthetic flush is a real dispatch, so a sink driven live with
        // the same signals plus an unload sees exactly the replayed events.
        let capture = CaptureBackend::default();
        let mut live = AdUnitSession::new(Box::new(capture.clone()), None);
        live.sink_ready_at(layout, at_ms(2_500)).unwrap();
        for signal in &signals {
            live.dispatch_raw(signal).unwrap();
        }
        live.dispatch(&Signal::PageUnload, at_ms(2_500));

        let submitted: Vec<String> = capture
            .submissions
            .borrow()
            .iter()
            .map(|(n, _)| n.clone())
            .collect();
        let replayed: Vec<String> = events.iter().map(|e| e.name().to_string()).collect();
        assert_eq!(submitted, replayed);
    }

    #[test]
    fn test_replay_rejects_bad_schema() {
        let mut bad = raw(0, Signal::VideoPlay { duration_s: None });
        bad.schema_version = "nope".to_string();
        assert_ne!(bad.schema_version, SCHEMA_VERSION);

        let err = replay_signals(UnitLayout::default(), None, &[bad]).unwrap_err();
        assert!(matches!(err, TrackError::UnsupportedSchema(_)));
    }
}
