//! Carousel dwell observation
//!
//! Tracks which slide the user is looking at and for how long. The current
//! index is derived from the container's positional signal rather than
//! trusted from the triggering gesture, because swipes report completion
//! asynchronously after their animation settles. Every departure emits a
//! `dwell_end` before the next `slide_view`, so event order always follows
//! gesture order.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{SlideDirection, TrackedEvent};

/// Minimum dwell (ms) for a slide occupancy to count as viewed.
pub const DEFAULT_MIN_DWELL_MS: i64 = 2_000;

/// Configuration for one carousel observer.
#[derive(Debug, Clone)]
pub struct CarouselConfig {
    pub slide_count: usize,
    /// Dwell threshold for the per-slide viewed flag. `dwell_end` itself is
    /// emitted unconditionally.
    pub min_dwell_ms: i64,
    /// Whether a start-gate gesture must arrive before tracking begins.
    pub gated: bool,
}

impl CarouselConfig {
    pub fn new(slide_count: usize) -> Self {
        Self {
            slide_count,
            min_dwell_ms: DEFAULT_MIN_DWELL_MS,
            gated: false,
        }
    }

    pub fn gated(mut self) -> Self {
        self.gated = true;
        self
    }

    pub fn with_min_dwell_ms(mut self, min_dwell_ms: i64) -> Self {
        self.min_dwell_ms = min_dwell_ms;
        self
    }
}

/// One completed slide occupancy.
#[derive(Debug, Clone, Serialize)]
pub struct DwellRecord {
    pub slide_index: usize,
    pub dwell_ms: i64,
    /// Departure time.
    pub timestamp: DateTime<Utc>,
}

/// Mutable carousel accounting, owned by the observer.
#[derive(Debug, Clone)]
pub struct CarouselState {
    pub started: bool,
    pub completed: bool,
    /// Always in `[0, slide_count)`.
    pub current_index: usize,
    pub entered_at: Option<DateTime<Utc>>,
    /// Per-slide viewed flags; a flag is set by any single occupancy meeting
    /// the dwell threshold. Visits are not summed per slide.
    pub viewed: Vec<bool>,
    pub total_dwell_ms: i64,
    /// Append-only record of every completed occupancy.
    pub history: Vec<DwellRecord>,
}

/// Observer for a swipeable slide container.
pub struct CarouselObserver {
    config: CarouselConfig,
    state: CarouselState,
}

impl CarouselObserver {
    pub fn new(config: CarouselConfig) -> Self {
        let slide_count = config.slide_count;
        Self {
            config,
            state: CarouselState {
                started: false,
                completed: false,
                current_index: 0,
                entered_at: None,
                viewed: vec![false; slide_count],
                total_dwell_ms: 0,
                history: Vec::new(),
            },
        }
    }

    pub fn state(&self) -> &CarouselState {
        &self.state
    }

    pub fn is_gated(&self) -> bool {
        self.config.gated
    }

    /// Begin tracking: emit `carousel_start` and the initial `slide_view` for
    /// slide 0. Called on activation for ungated carousels, or on the
    /// start-gate gesture otherwise. Idempotent.
    pub fn begin(&mut self, at: DateTime<Utc>) -> Vec<TrackedEvent> {
        if self.state.started || self.state.completed || self.config.slide_count == 0 {
            return Vec::new();
        }
        self.state.started = true;
        self.state.current_index = 0;
        self.state.entered_at = Some(at);
        vec![
            TrackedEvent::CarouselStart {
                total_slides: self.config.slide_count,
            },
            TrackedEvent::SlideView {
                slide_index: 0,
                direction: SlideDirection::Start,
            },
        ]
    }

    /// Positional signal from the slide container: horizontal offset as a
    /// percentage of container width. Slide i sits at an offset of `-100 * i`
    /// percent, so the occupied index is `round(|offset| / 100)`.
    pub fn offset_changed(&mut self, offset_pct: f64, at: DateTime<Utc>) -> Vec<TrackedEvent> {
        if !offset_pct.is_finite() {
            return Vec::new();
        }
        let index = (offset_pct.abs() / 100.0).round() as usize;
        self.change_to(index, at)
    }

    /// Explicit index notification from a container that exposes one.
    pub fn set_index(&mut self, index: usize, at: DateTime<Utc>) -> Vec<TrackedEvent> {
        self.change_to(index, at)
    }

    fn change_to(&mut self, index: usize, at: DateTime<Utc>) -> Vec<TrackedEvent> {
        if !self.state.started || self.state.completed {
            return Vec::new();
        }
        let index = index.min(self.config.slide_count - 1);
        if index == self.state.current_index {
            return Vec::new();
        }

        let mut events = vec![self.leave_current(at)];

        let direction = if index == self.state.current_index + 1 {
            SlideDirection::Next
        } else if index + 1 == self.state.current_index {
            SlideDirection::Prev
        } else {
            SlideDirection::Jump
        };
        events.push(TrackedEvent::SlideView {
            slide_index: index,
            direction,
        });

        self.state.current_index = index;
        self.state.entered_at = Some(at);
        events
    }

    /// Close the current occupancy: emit `dwell_end` unconditionally, set the
    /// viewed flag when the threshold is met, and append to history.
    fn leave_current(&mut self, at: DateTime<Utc>) -> TrackedEvent {
        let index = self.state.current_index;
        let dwell_ms = self
            .state
            .entered_at
            .map(|entered| (at - entered).num_milliseconds().max(0))
            .unwrap_or(0);

        if dwell_ms >= self.config.min_dwell_ms {
            self.state.viewed[index] = true;
        }
        self.state.history.push(DwellRecord {
            slide_index: index,
            dwell_ms,
            timestamp: at,
        });
        self.state.total_dwell_ms += dwell_ms;

        TrackedEvent::DwellEnd {
            slide_index: index,
            dwell_ms,
        }
    }

    /// Terminal flush on page unload, hide, or an explicit end: close the
    /// current occupancy and emit `carousel_complete`. A no-op unless
    /// tracking had started; idempotent afterwards.
    pub fn flush(&mut self, at: DateTime<Utc>) -> Vec<TrackedEvent> {
        if !self.state.started || self.state.completed {
            return Vec::new();
        }
        let mut events = vec![self.leave_current(at)];
        self.state.entered_at = None;
        self.state.completed = true;

        events.push(TrackedEvent::CarouselComplete {
            total_dwell_ms: self.state.total_dwell_ms,
            all_viewed: self.state.viewed.iter().all(|v| *v),
        });
        events
    }
}
