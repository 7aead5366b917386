//! Playback state machine with anti-skip accounting
//!
//! Tracks the highest playback position ever reached so seeking backward
//! never reduces reported progress, accumulates actually-watched wall time
//! across pause/resume cycles, and emits each configured milestone exactly
//! once in ascending order.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::media::transport::PlaybackSignal;
use crate::types::{TrackedEvent, VideoKind};

/// Milestone seconds reported when no explicit configuration is given.
pub const DEFAULT_MILESTONES_S: &[u32] = &[5, 10, 15, 30];

/// Configuration for one media observer.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub video_type: VideoKind,
    /// Playback-position thresholds (seconds) that each emit one
    /// `video_progress` event when first reached.
    pub milestones_s: Vec<u32>,
}

impl MediaConfig {
    pub fn new(video_type: VideoKind) -> Self {
        Self {
            video_type,
            milestones_s: DEFAULT_MILESTONES_S.to_vec(),
        }
    }

    pub fn with_milestones(mut self, milestones_s: Vec<u32>) -> Self {
        self.milestones_s = milestones_s;
        self
    }
}

/// Mutable playback accounting, owned by the observer.
#[derive(Debug, Clone, Default)]
pub struct PlaybackState {
    pub started: bool,
    pub completed: bool,
    /// Last known duration; 0 until the transport reports one.
    pub duration_s: f64,
    /// Highest position ever reached. Non-decreasing for the lifetime of the
    /// observer.
    pub max_watched_s: f64,
    /// Milestones already emitted this page load.
    pub reported_milestones: BTreeSet<u32>,
    /// Wall time actually spent in the playing sub-state.
    pub watched_ms: i64,
    /// Set while playing; cleared on pause and on completion flush.
    pub resumed_at: Option<DateTime<Utc>>,
}

/// Observer for a single video-like playback surface.
///
/// All transitions are pure in the timestamp: callers pass the signal time,
/// so recorded logs replay identically.
pub struct MediaProgressObserver {
    config: MediaConfig,
    state: PlaybackState,
}

impl MediaProgressObserver {
    pub fn new(mut config: MediaConfig) -> Self {
        config.milestones_s.sort_unstable();
        config.milestones_s.dedup();
        Self {
            config,
            state: PlaybackState::default(),
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// Route one normalized playback signal through the state machine.
    pub fn handle(&mut self, signal: PlaybackSignal, at: DateTime<Utc>) -> Vec<TrackedEvent> {
        match signal {
            PlaybackSignal::Start { duration_s } => self.on_start(duration_s, at),
            PlaybackSignal::Progress {
                position_s,
                duration_s,
            } => self.on_progress(position_s, duration_s),
            PlaybackSignal::Pause => {
                self.on_pause(at);
                Vec::new()
            }
            PlaybackSignal::Resume => {
                self.on_resume(at);
                Vec::new()
            }
            PlaybackSignal::End => self.on_end(at),
        }
    }

    /// First play signal: enter the started state and emit `video_start`
    /// once, with the duration when the transport could report it at play
    /// time. Repeated start signals behave like resume.
    fn on_start(&mut self, duration_s: Option<f64>, at: DateTime<Utc>) -> Vec<TrackedEvent> {
        if self.state.completed {
            return Vec::new();
        }
        if let Some(duration_s) = duration_s {
            if duration_s.is_finite() && duration_s > 0.0 {
                self.state.duration_s = duration_s;
            }
        }
        if self.state.started {
            self.on_resume(at);
            return Vec::new();
        }
        self.state.started = true;
        self.state.resumed_at = Some(at);
        vec![TrackedEvent::VideoStart {
            video_type: self.config.video_type,
            duration_s: self.state.duration_s,
        }]
    }

    /// Progress report from either transport. Raises the monotonic watermark
    /// and emits any milestones it newly covers, in ascending order.
    fn on_progress(&mut self, position_s: f64, duration_s: f64) -> Vec<TrackedEvent> {
        if !self.state.started || self.state.completed {
            return Vec::new();
        }
        if duration_s.is_finite() && duration_s > 0.0 {
            self.state.duration_s = duration_s;
        }
        if position_s.is_finite() && position_s > self.state.max_watched_s {
            self.state.max_watched_s = position_s;
        }

        let mut events = Vec::new();
        for &milestone in &self.config.milestones_s {
            if self.state.max_watched_s >= milestone as f64
                && !self.state.reported_milestones.contains(&milestone)
            {
                self.state.reported_milestones.insert(milestone);
                events.push(TrackedEvent::VideoProgress {
                    second: milestone,
                    duration_s: self.state.duration_s,
                    video_type: self.config.video_type,
                });
            }
        }
        events
    }

    /// Close the open watched interval.
    fn on_pause(&mut self, at: DateTime<Utc>) {
        if let Some(resumed_at) = self.state.resumed_at.take() {
            let elapsed = (at - resumed_at).num_milliseconds();
            if elapsed > 0 {
                self.state.watched_ms += elapsed;
            }
        }
    }

    /// Reopen the watched interval. Idempotent against duplicate signals.
    fn on_resume(&mut self, at: DateTime<Utc>) {
        if self.state.started && !self.state.completed && self.state.resumed_at.is_none() {
            self.state.resumed_at = Some(at);
        }
    }

    /// Natural end of playback.
    fn on_end(&mut self, at: DateTime<Utc>) -> Vec<TrackedEvent> {
        self.complete(at, true)
    }

    /// Terminal flush on page unload or hide. A no-op unless playback had
    /// started and has not already completed.
    pub fn flush(&mut self, at: DateTime<Utc>) -> Vec<TrackedEvent> {
        self.complete(at, false)
    }

    fn complete(&mut self, at: DateTime<Utc>, naturally: bool) -> Vec<TrackedEvent> {
        if !self.state.started || self.state.completed {
            return Vec::new();
        }
        self.on_pause(at);
        self.state.completed = true;

        let percent_watched = if self.state.duration_s > 0.0 {
            (self.state.max_watched_s / self.state.duration_s * 100.0).round() as u32
        } else {
            0
        };

        vec![TrackedEvent::VideoComplete {
            watched_ms: self.state.watched_ms,
            percent_watched,
            max_watched_s: self.state.max_watched_s,
            duration_s: self.state.duration_s,
            video_type: self.config.video_type,
            completed_naturally: if naturally { None } else { Some(false) },
        }]
    }
}
