//! adtrace - Interaction instrumentation engine for simulated ad units
//!
//! adtrace converts raw interaction signals from a simulated social-media ad
//! unit (video playback, carousel swipes, page lifecycle) into a small set of
//! well-formed analytics events tagged with a participant identifier, with
//! dwell-time accounting and anti-skip (monotonic max-watched) semantics.
//!
//! ## Modules
//!
//! - **Sink**: identity-merging adapter in front of the external analytics
//!   backend; failures are swallowed so tracking never breaks the host page
//! - **Media**: playback observer over two transports (native element,
//!   cross-frame embedded player)
//! - **Carousel**: slide dwell observer with start-gate support
//! - **Session**: per-page-load orchestration and signal-log replay

pub mod carousel;
pub mod clock;
pub mod error;
pub mod identity;
pub mod media;
pub mod session;
pub mod signal;
pub mod sink;
pub mod types;

pub use carousel::{CarouselConfig, CarouselObserver, DEFAULT_MIN_DWELL_MS};
pub use clock::{Clock, SystemClock};
pub use error::TrackError;
pub use identity::{resolve_identity, IdentityPrompt, NoPrompt};
pub use media::{MediaConfig, MediaProgressObserver, DEFAULT_MILESTONES_S};
pub use session::{replay_signals, AdUnitSession, UnitLayout};
pub use signal::{RawSignal, Signal, SignalLog, SCHEMA_VERSION};
pub use sink::{AnalyticsBackend, JsonLinesBackend, RecordingBackend, SinkAdapter};
pub use types::{SlideDirection, TrackedEvent, VideoKind};

/// adtrace version attached to CLI reports
pub const ADTRACE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for CLI reports
pub const PRODUCER_NAME: &str = "adtrace";
