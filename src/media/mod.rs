//! Media progress observation
//!
//! Split in two: [`transport`] normalizes the two playback surfaces (native
//! element, embedded cross-frame player) into one `PlaybackSignal` vocabulary,
//! and [`observer`] turns that vocabulary into analytics events with
//! anti-skip accounting. The observer never sees which transport fed it.

pub mod observer;
pub mod transport;

pub use observer::{MediaConfig, MediaProgressObserver, PlaybackState, DEFAULT_MILESTONES_S};
pub use transport::{EmbeddedTransport, NativeTransport, PlaybackSignal, PlaybackTransport};
