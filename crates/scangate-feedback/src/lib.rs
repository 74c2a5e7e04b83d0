//! scangate-feedback: the continuous scan loop and everything it feeds.
//!
//! [`FeedbackLoop`] owns a frame source and a detector, assesses one frame
//! per cycle and pushes the results into an injected [`FeedbackSink`].
//! [`DebouncedSink`] holds back decision changes for a short window so
//! single-frame noise does not flicker the banner.

pub mod config;
pub mod engine;
pub mod overlay;
pub mod panel;
pub mod sink;

pub use config::{Config, ConfigError};
pub use engine::{FeedbackLoop, LoopControl, LoopError, LoopState};
pub use overlay::{Oval, OverlayFrame, OverlayState, Tone};
pub use panel::{BrightnessMeter, CaptureAction, Checklist, ChecklistItem, MeterLevel};
pub use sink::{DebouncedSink, FeedbackSink};
