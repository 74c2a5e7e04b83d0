//! scangate-hw: frame acquisition for the quality gate.
//!
//! Sources hand out [`Frame`]s already downscaled to the analysis resolution,
//! together with the original capture size used for the resolution floor.

pub mod frame;
pub mod source;

pub use frame::{downscale, Frame};
pub use source::{FrameSource, ImageSequenceSource, SourceError, StillImageSource};
