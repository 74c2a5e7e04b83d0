//! Face detector capability.
//!
//! Backends normalize their output to [`Detection`] lists so the geometry
//! checks never depend on which model produced them. [`ReplayDetector`]
//! plays back detections recorded as JSON.

use crate::types::{Detection, FrameBuffer};
use std::future::Future;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector used before initialize()")]
    NotInitialized,
    #[error("detector initialization failed: {0}")]
    InitFailed(String),
    #[error("detection failed: {0}")]
    DetectionFailed(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// An external face locator.
///
/// `initialize` is called once per session before the first `detect`.
/// Its failure is fatal for the session, unlike a frame with no faces.
pub trait FaceDetector: Send {
    fn initialize(&mut self) -> impl Future<Output = Result<(), DetectorError>> + Send;

    fn is_ready(&self) -> bool;

    /// Locate faces in `frame`. Coordinates are in `frame` pixels.
    fn detect(
        &mut self,
        frame: &FrameBuffer,
    ) -> impl Future<Output = Result<Vec<Detection>, DetectorError>> + Send;
}

/// Replays a fixed sequence of per-frame detections, wrapping at the end.
#[derive(Debug, Clone)]
pub struct ReplayDetector {
    frames: Vec<Vec<Detection>>,
    cursor: usize,
    ready: bool,
}

impl ReplayDetector {
    pub fn new(frames: Vec<Vec<Detection>>) -> Self {
        Self {
            frames,
            cursor: 0,
            ready: false,
        }
    }

    /// A detector that never finds a face.
    pub fn empty() -> Self {
        Self::new(vec![Vec::new()])
    }

    /// Parse a JSON array holding one array of detections per frame.
    pub fn from_json(json: &str) -> Result<Self, DetectorError> {
        let frames: Vec<Vec<Detection>> = serde_json::from_str(json)?;
        Ok(Self::new(frames))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DetectorError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let detector = Self::from_json(&json)?;
        tracing::info!(
            path = %path.display(),
            frames = detector.frames.len(),
            "loaded detection recording"
        );
        Ok(detector)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FaceDetector for ReplayDetector {
    async fn initialize(&mut self) -> Result<(), DetectorError> {
        if self.frames.is_empty() {
            return Err(DetectorError::InitFailed(
                "detection recording has no frames".into(),
            ));
        }
        self.ready = true;
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    async fn detect(&mut self, _frame: &FrameBuffer) -> Result<Vec<Detection>, DetectorError> {
        if !self.ready {
            return Err(DetectorError::NotInitialized);
        }
        let detections = self.frames[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.frames.len();
        Ok(detections)
    }
}
