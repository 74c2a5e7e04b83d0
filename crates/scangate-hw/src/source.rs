//! Frame sources: the capture handle a feedback loop owns between start and stop.

use crate::frame::Frame;
use image::RgbaImage;
use scangate_core::FrameError;
use std::path::{Path, PathBuf};
use thiserror::Error;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("source not found: {0}")]
    NotFound(String),
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("no image frames in {0}")]
    Empty(String),
    #[error("frame source is not open")]
    NotOpen,
    #[error("frame: {0}")]
    Frame(#[from] FrameError),
}

impl SourceError {
    /// The source itself is gone, as opposed to one bad frame.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Empty(_) | Self::NotOpen)
    }
}

/// A provider of downscaled analysis frames.
///
/// `open` acquires the underlying handle; `release` gives it back and is
/// safe to call when already released.
pub trait FrameSource: Send {
    fn open(&mut self) -> Result<(), SourceError>;

    fn is_open(&self) -> bool;

    /// Capture the current frame, downscaled to the analysis resolution.
    fn capture(&mut self) -> Result<Frame, SourceError>;

    fn release(&mut self);
}

fn decode(path: &Path) -> Result<RgbaImage, SourceError> {
    let image = image::open(path).map_err(|e| match e {
        image::ImageError::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
            SourceError::NotFound(path.display().to_string())
        }
        source => SourceError::Decode {
            path: path.display().to_string(),
            source,
        },
    })?;
    Ok(image.to_rgba8())
}

/// A single image file presented as a live feed: every capture returns the
/// same picture with an increasing sequence number.
pub struct StillImageSource {
    path: PathBuf,
    width: u32,
    height: u32,
    image: Option<RgbaImage>,
    sequence: u32,
}

impl StillImageSource {
    /// `width` x `height` is the analysis resolution.
    pub fn new(path: impl Into<PathBuf>, width: u32, height: u32) -> Self {
        Self {
            path: path.into(),
            width,
            height,
            image: None,
            sequence: 0,
        }
    }
}

impl FrameSource for StillImageSource {
    fn open(&mut self) -> Result<(), SourceError> {
        let image = decode(&self.path)?;
        tracing::info!(
            path = %self.path.display(),
            width = image.width(),
            height = image.height(),
            "opened still image"
        );
        self.image = Some(image);
        self.sequence = 0;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.image.is_some()
    }

    fn capture(&mut self) -> Result<Frame, SourceError> {
        let image = self.image.as_ref().ok_or(SourceError::NotOpen)?;
        let frame = Frame::from_image(image, self.width, self.height, self.sequence)?;
        self.sequence = self.sequence.wrapping_add(1);
        Ok(frame)
    }

    fn release(&mut self) {
        if self.image.take().is_some() {
            tracing::debug!(path = %self.path.display(), "released still image");
        }
    }
}

/// A directory of image files played back in file-name order, looping.
/// Each capture decodes the next file.
pub struct ImageSequenceSource {
    dir: PathBuf,
    width: u32,
    height: u32,
    files: Vec<PathBuf>,
    cursor: usize,
    sequence: u32,
    open: bool,
}

impl ImageSequenceSource {
    pub fn new(dir: impl Into<PathBuf>, width: u32, height: u32) -> Self {
        Self {
            dir: dir.into(),
            width,
            height,
            files: Vec::new(),
            cursor: 0,
            sequence: 0,
            open: false,
        }
    }

    /// Number of frames found by the last `open`.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn is_image_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
}

impl FrameSource for ImageSequenceSource {
    fn open(&mut self) -> Result<(), SourceError> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| SourceError::NotFound(format!("{}: {e}", self.dir.display())))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_image_file(path))
            .collect();
        if files.is_empty() {
            return Err(SourceError::Empty(self.dir.display().to_string()));
        }
        files.sort();

        tracing::info!(dir = %self.dir.display(), frames = files.len(), "opened image sequence");
        self.files = files;
        self.cursor = 0;
        self.sequence = 0;
        self.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn capture(&mut self) -> Result<Frame, SourceError> {
        if !self.open {
            return Err(SourceError::NotOpen);
        }
        let path = &self.files[self.cursor];
        self.cursor = (self.cursor + 1) % self.files.len();
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);

        let image = decode(path)?;
        tracing::trace!(path = %path.display(), sequence, "decoded frame");
        Ok(Frame::from_image(&image, self.width, self.height, sequence)?)
    }

    fn release(&mut self) {
        if self.open {
            tracing::debug!(dir = %self.dir.display(), "released image sequence");
        }
        self.open = false;
        self.files.clear();
        self.cursor = 0;
    }
}
