//! Captured frame type and RGBA downscaling to the analysis resolution.

use image::imageops::FilterType;
use image::RgbaImage;
use scangate_core::{FrameBuffer, FrameError};

/// One captured frame: the downscaled analysis buffer plus the size of the
/// capture it came from.
#[derive(Clone, Debug)]
pub struct Frame {
    pub buffer: FrameBuffer,
    pub original_width: u32,
    pub original_height: u32,
    /// When the frame was captured.
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl Frame {
    /// Downscale `image` to `width` x `height` and wrap it as a frame.
    pub fn from_image(
        image: &RgbaImage,
        width: u32,
        height: u32,
        sequence: u32,
    ) -> Result<Self, FrameError> {
        Ok(Self {
            buffer: downscale(image, width, height)?,
            original_width: image.width(),
            original_height: image.height(),
            timestamp: std::time::Instant::now(),
            sequence,
        })
    }

    pub fn original_size(&self) -> (u32, u32) {
        (self.original_width, self.original_height)
    }
}

/// Resize an RGBA image to exactly `width` x `height`, ignoring aspect ratio.
///
/// Triangle filtering is enough here: the analyzers only look at coarse
/// brightness and edge statistics.
pub fn downscale(image: &RgbaImage, width: u32, height: u32) -> Result<FrameBuffer, FrameError> {
    if width == 0 || height == 0 {
        return Err(FrameError::EmptyDimensions { width, height });
    }
    let resized = if image.dimensions() == (width, height) {
        image.clone()
    } else {
        image::imageops::resize(image, width, height, FilterType::Triangle)
    };
    FrameBuffer::new(resized.into_raw(), width, height)
}
