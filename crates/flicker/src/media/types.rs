use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// A frame as produced by an image source, before filters and resizing.
pub type RawImage = RgbaImage;

/// Output of a `FrameRenderer`: filters applied, resized to the target size.
pub type RenderedFrame = RgbaImage;

/// A rendered frame shared with readers.
pub type RenderableImage = Arc<RenderedFrame>;

/// Shortest delay honored for an animation frame. Zero and tiny delays are
/// common in the wild and would otherwise spin the pacing clock.
pub const MIN_FRAME_DELAY_MS: u32 = 20;

/// Bytes per pixel of a decoded RGBA8 frame.
pub const BYTES_PER_PIXEL: usize = 4;

/// Target display size for rendered frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
}

impl TargetSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A size with a zero dimension cannot be resized into.
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Convert a container delay in milliseconds to a frame duration, clamped to
/// [`MIN_FRAME_DELAY_MS`].
pub fn frame_delay(delay_ms: u32) -> Duration {
    Duration::from_millis(u64::from(delay_ms.max(MIN_FRAME_DELAY_MS)))
}

/// Approximate resident bytes of one RGBA8 frame.
pub fn frame_bytes(image: &RgbaImage) -> usize {
    image.width() as usize * image.height() as usize * BYTES_PER_PIXEL
}
