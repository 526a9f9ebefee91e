use thiserror::Error;

use crate::format::AssetType;

/// Failure to produce raw frames from an image source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read image source: {0}")]
    Io(#[from] std::io::Error),

    #[error("GIF decode error: {0}")]
    Gif(#[from] gif::DecodingError),

    #[error("WebP decode error: {0}")]
    Webp(#[from] image_webp::DecodingError),

    #[error("image decode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("unsupported asset type {0}")]
    Unsupported(AssetType),

    #[error("decoded frame buffer does not fit {width}x{height}")]
    FrameBuffer { width: u32, height: u32 },

    #[error("image source contains no frames")]
    NoFrames,

    #[error("frame index {index} out of range (frame count {count})")]
    FrameOutOfRange { index: usize, count: usize },
}

/// Failure in the filter/resize stage.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render produced an empty {width}x{height} image")]
    EmptyOutput { width: u32, height: u32 },
}

/// Failure loading or saving a playback config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure constructing a frame store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to spawn preload worker: {0}")]
    Spawn(#[from] std::io::Error),
}
