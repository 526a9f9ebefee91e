//! Per-frame filter chain and content-fit resizing.

use image::DynamicImage;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use super::types::{RawImage, RenderedFrame, TargetSize};
use crate::error::RenderError;

/// Resampling filter used for every content-mode resize.
const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// How a frame is fitted into the target size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentMode {
    /// Stretch to exactly the target size.
    ScaleToFill,
    /// Fit inside the target, preserving aspect ratio.
    #[default]
    ScaleAspectFit,
    /// Cover the target, preserving aspect ratio and cropping the overflow.
    ScaleAspectFill,
    /// Keep the decoded size.
    Original,
}

impl ContentMode {
    /// Resize `image` into `size`. No size, or a size with a zero dimension,
    /// leaves the image untouched.
    pub fn resize(self, image: DynamicImage, size: Option<TargetSize>) -> DynamicImage {
        let Some(size) = size.filter(|s| !s.is_empty()) else {
            return image;
        };
        if image.width() == size.width && image.height() == size.height {
            return image;
        }
        match self {
            ContentMode::ScaleToFill => image.resize_exact(size.width, size.height, RESIZE_FILTER),
            ContentMode::ScaleAspectFit => image.resize(size.width, size.height, RESIZE_FILTER),
            ContentMode::ScaleAspectFill => {
                image.resize_to_fill(size.width, size.height, RESIZE_FILTER)
            }
            ContentMode::Original => image,
        }
    }
}

/// A single pixel filter. Filters run in list order before resizing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "amount", rename_all = "snake_case")]
pub enum Filter {
    Grayscale,
    Invert,
    /// Add to every channel (negative darkens).
    Brighten(i32),
    /// Contrast adjustment in percent; positive increases.
    Contrast(f32),
    /// Hue rotation in degrees.
    HueRotate(i32),
    /// Gaussian blur sigma.
    Blur(f32),
    FlipHorizontal,
    FlipVertical,
}

impl Filter {
    pub fn apply(self, image: DynamicImage) -> DynamicImage {
        match self {
            Filter::Grayscale => DynamicImage::ImageRgba8(image.grayscale().into_rgba8()),
            Filter::Invert => {
                let mut image = image;
                image.invert();
                image
            }
            Filter::Brighten(value) => image.brighten(value),
            Filter::Contrast(value) => image.adjust_contrast(value),
            Filter::HueRotate(degrees) => image.huerotate(degrees),
            Filter::Blur(sigma) if sigma > 0.0 => image.blur(sigma),
            Filter::Blur(_) => image,
            Filter::FlipHorizontal => image.fliph(),
            Filter::FlipVertical => image.flipv(),
        }
    }
}

/// Turns a raw frame into the image readers display.
pub trait FrameRenderer: Send + Sync {
    fn render(
        &self,
        raw: &RawImage,
        size: Option<TargetSize>,
        mode: ContentMode,
    ) -> Result<RenderedFrame, RenderError>;
}

/// Default renderer: apply `filters` in order, then fit with the content mode.
#[derive(Debug, Clone, Default)]
pub struct FilterPipeline {
    filters: Vec<Filter>,
}

impl FilterPipeline {
    pub fn new(filters: Vec<Filter>) -> Self {
        Self { filters }
    }
}

impl FrameRenderer for FilterPipeline {
    fn render(
        &self,
        raw: &RawImage,
        size: Option<TargetSize>,
        mode: ContentMode,
    ) -> Result<RenderedFrame, RenderError> {
        let filtered = self
            .filters
            .iter()
            .fold(DynamicImage::ImageRgba8(raw.clone()), |img, filter| {
                filter.apply(img)
            });
        let out = mode.resize(filtered, size).into_rgba8();
        if out.width() == 0 || out.height() == 0 {
            return Err(RenderError::EmptyOutput {
                width: out.width(),
                height: out.height(),
            });
        }
        Ok(out)
    }
}
