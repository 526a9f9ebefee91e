use std::time::Duration;

use crate::media::types::{RawImage, RenderableImage};

#[derive(Default)]
enum SlotState {
    #[default]
    Placeholder,
    Loaded {
        raw: RawImage,
        image: RenderableImage,
    },
}

/// One frame of the animation: decoded images once loaded, plus its display
/// duration once the source metadata has been read.
#[derive(Default)]
pub struct FrameSlot {
    duration: Option<Duration>,
    state: SlotState,
}

impl FrameSlot {
    pub fn placeholder() -> Self {
        Self::default()
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.state, SlotState::Placeholder)
    }

    /// Rendered image, if loaded.
    pub fn image(&self) -> Option<&RenderableImage> {
        match &self.state {
            SlotState::Loaded { image, .. } => Some(image),
            SlotState::Placeholder => None,
        }
    }

    /// Decoded image before filters and resizing, if loaded.
    pub fn raw(&self) -> Option<&RawImage> {
        match &self.state {
            SlotState::Loaded { raw, .. } => Some(raw),
            SlotState::Placeholder => None,
        }
    }

    /// `None` until the source metadata has been read.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub(crate) fn set_duration(&mut self, duration: Duration) {
        self.duration = Some(duration);
    }

    pub(crate) fn fill(&mut self, raw: RawImage, image: RenderableImage) {
        self.state = SlotState::Loaded { raw, image };
    }

    /// Drop both images, keeping the duration. Returns whether anything was freed.
    pub(crate) fn evict(&mut self) -> bool {
        let was_loaded = !self.is_placeholder();
        self.state = SlotState::Placeholder;
        was_loaded
    }
}
