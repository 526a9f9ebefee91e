use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use super::slot::FrameSlot;
use crate::media::decoder::ImageSource;
use crate::media::filter::{ContentMode, FrameRenderer};
use crate::media::types::{RawImage, RenderableImage, RenderedFrame, TargetSize};

/// Decode + render pipeline for a single frame index.
pub struct FrameLoader {
    source: Arc<dyn ImageSource>,
    renderer: Arc<dyn FrameRenderer>,
    size: Option<TargetSize>,
    content_mode: ContentMode,
}

impl FrameLoader {
    pub fn new(
        source: Arc<dyn ImageSource>,
        renderer: Arc<dyn FrameRenderer>,
        size: Option<TargetSize>,
        content_mode: ContentMode,
    ) -> Self {
        Self {
            source,
            renderer,
            size,
            content_mode,
        }
    }

    pub fn source(&self) -> &dyn ImageSource {
        self.source.as_ref()
    }

    /// Decode and render frame `index`. Failures are logged and yield `None`.
    pub fn load(&self, index: usize) -> Option<(RawImage, RenderedFrame)> {
        let raw = match self.source.decode(index) {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("Failed to decode frame {index}: {e}");
                return None;
            }
        };
        match self.renderer.render(&raw, self.size, self.content_mode) {
            Ok(image) => Some((raw, image)),
            Err(e) => {
                log::warn!("Failed to render frame {index}: {e}");
                None
            }
        }
    }
}

/// Fixed-size arena of frame slots with a bounded lookahead window.
///
/// Each slot sits behind its own lock. Loading decodes outside any lock and
/// only takes the write lock to install the result, so readers never wait on a
/// decode.
pub struct FrameBuffer {
    slots: Vec<RwLock<FrameSlot>>,
    buffer_frame_count: usize,
}

impl FrameBuffer {
    pub fn new(frame_count: usize, buffer_frame_count: usize) -> Self {
        Self {
            slots: (0..frame_count)
                .map(|_| RwLock::new(FrameSlot::placeholder()))
                .collect(),
            buffer_frame_count,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn buffer_frame_count(&self) -> usize {
        self.buffer_frame_count
    }

    fn read(&self, index: usize) -> Option<RwLockReadGuard<'_, FrameSlot>> {
        self.slots
            .get(index)
            .map(|slot| slot.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write(&self, index: usize) -> Option<RwLockWriteGuard<'_, FrameSlot>> {
        self.slots
            .get(index)
            .map(|slot| slot.write().unwrap_or_else(PoisonError::into_inner))
    }

    /// Rendered image at `index`; `None` when out of range or not loaded yet.
    pub fn frame_image(&self, index: usize) -> Option<RenderableImage> {
        self.read(index)?.image().cloned()
    }

    /// Display duration at `index`. Unknown or out of range reads as
    /// `Duration::MAX` so the frame never expires early.
    pub fn duration(&self, index: usize) -> Duration {
        self.read(index)
            .and_then(|slot| slot.duration())
            .unwrap_or(Duration::MAX)
    }

    pub fn set_duration(&self, index: usize, duration: Duration) {
        if let Some(mut slot) = self.write(index) {
            slot.set_duration(duration);
        }
    }

    pub fn is_loaded(&self, index: usize) -> bool {
        self.read(index).is_some_and(|slot| !slot.is_placeholder())
    }

    pub fn loaded_count(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_loaded(i)).count()
    }

    /// First loaded image scanning from index 0.
    pub fn first_image(&self) -> Option<RenderableImage> {
        (0..self.len()).find_map(|i| self.frame_image(i))
    }

    /// Populate slot `index` if it is still a placeholder. Returns `true` when
    /// this call loaded it; a loaded slot, bad index or pipeline failure is a
    /// no-op returning `false`.
    pub fn load_slot(&self, index: usize, loader: &FrameLoader) -> bool {
        match self.read(index) {
            Some(slot) if slot.is_placeholder() => {}
            _ => return false,
        }

        let Some((raw, image)) = loader.load(index) else {
            return false;
        };

        match self.write(index) {
            Some(mut slot) if slot.is_placeholder() => {
                slot.fill(raw, Arc::new(image));
                true
            }
            _ => false,
        }
    }

    /// The `buffer_frame_count` indices after `start`, wrapping past the last
    /// frame. Empty when the buffer already covers every other frame.
    pub fn preload_window(&self, start: usize) -> Vec<usize> {
        let n = self.len();
        if n == 0 || self.buffer_frame_count >= n - 1 {
            return Vec::new();
        }
        (1..=self.buffer_frame_count)
            .map(|offset| (start + offset) % n)
            .collect()
    }

    /// Indices worth keeping resident around `cursor`: the frame just shown,
    /// the current one and the lookahead window.
    pub fn retained_window(&self, cursor: usize) -> Vec<usize> {
        let n = self.len();
        if n == 0 {
            return Vec::new();
        }
        let cursor = cursor % n;
        let mut keep = Vec::with_capacity(self.buffer_frame_count + 2);
        keep.push((cursor + n - 1) % n);
        keep.push(cursor);
        keep.extend(self.preload_window(cursor));
        keep
    }

    /// Return every loaded slot not listed in `keep` to placeholder state.
    pub fn evict_outside(&self, keep: &[usize]) -> usize {
        let mut evicted = 0;
        for index in 0..self.len() {
            if keep.contains(&index) {
                continue;
            }
            if let Some(mut slot) = self.write(index) {
                if slot.evict() {
                    evicted += 1;
                }
            }
        }
        evicted
    }
}
