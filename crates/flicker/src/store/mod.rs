//! Frame cache, pacing clock and background preloading for one animation.

pub mod buffer;
pub mod clock;
pub mod preloader;
pub mod slot;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, select};

use crate::config::AnimatedOptions;
use crate::error::StoreError;
use crate::media::decoder::ImageSource;
use crate::media::filter::{FilterPipeline, FrameRenderer};
use crate::media::types::{RenderableImage, frame_bytes};
use buffer::{FrameBuffer, FrameLoader};
use clock::{PlaybackClock, Tick};
use preloader::{PreloadContext, PreloadJob, Preloader, StoreEvent};

/// Unread [`StoreEvent::Advanced`] results kept; older ones are dropped first.
pub const ADVANCE_EVENT_CAPACITY: usize = 64;

/// Playback state for one animated image.
///
/// Frames are decoded on a dedicated preload thread; the host drives pacing by
/// calling [`FrameStore::tick`] (or [`FrameStore::should_advance`]) once per
/// display refresh and reads [`FrameStore::current_image`]. Nothing here blocks
/// on a decode.
pub struct FrameStore {
    buffer: Arc<FrameBuffer>,
    clock: PlaybackClock,
    cursor: Arc<AtomicUsize>,
    ready_rx: Receiver<StoreEvent>,
    advanced_tx: Sender<StoreEvent>,
    advanced_rx: Receiver<StoreEvent>,
    loop_duration: Option<Duration>,
    preloader: Preloader,
}

impl FrameStore {
    /// Store rendering through a [`FilterPipeline`] built from `options.filters`.
    pub fn new(source: Arc<dyn ImageSource>, options: &AnimatedOptions) -> Result<Self, StoreError> {
        let renderer = Arc::new(FilterPipeline::new(options.filters.clone()));
        Self::with_renderer(source, renderer, options)
    }

    pub fn with_renderer(
        source: Arc<dyn ImageSource>,
        renderer: Arc<dyn FrameRenderer>,
        options: &AnimatedOptions,
    ) -> Result<Self, StoreError> {
        let frame_count = source.frame_count();
        let buffer = Arc::new(FrameBuffer::new(frame_count, options.buffer_frame_count));
        let cursor = Arc::new(AtomicUsize::new(0));
        let (ready_tx, ready_rx) = bounded(1);
        let (advanced_tx, advanced_rx) = bounded(ADVANCE_EVENT_CAPACITY);

        let preloader = Preloader::spawn(PreloadContext {
            buffer: buffer.clone(),
            loader: FrameLoader::new(source, renderer, options.size, options.content_mode),
            cursor: cursor.clone(),
            eviction: options.eviction,
            max_time_step: options.max_time_step,
            events: ready_tx,
        })?;
        preloader.request(PreloadJob::Setup);

        log::debug!(
            "Frame store created: {frame_count} frames, window {}, loops {}",
            options.buffer_frame_count,
            options.loop_count
        );

        Ok(Self {
            buffer,
            clock: PlaybackClock::new(frame_count, options.loop_count, options.max_time_step),
            cursor,
            ready_rx,
            advanced_tx,
            advanced_rx,
            loop_duration: None,
            preloader,
        })
    }

    /// Advance playback by `elapsed`. Returns whether the displayed frame
    /// changed; a change queues a preload for the new cursor.
    pub fn tick(&mut self, elapsed: Duration) -> bool {
        let buffer = &self.buffer;
        let change = match self.clock.tick(elapsed, |index| buffer.duration(index)) {
            Tick::Hold => return false,
            Tick::Advanced(change) => change,
        };

        self.cursor.store(change.current, Ordering::Release);
        if change.wrapped {
            log::debug!("Loop {} started", self.clock.current_loop());
        }
        if change.finished {
            log::info!(
                "Playback finished on frame {} after {} loop(s)",
                change.current,
                self.clock.current_loop() + 1
            );
        }
        if !self.preloader.request(PreloadJob::Window {
            start: change.current,
        }) {
            log::warn!("Preload thread gone; frame {} not queued", change.current);
        }
        true
    }

    /// [`tick`](Self::tick), delivering the result as a
    /// [`StoreEvent::Advanced`] instead of returning it. At most
    /// [`ADVANCE_EVENT_CAPACITY`] results wait unread.
    pub fn should_advance(&mut self, elapsed: Duration) {
        let event = StoreEvent::Advanced(self.tick(elapsed));
        if let Err(TrySendError::Full(event)) = self.advanced_tx.try_send(event) {
            let _ = self.advanced_rx.try_recv();
            let _ = self.advanced_tx.try_send(event);
        }
    }

    /// Next pending event; Ready comes before any queued advance results.
    pub fn try_recv_event(&mut self) -> Option<StoreEvent> {
        let event = self
            .ready_rx
            .try_recv()
            .or_else(|_| self.advanced_rx.try_recv())
            .ok()?;
        Some(self.observe(event))
    }

    pub fn recv_event_timeout(&mut self, timeout: Duration) -> Option<StoreEvent> {
        if let Some(event) = self.try_recv_event() {
            return Some(event);
        }
        let event = select! {
            recv(self.ready_rx) -> event => event.ok(),
            recv(self.advanced_rx) -> event => event.ok(),
            default(timeout) => None,
        };
        event.map(|event| self.observe(event))
    }

    /// Block until setup reports Ready or `timeout` passes. Queued advance
    /// results are left alone.
    pub fn wait_ready(&mut self, timeout: Duration) -> bool {
        if self.is_ready() {
            return true;
        }
        if let Ok(event) = self.ready_rx.recv_timeout(timeout) {
            self.observe(event);
        }
        self.is_ready()
    }

    fn observe(&mut self, event: StoreEvent) -> StoreEvent {
        if let StoreEvent::Ready { loop_duration } = event {
            self.loop_duration = Some(loop_duration);
        }
        event
    }

    pub fn is_ready(&self) -> bool {
        self.loop_duration.is_some()
    }

    /// Image for the current frame, `None` while it is still loading.
    pub fn current_image(&self) -> Option<RenderableImage> {
        self.buffer.frame_image(self.clock.current_frame_index())
    }

    /// First loaded frame, scanning from the start. Useful as a poster image.
    pub fn first_image(&self) -> Option<RenderableImage> {
        self.buffer.first_image()
    }

    pub fn is_animatable(&self) -> bool {
        self.clock.is_animatable()
    }

    /// Bytes needed to hold every rendered frame, extrapolated from one loaded
    /// frame. 0 until something has loaded.
    pub fn estimated_memory_cost(&self) -> usize {
        self.buffer
            .first_image()
            .map_or(0, |image| frame_bytes(&image) * self.buffer.len())
    }

    pub fn is_finished(&self) -> bool {
        self.clock.is_finished()
    }

    pub fn current_loop(&self) -> usize {
        self.clock.current_loop()
    }

    pub fn current_frame_index(&self) -> usize {
        self.clock.current_frame_index()
    }

    pub fn frame_count(&self) -> usize {
        self.buffer.len()
    }

    pub fn loaded_frame_count(&self) -> usize {
        self.buffer.loaded_count()
    }

    /// Known once Ready has been received.
    pub fn loop_duration(&self) -> Option<Duration> {
        self.loop_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::filter::ContentMode;
    use crate::media::types::TargetSize;
    use crate::store::preloader::EvictionPolicy;
    use crate::test_support::{CountingSource, FRAME_HEIGHT, FRAME_WIDTH, wait_until};
    use std::time::Instant;

    const STEP: Duration = Duration::from_millis(10);
    const TIMEOUT: Duration = Duration::from_secs(5);

    fn options(buffer_frame_count: usize, loop_count: i32) -> AnimatedOptions {
        AnimatedOptions {
            buffer_frame_count,
            loop_count,
            ..AnimatedOptions::default()
        }
    }

    fn ready_store(source: CountingSource, options: &AnimatedOptions) -> FrameStore {
        let mut store = FrameStore::new(Arc::new(source), options).unwrap();
        assert!(store.wait_ready(TIMEOUT), "store never became ready");
        store
    }

    #[test]
    fn becomes_ready_with_first_frame() {
        let store = ready_store(CountingSource::new(5, STEP), &options(2, 0));

        assert!(store.is_ready());
        assert_eq!(store.loop_duration(), Some(Duration::from_millis(50)));
        assert_eq!(store.frame_count(), 5);
        assert!(store.is_animatable());
        let image = store.current_image().unwrap();
        assert_eq!(image.get_pixel(0, 0)[0], 0);
        assert_eq!(store.loaded_frame_count(), 3);
    }

    #[test]
    fn advance_preloads_next_window() {
        let mut store = ready_store(CountingSource::new(10, STEP), &options(2, 0));

        assert!(store.tick(STEP));
        assert_eq!(store.current_frame_index(), 1);
        assert!(wait_until(TIMEOUT, || store.buffer.is_loaded(3)));
        assert!(!store.buffer.is_loaded(4));
    }

    #[test]
    fn holds_until_frame_duration_elapses() {
        let mut store = ready_store(CountingSource::new(3, STEP * 3), &options(5, 0));
        assert!(!store.tick(STEP));
        assert!(!store.tick(STEP));
        assert!(store.tick(STEP));
    }

    #[test]
    fn window_eviction_bounds_resident_frames() {
        let options = AnimatedOptions {
            eviction: EvictionPolicy::Window,
            ..options(2, 0)
        };
        let mut store = ready_store(CountingSource::new(10, STEP), &options);
        for _ in 0..5 {
            assert!(store.tick(STEP));
        }
        let buffer = store.buffer.clone();

        assert!(wait_until(TIMEOUT, || buffer.loaded_count() == 4 && buffer.is_loaded(7)));
        for index in 4..=7 {
            assert!(buffer.is_loaded(index), "frame {index} evicted");
        }
    }

    #[test]
    fn memory_cost_is_linear_in_frame_count() {
        let small = ready_store(CountingSource::new(3, STEP), &options(20, 0));
        let large = ready_store(CountingSource::new(6, STEP), &options(20, 0));

        let frame = (FRAME_WIDTH * FRAME_HEIGHT * 4) as usize;
        assert_eq!(small.estimated_memory_cost(), frame * 3);
        assert_eq!(large.estimated_memory_cost(), 2 * small.estimated_memory_cost());
    }

    #[test]
    fn memory_cost_is_zero_when_nothing_loaded() {
        let store = ready_store(CountingSource::new(3, STEP).failing(&[0, 1, 2]), &options(2, 0));
        assert_eq!(store.estimated_memory_cost(), 0);
        assert!(store.first_image().is_none());
    }

    #[test]
    fn failed_frame_keeps_animating() {
        let mut store = ready_store(CountingSource::new(3, STEP).failing(&[1]), &options(2, 0));

        assert!(store.tick(STEP));
        assert_eq!(store.current_frame_index(), 1);
        assert!(store.current_image().is_none());
        assert!(store.tick(STEP));
        assert_eq!(store.current_frame_index(), 2);
        assert!(store.current_image().is_some());
    }

    #[test]
    fn should_advance_posts_events() {
        let mut store = ready_store(CountingSource::new(3, STEP), &options(2, 0));

        store.should_advance(STEP);
        assert_eq!(store.current_frame_index(), 1);
        assert_eq!(store.try_recv_event(), Some(StoreEvent::Advanced(true)));
        store.should_advance(Duration::from_millis(1));
        assert_eq!(
            store.recv_event_timeout(TIMEOUT),
            Some(StoreEvent::Advanced(false))
        );
        assert_eq!(store.try_recv_event(), None);
    }

    #[test]
    fn unread_advance_events_stay_bounded() {
        let mut store = ready_store(CountingSource::new(3, STEP), &options(2, 0));

        for _ in 0..10_000 {
            store.should_advance(Duration::ZERO);
        }
        store.should_advance(STEP);
        assert_eq!(store.advanced_rx.len(), ADVANCE_EVENT_CAPACITY);

        let mut drained = Vec::new();
        while let Some(event) = store.try_recv_event() {
            drained.push(event);
        }
        assert_eq!(drained.len(), ADVANCE_EVENT_CAPACITY);
        // the newest result survives
        assert_eq!(drained.last(), Some(&StoreEvent::Advanced(true)));
    }

    #[test]
    fn ready_arrives_even_with_a_full_advance_queue() {
        let source = CountingSource::new(30, STEP).slow(Duration::from_millis(5));
        let mut store = FrameStore::new(Arc::new(source), &options(5, 0)).unwrap();
        for _ in 0..(ADVANCE_EVENT_CAPACITY * 2) {
            store.should_advance(Duration::ZERO);
        }
        assert!(store.wait_ready(TIMEOUT));
        assert_eq!(store.advanced_rx.len(), ADVANCE_EVENT_CAPACITY);
    }

    #[test]
    fn finite_loops_finish() {
        let mut store = ready_store(CountingSource::new(3, STEP), &options(3, 1));
        assert!(store.tick(STEP));
        assert!(!store.is_finished());
        assert!(store.tick(STEP));
        assert!(store.is_finished());
        assert_eq!(store.current_loop(), 0);
    }

    #[test]
    fn single_frame_is_not_animatable() {
        let mut store = ready_store(CountingSource::new(1, STEP), &options(2, 0));
        assert!(!store.is_animatable());
        assert!(!store.tick(Duration::from_secs(10)));
        assert!(store.current_image().is_some());
    }

    #[test]
    fn renders_at_requested_size() {
        let options = AnimatedOptions {
            size: Some(TargetSize::new(2, 2)),
            content_mode: ContentMode::ScaleToFill,
            ..options(2, 0)
        };
        let store = ready_store(CountingSource::new(2, STEP), &options);
        assert_eq!(store.current_image().unwrap().dimensions(), (2, 2));
    }

    #[test]
    fn drop_during_slow_setup_returns_promptly() {
        let source = CountingSource::new(60, STEP).slow(Duration::from_millis(50));
        let store = FrameStore::new(Arc::new(source), &options(40, 0)).unwrap();

        let started = Instant::now();
        drop(store);
        assert!(
            started.elapsed() < Duration::from_millis(500),
            "drop waited {:?}",
            started.elapsed()
        );
    }
}
