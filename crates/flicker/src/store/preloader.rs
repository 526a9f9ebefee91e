use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError, unbounded};
use serde::{Deserialize, Serialize};

use super::buffer::{FrameBuffer, FrameLoader};

/// Work for the background preload thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreloadJob {
    /// Read every frame duration, warm up the first window, then report Ready.
    Setup,
    /// Make sure `start` and the window after it are loaded.
    Window { start: usize },
}

/// Notifications delivered to the foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    /// Setup finished. `loop_duration` sums every frame duration, each capped
    /// at the store's max time step.
    Ready { loop_duration: Duration },
    /// Result of a `should_advance` call.
    Advanced(bool),
}

/// What happens to loaded frames that fall out of the preload window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Keep every frame once decoded.
    #[default]
    Retain,
    /// Drop frames outside the window around the job start and the live cursor.
    Window,
}

/// Everything the worker thread owns.
pub(crate) struct PreloadContext {
    pub buffer: Arc<FrameBuffer>,
    pub loader: FrameLoader,
    pub cursor: Arc<AtomicUsize>,
    pub eviction: EvictionPolicy,
    pub max_time_step: Duration,
    /// Receives the single Ready event.
    pub events: Sender<StoreEvent>,
}

/// Owns the preload thread. Dropping it abandons queued jobs, lets the load in
/// flight finish, then joins.
pub struct Preloader {
    job_tx: Option<Sender<PreloadJob>>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Preloader {
    pub(crate) fn spawn(context: PreloadContext) -> io::Result<Self> {
        let (job_tx, job_rx) = unbounded::<PreloadJob>();
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            context,
            shutdown: shutdown.clone(),
        };
        let handle = thread::Builder::new()
            .name("flicker-preload".into())
            .spawn(move || worker.run(&job_rx))?;

        Ok(Self {
            job_tx: Some(job_tx),
            shutdown,
            handle: Some(handle),
        })
    }

    /// Queue a job. Returns `false` if the worker is gone.
    pub fn request(&self, job: PreloadJob) -> bool {
        self.job_tx
            .as_ref()
            .is_some_and(|tx| tx.send(job).is_ok())
    }
}

impl Drop for Preloader {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.job_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

struct Worker {
    context: PreloadContext,
    shutdown: Arc<AtomicBool>,
}

impl Worker {
    fn run(&self, job_rx: &Receiver<PreloadJob>) {
        while let Ok(job) = job_rx.recv() {
            if self.stopping() {
                break;
            }
            match job {
                PreloadJob::Setup => self.setup(),
                PreloadJob::Window { start } => self.fill_window(start),
            }
        }
        log::debug!("Preload thread exiting");
    }

    fn stopping(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Load one slot unless the owner is shutting down.
    fn load(&self, index: usize) -> bool {
        !self.stopping() && self.context.buffer.load_slot(index, &self.context.loader)
    }

    fn setup(&self) {
        let context = &self.context;
        let buffer = &context.buffer;
        let source = context.loader.source();

        let mut loop_duration = Duration::ZERO;
        for index in 0..buffer.len() {
            let duration = source.frame_duration(index);
            buffer.set_duration(index, duration);
            loop_duration = loop_duration.saturating_add(duration.min(context.max_time_step));
        }

        let warm_up = buffer.buffer_frame_count().min(buffer.len().saturating_sub(1));
        if !buffer.is_empty() {
            for index in 0..=warm_up {
                self.load(index);
            }
        }
        if self.stopping() {
            return;
        }

        log::info!(
            "Frame store ready: {} frames, {} loaded, loop {:?}",
            buffer.len(),
            buffer.loaded_count(),
            loop_duration
        );
        match context.events.try_send(StoreEvent::Ready { loop_duration }) {
            // Foreground may already be gone
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => log::warn!("Ready event dropped: queue full"),
        }
    }

    fn fill_window(&self, start: usize) {
        let context = &self.context;
        let buffer = &context.buffer;
        // The current frame first: it may have been evicted or never warmed up
        self.load(start);

        let window = buffer.preload_window(start);
        let loaded = window.iter().filter(|&&index| self.load(index)).count();
        if self.stopping() {
            return;
        }
        if loaded > 0 {
            log::debug!("Preloaded {loaded} frame(s) after {start}");
        }

        if context.eviction == EvictionPolicy::Window && !window.is_empty() {
            let mut keep = buffer.retained_window(start);
            keep.extend(buffer.retained_window(context.cursor.load(Ordering::Acquire)));
            let evicted = buffer.evict_outside(&keep);
            if evicted > 0 {
                log::debug!("Evicted {evicted} frame(s) outside window at {start}");
            }
        }
    }
}
