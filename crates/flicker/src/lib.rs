//! Animated-image playback: format sniffing, frame decoding and a paced,
//! preloading frame store.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use flicker::{AnimatedOptions, AnimatedSource, FrameStore};
//!
//! let source = AnimatedSource::open("spinner.gif".as_ref())?;
//! let mut store = FrameStore::new(Arc::new(source), &AnimatedOptions::default())?;
//! store.wait_ready(Duration::from_secs(1));
//! if store.tick(Duration::from_millis(16)) {
//!     let _frame = store.current_image();
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod media;
pub mod store;

#[cfg(test)]
mod test_support;

pub use config::{AnimatedOptions, PlaybackConfig};
pub use error::{ConfigError, RenderError, SourceError, StoreError};
pub use format::AssetType;
pub use media::decoder::{AnimatedSource, ImageSource};
pub use media::filter::{ContentMode, Filter, FilterPipeline, FrameRenderer};
pub use media::types::{RenderableImage, RenderedFrame, TargetSize};
pub use store::FrameStore;
pub use store::clock::{FrameChange, PlaybackClock, Tick};
pub use store::preloader::{EvictionPolicy, StoreEvent};
