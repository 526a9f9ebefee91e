use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::media::filter::{ContentMode, Filter};
use crate::media::types::TargetSize;
use crate::store::clock::DEFAULT_MAX_TIME_STEP;
use crate::store::preloader::EvictionPolicy;

pub const DEFAULT_BUFFER_FRAME_COUNT: usize = 20;

/// Construction-time options for a `FrameStore`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimatedOptions {
    /// Render size; `None` keeps the decoded size.
    pub size: Option<TargetSize>,
    pub content_mode: ContentMode,
    pub filters: Vec<Filter>,
    /// Frames decoded ahead of the cursor.
    pub buffer_frame_count: usize,
    /// Loops to play; `<= 0` loops forever.
    pub loop_count: i32,
    #[serde(rename = "max_time_step_ms", with = "duration_ms")]
    pub max_time_step: Duration,
    pub eviction: EvictionPolicy,
}

impl Default for AnimatedOptions {
    fn default() -> Self {
        Self {
            size: None,
            content_mode: ContentMode::default(),
            filters: Vec::new(),
            buffer_frame_count: DEFAULT_BUFFER_FRAME_COUNT,
            loop_count: 0,
            max_time_step: DEFAULT_MAX_TIME_STEP,
            eviction: EvictionPolicy::default(),
        }
    }
}

/// Persisted playback settings for the `flicker` binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    pub version: u32,
    #[serde(default)]
    pub animation: AnimatedOptions,
    /// Simulated display refresh rate.
    #[serde(default = "default_refresh_rate")]
    pub refresh_rate_hz: u32,
    /// Stop the demo after this many loops even when playback loops forever.
    #[serde(default)]
    pub max_loops_to_play: Option<usize>,
}

fn default_refresh_rate() -> u32 {
    60
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            version: 1,
            animation: AnimatedOptions::default(),
            refresh_rate_hz: default_refresh_rate(),
            max_loops_to_play: None,
        }
    }
}

impl PlaybackConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("flicker").join("playback.json"))
    }

    /// Load from the user config dir. Missing or malformed files yield defaults.
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(ConfigError::Io(_)) => Self::default(),
            Err(e) => {
                log::warn!("Ignoring malformed config {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Write to the user config dir, logging failures.
    pub fn save(&self) {
        let Some(path) = Self::default_path() else {
            return;
        };
        match self.save_to(&path) {
            Ok(()) => log::info!("Saved config to {}", path.display()),
            Err(e) => log::warn!("Failed to save config {}: {e}", path.display()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Time between simulated display refreshes.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(1) / self.refresh_rate_hz.max(1)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
