//! Configuration management for spotlight-slideshow

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::slideshow::EngineTiming;
use crate::spotlight::SpotlightTiming;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Per-window slideshow settings
    #[serde(default)]
    pub slideshow: SlideshowConfig,

    /// Spotlight rotation settings
    #[serde(default)]
    pub spotlight: SpotlightConfig,

    /// Path to config file (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlideshowConfig {
    /// Seconds each slide is shown before advancing (capped at 5)
    #[serde(default = "default_delay_secs")]
    pub default_delay_secs: f64,

    /// Tick loop interval while running (ms)
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Re-check interval while paused (ms)
    #[serde(default = "default_paused_tick_ms")]
    pub paused_tick_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotlightConfig {
    /// Seconds each window keeps the spotlight
    #[serde(default = "default_duration_secs")]
    pub duration_secs: f64,

    /// Scheduler loop interval while a window holds the spotlight (ms)
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Pause after handing the spotlight to a new window (ms)
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Scheduler loop interval while there is nothing to rotate (ms)
    #[serde(default = "default_idle_tick_ms")]
    pub idle_tick_ms: u64,

    /// Whether to start the scheduler on launch
    #[serde(default = "default_true")]
    pub autostart: bool,
}

// Default value functions
fn default_delay_secs() -> f64 {
    1.0
}

fn default_tick_ms() -> u64 {
    1000
}

fn default_paused_tick_ms() -> u64 {
    500
}

fn default_duration_secs() -> f64 {
    20.0
}

fn default_settle_ms() -> u64 {
    300
}

fn default_idle_tick_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

impl Default for SlideshowConfig {
    fn default() -> Self {
        Self {
            default_delay_secs: default_delay_secs(),
            tick_ms: default_tick_ms(),
            paused_tick_ms: default_paused_tick_ms(),
        }
    }
}

impl Default for SpotlightConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_duration_secs(),
            tick_ms: default_tick_ms(),
            settle_ms: default_settle_ms(),
            idle_tick_ms: default_idle_tick_ms(),
            autostart: true,
        }
    }
}

impl Config {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            // Create default config
            let mut config = Config::default();
            config.config_path = Some(config_path);
            config.save()?;
            Ok(config)
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = self.config_path()?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Get the config file path
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Self::default_config_path(),
        }
    }

    /// Get default config path
    fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = directories::ProjectDirs::from("dev", "spotlight-slideshow", "viewer")
            .context("Failed to determine config directory")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Timing for every slideshow engine; zero intervals fall back to defaults
    pub fn engine_timing(&self) -> EngineTiming {
        EngineTiming {
            tick: Duration::from_millis(self.slideshow.tick_ms),
            paused_tick: Duration::from_millis(self.slideshow.paused_tick_ms),
            default_delay_secs: self.slideshow.default_delay_secs,
        }
        .sanitized()
    }

    /// Timing for the spotlight scheduler; invalid values fall back to defaults
    pub fn spotlight_timing(&self) -> SpotlightTiming {
        SpotlightTiming {
            duration_secs: self.spotlight.duration_secs,
            tick: Duration::from_millis(self.spotlight.tick_ms),
            settle: Duration::from_millis(self.spotlight.settle_ms),
            idle_tick: Duration::from_millis(self.spotlight.idle_tick_ms),
        }
        .sanitized()
    }
}
