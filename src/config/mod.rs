use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Player configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Audio render engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Size of the output buffer, in milliseconds of audio
    pub latency_ms: u32,
    /// Decode the whole source up front so seeks are sample accurate
    pub seekable: bool,
    pub looping: bool,
    pub default_volume: f32,
    /// Frames per seek buffer chunk
    pub chunk_frames: usize,
    pub preferred_device: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            latency_ms: 500,
            seekable: true,
            looping: true,
            default_volume: 0.8,
            chunk_frames: 1_000_000,
            preferred_device: None,
        }
    }
}

impl EngineConfig {
    /// Interval between render ticks, a third of the buffer latency
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.latency_ms.max(3) / 3))
    }

    /// Output buffer length for `sample_rate`, rounded up to 16 frames
    pub fn buffer_frames(&self, sample_rate: u32) -> usize {
        let frames = sample_rate as usize * self.latency_ms as usize / 1000;
        ((frames + 15) & !15).max(16)
    }
}

/// Playlist scheduler and asset cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Persisted playlists, play position and cached assets
    pub cache_dir: PathBuf,
    /// Directory assets are fetched from
    pub asset_dir: PathBuf,
    pub refresh_interval_secs: u64,
    pub persist_interval_secs: u64,
    pub fetch_workers: usize,
    pub max_playlists: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let base = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("signage-player");
        Self {
            cache_dir: dirs::cache_dir()
                .map(|dir| dir.join("signage-player"))
                .unwrap_or_else(|| base.join("cache")),
            asset_dir: base.join("assets"),
            refresh_interval_secs: 60,
            persist_interval_secs: 5,
            fetch_workers: 4,
            max_playlists: 32,
        }
    }
}

impl SchedulerConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn persist_interval(&self) -> Duration {
        Duration::from_secs(self.persist_interval_secs.max(1))
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    config: PlayerConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path()?;
        Self::open(config_path)
    }

    /// Load from an explicit path, falling back to defaults if the file is missing
    pub fn open(config_path: PathBuf) -> Result<Self, ConfigError> {
        let config = Self::load_config(&config_path)?;
        Ok(Self { config, config_path })
    }

    pub fn get_config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn update_config<F>(&mut self, updater: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut PlayerConfig),
    {
        updater(&mut self.config);
        self.save_config()
    }

    pub fn set_volume(&mut self, volume: f32) -> Result<(), ConfigError> {
        self.config.engine.default_volume = volume.clamp(0.0, 1.0);
        self.save_config()
    }

    pub fn set_preferred_device(&mut self, device: Option<String>) -> Result<(), ConfigError> {
        self.config.engine.preferred_device = device;
        self.save_config()
    }

    pub fn reset_to_defaults(&mut self) -> Result<(), ConfigError> {
        self.config = PlayerConfig::default();
        self.save_config()
    }

    fn get_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::home_dir()
            .ok_or(ConfigError::ConfigDirNotFound)?
            .join(".config")
            .join("signage-player");

        std::fs::create_dir_all(&config_dir)?;

        Ok(config_dir.join("config.toml"))
    }

    fn load_config(path: &Path) -> Result<PlayerConfig, ConfigError> {
        if !path.exists() {
            return Ok(PlayerConfig::default());
        }

        let config_content = std::fs::read_to_string(path)?;
        let config: PlayerConfig = toml::from_str(&config_content)?;

        Ok(config)
    }

    fn save_config(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let config_content = toml::to_string_pretty(&self.config)?;
        std::fs::write(&self.config_path, config_content)?;

        Ok(())
    }
}
