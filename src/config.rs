use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{download::pool::MAX_WORKERS, error::CoreError, storage::db::DATABASE_FILE_NAME};

const APP_DIR_NAME: &str = "ub-wavex";
const MUSIC_DIR_NAME: &str = "UB-WaveX";
pub const CACHE_DIR_NAME: &str = "cache";

/// Startup configuration; every field has a default so the file is optional.
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub downloads: DownloadSettings,
    pub backend: BackendConfig,
    pub metadata: MetadataConfig,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.to_string_lossy()))?;
        toml::from_str(&contents).with_context(|| "Failed to parse config TOML")
    }

    /// Loads `path` when given, else runs on defaults.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Config> {
        let cfg = match path {
            Some(path) => Self::load(path)?,
            None => Config::default(),
        };
        cfg.downloads
            .validate()
            .with_context(|| "Invalid [downloads] section")?;
        Ok(cfg)
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    /// holds the database and the on-disk cache
    pub data_dir: Option<PathBuf>,
    pub download_dir: Option<PathBuf>,
}

impl PathsConfig {
    pub fn resolve(&self) -> AppPaths {
        let data_dir = self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR_NAME)
        });
        let download_dir = self.download_dir.clone().unwrap_or_else(|| {
            dirs::audio_dir()
                .or_else(|| dirs::home_dir().map(|home| home.join("Music")))
                .unwrap_or_else(|| PathBuf::from("."))
                .join(MUSIC_DIR_NAME)
        });

        AppPaths {
            db_path: data_dir.join(DATABASE_FILE_NAME),
            cache_dir: data_dir.join(CACHE_DIR_NAME),
            download_dir,
        }
    }
}

/// Directories the core reads from and writes to at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub db_path: PathBuf,
    pub cache_dir: PathBuf,
    pub download_dir: PathBuf,
}

/// Download behaviour, updatable by the host at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DownloadSettings {
    #[serde(alias = "auto_download")]
    pub auto_download: bool,
    #[serde(alias = "concurrent_downloads")]
    pub concurrent_downloads: usize,
    #[serde(alias = "embed_metadata")]
    pub embed_metadata: bool,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            auto_download: false,
            concurrent_downloads: 3,
            embed_metadata: true,
        }
    }
}

impl DownloadSettings {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(1..=MAX_WORKERS).contains(&self.concurrent_downloads) {
            return Err(CoreError::InvalidRequest(format!(
                "concurrentDownloads must be between 1 and {MAX_WORKERS}, got {}",
                self.concurrent_downloads
            )));
        }
        Ok(())
    }

    /// Merges `update` over the current values; nothing changes if the result is invalid.
    pub fn apply(&mut self, update: &DownloadSettingsUpdate) -> Result<(), CoreError> {
        let merged = Self {
            auto_download: update.auto_download.unwrap_or(self.auto_download),
            concurrent_downloads: update
                .concurrent_downloads
                .unwrap_or(self.concurrent_downloads),
            embed_metadata: update.embed_metadata.unwrap_or(self.embed_metadata),
        };
        merged.validate()?;
        *self = merged;
        Ok(())
    }
}

/// Partial settings as sent by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadSettingsUpdate {
    #[serde(alias = "auto_download")]
    pub auto_download: Option<bool>,
    #[serde(alias = "concurrent_downloads")]
    pub concurrent_downloads: Option<usize>,
    #[serde(alias = "embed_metadata")]
    pub embed_metadata: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    pub ytdlp_path: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
}

impl BackendConfig {
    pub fn ytdlp_program(&self) -> PathBuf {
        self.ytdlp_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("yt-dlp"))
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MetadataConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub failed_lookup_ttl_hours: u64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            user_agent: "UB-WaveX/1.0".to_string(),
            timeout_secs: 10,
            failed_lookup_ttl_hours: 24,
        }
    }
}

impl MetadataConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn failed_lookup_ttl(&self) -> Duration {
        Duration::from_secs(self.failed_lookup_ttl_hours * 60 * 60)
    }
}
