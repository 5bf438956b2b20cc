//! Bridge Configuration
//!
//! Manages the settings of the bridge:
//! - ADB location and target device
//! - Extraction worker tuning
//! - Logging level
//! - Channel names

use std::path::{Path, PathBuf};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{BridgeError, Result};

/// ADB configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdbConfig {
    /// Path to the Android SDK holding `platform-tools/adb`
    pub sdk_path: Option<PathBuf>,
    /// Serial of the device to manage; first online device when unset
    pub serial: Option<String>,
}

impl AdbConfig {
    /// Get Android SDK path, with auto-detection
    pub fn resolve_sdk_path(&self) -> Option<PathBuf> {
        self.sdk_path.clone().or_else(|| {
            let from_env = ["ANDROID_HOME", "ANDROID_SDK_ROOT"]
                .iter()
                .filter_map(|var| std::env::var_os(var))
                .map(PathBuf::from);

            let home = BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
            let candidates = if cfg!(windows) {
                vec![
                    BaseDirs::new().map(|d| d.data_local_dir().join("Android").join("Sdk")),
                    Some(PathBuf::from("C:\\Android\\sdk")),
                ]
            } else {
                vec![
                    home.as_ref().map(|h| h.join("Android").join("Sdk")),
                    home.as_ref().map(|h| h.join("Library").join("Android").join("sdk")),
                    Some(PathBuf::from("/usr/local/android-sdk")),
                ]
            };

            from_env
                .chain(candidates.into_iter().flatten())
                .find(|p| p.exists())
        })
    }
}

/// Extraction worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Bytes read per progress step
    pub chunk_size: usize,
    /// Extraction requests that may wait behind the running one
    pub queue_capacity: usize,
    /// Where APKs pulled from a device are cached
    pub cache_dir: Option<PathBuf>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            chunk_size: 4096,
            queue_capacity: 32,
            cache_dir: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Channel names
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub method: String,
    pub events: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            method: crate::METHOD_CHANNEL.to_string(),
            events: crate::EVENT_CHANNEL.to_string(),
        }
    }
}

/// Main bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Configuration version for migrations
    pub version: u32,
    pub adb: AdbConfig,
    pub extraction: ExtractionConfig,
    pub logging: LoggingConfig,
    pub channels: ChannelConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            version: 1,
            adb: AdbConfig::default(),
            extraction: ExtractionConfig::default(),
            logging: LoggingConfig::default(),
            channels: ChannelConfig::default(),
        }
    }
}

impl BridgeConfig {
    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("com", "installed-apps", "InstalledApps")
    }

    /// Get the configuration file path
    pub fn config_file() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Directory for pulled APKs: the configured one, else the platform cache dir
    pub fn cache_dir(&self) -> PathBuf {
        self.extraction
            .cache_dir
            .clone()
            .or_else(|| Self::project_dirs().map(|dirs| dirs.cache_dir().to_path_buf()))
            .unwrap_or_else(|| std::env::temp_dir().join("installed-apps"))
    }

    /// Check values that would make the bridge unusable
    pub fn validate(&self) -> Result<()> {
        if self.extraction.chunk_size == 0 {
            return Err(BridgeError::Config("extraction.chunk_size must be positive".into()));
        }
        if self.extraction.queue_capacity == 0 {
            return Err(BridgeError::Config("extraction.queue_capacity must be positive".into()));
        }
        Ok(())
    }

    /// Load configuration from `path`, writing the defaults there when it is missing
    pub async fn load_or_default(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            debug!("Loading config from {:?}", path);
            let contents = tokio::fs::read_to_string(path).await?;
            toml::from_str::<BridgeConfig>(&contents)?
        } else {
            info!("Config file {:?} not found, using defaults", path);
            let config = BridgeConfig::default();
            config.save(path).await?;
            config
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path`
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = toml::to_string_pretty(self)?;
        tokio::fs::write(path, contents).await?;

        debug!("Config saved to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.extraction.chunk_size, 4096);
        assert_eq!(config.channels.method, "installed_apps");
        assert_eq!(config.channels.events, "installed_apps/extract_apk_stream");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: BridgeConfig = toml::from_str("[extraction]\nchunk_size = 512\n").unwrap();
        assert_eq!(config.extraction.chunk_size, 512);
        assert_eq!(config.extraction.queue_capacity, 32);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let mut config = BridgeConfig::default();
        config.extraction.chunk_size = 0;
        assert!(matches!(config.validate(), Err(BridgeError::Config(_))));
    }

    #[tokio::test]
    async fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = BridgeConfig::load_or_default(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(config.version, 1);

        let reloaded = BridgeConfig::load_or_default(&path).await.unwrap();
        assert_eq!(reloaded.extraction.chunk_size, config.extraction.chunk_size);
    }
}
