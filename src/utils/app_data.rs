use crate::store::fs_input::DEFAULT_READ_CHUNK_SIZE;
use crate::store::lock::LockFactoryKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "segdir";
const CONFIG_FILE: &str = "config.json";

/// Storage configuration stored in the app data directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Largest single physical read in bytes; 0 means unchunked
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,

    /// Locking strategy for directories opened with this config
    #[serde(default)]
    pub lock_factory: LockFactoryKind,

    /// Where lock files go. None keeps them inside the index directory
    #[serde(default)]
    pub lock_dir: Option<PathBuf>,

    /// Read files through memory maps instead of buffered reads
    #[serde(default)]
    pub use_mmap: bool,

    /// Fixed buffer size for every input. None or 0 follows the IO context
    #[serde(default)]
    pub buffer_size_override: Option<usize>,
}

fn default_read_chunk_size() -> usize {
    DEFAULT_READ_CHUNK_SIZE
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: default_read_chunk_size(),
            lock_factory: LockFactoryKind::default(),
            lock_dir: None,
            use_mmap: false,
            buffer_size_override: None,
        }
    }
}

impl StoreConfig {
    /// Load config from the app data directory, or return default if not found
    pub fn load() -> Result<Self> {
        let config_path = get_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load config from `config_path`, or return default if it does not exist
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            let config: StoreConfig = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to the app data directory
    pub fn save(&self) -> Result<PathBuf> {
        let config_path = get_config_path()?;
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(config_path, content)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        Ok(())
    }

    /// Chunk size with 0 resolved to unchunked
    pub fn effective_chunk_size(&self) -> usize {
        if self.read_chunk_size == 0 {
            DEFAULT_READ_CHUNK_SIZE
        } else {
            self.read_chunk_size
        }
    }

    /// Buffer size override with 0 resolved to none
    pub fn effective_buffer_size(&self) -> Option<usize> {
        self.buffer_size_override.filter(|&size| size > 0)
    }
}

/// Get the path to the config file
pub fn get_config_path() -> Result<PathBuf> {
    let app_dir = get_app_data_dir()?;
    Ok(app_dir.join(CONFIG_FILE))
}

/// Get the application data directory
pub fn get_app_data_dir() -> Result<PathBuf> {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|h| h.join("Library").join("Application Support"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
    } else {
        // Linux/Unix: use XDG_DATA_HOME or ~/.local/share
        dirs::data_dir()
    };

    let base = base.context("Could not determine app data directory")?;
    let app_dir = base.join(APP_NAME);

    fs::create_dir_all(&app_dir)?;
    Ok(app_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_store_config_default() {
        let config = StoreConfig::default();
        assert_eq!(config.read_chunk_size, i32::MAX as usize);
        assert_eq!(config.lock_factory, LockFactoryKind::Simple);
        assert!(config.lock_dir.is_none());
        assert!(!config.use_mmap);
        assert_eq!(config.effective_buffer_size(), None);
    }

    #[test]
    fn test_effective_values() {
        let mut config = StoreConfig::default();

        config.read_chunk_size = 0;
        assert_eq!(config.effective_chunk_size(), i32::MAX as usize);
        config.read_chunk_size = 8192;
        assert_eq!(config.effective_chunk_size(), 8192);

        config.buffer_size_override = Some(0);
        assert_eq!(config.effective_buffer_size(), None);
        config.buffer_size_override = Some(512);
        assert_eq!(config.effective_buffer_size(), Some(512));
    }

    #[test]
    fn test_store_config_partial_json() {
        // Should use defaults for missing fields
        let json = r#"{"lock_factory": "single_instance", "use_mmap": true}"#;
        let config: StoreConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.lock_factory, LockFactoryKind::SingleInstance);
        assert!(config.use_mmap);
        assert_eq!(config.read_chunk_size, i32::MAX as usize); // default
    }

    #[test]
    fn test_store_config_empty_json() {
        let config: StoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        let config = StoreConfig {
            read_chunk_size: 1 << 20,
            lock_factory: LockFactoryKind::Disabled,
            lock_dir: Some(PathBuf::from("/var/lock/segdir")),
            use_mmap: true,
            buffer_size_override: Some(2048),
        };
        config.save_to(&path).unwrap();

        let loaded = StoreConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file_gives_default() {
        let dir = tempdir().unwrap();
        let loaded = StoreConfig::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, StoreConfig::default());
    }

    #[test]
    fn test_load_invalid_json_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "{ not json").unwrap();
        let err = StoreConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }
}
