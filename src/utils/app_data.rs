use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const APP_NAME: &str = "hybridfind";
const CONFIG_FILE: &str = "config.json";

/// Default number of fallback scan workers
pub const DEFAULT_SCAN_WORKERS: usize = 10;

/// Timeout used when a query doesn't ask for one (seconds)
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 10;

/// Timeout for coverage probes (seconds)
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 1;

/// Search configuration
///
/// Loaded with priority: environment variables > config file > defaults.
/// The config file lives at `<data dir>/hybridfind/config.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchConfig {
    /// Worker threads per fallback scan
    #[serde(default = "default_scan_workers")]
    pub scan_workers: usize,

    /// Backend timeout for queries that don't specify one
    #[serde(default = "default_query_timeout_secs")]
    pub default_timeout_secs: u64,

    /// Backend timeout for coverage probes
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Socket of the index service; None uses the per-user runtime location
    #[serde(default)]
    pub socket_path: Option<PathBuf>,

    /// Extensions treated as images by the fallback scanner
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,

    /// Extensions treated as videos by the fallback scanner
    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,
}

fn default_scan_workers() -> usize {
    DEFAULT_SCAN_WORKERS
}

fn default_query_timeout_secs() -> u64 {
    DEFAULT_QUERY_TIMEOUT_SECS
}

fn default_probe_timeout_secs() -> u64 {
    DEFAULT_PROBE_TIMEOUT_SECS
}

fn default_image_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "gif", "tif", "tiff", "bmp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_video_extensions() -> Vec<String> {
    // GIFs count as videos too; animated ones are filtered further up
    ["mp4", "avi", "mov", "wmv", "flv", "webm", "mkv", "gif"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            scan_workers: default_scan_workers(),
            default_timeout_secs: default_query_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            socket_path: None,
            image_extensions: default_image_extensions(),
            video_extensions: default_video_extensions(),
        }
    }
}

impl SearchConfig {
    /// Load the config file (if any), then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?;
        config.apply_env();
        Ok(config)
    }

    /// Load config from the app data directory, or return default if not found
    pub fn load_file() -> Result<Self> {
        let config_path = get_config_path()?;

        if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            let config: SearchConfig = serde_json::from_str(&content)
                .context("Failed to parse config file")?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply `HYBRIDFIND_*` environment variable overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(workers) = var("HYBRIDFIND_SCAN_WORKERS").and_then(|v| v.parse().ok()) {
            self.scan_workers = workers;
        }

        if let Some(secs) = var("HYBRIDFIND_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.default_timeout_secs = secs;
        }

        if let Some(secs) = var("HYBRIDFIND_PROBE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.probe_timeout_secs = secs;
        }

        if let Some(path) = var("HYBRIDFIND_SOCKET") {
            if !path.is_empty() {
                self.socket_path = Some(PathBuf::from(path));
            }
        }
    }

    /// Worker count, never below one
    pub fn effective_scan_workers(&self) -> usize {
        self.scan_workers.max(1)
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
        dirs::home_dir()
            .map(|h| h.join("Library").join("Application Support"))
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
    use std::collections::HashMap;

    #[test]
    fn test_config_default() {
        let config = SearchConfig::default();
        assert_eq!(config.scan_workers, 10);
        assert_eq!(config.default_timeout_secs, 10);
        assert_eq!(config.probe_timeout_secs, 1);
        assert!(config.image_extensions.contains(&"jpeg".to_string()));
        assert!(config.video_extensions.contains(&"gif".to_string()));
    }

    #[test]
    fn test_config_partial_json() {
        // Should use defaults for missing fields
        let json = r#"{"scan_workers": 4}"#;
        let config: SearchConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.scan_workers, 4);
        assert_eq!(config.default_timeout_secs, DEFAULT_QUERY_TIMEOUT_SECS);
        assert!(config.socket_path.is_none());
    }

    #[test]
    fn test_config_empty_json() {
        let config: SearchConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SearchConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("HYBRIDFIND_SCAN_WORKERS", "3"),
            ("HYBRIDFIND_TIMEOUT_SECS", "not-a-number"),
            ("HYBRIDFIND_SOCKET", "/run/index.sock"),
        ]
        .into_iter()
        .collect();

        let mut config = SearchConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.scan_workers, 3);
        // Unparseable values are ignored
        assert_eq!(config.default_timeout_secs, DEFAULT_QUERY_TIMEOUT_SECS);
        assert_eq!(config.socket_path, Some(PathBuf::from("/run/index.sock")));
    }

    #[test]
    fn test_effective_workers() {
        let config = SearchConfig {
            scan_workers: 0,
            ..SearchConfig::default()
        };
        assert_eq!(config.effective_scan_workers(), 1);
    }
}
