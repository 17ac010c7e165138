use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_country")]
    pub country: String,
    /// Items requested per page; also the cursor step.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Upper bound on pages walked by one "load more".
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Term searched at start-up.
    #[serde(default = "default_initial_term")]
    pub initial_term: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Use mpv for audio output. When false (or mpv is missing) playback is silent.
    #[serde(default = "default_use_mpv")]
    pub use_mpv: bool,
}

/// User-configurable paths for downloads and stored collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory for downloaded preview clips.
    /// Defaults to `~/Music/groovewave`.
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: PathBuf,
    /// Directory holding the persisted collections.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            country: default_country(),
            page_size: default_page_size(),
            max_attempts: default_max_attempts(),
            timeout_secs: default_timeout_secs(),
            initial_term: default_initial_term(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            use_mpv: default_use_mpv(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            downloads_dir: default_downloads_dir(),
            store_dir: default_store_dir(),
        }
    }
}

fn default_base_url() -> String {
    "https://itunes.apple.com/search".to_string()
}

fn default_country() -> String {
    "US".to_string()
}

fn default_page_size() -> usize {
    50
}

fn default_max_attempts() -> usize {
    5
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_initial_term() -> String {
    "Top 100".to_string()
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

fn default_use_mpv() -> bool {
    true
}

fn default_downloads_dir() -> PathBuf {
    dirs::audio_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("groovewave")
}

fn default_store_dir() -> PathBuf {
    platform::data_dir().join("store")
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            http: HttpConfig::default(),
            player: PlayerConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.http.enabled);
        assert_eq!(config.http.port, 8990);
        assert_eq!(config.search.page_size, 50);
        assert_eq!(config.search.max_attempts, 5);
        assert_eq!(config.search.initial_term, "Top 100");
        assert!(config.search.base_url.starts_with("https://"));
        assert!(config.paths.store_dir.ends_with("groovewave/store"));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str("[search]\npage_size = 25\n").unwrap();
        assert_eq!(config.search.page_size, 25);
        assert_eq!(config.search.max_attempts, 5);
        assert_eq!(config.http.port, 8990);
    }
}
