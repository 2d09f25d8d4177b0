use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

use super::channels::{default_channels, Channel};
use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default = "default_channels")]
    pub channels: Vec<Channel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    /// Housekeeping tick; also re-checks the daily fact every UTC hour.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
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
    #[serde(default = "default_volume")]
    pub default_volume: f32,
    /// Start the first episode without waiting for a play command.
    #[serde(default)]
    pub autoplay: bool,
}

/// Episode list source.  The TOML file wins when it exists; otherwise the
/// list source (an https:// URL or a local path) is read line by line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_episodes_toml")]
    pub episodes_toml: PathBuf,
    #[serde(default)]
    pub list_source: Option<String>,
}

/// Remote collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_recommend_url")]
    pub recommend_url: String,
    /// URL or file path of the daily match document.
    #[serde(default = "default_daily_fact_source")]
    pub daily_fact_source: String,
    #[serde(default = "default_oembed_url")]
    pub oembed_url: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session-scoped key/value file, removed when the daemon exits.
    #[serde(default = "default_store_file")]
    pub store_file: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
            heartbeat_secs: default_heartbeat_secs(),
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
            default_volume: default_volume(),
            autoplay: false,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            episodes_toml: default_episodes_toml(),
            list_source: None,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            recommend_url: default_recommend_url(),
            daily_fact_source: default_daily_fact_source(),
            oembed_url: default_oembed_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store_file: default_store_file(),
        }
    }
}

fn default_log_file() -> PathBuf {
    platform::data_dir().join("sedna.log")
}

fn default_heartbeat_secs() -> u64 {
    30
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

fn default_volume() -> f32 {
    0.5
}

fn default_episodes_toml() -> PathBuf {
    platform::config_dir().join("episodes.toml")
}

fn default_recommend_url() -> String {
    "https://sedna-website-func-ch.azurewebsites.net/api/recommend".to_string()
}

fn default_daily_fact_source() -> String {
    platform::data_dir()
        .join("daily_match.json")
        .display()
        .to_string()
}

fn default_oembed_url() -> String {
    "https://soundcloud.com/oembed".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_store_file() -> PathBuf {
    platform::data_dir().join("session.json")
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
        Self::from_toml_str(&content)
    }

    /// Parse a config document; channel rules and ids are validated here.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        let mut seen = HashSet::new();
        for channel in &config.channels {
            if !seen.insert(channel.id) {
                anyhow::bail!("Duplicate channel id {} in config", channel.id);
            }
        }
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
            daemon: DaemonConfig::default(),
            http: HttpConfig::default(),
            player: PlayerConfig::default(),
            catalog: CatalogConfig::default(),
            api: ApiConfig::default(),
            session: SessionConfig::default(),
            channels: default_channels(),
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
        assert_eq!(config.http.bind_address, "127.0.0.1");
        assert!(config.api.recommend_url.starts_with("https://"));
        assert!(config.catalog.episodes_toml.ends_with("sedna/episodes.toml"));
        assert_eq!(config.channels.len(), 4);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config = Config::from_toml_str(
            r#"
            [http]
            port = 9000
            "#,
        )
        .unwrap();
        assert_eq!(config.http.port, 9000);
        assert_eq!(config.api.oembed_url, "https://soundcloud.com/oembed");
        assert_eq!(config.channels.len(), 4);
    }

    #[test]
    fn test_custom_channels() {
        let config = Config::from_toml_str(
            r#"
            [[channels]]
            id = 7
            name = "Night"
            pattern = "/night"
            "#,
        )
        .unwrap();
        assert_eq!(config.channels.len(), 1);
        assert_eq!(config.channels[0].id, 7);
    }

    #[test]
    fn test_channel_with_both_modes_rejected() {
        let result = Config::from_toml_str(
            r#"
            [[channels]]
            id = 1
            name = "Bad"
            pattern = "/a"
            exclude_patterns = ["/b"]
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_channel_ids_rejected() {
        let result = Config::from_toml_str(
            r#"
            [[channels]]
            id = 2
            name = "Morning"
            pattern = "/morning"

            [[channels]]
            id = 2
            name = "Evening"
            pattern = "/evening"
            "#,
        );
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Duplicate channel id 2"), "{}", err);
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        let back = Config::from_toml_str(&text).unwrap();
        assert_eq!(back.channels, Config::default().channels);
    }
}
