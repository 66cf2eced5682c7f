use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use thiserror::Error;
use crate::auth::{
    ClientSecrets,
    InteractiveAuth,
    DEFAULT_REDIRECT_PORT,
    GOOGLE_AUTH_URL,
    GOOGLE_TOKEN_URL,
};
use crate::upload::{PrivacyStatus, TransferOptions, YOUTUBE_API_BASE};

const APP_DIR: &str = "clip-uploader";
const TOKEN_FILE: &str = "token.json";
const DEFAULT_LOG_RETENTION_DAYS: usize = 28;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub client_secrets: PathBuf,
    pub token_path: PathBuf,
    pub redirect_port: u16,
    pub auth_timeout_secs: u64,
    pub chunk_size: usize,
    pub progress_interval_ms: u64,
    pub privacy_status: PrivacyStatus,
    pub default_directory: Option<PathBuf>,
    /// `"YYYY/MM"` or `"default"` to playlist id
    pub playlists: HashMap<String, String>,
    pub endpoints: Endpoints,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        let options = TransferOptions::default();
        Self {
            client_secrets: PathBuf::from("client_secret.json"),
            token_path: default_token_path(),
            redirect_port: DEFAULT_REDIRECT_PORT,
            auth_timeout_secs: 300,
            chunk_size: options.chunk_size,
            progress_interval_ms: options.progress_interval.as_millis() as u64,
            privacy_status: options.privacy_status,
            default_directory: None,
            playlists: HashMap::new(),
            endpoints: Endpoints::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Endpoints {
    pub auth_url: String,
    pub token_url: String,
    pub api_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            api_base: YOUTUBE_API_BASE.to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Daily rotated log files go here when set
    pub directory: Option<PathBuf>,
    /// Days of log files kept; 0 keeps every file
    pub retention_days: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            retention_days: DEFAULT_LOG_RETENTION_DAYS,
        }
    }
}

impl LoggingConfig {
    /// One file per day, so the retention window is the file count.
    pub fn max_log_files(&self) -> Option<usize> {
        (self.retention_days > 0).then_some(self.retention_days)
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&config_str)
    }

    pub fn from_toml_str(config_str: &str) -> Result<Config, ConfigError> {
        Ok(toml::from_str(config_str)?)
    }

    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            chunk_size: self.chunk_size.max(1),
            progress_interval: Duration::from_millis(self.progress_interval_ms),
            privacy_status: self.privacy_status,
        }
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    pub fn interactive_auth(&self, secrets: ClientSecrets) -> InteractiveAuth {
        InteractiveAuth {
            redirect_port: self.redirect_port,
            timeout: self.auth_timeout(),
            ..InteractiveAuth::new(secrets)
        }
    }

    /// Relative input paths are taken from `default_directory` when one is set.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.default_directory {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

fn default_token_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(TOKEN_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.redirect_port, 52719);
        assert_eq!(config.auth_timeout(), Duration::from_secs(300));
        assert!(config.token_path.ends_with("token.json"));
        assert_eq!(config.logging.max_log_files(), Some(28));

        let options = config.transfer_options();
        assert_eq!(options.chunk_size, 8 * 1024 * 1024);
        assert_eq!(options.progress_interval, Duration::from_millis(250));
        assert_eq!(options.privacy_status, PrivacyStatus::Private);
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml_str(r#"
            client_secrets = "secrets/client.json"
            token_path = "/tmp/token.json"
            redirect_port = 8080
            chunk_size = 1024
            privacy_status = "unlisted"
            default_directory = "/videos"

            [playlists]
            default = "PLdefault"
            "2024/05" = "PLmay"

            [endpoints]
            api_base = "http://127.0.0.1:9000"

            [logging]
            level = "debug"
            directory = "logs"
            retention_days = 14
        "#).unwrap();

        assert_eq!(config.redirect_port, 8080);
        assert_eq!(config.transfer_options().chunk_size, 1024);
        assert_eq!(config.privacy_status, PrivacyStatus::Unlisted);
        assert_eq!(config.playlists.get("2024/05").map(String::as_str), Some("PLmay"));
        assert_eq!(config.endpoints.api_base, "http://127.0.0.1:9000");
        assert_eq!(config.endpoints.token_url, GOOGLE_TOKEN_URL);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.directory, Some(PathBuf::from("logs")));
        assert_eq!(config.logging.max_log_files(), Some(14));

        assert_eq!(config.resolve_path(Path::new("clip.mp4")), PathBuf::from("/videos/clip.mp4"));
        assert_eq!(config.resolve_path(Path::new("/other/clip.mp4")), PathBuf::from("/other/clip.mp4"));

        let auth = config.interactive_auth(ClientSecrets {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
        });
        assert_eq!(auth.redirect_port, 8080);
        assert!(auth.open_browser);
    }

    #[test]
    fn test_zero_retention_keeps_all_logs() {
        let config = Config::from_toml_str("[logging]\nretention_days = 0\n").unwrap();
        assert_eq!(config.logging.retention_days, 0);
        assert_eq!(config.logging.max_log_files(), None);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(Config::from_toml_str("redirect_port = \"nope\""), Err(ConfigError::Parse(_))));
        assert!(matches!(Config::load("/definitely/missing/config.toml"), Err(ConfigError::Io { .. })));
    }
}
