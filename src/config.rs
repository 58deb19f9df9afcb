use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const APP_DIR: &str = "codeloom";
const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:5001/chat";
const DEFAULT_CLUSTER: &str = "eu";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PONG_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PusherConfig {
    pub key: String,
    pub cluster: String,
    pub socket_url: Option<String>,
    /// How long to wait for a pong after a keep-alive ping before the
    /// connection is considered dead.
    pub pong_timeout_secs: u64,
}

impl Default for PusherConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            cluster: DEFAULT_CLUSTER.to_string(),
            socket_url: None,
            pong_timeout_secs: DEFAULT_PONG_TIMEOUT_SECS,
        }
    }
}

impl PusherConfig {
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }

    pub fn resolved_socket_url(&self) -> String {
        if let Some(url) = self.socket_url.as_deref().filter(|url| !url.trim().is_empty()) {
            return url.to_string();
        }
        format!(
            "wss://ws-{}.pusher.com/app/{}?protocol=7&client=codeloom&version={}",
            self.cluster,
            self.key,
            env!("CARGO_PKG_VERSION")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend_url: String,
    /// The backend answers a turn only after generation finishes, so there is
    /// no overall deadline unless one is configured.
    pub request_timeout_secs: Option<u64>,
    pub connect_timeout_secs: u64,
    pub download_dir: Option<PathBuf>,
    pub pusher: PusherConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            request_timeout_secs: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            download_dir: None,
            pusher: PusherConfig::default(),
        }
    }
}

impl AppConfig {
    /// Config file, then `.env`, then process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let mut config = match config_file_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = lookup("CODELOOM_BACKEND_URL") {
            self.backend_url = url;
        }
        if let Some(secs) = lookup("CODELOOM_REQUEST_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.request_timeout_secs = Some(secs);
        }
        if let Some(secs) = lookup("CODELOOM_CONNECT_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.connect_timeout_secs = secs;
        }
        if let Some(dir) = lookup("CODELOOM_DOWNLOAD_DIR") {
            self.download_dir = Some(PathBuf::from(dir));
        }
        if let Some(key) = lookup("CODELOOM_PUSHER_KEY") {
            self.pusher.key = key;
        }
        if let Some(cluster) = lookup("CODELOOM_PUSHER_CLUSTER") {
            self.pusher.cluster = cluster;
        }
        if let Some(url) = lookup("CODELOOM_PUSHER_SOCKET_URL") {
            self.pusher.socket_url = Some(url);
        }
        if let Some(secs) = lookup("CODELOOM_PUSHER_PONG_TIMEOUT_SECS").and_then(|v| v.parse().ok())
        {
            self.pusher.pong_timeout_secs = secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.backend_url.starts_with("http://") || self.backend_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "backend_url must be an http(s) url, got `{}`",
                self.backend_url
            )));
        }
        if self.request_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than zero when set".to_string(),
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "connect_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.pusher.pong_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "pusher.pong_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn resolved_download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

pub fn app_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR))
}

fn config_file_path() -> Option<PathBuf> {
    app_dir().map(|dir| dir.join("config.toml"))
}
