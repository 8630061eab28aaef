//! Configuration management for CLI, environment variables, and config files.

use crate::error::{CoreError, ValidationIssue};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for pikpakfs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub downloader: DownloaderConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration for the remote drive gateway (C1).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub proxy: Option<String>,
}

/// Configuration for the local downloader gateway (C2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    pub rpc_url: String,
    pub rpc_secret: String,
    pub base_path: String,
}

/// Configuration for the scheduler's per-tag concurrency caps and tick interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub torrent_concurrency: usize,
    pub file_download_concurrency: usize,
    pub tick_millis: u64,
}

/// Configuration for where persisted state lives on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub token_cache_path: PathBuf,
    pub snapshot_path: PathBuf,
}

/// Configuration for logging output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api-drive.pikpak.com".to_string(),
            username: None,
            password: None,
            proxy: None,
        }
    }
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:6800/jsonrpc".to_string(),
            rpc_secret: String::new(),
            base_path: "/downloads".to_string(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            torrent_concurrency: 5,
            file_download_concurrency: 5,
            tick_millis: 500,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            token_cache_path: config_dir.join("pikpakfs/token.json"),
            snapshot_path: config_dir.join("pikpakfs/tasks.json"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: &PathBuf) -> Result<Self, CoreError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| CoreError::ReadError(e.to_string()))?;
        toml::from_str(&content).map_err(|e| CoreError::ParseError(e.to_string()))
    }

    pub fn from_default_locations() -> Result<Self, CoreError> {
        let candidates = [
            dirs::config_dir().map(|d| d.join("pikpakfs/config.toml")),
            Some(PathBuf::from("/etc/pikpakfs/config.toml")),
            Some(PathBuf::from("./pikpakfs.toml")),
        ];

        for path in candidates.iter().flatten() {
            if path.exists() {
                tracing::info!("loading config from {}", path.display());
                return Self::from_file(path);
            }
        }

        Ok(Self::default())
    }

    pub fn merge_from_env(mut self) -> Result<Self, CoreError> {
        if let Ok(val) = std::env::var("PIKPAK_REMOTE_BASE_URL") {
            self.remote.base_url = val;
        }
        if let Ok(val) = std::env::var("PIKPAK_REMOTE_USERNAME") {
            self.remote.username = Some(val);
        }
        if let Ok(val) = std::env::var("PIKPAK_REMOTE_PASSWORD") {
            self.remote.password = Some(val);
        }
        if let Ok(val) = std::env::var("PIKPAK_REMOTE_PROXY") {
            self.remote.proxy = Some(val);
        }
        if let Ok(val) = std::env::var("PIKPAK_DOWNLOADER_RPC_URL") {
            self.downloader.rpc_url = val;
        }
        if let Ok(val) = std::env::var("PIKPAK_DOWNLOADER_RPC_SECRET") {
            self.downloader.rpc_secret = val;
        }
        if let Ok(val) = std::env::var("PIKPAK_TORRENT_CONCURRENCY") {
            self.scheduler.torrent_concurrency = val.parse().map_err(|_| {
                CoreError::InvalidCommand("PIKPAK_TORRENT_CONCURRENCY has invalid format".into())
            })?;
        }
        if let Ok(val) = std::env::var("PIKPAK_FILE_DOWNLOAD_CONCURRENCY") {
            self.scheduler.file_download_concurrency = val.parse().map_err(|_| {
                CoreError::InvalidCommand(
                    "PIKPAK_FILE_DOWNLOAD_CONCURRENCY has invalid format".into(),
                )
            })?;
        }
        if let Ok(val) = std::env::var("PIKPAK_LOG_LEVEL") {
            self.logging.level = val;
        }

        Ok(self)
    }

    pub fn merge_from_cli(mut self, cli: &CliArgs) -> Self {
        if let Some(ref url) = cli.remote_base_url {
            self.remote.base_url = url.clone();
        }
        if let Some(ref username) = cli.username {
            self.remote.username = Some(username.clone());
        }
        if let Some(ref password) = cli.password {
            self.remote.password = Some(password.clone());
        }
        if let Some(ref snapshot_path) = cli.snapshot_path {
            self.persistence.snapshot_path = snapshot_path.clone();
        }
        if cli.verbose > 0 {
            self.logging.level = match cli.verbose {
                1 => "debug",
                _ => "trace",
            }
            .to_string();
        }
        self
    }

    pub fn load_with_cli(cli: &CliArgs) -> Result<Self, CoreError> {
        Ok(Self::from_default_locations()?
            .merge_from_env()?
            .merge_from_cli(cli))
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let mut issues = Vec::new();

        if self.remote.base_url.is_empty() {
            issues.push(ValidationIssue {
                field: "remote.base_url".to_string(),
                message: "cannot be empty".to_string(),
            });
        } else if let Err(e) = reqwest::Url::parse(&self.remote.base_url) {
            issues.push(ValidationIssue {
                field: "remote.base_url".to_string(),
                message: format!("invalid URL: {}", e),
            });
        }

        if self.downloader.rpc_url.is_empty() {
            issues.push(ValidationIssue {
                field: "downloader.rpc_url".to_string(),
                message: "cannot be empty".to_string(),
            });
        }

        if self.scheduler.torrent_concurrency == 0 {
            issues.push(ValidationIssue {
                field: "scheduler.torrent_concurrency".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if self.scheduler.file_download_concurrency == 0 {
            issues.push(ValidationIssue {
                field: "scheduler.file_download_concurrency".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            issues.push(ValidationIssue {
                field: "logging.level".to_string(),
                message: format!(
                    "invalid log level '{}', expected one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(CoreError::ValidationError(issues))
        }
    }
}

/// Command-line arguments that override configuration values.
#[derive(Debug, Clone, Default, clap::Parser)]
#[command(name = "pikpakfs")]
#[command(about = "A command-driven virtual filesystem over a cloud drive's offline downloads")]
pub struct CliArgs {
    /// Override the remote drive's base URL.
    #[arg(long, env = "PIKPAK_REMOTE_BASE_URL")]
    pub remote_base_url: Option<String>,

    /// Username used for login if no cached token is present.
    #[arg(long, env = "PIKPAK_REMOTE_USERNAME")]
    pub username: Option<String>,

    /// Password used for login if no cached token is present.
    #[arg(long, env = "PIKPAK_REMOTE_PASSWORD")]
    pub password: Option<String>,

    /// Override the path the task snapshot is written to / read from.
    #[arg(long)]
    pub snapshot_path: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduler.torrent_concurrency, 5);
        assert_eq!(config.scheduler.file_download_concurrency, 5);
    }

    #[test]
    fn toml_config_parsing() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [remote]
            base_url = "https://example.test"

            [scheduler]
            torrent_concurrency = 2
            file_download_concurrency = 3
            "#
        )
        .unwrap();
        let config = Config::from_file(&file.path().to_path_buf()).unwrap();
        assert_eq!(config.remote.base_url, "https://example.test");
        assert_eq!(config.scheduler.torrent_concurrency, 2);
        assert_eq!(config.scheduler.file_download_concurrency, 3);
    }

    #[test]
    fn validate_rejects_empty_base_url() {
        let mut config = Config::default();
        config.remote.base_url = String::new();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.scheduler.torrent_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn merge_from_cli_overrides_defaults() {
        let config = Config::default();
        let cli = CliArgs {
            remote_base_url: Some("https://custom.example".to_string()),
            username: Some("alice".to_string()),
            password: None,
            snapshot_path: None,
            verbose: 0,
        };
        let merged = config.merge_from_cli(&cli);
        assert_eq!(merged.remote.base_url, "https://custom.example");
        assert_eq!(merged.remote.username, Some("alice".to_string()));
    }
}
