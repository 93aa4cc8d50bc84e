use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::store::StoreOptions;

/// Config file looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "devtrack.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `text` or `json`
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

/// SQLite store settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Path to the SQLite file, or `:memory:`
    #[serde(default = "default_database_path")]
    pub database_path: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            max_connections: default_max_connections(),
            busy_timeout_seconds: default_busy_timeout(),
        }
    }
}

impl From<&StoreConfig> for StoreOptions {
    fn from(cfg: &StoreConfig) -> Self {
        StoreOptions {
            database_path: cfg.database_path.clone(),
            max_connections: cfg.max_connections,
            busy_timeout: Duration::from_secs(cfg.busy_timeout_seconds),
            read_only: false,
        }
    }
}

/// Request tracking middleware settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Prefix the admin/analytics routes are mounted under
    #[serde(default = "default_mount_path")]
    pub mount_path: String,

    /// Paths never tracked. Entries ending in `/` match as prefixes.
    #[serde(default = "default_exclude_paths")]
    pub exclude_paths: Vec<String>,

    /// Request body keys replaced with `***` before storage (case-insensitive)
    #[serde(default = "default_sensitive_fields")]
    pub sensitive_fields: Vec<String>,

    /// Larger request bodies are not buffered or stored
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Records queued for the background writer before new ones are dropped
    #[serde(default = "default_writer_buffer")]
    pub writer_buffer: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            mount_path: default_mount_path(),
            exclude_paths: default_exclude_paths(),
            sensitive_fields: default_sensitive_fields(),
            max_body_bytes: default_max_body_bytes(),
            writer_buffer: default_writer_buffer(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_database_path() -> String {
    "devtrack_logs.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_mount_path() -> String {
    "/__devtrack__".to_string()
}

fn default_exclude_paths() -> Vec<String> {
    [
        "/__devtrack__/stats",
        "/__devtrack__/logs",
        "/admin/",
        "/static/",
        "/media/",
        "/favicon.ico",
        "/health",
        "/metrics",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_sensitive_fields() -> Vec<String> {
    vec!["password".to_string()]
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

fn default_writer_buffer() -> usize {
    10_000
}

/// Load configuration from an optional TOML file plus `DEVTRACK__*` environment overrides
///
/// An explicitly passed file must exist; the default `devtrack.toml` is optional.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let file = match path {
        Some(path) => config::File::from(path).required(true),
        None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };

    let config = config::Config::builder()
        .add_source(file)
        .add_source(
            config::Environment::with_prefix("DEVTRACK")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("tracking.exclude_paths")
                .with_list_parse_key("tracking.sensitive_fields")
                .try_parsing(true),
        )
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;
    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.store.database_path.trim().is_empty() {
        anyhow::bail!("store.database_path cannot be empty");
    }

    if cfg.store.max_connections == 0 {
        anyhow::bail!("store.max_connections must be >= 1");
    }

    if !cfg.tracking.mount_path.starts_with('/') {
        anyhow::bail!(
            "tracking.mount_path must start with '/', got '{}'",
            cfg.tracking.mount_path
        );
    }

    if cfg.tracking.mount_path.len() > 1 && cfg.tracking.mount_path.ends_with('/') {
        anyhow::bail!("tracking.mount_path must not end with '/'");
    }

    if cfg.tracking.writer_buffer == 0 {
        anyhow::bail!("tracking.writer_buffer must be >= 1");
    }

    match cfg.server.log_format.as_str() {
        "text" | "json" => {}
        other => anyhow::bail!("server.log_format must be 'text' or 'json', got '{}'", other),
    }

    Ok(())
}
