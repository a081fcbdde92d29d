//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from TOML and carries all
//! sub-configs for server, storage, transcoding, logging, etc. Every section
//! defaults sensibly so a completely empty file is valid. Environment
//! variables are applied on top of the file by [`Config::apply_env_overrides`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

/// Placeholder secret shipped in the defaults.
pub const DEFAULT_STREAM_SECRET: &str = "change-me-in-production";

/// Locations searched when no explicit config path is given.
const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "./streamforge.toml",
    "~/.config/streamforge/config.toml",
    "/etc/streamforge/config.toml",
];

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub transcoding: TranscodingConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
    pub cleanup: CleanupConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
}

impl Config {
    /// Deserialize a `Config` from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Read and parse the config file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Validation(format!("failed to read config file {}: {e}", path.display()))
        })?;
        let config = Self::from_toml(&contents)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load from `custom_path` if given, otherwise from the first default
    /// location that exists, otherwise fall back to defaults.
    pub fn load_or_default(custom_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = custom_path {
            return Self::load(path);
        }

        for candidate in DEFAULT_CONFIG_PATHS {
            let expanded = shellexpand::tilde(candidate);
            let path = Path::new(expanded.as_ref());
            if path.exists() {
                return Self::load(path);
            }
        }

        tracing::info!("No config file found; using defaults");
        Ok(Self::default())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Values that fail to parse are logged and ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(name: &str, raw: String) -> Option<T> {
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!("Ignoring invalid value for {name}: {raw:?}");
                    None
                }
            }
        }

        if let Some(v) = lookup("HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("PORT").and_then(|v| parsed("PORT", v)) {
            self.server.port = v;
        }
        if let Some(v) = lookup("HLS_ROOT") {
            self.storage.hls_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("FFMPEG_PATH") {
            self.transcoding.ffmpeg_path = PathBuf::from(v);
        }
        if let Some(v) =
            lookup("MAX_CONCURRENT_STREAMS").and_then(|v| parsed("MAX_CONCURRENT_STREAMS", v))
        {
            self.transcoding.max_concurrent_streams = v;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("LOG_FORMAT").and_then(|v| parsed("LOG_FORMAT", v)) {
            self.logging.format = v;
        }
        if let Some(v) = lookup("STREAM_SECRET") {
            self.security.stream_secret = v;
        }
        if let Some(v) = lookup("API_KEY") {
            self.security.api_key = Some(v).filter(|k| !k.is_empty());
        }
        if let Some(v) = lookup("ENABLE_METRICS") {
            self.metrics.enabled = v == "true";
        }
        if let Some(v) = lookup("CLEANUP_ENABLED") {
            self.cleanup.enabled = v != "false";
        }
        if let Some(v) =
            lookup("CLEANUP_INTERVAL_HOURS").and_then(|v| parsed("CLEANUP_INTERVAL_HOURS", v))
        {
            self.cleanup.interval_hours = v;
        }
        if let Some(v) =
            lookup("STREAM_RETENTION_HOURS").and_then(|v| parsed("STREAM_RETENTION_HOURS", v))
        {
            self.cleanup.retention_hours = v;
        }
    }

    /// Name of the profile used when a stream is started without one.
    pub fn default_profile(&self) -> Option<&str> {
        self.transcoding.profiles.first().map(String::as_str)
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.transcoding.max_concurrent_streams == 0 {
            warnings.push(
                "transcoding.max_concurrent_streams is 0; every stream will be rejected".into(),
            );
        }

        if self.transcoding.profiles.is_empty() {
            warnings.push("transcoding.profiles is empty; streams must name a profile".into());
        }

        if !self.transcoding.input_url_template.contains("{key}") {
            warnings.push(
                "transcoding.input_url_template has no {key} placeholder; all streams share one input"
                    .into(),
            );
        }

        if self.security.require_stream_token && self.security.stream_secret == DEFAULT_STREAM_SECRET
        {
            warnings.push(
                "stream tokens are required but security.stream_secret is the default".into(),
            );
        }

        if self.cleanup.enabled && self.cleanup.interval_hours == 0 {
            warnings.push("cleanup.interval_hours is 0; cleanup will be disabled".into());
        }

        if self.rate_limit.api_per_minute == 0 || self.rate_limit.stream_ops_per_minute == 0 {
            warnings.push("rate_limit quotas of 0 are treated as 1 request per minute".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

/// Where HLS output is written and served from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub hls_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            hls_root: PathBuf::from("./hls"),
        }
    }
}

/// Encoder and admission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodingConfig {
    pub ffmpeg_path: PathBuf,
    pub max_concurrent_streams: usize,
    /// Profile names; the first one is the default.
    pub profiles: Vec<String>,
    /// Encoder input locator; `{key}` is replaced by the sanitized key.
    pub input_url_template: String,
    /// Seconds to wait after a graceful stop before killing the encoder.
    pub stop_grace_secs: u64,
    /// Whether publishers send an audio track. Set to false for
    /// video-only sources so the encoder does not wait on audio variants.
    pub source_audio: bool,
}

impl Default for TranscodingConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            max_concurrent_streams: 10,
            profiles: vec!["adaptive".into()],
            input_url_template: "rtmp://127.0.0.1/live/{key}".into(),
            stop_grace_secs: 10,
            source_audio: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Periodic removal of stale HLS output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub enabled: bool,
    pub interval_hours: u64,
    pub retention_hours: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_hours: 6,
            retention_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// HMAC secret for publish tokens.
    pub stream_secret: String,
    /// Bearer key required by the stream management API when set.
    pub api_key: Option<String>,
    /// Reject publish attempts without a valid stream token.
    pub require_stream_token: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            stream_secret: DEFAULT_STREAM_SECRET.into(),
            api_key: None,
            require_stream_token: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub api_per_minute: u32,
    /// Quota for stream start/stop operations.
    pub stream_ops_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            api_per_minute: 1000,
            stream_ops_per_minute: 10,
        }
    }
}
