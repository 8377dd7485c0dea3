//! TOML Configuration File Support
//!
//! Configuration lives at `~/.config/director/director.toml` unless a path
//! is given on the command line.
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables (`DIRECTOR_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [device]
//! url = "ws://localhost:4444"
//! password = "salasana"
//!
//! [stream]
//! url = "http://localhost:8080"
//! filter = "stream"
//!
//! [overlay]
//! url = "ws://localhost:9000/overlay"
//!
//! [transport]
//! initial_retry_delay_ms = 500
//! backoff_factor = 2.0
//! max_retry_delay_ms = 30000
//!
//! [scheduler]
//! nudge_interval_ms = 0
//!
//! [[rules]]
//! when = "anything"
//! scene = "xsumo"
//!
//! [[rules]]
//! when = "otherwise"
//! scene = "break"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::relay::DEFAULT_SNAPSHOT_TAG;
use crate::rules::RuleSpec;
use crate::transport::TransportOptions;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where the configuration was last changed from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

/// `[device]`: the obs-websocket server
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// WebSocket URL
    pub url: String,
    /// Password, if the server requires authentication
    pub password: Option<String>,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:4444".to_string(),
            password: None,
            request_timeout_ms: 5000,
        }
    }
}

impl DeviceConfig {
    /// Request timeout as a `Duration`
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// `[stream]`: the judging server's event stream
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Base URL of the judging server
    pub url: String,
    /// Name of the server-side filter to subscribe to
    pub filter: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            filter: "stream".to_string(),
        }
    }
}

impl StreamConfig {
    /// Full SSE endpoint, `{url}/filter/{filter}`
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}/filter/{}", self.url.trim_end_matches('/'), self.filter)
    }
}

/// `[overlay]`: optional downstream snapshot consumer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// WebSocket URL
    pub url: String,
    /// Envelope tag for snapshot frames
    #[serde(default = "default_snapshot_tag")]
    pub tag: String,
}

fn default_snapshot_tag() -> String {
    DEFAULT_SNAPSHOT_TAG.to_string()
}

/// `[scheduler]`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Re-evaluate the rules this often even without changes (0 = never)
    pub nudge_interval_ms: u64,
}

impl SchedulerConfig {
    /// Nudge interval, `None` when disabled
    #[must_use]
    pub fn nudge_interval(&self) -> Option<Duration> {
        (self.nudge_interval_ms > 0).then(|| Duration::from_millis(self.nudge_interval_ms))
    }
}

// =============================================================================
// Top-level Configuration
// =============================================================================

/// Complete director configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorConfig {
    /// Controlled device
    pub device: DeviceConfig,
    /// Inbound judging stream
    pub stream: StreamConfig,
    /// Downstream snapshot relay
    pub overlay: Option<OverlayConfig>,
    /// Reconnect and logging options shared by every transport client
    pub transport: TransportOptions,
    /// Apply scheduler
    pub scheduler: SchedulerConfig,
    /// Scene rules, in evaluation order
    pub rules: Vec<RuleSpec>,

    /// Where the configuration was last changed from
    #[serde(skip)]
    source: ConfigSource,
    /// Path of the file that was loaded, if any
    #[serde(skip)]
    config_file_path: Option<PathBuf>,
}

impl DirectorConfig {
    /// Parse a TOML document
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ParseError`] on malformed TOML.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;
        config.source = ConfigSource::File;
        Ok(config)
    }

    /// Where the configuration was last changed from
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// File the configuration was loaded from
    #[must_use]
    pub fn config_file_path(&self) -> Option<&PathBuf> {
        self.config_file_path.as_ref()
    }

    /// Apply `DIRECTOR_*` environment variables
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut touched = false;

        if let Some(url) = lookup("DIRECTOR_DEVICE_URL") {
            self.device.url = url;
            touched = true;
        }
        if let Some(password) = lookup("DIRECTOR_DEVICE_PASSWORD") {
            self.device.password = Some(password).filter(|p| !p.is_empty());
            touched = true;
        }
        if let Some(ms) = lookup("DIRECTOR_REQUEST_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.device.request_timeout_ms = ms;
            touched = true;
        }
        if let Some(url) = lookup("DIRECTOR_STREAM_URL") {
            self.stream.url = url;
            touched = true;
        }
        if let Some(filter) = lookup("DIRECTOR_STREAM_FILTER") {
            self.stream.filter = filter;
            touched = true;
        }
        if let Some(url) = lookup("DIRECTOR_OVERLAY_URL") {
            self.overlay = if url.is_empty() {
                None
            } else {
                Some(OverlayConfig {
                    url,
                    tag: self
                        .overlay
                        .take()
                        .map_or_else(default_snapshot_tag, |o| o.tag),
                })
            };
            touched = true;
        }
        if let Some(enabled) = lookup("DIRECTOR_LOG_FRAMES") {
            self.transport.log_frames = enabled != "0" && enabled.to_lowercase() != "false";
            touched = true;
        }
        if let Some(ms) = lookup("DIRECTOR_NUDGE_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.scheduler.nudge_interval_ms = ms;
            touched = true;
        }

        if touched {
            self.source = ConfigSource::Env;
        }
    }

    /// Check every value the runtime relies on
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.transport
            .validate()
            .map_err(ConfigError::ValidationError)?;

        require_scheme("device.url", &self.device.url, &["ws://", "wss://"])?;
        require_scheme("stream.url", &self.stream.url, &["http://", "https://"])?;
        if let Some(overlay) = &self.overlay {
            require_scheme("overlay.url", &overlay.url, &["ws://", "wss://"])?;
            if overlay.tag.is_empty() {
                return Err(ConfigError::ValidationError(
                    "overlay.tag must not be empty".into(),
                ));
            }
        }
        if self.stream.filter.is_empty() {
            return Err(ConfigError::ValidationError(
                "stream.filter must not be empty".into(),
            ));
        }
        if self.device.request_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "device.request_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn require_scheme(field: &str, url: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    if schemes.iter().any(|s| url.starts_with(s)) {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(format!(
            "{field} must start with one of {schemes:?}, got {url:?}"
        )))
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/director/director.toml` or
/// `~/.config/director/director.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("director").join("director.toml"))
}

/// Load configuration from the default path
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<DirectorConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path, then apply the environment
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<DirectorConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration with a custom environment lookup
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config_with_env<F>(
    path: Option<PathBuf>,
    lookup: F,
) -> Result<DirectorConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = DirectorConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;
            config = DirectorConfig::from_toml_str(&content)?;
            config.config_file_path = Some(config_path.clone());

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    config.apply_env_with(lookup);
    Ok(config)
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Command-line overrides, applied after [`load_config`]
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Device URL override
    pub device_url: Option<String>,
    /// Stream URL override
    pub stream_url: Option<String>,
    /// Per-frame logging override
    pub log_frames: Option<bool>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set device URL override
    #[must_use]
    pub fn with_device_url(mut self, url: String) -> Self {
        self.device_url = Some(url);
        self
    }

    /// Set stream URL override
    #[must_use]
    pub fn with_stream_url(mut self, url: String) -> Self {
        self.stream_url = Some(url);
        self
    }

    /// Set per-frame logging override
    #[must_use]
    pub fn with_log_frames(mut self, enabled: bool) -> Self {
        self.log_frames = Some(enabled);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut DirectorConfig) {
        if self.device_url.is_some() || self.stream_url.is_some() || self.log_frames.is_some() {
            config.source = ConfigSource::Cli;
        }
        if let Some(ref url) = self.device_url {
            config.device.url = url.clone();
        }
        if let Some(ref url) = self.stream_url {
            config.stream.url = url.clone();
        }
        if let Some(enabled) = self.log_frames {
            config.transport.log_frames = enabled;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Condition;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = DirectorConfig::default();

        assert_eq!(config.device.url, "ws://localhost:4444");
        assert_eq!(config.device.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.stream.endpoint(), "http://localhost:8080/filter/stream");
        assert_eq!(config.overlay, None);
        assert_eq!(config.scheduler.nudge_interval(), None);
        assert!(config.rules.is_empty());
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_path() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("director/director.toml"));
        }
    }

    #[test]
    fn test_parse_full_file() {
        let file = write_config(
            r#"
[device]
url = "ws://obs.local:4444"
password = "salasana"

[stream]
url = "http://judging.local:8080/"
filter = "main"

[overlay]
url = "ws://overlay.local:9000"

[transport]
initial_retry_delay_ms = 250
log_frames = true

[scheduler]
nudge_interval_ms = 10000

[[rules]]
when = "arena"
arena = "A"
scene = "Arena A"

[[rules]]
when = "otherwise"
scene = "Break"
"#,
        );

        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();

        assert_eq!(config.device.url, "ws://obs.local:4444");
        assert_eq!(config.device.password.as_deref(), Some("salasana"));
        assert_eq!(config.stream.endpoint(), "http://judging.local:8080/filter/main");
        let overlay = config.overlay.clone().unwrap();
        assert_eq!(overlay.tag, "snapshot");
        assert_eq!(config.transport.initial_retry_delay_ms, 250);
        assert_eq!(config.transport.backoff_factor, 2.0);
        assert!(config.transport.log_frames);
        assert_eq!(config.scheduler.nudge_interval(), Some(Duration::from_secs(10)));
        assert_eq!(
            config.rules[0].condition,
            Condition::Arena { arena: "A".into() }
        );
        assert_eq!(config.rules[1].scene, "Break");
        assert_eq!(config.source(), ConfigSource::File);
        assert_eq!(config.config_file_path(), Some(&file.path().to_path_buf()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_graceful() {
        let config = load_config_with_env(
            Some(PathBuf::from("/nonexistent/director.toml")),
            no_env,
        )
        .unwrap();
        assert_eq!(config, DirectorConfig::default());
    }

    #[test]
    fn test_malformed_toml_error() {
        let file = write_config("[device\nurl = 4");
        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env);
        assert!(matches!(result.unwrap_err(), ConfigError::ParseError(_)));
    }

    #[test]
    fn test_env_overrides_file() {
        let file = write_config("[device]\nurl = \"ws://file:4444\"\n");
        let config = load_config_with_env(
            Some(file.path().to_path_buf()),
            env(&[
                ("DIRECTOR_DEVICE_URL", "ws://env:4444"),
                ("DIRECTOR_OVERLAY_URL", "ws://overlay:1"),
                ("DIRECTOR_LOG_FRAMES", "1"),
            ]),
        )
        .unwrap();

        assert_eq!(config.device.url, "ws://env:4444");
        assert_eq!(config.overlay.as_ref().unwrap().url, "ws://overlay:1");
        assert!(config.transport.log_frames);
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_cli_overrides_env() {
        let mut config = DirectorConfig::default();
        config.apply_env_with(env(&[("DIRECTOR_STREAM_URL", "http://env:1")]));

        ConfigOverrides::new()
            .with_stream_url("http://cli:2".to_string())
            .with_log_frames(true)
            .apply(&mut config);

        assert_eq!(config.stream.url, "http://cli:2");
        assert!(config.transport.log_frames);
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_empty_overrides_no_change() {
        let mut config = DirectorConfig::default();
        ConfigOverrides::new().apply(&mut config);
        assert_eq!(config.source(), ConfigSource::Default);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = DirectorConfig::default();
        config.device.url = "http://localhost:4444".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(msg)) if msg.contains("device.url")
        ));

        let mut config = DirectorConfig::default();
        config.stream.url = "ws://localhost".into();
        assert!(config.validate().is_err());

        let mut config = DirectorConfig::default();
        config.transport.backoff_factor = 0.5;
        assert!(config.validate().is_err());

        let mut config = DirectorConfig::default();
        config.transport.max_retry_delay_ms = 10;
        assert!(config.validate().is_err());

        let mut config = DirectorConfig::default();
        config.device.request_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::ValidationError("bad".into());
        assert_eq!(err.to_string(), "Invalid configuration: bad");
    }
}
