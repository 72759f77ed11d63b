//! Client configuration loading.
//!
//! Reads an optional JSON file and then applies `RESOCKET_*` environment
//! overrides. Every field has a default, so a partial file (or none at all)
//! is fine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::ReconnectPolicy;
use crate::constants::{
    DIAL_TIMEOUT, MAX_FRAME_SIZE, READ_BUFFER_SIZE, READ_RETRY_DELAY, WRITE_QUEUE_CAPACITY,
};

/// How application messages map onto the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// Unframed: every read chunk goes to the sink as is, writes go out as is.
    Raw,
    /// `[u32 BE length][payload]` frames.
    LengthPrefixed,
}

impl Default for Framing {
    fn default() -> Self {
        Self::LengthPrefixed
    }
}

/// Configuration for a [`ReconnectingClient`](crate::ReconnectingClient).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    /// Outbound messages held before `write` fails with a full-queue error.
    pub queue_capacity: usize,
    /// Per-attempt dial timeout in milliseconds.
    pub dial_timeout_ms: u64,
    /// Pause after a transient read error, in milliseconds.
    pub read_retry_delay_ms: u64,
    /// Read pump buffer size in bytes.
    pub read_buffer_size: usize,
    /// Largest frame payload accepted or sent.
    pub max_frame_size: usize,
    /// Wire framing.
    pub framing: Framing,
    /// Delay policy between failed dials.
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            queue_capacity: WRITE_QUEUE_CAPACITY,
            dial_timeout_ms: DIAL_TIMEOUT.as_millis() as u64,
            read_retry_delay_ms: READ_RETRY_DELAY.as_millis() as u64,
            read_buffer_size: READ_BUFFER_SIZE,
            max_frame_size: MAX_FRAME_SIZE,
            framing: Framing::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Default config file location (`<config dir>/resocket/config.json`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("resocket").join("config.json"))
    }

    /// Loads configuration from `path` (or the default location), with
    /// environment variable overrides. A missing file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut config = match path {
            Some(path) if path.exists() => Self::load_from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a JSON config file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid config: {}", path.display()))
    }

    /// Apply `RESOCKET_*` overrides from `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup("RESOCKET_QUEUE_CAPACITY") {
            self.queue_capacity = value
                .parse()
                .context("RESOCKET_QUEUE_CAPACITY must be a number")?;
        }

        if let Some(value) = lookup("RESOCKET_DIAL_TIMEOUT_MS") {
            self.dial_timeout_ms = value
                .parse()
                .context("RESOCKET_DIAL_TIMEOUT_MS must be a number")?;
        }

        if let Some(value) = lookup("RESOCKET_MAX_FRAME_SIZE") {
            self.max_frame_size = value
                .parse()
                .context("RESOCKET_MAX_FRAME_SIZE must be a number")?;
        }

        if let Some(value) = lookup("RESOCKET_FRAMING") {
            self.framing = match value.as_str() {
                "raw" => Framing::Raw,
                "length_prefixed" | "framed" => Framing::LengthPrefixed,
                other => anyhow::bail!("Unknown RESOCKET_FRAMING '{other}'"),
            };
        }

        if let Some(value) = lookup("RESOCKET_RECONNECT") {
            self.reconnect = match value.as_str() {
                "immediate" => ReconnectPolicy::Immediate,
                "fixed" => ReconnectPolicy::default(),
                "exponential" | "exponential_jitter" => ReconnectPolicy::exponential(),
                other => anyhow::bail!("Unknown RESOCKET_RECONNECT '{other}'"),
            };
        }

        Ok(())
    }

    /// Dial timeout as a `Duration`.
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    /// Transient read delay as a `Duration`.
    pub fn read_retry_delay(&self) -> Duration {
        Duration::from_millis(self.read_retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_constants() {
        let config = ClientConfig::default();
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.dial_timeout(), Duration::from_secs(5));
        assert_eq!(config.read_retry_delay(), Duration::from_millis(50));
        assert_eq!(config.max_frame_size, 10 * 1024 * 1024);
        assert_eq!(config.framing, Framing::LengthPrefixed);
        assert_eq!(config.reconnect, ReconnectPolicy::Fixed { delay_ms: 5000 });
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(
            &path,
            r#"{"queue_capacity": 8, "framing": "raw", "reconnect": {"policy": "fixed", "delay_ms": 25}}"#,
        )
        .unwrap();

        let config = ClientConfig::load_from_file(&path).unwrap();
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.framing, Framing::Raw);
        assert_eq!(config.reconnect, ReconnectPolicy::Fixed { delay_ms: 25 });
        assert_eq!(config.read_buffer_size, READ_BUFFER_SIZE);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, "not json").unwrap();
        assert!(ClientConfig::load_from_file(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("RESOCKET_QUEUE_CAPACITY", "2"),
            ("RESOCKET_FRAMING", "raw"),
            ("RESOCKET_RECONNECT", "exponential"),
        ]);
        let mut config = ClientConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| (*v).to_string()))
            .unwrap();

        assert_eq!(config.queue_capacity, 2);
        assert_eq!(config.framing, Framing::Raw);
        assert_eq!(config.reconnect, ReconnectPolicy::exponential());
    }

    #[test]
    fn test_bad_env_override_is_rejected() {
        let mut config = ClientConfig::default();
        let result = config.apply_overrides(|key| {
            (key == "RESOCKET_QUEUE_CAPACITY").then(|| "lots".to_string())
        });
        assert!(result.is_err());
    }
}
