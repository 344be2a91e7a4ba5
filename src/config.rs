use anyhow::{Context, Result};
use serde::Deserialize;

use crate::recording::RecordingConfig;

/// Prefix of environment overrides, e.g. `CALL_RECORDER__SERVICE__HTTP__PORT=9000`
pub const ENV_PREFIX: &str = "CALL_RECORDER";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory the filesystem object store writes recordings under
    #[serde(default = "default_root_dir")]
    pub root_dir: String,
}

fn default_service_name() -> String {
    "call-recorder".to_string()
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_root_dir() -> String {
    "./data".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
        }
    }
}

impl Config {
    /// Load `path` (any extension the `config` crate understands, optional)
    /// and apply `CALL_RECORDER__*` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to load config from {}", path))?;

        settings
            .try_deserialize()
            .with_context(|| format!("Invalid config in {}", path))
    }

    /// `bind:port` for the HTTP listener
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.service.http.bind, self.service.http.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_missing_file_uses_defaults() -> Result<()> {
        let temp_dir = tempfile::TempDir::new()?;
        let path = temp_dir.path().join("absent");

        let config = Config::load(path.to_str().unwrap())?;
        assert_eq!(config.service.name, "call-recorder");
        assert_eq!(config.recording.sample_rate, 8000);
        assert_eq!(config.storage.root_dir, "./data");
        Ok(())
    }

    #[test]
    fn test_load_file_overrides() -> Result<()> {
        let temp_dir = tempfile::TempDir::new()?;
        let path = temp_dir.path().join("recorder.toml");
        let mut file = std::fs::File::create(&path)?;
        writeln!(
            file,
            r#"
[service]
name = "recorder-test"

[service.http]
port = 9100

[recording]
max_duration_seconds = 60
enable_mixdown = true

[storage]
root_dir = "/tmp/recordings"
"#
        )?;

        let stem = temp_dir.path().join("recorder");
        let config = Config::load(stem.to_str().unwrap())?;

        assert_eq!(config.service.name, "recorder-test");
        assert_eq!(config.service.http.port, 9100);
        assert_eq!(config.service.http.bind, "127.0.0.1");
        assert_eq!(config.recording.max_duration_seconds, 60);
        assert!(config.recording.enable_mixdown);
        // Untouched fields keep their defaults
        assert_eq!(config.recording.segment_duration_ms, 30_000);
        assert_eq!(config.storage.root_dir, "/tmp/recordings");
        assert_eq!(config.http_addr(), "127.0.0.1:9100");
        Ok(())
    }
}
