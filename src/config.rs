use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

/// Environment variable naming a YAML config file.
pub const CONFIG_ENV: &str = "LOOPHTTP_CONFIG";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub tweak: TweakConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Readiness-wait bound per tick, in seconds
    pub poll_timeout_secs: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TweakConfig {
    pub port: u16,
    pub poll_timeout_secs: f64,
    /// How long a long-poll is parked before it is answered anyway
    pub long_poll_timeout_secs: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            poll_timeout_secs: 1.0 / 60.0,
        }
    }
}

impl Default for TweakConfig {
    fn default() -> Self {
        Self {
            port: 1138,
            poll_timeout_secs: 0.25,
            long_poll_timeout_secs: 30.0,
        }
    }
}

impl ServerConfig {
    pub fn poll_timeout(&self) -> Duration {
        secs_to_duration(self.poll_timeout_secs)
    }
}

impl TweakConfig {
    pub fn poll_timeout(&self) -> Duration {
        secs_to_duration(self.poll_timeout_secs)
    }

    pub fn long_poll_timeout(&self) -> Duration {
        secs_to_duration(self.long_poll_timeout_secs)
    }
}

/// Fractional seconds to a Duration; negative, NaN and infinite clamp to zero.
pub fn secs_to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

impl Config {
    /// Defaults, or the file named by `LOOPHTTP_CONFIG`, then `HTTP_PORT` /
    /// `TWEAK_PORT` overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };

        if let Some(port) = port_from_env("HTTP_PORT")? {
            cfg.server.port = port;
        }
        if let Some(port) = port_from_env("TWEAK_PORT")? {
            cfg.tweak.port = port;
        }

        Ok(cfg)
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(yaml).context("invalid config")
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("in {}", path.display()))
    }
}

fn port_from_env(var: &str) -> anyhow::Result<Option<u16>> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{var} is not a port number: {value:?}")),
        Err(_) => Ok(None),
    }
}
