//! Shared configuration for the csk network tools.
//!
//! TOML defaults under the platform config dir, `CSK_NET_*` environment
//! overrides, and translation to `csk_network::TrackerConfig`. The CLI
//! layers its own flags on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

use csk_network::TrackerConfig;
use csk_network::nm;

/// Prefix for environment overrides, e.g. `CSK_NET_SETTLE_MS=500`.
pub const ENV_PREFIX: &str = "CSK_NET_";

/// Overrides the config file location entirely.
pub const CONFIG_PATH_ENV: &str = "CSK_NET_CONFIG";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,
}

/// Which message bus to connect to.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BusKind {
    #[default]
    System,
    Session,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default)]
    pub bus: BusKind,

    /// Well-known bus name of the network daemon.
    #[serde(default = "default_daemon")]
    pub daemon: String,

    /// `table`, `json` or `plain`.
    #[serde(default = "default_output")]
    pub output: String,

    /// How long one-shot commands wait for the mirror to converge.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Event broadcast capacity.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            bus: BusKind::default(),
            daemon: default_daemon(),
            output: default_output(),
            settle_ms: default_settle_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Defaults {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

fn default_daemon() -> String {
    nm::SERVICE.into()
}
fn default_output() -> String {
    "table".into()
}
fn default_settle_ms() -> u64 {
    1500
}
fn default_event_buffer() -> usize {
    256
}

const OUTPUT_FORMATS: [&str; 3] = ["table", "json", "plain"];
const MAX_SETTLE_MS: u64 = 60_000;

impl Config {
    /// Reject values no command could run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.defaults;
        if d.daemon.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "daemon".into(),
                reason: "bus name must not be empty".into(),
            });
        }
        if !OUTPUT_FORMATS.contains(&d.output.as_str()) {
            return Err(ConfigError::Validation {
                field: "output".into(),
                reason: format!("expected one of {OUTPUT_FORMATS:?}, got '{}'", d.output),
            });
        }
        if d.settle_ms > MAX_SETTLE_MS {
            return Err(ConfigError::Validation {
                field: "settle_ms".into(),
                reason: format!("at most {MAX_SETTLE_MS}, got {}", d.settle_ms),
            });
        }
        if d.event_buffer == 0 {
            return Err(ConfigError::Validation {
                field: "event_buffer".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Tracker settings derived from this config.
    pub fn to_tracker_config(&self) -> TrackerConfig {
        TrackerConfig::default()
            .with_daemon_name(self.defaults.daemon.clone())
            .with_event_buffer(self.defaults.event_buffer)
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path: `CSK_NET_CONFIG` if set, else XDG /
/// platform conventions.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    ProjectDirs::from("org", "csk", "csk-network").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("csk-network");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file + environment. A missing file yields the
/// defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(
            Env::prefixed(ENV_PREFIX)
                .ignore(&["config"])
                .map(|key| format!("defaults.{key}").into()),
        );

    let config: Config = figment.extract()?;
    config.validate()?;
    Ok(config)
}

/// Load config, returning the defaults if anything goes wrong.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(&path, cfg)?;
    Ok(path)
}

pub fn save_config_to(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    cfg.validate()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}
