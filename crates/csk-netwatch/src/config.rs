//! CLI configuration: thin wrapper around `csk_config` shared types.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides (`--bus`,
//! `--daemon`, `--output`, `--settle-ms`).

use std::time::Duration;

use clap::ValueEnum;

use csk_network::TrackerConfig;

use crate::cli::{BusChoice, GlobalOpts, OutputFormat};
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use csk_config::{BusKind, Config, config_path, load_config};

// ── Resolved settings ───────────────────────────────────────────────

/// Everything a bus-bound command needs, flags applied over config.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bus: BusKind,
    pub tracker: TrackerConfig,
    pub output: OutputFormat,
    pub settle: Duration,
}

/// Merge the loaded config with command-line overrides.
pub fn resolve(config: &Config, global: &GlobalOpts) -> Result<Settings, CliError> {
    let mut tracker = config.to_tracker_config();
    if let Some(daemon) = &global.daemon {
        if daemon.trim().is_empty() {
            return Err(CliError::Validation {
                field: "daemon".into(),
                reason: "bus name must not be empty".into(),
            });
        }
        tracker = tracker.with_daemon_name(daemon.clone());
    }

    let bus = match global.bus {
        Some(BusChoice::System) => BusKind::System,
        Some(BusChoice::Session) => BusKind::Session,
        None => config.defaults.bus,
    };

    let output = match global.output {
        Some(format) => format,
        None => OutputFormat::from_str(&config.defaults.output, true).map_err(|reason| {
            CliError::Validation {
                field: "output".into(),
                reason,
            }
        })?,
    };

    let settle = global
        .settle_ms
        .map_or_else(|| config.defaults.settle(), Duration::from_millis);

    Ok(Settings {
        bus,
        tracker,
        output,
        settle,
    })
}

/// Output format for commands that never touch the bus.
pub fn output_format(config: &Config, global: &GlobalOpts) -> OutputFormat {
    global.output.unwrap_or_else(|| {
        OutputFormat::from_str(&config.defaults.output, true).unwrap_or(OutputFormat::Table)
    })
}
