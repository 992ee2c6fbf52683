//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use csk_config::ConfigError;
use csk_network::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const UNSUPPORTED: i32 = 5;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to the {bus} bus")]
    #[diagnostic(
        code(netwatch::bus_unavailable),
        help(
            "Check that a D-Bus daemon is running and reachable.\n\
             Reason: {reason}"
        )
    )]
    BusUnavailable { bus: String, reason: String },

    #[error("Network daemon {name} is not running")]
    #[diagnostic(
        code(netwatch::daemon_unavailable),
        help(
            "Start NetworkManager, or point --daemon at another bus name.\n\
             Try: systemctl status NetworkManager"
        )
    )]
    DaemonUnavailable { name: String },

    #[error("Network tracker stopped unexpectedly")]
    #[diagnostic(code(netwatch::tracker_stopped))]
    TrackerStopped,

    // ── Resources ────────────────────────────────────────────────────
    #[error("Device '{identifier}' not found")]
    #[diagnostic(
        code(netwatch::not_found),
        help("Run: csk-netwatch devices to see available devices")
    )]
    DeviceNotFound { identifier: String },

    #[error("Operation '{operation}' is not supported on {target}")]
    #[diagnostic(code(netwatch::unsupported))]
    Unsupported { operation: String, target: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(netwatch::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(netwatch::config),
        help("Check the config file shown by: csk-netwatch config path")
    )]
    Config(#[from] ConfigError),

    // ── Internal ─────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    #[diagnostic(code(netwatch::internal))]
    Internal(String),

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not encode JSON: {0}")]
    #[diagnostic(code(netwatch::json))]
    Json(#[from] serde_json::Error),

    #[error("Could not encode TOML: {0}")]
    #[diagnostic(code(netwatch::toml))]
    Toml(#[from] toml::ser::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BusUnavailable { .. } | Self::DaemonUnavailable { .. } => exit_code::CONNECTION,
            Self::DeviceNotFound { .. } => exit_code::NOT_FOUND,
            Self::Unsupported { .. } => exit_code::UNSUPPORTED,
            Self::Validation { .. } | Self::Config(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::BusUnavailable { reason } => CliError::BusUnavailable {
                bus: "message".into(),
                reason,
            },
            CoreError::DaemonUnavailable { name } => CliError::DaemonUnavailable { name },
            CoreError::TrackerStopped => CliError::TrackerStopped,
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}
