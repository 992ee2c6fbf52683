// ── Core error types ──
//
// Consumer-facing failures of the controller. The tracker itself never
// returns errors: malformed data, failed fetches and stale signals are
// logged and absorbed. What remains is getting a controller running at all.

use csk_bus::BusError;
use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to the message bus: {reason}")]
    BusUnavailable { reason: String },

    #[error("Network daemon {name} is not running")]
    DaemonUnavailable { name: String },

    #[error("Network tracker has stopped")]
    TrackerStopped,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

const SERVICE_UNKNOWN: &str = "org.freedesktop.DBus.Error.ServiceUnknown";
const NAME_HAS_NO_OWNER: &str = "org.freedesktop.DBus.Error.NameHasNoOwner";

// ── Conversion from transport-layer errors ───────────────────────────

impl From<BusError> for CoreError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::Connection(reason) => Self::BusUnavailable { reason },
            BusError::Closed => Self::TrackerStopped,
            BusError::Method { name, message }
                if name == SERVICE_UNKNOWN || name == NAME_HAS_NO_OWNER =>
            {
                Self::DaemonUnavailable { name: message }
            }
            other => Self::Internal(other.to_string()),
        }
    }
}
