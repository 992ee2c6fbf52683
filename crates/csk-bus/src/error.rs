use thiserror::Error;

/// Top-level error type for the `csk-bus` crate.
///
/// Covers every failure a call or subscription can hit between the tracker
/// and the daemon. `csk-network` absorbs most of these and maps the rest
/// into `CoreError`.
#[derive(Debug, Error)]
pub enum BusError {
    // ── Transport ───────────────────────────────────────────────────
    /// Could not reach the bus, or the connection broke mid-call.
    #[error("D-Bus connection failed: {0}")]
    Connection(String),

    /// The connection was closed before the call could be sent.
    #[error("D-Bus connection closed")]
    Closed,

    // ── Remote ──────────────────────────────────────────────────────
    /// The remote side replied with a D-Bus error.
    #[error("{name}: {message}")]
    Method { name: String, message: String },

    // ── Local ───────────────────────────────────────────────────────
    /// The caller's cancellation token fired before the reply arrived.
    #[error("Call cancelled")]
    Cancelled,

    /// An argument could not be encoded for the wire.
    #[error("Invalid argument for {method}: {reason}")]
    InvalidArgument { method: String, reason: String },

    /// A reply or signal body could not be decoded.
    #[error("Could not decode body ({signature}): {message}")]
    Decode { signature: String, message: String },
}

impl BusError {
    /// Returns `true` if the call was abandoned by its own token.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the D-Bus error name for remote failures.
    pub fn error_name(&self) -> Option<&str> {
        match self {
            Self::Method { name, .. } => Some(name),
            _ => None,
        }
    }
}

impl From<zbus::Error> for BusError {
    fn from(err: zbus::Error) -> Self {
        match err {
            zbus::Error::MethodError(name, detail, _) => Self::Method {
                name: name.to_string(),
                message: detail.unwrap_or_default(),
            },
            zbus::Error::Variant(e) => Self::Decode {
                signature: String::new(),
                message: e.to_string(),
            },
            other => Self::Connection(other.to_string()),
        }
    }
}
