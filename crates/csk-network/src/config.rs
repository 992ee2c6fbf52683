// ── Tracker configuration ──
//
// Runtime knobs for one tracker instance. Never touches disk: `csk-config`
// loads user settings and builds one of these.

use crate::nm;

const DEFAULT_EVENT_BUFFER: usize = 256;

/// How a [`Tracker`](crate::Tracker) reaches the daemon and how much event
/// backlog the [`Controller`](crate::Controller) keeps for slow readers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Well-known bus name of the network daemon.
    pub daemon_name: String,
    /// Capacity of the controller's event broadcast channel.
    pub event_buffer: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            daemon_name: nm::SERVICE.to_owned(),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl TrackerConfig {
    pub fn with_daemon_name(mut self, name: impl Into<String>) -> Self {
        self.daemon_name = name.into();
        self
    }

    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }
}
