// ── Controller commands ──
//
// Requests from `Controller` handles to the task that owns the tracker.
// Each carries a one-shot reply channel.

use tokio::sync::oneshot;

use crate::event::EventFilter;
use crate::observer::{Observer, ObserverId};
use crate::store::{AccessPointHandle, DeviceHandle};

/// Work for the tracker task.
pub(crate) enum Command {
    RequestScan(DeviceHandle),
    RequestConnect(AccessPointHandle),
    Observe {
        filter: EventFilter,
        callback: Observer,
    },
    Unobserve(ObserverId),
}

/// Outcome of a [`Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CommandResult {
    /// Scan or connect request issued (`true`) or ignored (`false`).
    Accepted(bool),
    Observing(ObserverId),
    Unobserved(bool),
}

pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: oneshot::Sender<CommandResult>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RequestScan(device) => f.debug_tuple("RequestScan").field(device).finish(),
            Self::RequestConnect(ap) => f.debug_tuple("RequestConnect").field(ap).finish(),
            Self::Observe { filter, .. } => f
                .debug_struct("Observe")
                .field("filter", filter)
                .finish_non_exhaustive(),
            Self::Unobserve(id) => f.debug_tuple("Unobserve").field(id).finish(),
        }
    }
}
