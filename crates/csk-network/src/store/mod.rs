// ── Entity storage ──
//
// The arena owns every live entity by key; handles give consumers shared,
// tombstone-safe read access to the same nodes.

pub(crate) mod arena;
mod handle;

pub use arena::{AccessPointId, ArenaKey, DeviceId, RawKey};
pub use handle::{AccessPointHandle, DeviceHandle, ManagerView};

pub(crate) use arena::Arena;
pub(crate) use handle::Node;
