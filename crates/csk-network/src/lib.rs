//! Observable mirror of the NetworkManager daemon's devices and access
//! points, for desktop shell panels and command-line consumers.
//!
//! - **[`Tracker`]**: sans-IO state machine. Fed name ownership changes,
//!   signals and call completions; produces [`Request`]s for the bus and
//!   synchronous [`Event`]s for observers. Devices are exposed only once
//!   fully initialized, and every async reply is tied to a cancellation
//!   token so torn-down entities never see late data.
//!
//! - **[`Controller`]**: async driver that owns a `Tracker` and a
//!   [`csk_bus::Bus`] on a tokio task. Readers load snapshots through a
//!   lock-free [`ManagerView`]; changes fan out on a `broadcast` channel.
//!   [`Controller::get_default()`] shares one instance per process.
//!
//! - **Handles** ([`DeviceHandle`], [`AccessPointHandle`]): cloneable
//!   references that keep answering with the last-known state after the
//!   entity is removed.
//!
//! - **Domain model** ([`model`]): `Manager`, `Device`, `AccessPoint`
//!   snapshots plus the icon and status derivations.

mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod model;
pub mod nm;
pub mod observer;
pub mod store;
pub mod tracker;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::TrackerConfig;
pub use controller::Controller;
pub use error::CoreError;
pub use event::{AccessPointField, DeviceField, Event, EventFilter, ManagerField};
pub use observer::{Observer, ObserverId};
pub use store::{AccessPointHandle, AccessPointId, DeviceHandle, DeviceId, ManagerView};
pub use tracker::{Request, SubscriptionId, Ticket, Tracker};

pub use model::{
    AccessPoint, ConnectionStatus, Device, DeviceKind, MacAddress, Manager, ObjectPath, Security,
};
