// ── Change events ──
//
// One tagged union covers everything consumers can observe: entity
// additions and removals, plus per-field changes on mutable attributes.
// Events carry handles, so observers can read the full current (or
// last-known) state of whatever the event is about.

use strum::{Display, EnumString};

use crate::store::{AccessPointHandle, DeviceHandle};

/// Mutable manager attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum ManagerField {
    Daemon,
    PrimaryDevice,
    Icon,
}

/// Mutable device attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum DeviceField {
    Name,
    Mac,
    Status,
    Icon,
    ActiveAccessPoint,
}

/// Mutable access point attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum AccessPointField {
    Name,
    Mac,
    Strength,
    Security,
    Status,
    Best,
    Active,
    Icon,
}

/// Everything an observer can be told.
#[derive(Debug, Clone)]
pub enum Event {
    /// A device finished initialization and is now exposed.
    DeviceAdded(DeviceHandle),
    /// A device is gone for good. Fires once per device, while the handle
    /// still reads its last-known state.
    DeviceRemoved(DeviceHandle),
    /// A ready device was reset by a type change and hidden again. It will
    /// be re-announced with `DeviceAdded` once it re-earns readiness.
    DeviceWithdrawn(DeviceHandle),
    AccessPointAdded {
        device: DeviceHandle,
        access_point: AccessPointHandle,
    },
    AccessPointRemoved {
        device: DeviceHandle,
        access_point: AccessPointHandle,
    },
    ManagerChanged(ManagerField),
    DeviceChanged {
        device: DeviceHandle,
        field: DeviceField,
    },
    AccessPointChanged {
        access_point: AccessPointHandle,
        field: AccessPointField,
    },
}

impl Event {
    /// Device the event concerns, if any. Access point events resolve to
    /// their owning device only when the event carries it.
    pub fn device(&self) -> Option<&DeviceHandle> {
        match self {
            Self::DeviceAdded(d)
            | Self::DeviceRemoved(d)
            | Self::DeviceWithdrawn(d)
            | Self::DeviceChanged { device: d, .. }
            | Self::AccessPointAdded { device: d, .. }
            | Self::AccessPointRemoved { device: d, .. } => Some(d),
            Self::ManagerChanged(_) | Self::AccessPointChanged { .. } => None,
        }
    }

    pub fn access_point(&self) -> Option<&AccessPointHandle> {
        match self {
            Self::AccessPointAdded { access_point, .. }
            | Self::AccessPointRemoved { access_point, .. }
            | Self::AccessPointChanged { access_point, .. } => Some(access_point),
            _ => None,
        }
    }

    /// Short machine-readable name, e.g. `device-added`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DeviceAdded(_) => "device-added",
            Self::DeviceRemoved(_) => "device-removed",
            Self::DeviceWithdrawn(_) => "device-withdrawn",
            Self::AccessPointAdded { .. } => "ap-added",
            Self::AccessPointRemoved { .. } => "ap-removed",
            Self::ManagerChanged(_) => "manager-changed",
            Self::DeviceChanged { .. } => "device-changed",
            Self::AccessPointChanged { .. } => "ap-changed",
        }
    }
}

// ── Filters ─────────────────────────────────────────────────────────

/// Which events an observer wants.
pub enum EventFilter {
    All,
    /// Device additions, removals and withdrawals plus manager changes.
    Manager,
    /// Everything about one device, including its access point churn.
    Device(DeviceHandle),
    /// Field changes of one access point.
    AccessPoint(AccessPointHandle),
    Custom(Box<dyn Fn(&Event) -> bool + Send + Sync>),
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        match self {
            Self::All => true,
            Self::Manager => matches!(
                event,
                Event::DeviceAdded(_)
                    | Event::DeviceRemoved(_)
                    | Event::DeviceWithdrawn(_)
                    | Event::ManagerChanged(_)
            ),
            Self::Device(device) => event.device() == Some(device),
            Self::AccessPoint(ap) => {
                matches!(event, Event::AccessPointChanged { access_point, .. } if access_point == ap)
            }
            Self::Custom(f) => f(event),
        }
    }
}

impl std::fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "All"),
            Self::Manager => write!(f, "Manager"),
            Self::Device(d) => f.debug_tuple("Device").field(&d.id()).finish(),
            Self::AccessPoint(a) => f.debug_tuple("AccessPoint").field(&a.id()).finish(),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}
