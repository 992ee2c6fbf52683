// ── Device domain types ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::entity_id::{MacAddress, ObjectPath};
use super::icon;
use crate::store::AccessPointHandle;

/// Device variant, resolved from the daemon's raw type code.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    #[default]
    Unknown,
    Wired,
    Wifi,
    Bluetooth,
}

impl DeviceKind {
    /// Bare display label, or `None` for variants that are never shown.
    pub fn label(self) -> Option<&'static str> {
        match self {
            Self::Wired => Some("Wired"),
            Self::Wifi => Some("Wi-Fi"),
            Self::Bluetooth => Some("Bluetooth"),
            Self::Unknown => None,
        }
    }
}

/// Three-band connection status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

/// Snapshot of one daemon network device.
#[derive(Debug, Clone)]
pub struct Device {
    /// Daemon object identity. Stable for the device's lifetime.
    pub path: ObjectPath,
    pub kind: DeviceKind,
    pub interface: Option<String>,
    /// Display name, disambiguated with the interface when siblings share
    /// a variant. `None` until the variant is resolved.
    pub name: Option<String>,
    pub mac: Option<MacAddress>,
    pub status: ConnectionStatus,
    pub icon: &'static str,
    /// Ready access points, in discovery order.
    pub access_points: Vec<AccessPointHandle>,
    pub active_access_point: Option<AccessPointHandle>,
    pub ready: bool,
    /// `false` once the manager has let go of the device.
    pub attached: bool,
}

impl Device {
    pub(crate) fn new(path: ObjectPath) -> Self {
        Self {
            path,
            kind: DeviceKind::Unknown,
            interface: None,
            name: None,
            mac: None,
            status: ConnectionStatus::Disconnected,
            icon: icon::OFFLINE,
            access_points: Vec::new(),
            active_access_point: None,
            ready: false,
            attached: true,
        }
    }

    /// Best access points only, the way a network list shows them.
    pub fn best_access_points(&self) -> Vec<AccessPointHandle> {
        self.access_points
            .iter()
            .filter(|ap| ap.get().best)
            .cloned()
            .collect()
    }

    /// Display name, falling back to the interface and then the path.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.interface.clone())
            .unwrap_or_else(|| self.path.to_string())
    }
}
