// ── Access point domain types ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::device::{ConnectionStatus, DeviceKind};
use super::entity_id::{MacAddress, ObjectPath};
use super::icon;
use crate::store::DeviceId;

/// Name given to the synthetic access point of a wired device with carrier.
pub const ETHERNET_AP_NAME: &str = "ethernet";

/// Security classification of an access point.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Security {
    #[default]
    None,
    Wep,
    WpaPsk,
    WpaEnterprise,
    Other,
}

/// Snapshot of one connectable target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPoint {
    /// Daemon object identity; `None` for synthetic wired/bluetooth APs.
    pub path: Option<ObjectPath>,
    /// Owning device. Cleared when the access point is removed.
    pub device: Option<DeviceId>,
    /// Variant of the owning device.
    pub kind: DeviceKind,
    /// Network name. `None` for hidden networks.
    pub name: Option<String>,
    pub remote_mac: Option<MacAddress>,
    /// Signal strength, 0..=100.
    pub strength: u8,
    pub security: Security,
    pub status: ConnectionStatus,
    /// Strongest member of its `(name, security)` group on this device.
    pub best: bool,
    /// This is the device's active access point.
    pub active: bool,
    pub icon: &'static str,
    pub ready: bool,
}

impl AccessPoint {
    pub(crate) fn new(device: DeviceId, kind: DeviceKind, path: Option<ObjectPath>) -> Self {
        Self {
            path,
            device: Some(device),
            kind,
            name: None,
            remote_mac: None,
            strength: 0,
            security: Security::None,
            status: ConnectionStatus::Disconnected,
            best: false,
            active: false,
            icon: icon::access_point(kind, ConnectionStatus::Disconnected, 0),
            ready: false,
        }
    }

    /// Group key for best-of-group selection. Unnamed access points are
    /// never grouped.
    pub fn group_key(&self) -> Option<(&str, Security)> {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => Some((name, self.security)),
            _ => None,
        }
    }

    /// Whether two access points represent the same logical network on the
    /// same device.
    pub fn same_network(&self, other: &Self) -> bool {
        self.device.is_some()
            && self.device == other.device
            && self.group_key().is_some()
            && self.group_key() == other.group_key()
    }
}
