// ── NetworkManager protocol constants ──
//
// Bus names, object paths, interfaces and the fixed numeric tables the
// tracker uses to classify what the daemon reports.

use crate::model::{ConnectionStatus, DeviceKind, Security};

pub const SERVICE: &str = "org.freedesktop.NetworkManager";
pub const PATH: &str = "/org/freedesktop/NetworkManager";

pub const MANAGER_INTERFACE: &str = "org.freedesktop.NetworkManager";
pub const DEVICE_INTERFACE: &str = "org.freedesktop.NetworkManager.Device";
pub const WIRED_INTERFACE: &str = "org.freedesktop.NetworkManager.Device.Wired";
pub const WIRELESS_INTERFACE: &str = "org.freedesktop.NetworkManager.Device.Wireless";
pub const BLUETOOTH_INTERFACE: &str = "org.freedesktop.NetworkManager.Device.Bluetooth";
pub const ACCESS_POINT_INTERFACE: &str = "org.freedesktop.NetworkManager.AccessPoint";
pub const ACTIVE_CONNECTION_INTERFACE: &str = "org.freedesktop.NetworkManager.Connection.Active";

// ── Device type codes (NMDeviceType) ────────────────────────────────

const TYPE_ETHERNET: u64 = 1;
const TYPE_WIFI: u64 = 2;
const TYPE_BLUETOOTH: u64 = 5;

/// Map the daemon's raw device type code to a variant.
pub fn device_kind(code: u64) -> DeviceKind {
    match code {
        TYPE_ETHERNET => DeviceKind::Wired,
        TYPE_WIFI => DeviceKind::Wifi,
        TYPE_BLUETOOTH => DeviceKind::Bluetooth,
        _ => DeviceKind::Unknown,
    }
}

/// Variant-specific property interface, if the variant has one.
pub fn kind_interface(kind: DeviceKind) -> Option<&'static str> {
    match kind {
        DeviceKind::Wired => Some(WIRED_INTERFACE),
        DeviceKind::Wifi => Some(WIRELESS_INTERFACE),
        DeviceKind::Bluetooth => Some(BLUETOOTH_INTERFACE),
        DeviceKind::Unknown => None,
    }
}

// ── Device state bands (NMDeviceState) ──────────────────────────────

const STATE_PREPARE: u64 = 40;
const STATE_ACTIVATED: u64 = 100;
const STATE_DEACTIVATING: u64 = 110;

/// Collapse the daemon's link-state code into three bands.
pub fn connection_status(state: u64) -> ConnectionStatus {
    if !(STATE_PREPARE..STATE_DEACTIVATING).contains(&state) {
        ConnectionStatus::Disconnected
    } else if state < STATE_ACTIVATED {
        ConnectionStatus::Connecting
    } else {
        ConnectionStatus::Connected
    }
}

// ── Access point security flags ─────────────────────────────────────

const AP_FLAGS_PRIVACY: u64 = 0x1;
const KEY_MGMT_PSK: u64 = 0x100;
const KEY_MGMT_802_1X: u64 = 0x200;
const KEY_MGMT_SAE: u64 = 0x400;
const KEY_MGMT_OWE: u64 = 0x800;
const KEY_MGMT_EAP_SUITE_B_192: u64 = 0x2000;

/// Classify an access point from its `Flags`, `WpaFlags` and `RsnFlags`.
pub fn security(flags: u64, wpa_flags: u64, rsn_flags: u64) -> Security {
    let wpa = wpa_flags | rsn_flags;
    if wpa & (KEY_MGMT_802_1X | KEY_MGMT_EAP_SUITE_B_192) != 0 {
        Security::WpaEnterprise
    } else if wpa & (KEY_MGMT_PSK | KEY_MGMT_SAE) != 0 {
        Security::WpaPsk
    } else if wpa == 0 && flags & AP_FLAGS_PRIVACY != 0 {
        Security::Wep
    } else if wpa & !KEY_MGMT_OWE != 0 {
        Security::Other
    } else {
        Security::None
    }
}
