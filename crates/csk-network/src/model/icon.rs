// ── Status icons ──
//
// Icon names are pure functions of variant, connection status and (for
// Wi-Fi) signal strength. Names follow the freedesktop symbolic icon set.

use super::{ConnectionStatus, DeviceKind};

pub const OFFLINE: &str = "network-offline-symbolic";

pub const WIRELESS_EXCELLENT: &str = "network-wireless-signal-excellent-symbolic";
pub const WIRELESS_GOOD: &str = "network-wireless-signal-good-symbolic";
pub const WIRELESS_OK: &str = "network-wireless-signal-ok-symbolic";
pub const WIRELESS_WEAK: &str = "network-wireless-signal-weak-symbolic";
pub const WIRELESS_NONE: &str = "network-wireless-signal-none-symbolic";
pub const WIRELESS_ACQUIRING: &str = "network-wireless-acquiring-symbolic";
pub const WIRELESS_OFFLINE: &str = "network-wireless-offline-symbolic";

pub const WIRED: &str = "network-wired-symbolic";
pub const WIRED_ACQUIRING: &str = "network-wired-acquiring-symbolic";
pub const WIRED_OFFLINE: &str = "network-wired-disconnected-symbolic";

pub const BLUETOOTH: &str = "bluetooth-active-symbolic";
pub const BLUETOOTH_ACQUIRING: &str = "network-cellular-acquiring-symbolic";
pub const BLUETOOTH_OFFLINE: &str = "bluetooth-disconnected-symbolic";

/// Wi-Fi signal icon, bucketed into five bands.
pub fn wireless_signal(strength: u8) -> &'static str {
    match strength {
        81.. => WIRELESS_EXCELLENT,
        61..=80 => WIRELESS_GOOD,
        41..=60 => WIRELESS_OK,
        21..=40 => WIRELESS_WEAK,
        _ => WIRELESS_NONE,
    }
}

/// Icon for one access point.
pub fn access_point(kind: DeviceKind, status: ConnectionStatus, strength: u8) -> &'static str {
    match (kind, status) {
        (DeviceKind::Wifi, ConnectionStatus::Connecting) => WIRELESS_ACQUIRING,
        (DeviceKind::Wifi, _) => wireless_signal(strength),
        (DeviceKind::Wired, ConnectionStatus::Connecting) => WIRED_ACQUIRING,
        (DeviceKind::Wired, _) => WIRED,
        (DeviceKind::Bluetooth, ConnectionStatus::Connecting) => BLUETOOTH_ACQUIRING,
        (DeviceKind::Bluetooth, _) => BLUETOOTH,
        (DeviceKind::Unknown, _) => OFFLINE,
    }
}

/// Icon for a device: mirrors the active access point while connected,
/// otherwise a fixed acquiring or offline icon for the variant.
pub fn device(
    kind: DeviceKind,
    status: ConnectionStatus,
    active_icon: Option<&'static str>,
) -> &'static str {
    match status {
        ConnectionStatus::Connected => active_icon.unwrap_or(match kind {
            DeviceKind::Wifi => WIRELESS_EXCELLENT,
            DeviceKind::Wired => WIRED,
            DeviceKind::Bluetooth => BLUETOOTH,
            DeviceKind::Unknown => OFFLINE,
        }),
        ConnectionStatus::Connecting => match kind {
            DeviceKind::Wifi => WIRELESS_ACQUIRING,
            DeviceKind::Wired => WIRED_ACQUIRING,
            DeviceKind::Bluetooth => BLUETOOTH_ACQUIRING,
            DeviceKind::Unknown => OFFLINE,
        },
        ConnectionStatus::Disconnected => match kind {
            DeviceKind::Wifi => WIRELESS_OFFLINE,
            DeviceKind::Wired => WIRED_OFFLINE,
            DeviceKind::Bluetooth => BLUETOOTH_OFFLINE,
            DeviceKind::Unknown => OFFLINE,
        },
    }
}
