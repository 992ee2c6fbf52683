// ── Domain model ──

pub mod access_point;
pub mod device;
pub mod entity_id;
pub mod icon;
pub mod manager;

pub use access_point::{AccessPoint, ETHERNET_AP_NAME, Security};
pub use device::{ConnectionStatus, Device, DeviceKind};
pub use entity_id::{MacAddress, ObjectPath};
pub use manager::Manager;
