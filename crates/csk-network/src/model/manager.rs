// ── Manager root ──

use super::icon;
use crate::store::DeviceHandle;

/// Snapshot of the manager root.
#[derive(Debug, Clone)]
pub struct Manager {
    /// Unique bus name of the current daemon instance; changes on restart.
    pub daemon_owner: Option<String>,
    /// Ready devices, in announcement order.
    pub devices: Vec<DeviceHandle>,
    /// Number of tracked devices, ready or not.
    pub known_devices: usize,
    pub primary_device: Option<DeviceHandle>,
    pub icon: &'static str,
}

impl Manager {
    pub(crate) fn new() -> Self {
        Self {
            daemon_owner: None,
            devices: Vec::new(),
            known_devices: 0,
            primary_device: None,
            icon: icon::OFFLINE,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.daemon_owner.is_some()
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}
