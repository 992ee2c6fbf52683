//! `devices`: list ready network devices.

use serde::Serialize;
use tabled::Tabled;

use csk_network::{ConnectionStatus, Controller, Device, DeviceHandle, DeviceKind, MacAddress};

use crate::cli::GlobalOpts;
use crate::config::Settings;
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Interface")]
    interface: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "Active AP")]
    active: String,
    #[tabled(rename = "Primary")]
    primary: String,
}

/// Serializable view of one device.
#[derive(Debug, Serialize)]
pub struct DeviceSummary {
    pub name: String,
    pub kind: DeviceKind,
    pub interface: Option<String>,
    pub path: String,
    pub status: ConnectionStatus,
    pub mac: Option<MacAddress>,
    pub active_access_point: Option<String>,
    pub icon: &'static str,
    pub primary: bool,
}

impl DeviceSummary {
    pub fn new(device: &Device, primary: bool) -> Self {
        Self {
            name: device.display_name(),
            kind: device.kind,
            interface: device.interface.clone(),
            path: device.path.to_string(),
            status: device.status,
            mac: device.mac.clone(),
            active_access_point: device
                .active_access_point
                .as_ref()
                .and_then(|ap| ap.get().name.clone()),
            icon: device.icon,
            primary,
        }
    }
}

fn row(d: &DeviceSummary) -> DeviceRow {
    DeviceRow {
        name: d.name.clone(),
        kind: d.kind.to_string(),
        interface: output::cell(d.interface.as_deref()),
        status: d.status.to_string(),
        mac: output::cell(d.mac.as_ref()),
        active: output::cell(d.active_access_point.as_deref()),
        primary: output::check(d.primary),
    }
}

/// Snapshot every ready device, marking the primary one.
pub fn summaries(controller: &Controller) -> Vec<DeviceSummary> {
    let primary: Option<DeviceHandle> = controller.primary_device();
    controller
        .devices()
        .iter()
        .map(|handle| DeviceSummary::new(&handle.get(), primary.as_ref() == Some(handle)))
        .collect()
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    controller: &Controller,
    settings: &Settings,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    super::settle(controller, settings.settle).await?;

    let devices = summaries(controller);
    let out = output::render_list(settings.output, &devices, row, |d| d.name.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}
