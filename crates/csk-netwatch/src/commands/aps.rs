//! `aps`: list access points per device.

use serde::Serialize;
use tabled::Tabled;

use csk_network::{AccessPoint, ConnectionStatus, Controller, DeviceHandle, MacAddress, Security};

use crate::cli::{ApsArgs, GlobalOpts};
use crate::config::Settings;
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct AccessPointRow {
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Signal")]
    strength: String,
    #[tabled(rename = "Security")]
    security: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Best")]
    best: String,
    #[tabled(rename = "Active")]
    active: String,
}

/// Serializable view of one access point.
#[derive(Debug, Serialize)]
pub struct AccessPointSummary {
    pub device: String,
    pub name: Option<String>,
    pub strength: u8,
    pub security: Security,
    pub status: ConnectionStatus,
    pub best: bool,
    pub active: bool,
    pub mac: Option<MacAddress>,
    pub path: Option<String>,
}

impl AccessPointSummary {
    fn new(device: &str, ap: &AccessPoint) -> Self {
        Self {
            device: device.to_owned(),
            name: ap.name.clone(),
            strength: ap.strength,
            security: ap.security,
            status: ap.status,
            best: ap.best,
            active: ap.active,
            mac: ap.remote_mac.clone(),
            path: ap.path.as_ref().map(ToString::to_string),
        }
    }

    fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| "(hidden)".into())
    }
}

fn row(ap: &AccessPointSummary) -> AccessPointRow {
    AccessPointRow {
        device: ap.device.clone(),
        name: ap.label(),
        strength: format!("{}%", ap.strength),
        security: ap.security.to_string(),
        status: ap.status.to_string(),
        best: output::check(ap.best),
        active: output::check(ap.active),
    }
}

/// Access points of `device`, strongest first. Without `all`, only the
/// best member of each network is listed.
fn collect(device: &DeviceHandle, all: bool) -> Vec<AccessPointSummary> {
    let snapshot = device.get();
    let handles = if all {
        snapshot.access_points.clone()
    } else {
        snapshot.best_access_points()
    };
    let name = snapshot.display_name();

    let mut aps: Vec<AccessPointSummary> = handles
        .iter()
        .map(|ap| AccessPointSummary::new(&name, &ap.get()))
        .collect();
    aps.sort_by(|a, b| b.strength.cmp(&a.strength));
    aps
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    controller: &Controller,
    args: &ApsArgs,
    settings: &Settings,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    super::settle(controller, settings.settle).await?;

    let devices = match &args.device {
        Some(identifier) => vec![super::find_device(controller, identifier)?],
        None => controller.devices(),
    };
    let aps: Vec<AccessPointSummary> = devices
        .iter()
        .flat_map(|device| collect(device, args.all))
        .collect();

    let out = output::render_list(
        settings.output,
        &aps,
        row,
        AccessPointSummary::label,
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
