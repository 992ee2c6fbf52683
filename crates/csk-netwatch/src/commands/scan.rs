//! `scan`: ask a Wi-Fi device to rescan.

use std::time::Duration;

use csk_network::{Controller, DeviceKind};

use crate::cli::{GlobalOpts, ScanArgs};
use crate::config::Settings;
use crate::error::CliError;
use crate::output;

/// Time for the tracker task to put the call on the wire before the
/// controller is shut down.
const FLUSH: Duration = Duration::from_millis(100);

pub async fn handle(
    controller: &Controller,
    args: &ScanArgs,
    settings: &Settings,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    super::settle(controller, settings.settle).await?;

    let device = super::find_device(controller, &args.device)?;
    let snapshot = device.get();
    if snapshot.kind != DeviceKind::Wifi {
        return Err(CliError::Unsupported {
            operation: "scan".into(),
            target: format!("{} ({} device)", snapshot.display_name(), snapshot.kind),
        });
    }

    if !controller.request_scan(&device).await? {
        return Err(CliError::Unsupported {
            operation: "scan".into(),
            target: snapshot.display_name(),
        });
    }
    tokio::time::sleep(FLUSH).await;

    output::print_output(
        &format!("Scan requested on {}", snapshot.display_name()),
        global.quiet,
    );
    Ok(())
}
