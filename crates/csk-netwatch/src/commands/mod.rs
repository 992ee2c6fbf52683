//! Command dispatch: bridges CLI args -> controller -> output formatting.

pub mod aps;
pub mod config_cmd;
pub mod devices;
pub mod scan;
pub mod watch;

use std::time::Duration;

use futures_util::StreamExt;
use tokio::time::Instant;

use csk_network::{Controller, CoreError, DeviceHandle};

use crate::cli::{Command, GlobalOpts};
use crate::config::{BusKind, Settings};
use crate::error::CliError;

/// A mirror that has gone this long without an event counts as settled.
const QUIET_PERIOD: Duration = Duration::from_millis(200);

/// Dispatch a bus-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    controller: &Controller,
    settings: &Settings,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Devices => devices::handle(controller, settings, global).await,
        Command::Aps(args) => aps::handle(controller, &args, settings, global).await,
        Command::Watch(args) => watch::handle(controller, &args, settings, global).await,
        Command::Scan(args) => scan::handle(controller, &args, settings, global).await,
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "local command reached the bus dispatcher".into(),
        )),
    }
}

// ── Shared helpers ──────────────────────────────────────────────────

/// Start a controller on the configured bus.
pub async fn connect(settings: &Settings) -> Result<Controller, CliError> {
    let tracker = settings.tracker.clone();
    let started = match settings.bus {
        BusKind::System => Controller::system(tracker).await,
        BusKind::Session => Controller::session(tracker).await,
    };
    started.map_err(|err| match err {
        CoreError::BusUnavailable { reason } => CliError::BusUnavailable {
            bus: settings.bus.to_string(),
            reason,
        },
        other => other.into(),
    })
}

/// Wait until the daemon is present and the event stream has gone quiet,
/// or the settle budget runs out.
pub async fn settle(controller: &Controller, budget: Duration) -> Result<(), CliError> {
    let deadline = Instant::now() + budget;
    let mut events = Box::pin(controller.event_stream());

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        let wait = QUIET_PERIOD.min(remaining);
        match tokio::time::timeout(wait, events.next()).await {
            Ok(Some(_)) => {}
            Ok(None) => return Err(CliError::TrackerStopped),
            Err(_) if controller.manager().is_connected() => break,
            Err(_) => {}
        }
    }

    if controller.manager().is_connected() {
        Ok(())
    } else {
        Err(CliError::DaemonUnavailable {
            name: controller.config().daemon_name.clone(),
        })
    }
}

/// Resolve a device by interface or display name among the ready ones.
pub fn find_device(controller: &Controller, identifier: &str) -> Result<DeviceHandle, CliError> {
    controller
        .find_device(identifier)
        .ok_or_else(|| CliError::DeviceNotFound {
            identifier: identifier.into(),
        })
}
