//! `watch`: stream change events until interrupted.

use futures_util::StreamExt;
use owo_colors::OwoColorize;
use serde::Serialize;

use csk_network::{
    AccessPointField, AccessPointHandle, Controller, DeviceField, DeviceHandle, Event,
    ManagerField,
};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::config::Settings;
use crate::error::CliError;
use crate::output;

// ── Event lines ─────────────────────────────────────────────────────

/// One printable event.
#[derive(Debug, Serialize)]
struct EventLine {
    time: String,
    kind: &'static str,
    subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
}

fn device_label(device: &DeviceHandle) -> String {
    device.get().display_name()
}

fn access_point_label(ap: &AccessPointHandle) -> String {
    ap.get().name.clone().unwrap_or_else(|| "(hidden)".into())
}

fn device_value(device: &DeviceHandle, field: DeviceField) -> String {
    let d = device.get();
    match field {
        DeviceField::Name => d.display_name(),
        DeviceField::Mac => output::cell(d.mac.as_ref()),
        DeviceField::Status => d.status.to_string(),
        DeviceField::Icon => d.icon.to_owned(),
        DeviceField::ActiveAccessPoint => {
            output::cell(d.active_access_point.as_ref().map(access_point_label))
        }
    }
}

fn access_point_value(ap: &AccessPointHandle, field: AccessPointField) -> String {
    let a = ap.get();
    match field {
        AccessPointField::Name => access_point_label(ap),
        AccessPointField::Mac => output::cell(a.remote_mac.as_ref()),
        AccessPointField::Strength => format!("{}%", a.strength),
        AccessPointField::Security => a.security.to_string(),
        AccessPointField::Status => a.status.to_string(),
        AccessPointField::Best => a.best.to_string(),
        AccessPointField::Active => a.active.to_string(),
        AccessPointField::Icon => a.icon.to_owned(),
    }
}

fn manager_value(controller: &Controller, field: ManagerField) -> String {
    let manager = controller.manager();
    match field {
        ManagerField::Daemon => output::cell(manager.daemon_owner.as_deref()),
        ManagerField::PrimaryDevice => output::cell(manager.primary_device.as_ref().map(device_label)),
        ManagerField::Icon => manager.icon.to_owned(),
    }
}

fn describe(controller: &Controller, event: &Event) -> EventLine {
    let (subject, field, value) = match event {
        Event::DeviceAdded(d) | Event::DeviceRemoved(d) | Event::DeviceWithdrawn(d) => {
            (device_label(d), None, None)
        }
        Event::AccessPointAdded {
            device,
            access_point,
        }
        | Event::AccessPointRemoved {
            device,
            access_point,
        } => (
            format!("{}: {}", device_label(device), access_point_label(access_point)),
            None,
            None,
        ),
        Event::ManagerChanged(field) => (
            "manager".to_owned(),
            Some(field.to_string()),
            Some(manager_value(controller, *field)),
        ),
        Event::DeviceChanged { device, field } => (
            device_label(device),
            Some(field.to_string()),
            Some(device_value(device, *field)),
        ),
        Event::AccessPointChanged {
            access_point,
            field,
        } => (
            access_point_label(access_point),
            Some(field.to_string()),
            Some(access_point_value(access_point, *field)),
        ),
    };
    EventLine {
        time: chrono::Local::now().format("%H:%M:%S").to_string(),
        kind: event.kind(),
        subject,
        field,
        value,
    }
}

fn paint_kind(kind: &'static str, color: bool) -> String {
    if !color {
        return kind.to_owned();
    }
    if kind.ends_with("-added") {
        kind.green().to_string()
    } else if kind.ends_with("-removed") {
        kind.red().to_string()
    } else if kind.ends_with("-withdrawn") {
        kind.magenta().to_string()
    } else if kind.starts_with("manager") {
        kind.cyan().to_string()
    } else {
        kind.yellow().to_string()
    }
}

fn render(line: &EventLine, format: OutputFormat, color: bool) -> Result<String, CliError> {
    let rendered = match format {
        OutputFormat::Json | OutputFormat::JsonCompact => serde_json::to_string(line)?,
        OutputFormat::Plain => line.kind.to_owned(),
        OutputFormat::Table => {
            let time = if color {
                line.time.dimmed().to_string()
            } else {
                line.time.clone()
            };
            let mut text = format!("{time} {:<16} {}", paint_kind(line.kind, color), line.subject);
            if let (Some(field), Some(value)) = (&line.field, &line.value) {
                text.push_str(&format!(" {field}={value}"));
            }
            text
        }
    };
    Ok(rendered)
}

/// Whether `event` concerns `device`, directly or through one of its
/// access points.
fn concerns(event: &Event, device: &DeviceHandle) -> bool {
    if event.device() == Some(device) {
        return true;
    }
    event
        .access_point()
        .is_some_and(|ap| ap.get().device == Some(device.id()))
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    controller: &Controller,
    args: &WatchArgs,
    settings: &Settings,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let color = output::should_color(global.color);
    let mut events = Box::pin(controller.event_stream());

    let device = match &args.device {
        Some(identifier) => {
            super::settle(controller, settings.settle).await?;
            Some(super::find_device(controller, identifier)?)
        }
        None => None,
    };

    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            _ = &mut interrupted => break,
            event = events.next() => {
                let Some(event) = event else {
                    return Err(CliError::TrackerStopped);
                };
                if device.as_ref().is_some_and(|d| !concerns(&event, d)) {
                    continue;
                }
                let line = describe(controller, &event);
                output::print_output(&render(&line, settings.output, color)?, global.quiet);
            }
        }
    }
    Ok(())
}
