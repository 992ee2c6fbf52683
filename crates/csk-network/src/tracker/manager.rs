// ── Daemon presence and primary device ──

use std::sync::Arc;

use csk_bus::{MethodCall, PROPERTIES_INTERFACE, Reply, Signal, SignalFilter};
use tracing::{debug, info};

use super::props::{self, Props};
use super::{Purpose, Session, SubscriptionOwner, Tracker};
use crate::event::{Event, ManagerField};
use crate::model::{Manager, ObjectPath, icon};
use crate::nm;
use crate::store::DeviceId;

impl Tracker {
    /// The daemon's bus name gained an owner.
    pub fn daemon_appeared(&mut self, owner: &str) {
        if self.daemon_owner() == Some(owner) {
            debug!(owner, "daemon owner unchanged");
            return;
        }
        if self.session.is_some() {
            // Restarted under a new owner without an observed vanish.
            self.end_session(true);
        }

        info!(owner, "network daemon appeared");
        let cancel = self.root.child_token();
        let filter = SignalFilter::new().sender(owner).path(nm::PATH);
        let subscription = self.subscribe(filter, SubscriptionOwner::Daemon);
        self.session = Some(Session {
            owner: owner.to_owned(),
            cancel: cancel.clone(),
            subscription,
        });

        let service = self.config.daemon_name.clone();
        self.call(
            MethodCall::new(&service, nm::PATH, nm::MANAGER_INTERFACE, "GetAllDevices"),
            cancel.clone(),
            Purpose::DeviceList,
        );
        self.call(
            MethodCall::get_all_properties(&service, nm::PATH, nm::MANAGER_INTERFACE),
            cancel,
            Purpose::ManagerProperties,
        );
        self.sync_manager();
    }

    /// The daemon's bus name lost its owner. Every device is removed with
    /// notifications.
    pub fn daemon_vanished(&mut self) {
        if self.session.is_none() {
            return;
        }
        info!("network daemon vanished");
        self.end_session(true);
        self.sync_manager();
    }

    pub(super) fn end_session(&mut self, notify: bool) {
        let Some(session) = self.session.take() else {
            return;
        };
        session.cancel.cancel();
        self.unsubscribe(session.subscription);
        self.remove_all_devices(notify);
        self.primary = None;
        self.pending_primary = None;
        self.primary_connection = None;
    }

    pub(super) fn handle_daemon_signal(&mut self, signal: &Signal) {
        match (signal.interface.as_str(), signal.member.as_str()) {
            (nm::MANAGER_INTERFACE, "DeviceAdded") => {
                if let Some(path) = signal.str_arg(0).and_then(ObjectPath::parse_ref) {
                    self.upsert_device(path);
                }
            }
            (nm::MANAGER_INTERFACE, "DeviceRemoved") => {
                if let Some(path) = signal.str_arg(0).and_then(ObjectPath::parse_ref) {
                    self.remove_device(&path);
                }
            }
            (PROPERTIES_INTERFACE | nm::MANAGER_INTERFACE, "PropertiesChanged") => {
                let Some((interface, props)) = Props::from_signal(signal) else {
                    return;
                };
                if interface != nm::MANAGER_INTERFACE || !props.contains("PrimaryConnection") {
                    return;
                }
                let connection = props.str("PrimaryConnection").map(ObjectPath::parse_ref);
                if let Some(connection) = connection {
                    self.on_primary_connection(connection);
                }
            }
            _ => {}
        }
    }

    pub(super) fn on_device_list(&mut self, reply: &Reply) {
        let Some(paths) = props::object_path_list(reply, nm::PATH) else {
            return;
        };
        debug!(count = paths.len(), "enumerated devices");
        for path in paths {
            self.upsert_device(path);
        }
    }

    pub(super) fn on_manager_properties(&mut self, reply: &Reply) {
        let Some(props) = Props::from_reply(reply, nm::PATH) else {
            return;
        };
        if let Some(raw) = props.str("PrimaryConnection") {
            self.on_primary_connection(ObjectPath::parse_ref(raw));
        }
    }

    // ── Primary device ───────────────────────────────────────────────

    /// The daemon's primary connection changed. Resolve it to a device path
    /// with one more fetch.
    fn on_primary_connection(&mut self, connection: Option<ObjectPath>) {
        if connection.is_some() && connection == self.primary_connection {
            return;
        }
        self.primary_connection.clone_from(&connection);

        let Some(connection) = connection else {
            debug!("no primary connection");
            self.pending_primary = None;
            self.set_primary(None);
            return;
        };
        let Some(cancel) = self.session.as_ref().map(|s| s.cancel.clone()) else {
            return;
        };
        debug!(%connection, "resolving primary connection");
        let call = MethodCall::get_all_properties(
            &self.config.daemon_name,
            connection.as_str(),
            nm::ACTIVE_CONNECTION_INTERFACE,
        );
        self.call(call, cancel, Purpose::PrimaryConnection { connection });
    }

    pub(super) fn on_primary_connection_devices(&mut self, connection: &ObjectPath, reply: &Reply) {
        if self.primary_connection.as_ref() != Some(connection) {
            debug!(%connection, "stale primary connection lookup");
            return;
        }
        let Some(props) = Props::from_reply(reply, connection.as_str()) else {
            return;
        };
        let device_path = props
            .object_paths("Devices")
            .and_then(|paths| paths.into_iter().next());
        debug!(%connection, device = ?device_path, "primary connection resolved");
        self.pending_primary = device_path;
        self.resolve_primary();
    }

    /// Match the pending primary path against the ready devices.
    pub(super) fn resolve_primary(&mut self) {
        let target = self
            .pending_primary
            .as_ref()
            .and_then(|path| self.devices.key_by_path(path))
            .filter(|id| self.ready.contains(id));
        self.set_primary(target);
    }

    fn set_primary(&mut self, device: Option<DeviceId>) {
        if self.primary != device {
            self.primary = device;
            self.sync_manager();
        }
    }

    // ── Manager snapshot ─────────────────────────────────────────────

    fn build_manager(&self) -> Manager {
        let primary_device = self.primary_device();
        let icon = primary_device
            .as_ref()
            .map_or(icon::OFFLINE, |device| device.get().icon);
        Manager {
            daemon_owner: self.daemon_owner().map(str::to_owned),
            devices: self.devices(),
            known_devices: self.known.len(),
            primary_device,
            icon,
        }
    }

    /// Publish a fresh manager snapshot without notifying anyone.
    pub(super) fn store_manager(&mut self) -> Arc<Manager> {
        let previous = self.manager.load();
        self.manager.store(self.build_manager());
        previous
    }

    /// Publish a fresh manager snapshot and notify changed fields.
    pub(super) fn sync_manager(&mut self) {
        let before = self.store_manager();
        let after = self.manager.load();

        if before.daemon_owner != after.daemon_owner {
            self.emit(&Event::ManagerChanged(ManagerField::Daemon));
        }
        if before.primary_device != after.primary_device {
            self.emit(&Event::ManagerChanged(ManagerField::PrimaryDevice));
        }
        if before.icon != after.icon {
            self.emit(&Event::ManagerChanged(ManagerField::Icon));
        }
    }
}
