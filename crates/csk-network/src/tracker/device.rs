// ── Device registry and type resolver ──
//
// A device moves through `Stage`s as its fetches complete:
// generic properties → variant → (Wi-Fi) access point enumeration →
// settled. It becomes ready once settled and every known access point is
// ready. A type change resets it to the start.

use std::sync::Arc;

use csk_bus::{CallArg, MethodCall, PROPERTIES_INTERFACE, Reply, Signal};
use tracing::{debug, warn};

use super::props::{self, Props};
use super::{DeviceEntry, Purpose, Stage, SubscriptionOwner, Tracker};
use crate::event::{DeviceField, Event};
use crate::model::{ConnectionStatus, Device, DeviceKind, MacAddress, ObjectPath, icon};
use crate::nm;
use crate::store::{AccessPointHandle, DeviceHandle, DeviceId};

impl Tracker {
    // ── Registry ─────────────────────────────────────────────────────

    /// Start tracking the device at `path`, or return the existing entry.
    /// Enumeration and `DeviceAdded` race; both land here.
    pub(super) fn upsert_device(&mut self, path: ObjectPath) -> Option<DeviceId> {
        if let Some(id) = self.devices.key_by_path(&path) {
            debug!(%path, "device already tracked");
            return Some(id);
        }
        let cancel = self.session.as_ref()?.cancel.child_token();

        let id = self
            .devices
            .insert_with(Some(path.clone()), |_| DeviceEntry::new(path.clone(), cancel));
        self.known.push(id);
        debug!(%path, device = %id, "tracking device");

        self.fetch_device_properties(id);
        self.sync_manager();
        Some(id)
    }

    /// Stop tracking the device at `path`. Unknown paths are ignored:
    /// not every daemon device is tracked.
    pub(super) fn remove_device(&mut self, path: &ObjectPath) {
        let Some(id) = self.devices.key_by_path(path) else {
            debug!(%path, "removal for untracked device");
            return;
        };
        self.teardown_device(id, true);
    }

    /// Drop every device at once. Siblings are not renamed on the way out.
    pub(super) fn remove_all_devices(&mut self, notify: bool) {
        let ids = self.known.clone();
        for id in &ids {
            if let Some(entry) = self.devices.get_mut(*id) {
                entry.tearing_down = true;
            }
        }
        for id in ids {
            self.teardown_device(id, notify);
        }
    }

    fn teardown_device(&mut self, id: DeviceId, notify: bool) {
        let Some(entry) = self.devices.get_mut(id) else {
            return;
        };
        entry.tearing_down = true;
        let announced = entry.ready;
        let access_points = entry.access_points.clone();
        let subscription = entry.subscription.take();
        let kind = entry.node.load().kind;
        let handle = DeviceHandle::new(id, Arc::clone(&entry.node));
        debug!(path = %entry.path, "removing device");

        for ap in access_points {
            self.teardown_access_point(ap, notify);
        }
        if let Some(entry) = self.devices.get(id) {
            entry.cancel.cancel();
        }
        if let Some(subscription) = subscription {
            self.unsubscribe(subscription);
        }

        self.known.retain(|d| *d != id);
        self.ready.retain(|d| *d != id);
        if self.primary == Some(id) {
            self.primary = None;
        }
        self.sync_manager();

        if notify && announced {
            self.emit(&Event::DeviceRemoved(handle.clone()));
        }

        handle.node().update(|d| d.attached = false);
        handle.node().kill();
        self.devices.remove(id);
        if self.session.is_some() {
            self.recompute_names(kind);
        }
    }

    /// A device reported a different type: discard everything derived from
    /// the old one and start over.
    fn reset_device_type(&mut self, id: DeviceId) {
        let Some(entry) = self.devices.get(id) else {
            return;
        };
        let was_ready = entry.ready;
        let access_points = entry.access_points.clone();
        let old_kind = entry.node.load().kind;
        let handle = DeviceHandle::new(id, Arc::clone(&entry.node));
        debug!(path = %entry.path, %old_kind, "device type changed, resetting");

        self.set_tearing_down(id, true);
        for ap in access_points {
            self.teardown_access_point(ap, true);
        }
        self.set_tearing_down(id, false);

        let Some(session_cancel) = self.session.as_ref().map(|s| s.cancel.clone()) else {
            return;
        };
        let Some(entry) = self.devices.get_mut(id) else {
            return;
        };
        entry.cancel.cancel();
        entry.cancel = session_cancel.child_token();
        entry.epoch = entry.epoch.wrapping_add(1);
        entry.stage = Stage::Properties;
        entry.raw_type = None;
        entry.active_path = None;
        entry.active = None;
        entry.ready = false;
        entry.node.update(|d| {
            d.kind = DeviceKind::Unknown;
            d.name = None;
            d.ready = false;
            d.access_points.clear();
            d.active_access_point = None;
            d.icon = icon::OFFLINE;
        });

        self.ready.retain(|d| *d != id);
        if self.primary == Some(id) {
            self.primary = None;
        }
        self.sync_manager();
        if was_ready {
            self.emit(&Event::DeviceWithdrawn(handle));
        }

        self.recompute_names(old_kind);
        self.fetch_device_properties(id);
    }

    /// Flip a device to ready if it is settled and every known access point
    /// is ready. Re-evaluated after every access point transition.
    pub(super) fn check_device_ready(&mut self, id: DeviceId) {
        let Some(entry) = self.devices.get_mut(id) else {
            return;
        };
        if entry.ready || entry.tearing_down || entry.stage != Stage::Settled {
            return;
        }
        if entry.ready_access_points.len() < entry.access_points.len() {
            return;
        }

        entry.ready = true;
        entry.node.update(|d| d.ready = true);
        let handle = DeviceHandle::new(id, Arc::clone(&entry.node));
        debug!(path = %entry.path, "device ready");

        self.ready.push(id);
        self.sync_manager();
        self.emit(&Event::DeviceAdded(handle));
        self.resolve_primary();
    }

    // ── Fetch sequence ───────────────────────────────────────────────

    fn fetch_device_properties(&mut self, id: DeviceId) {
        let Some(entry) = self.devices.get(id) else {
            return;
        };
        let call = MethodCall::get_all_properties(
            &self.config.daemon_name,
            entry.path.as_str(),
            nm::DEVICE_INTERFACE,
        );
        let purpose = Purpose::DeviceProperties {
            device: id,
            epoch: entry.epoch,
        };
        let cancel = entry.cancel.clone();
        self.call(call, cancel, purpose);
    }

    pub(super) fn on_device_properties(&mut self, id: DeviceId, epoch: u32, reply: &Reply) {
        let Some(entry) = self.devices.get(id) else {
            return;
        };
        if entry.epoch != epoch {
            return;
        }
        let origin = entry.path.to_string();
        let Some(props) = Props::from_reply(reply, &origin) else {
            self.fail_device(id);
            return;
        };

        let interface = props.str("Interface").map(str::to_owned);
        let status = props.u64("State").map(nm::connection_status);
        let mac = props.str("HwAddress").and_then(MacAddress::parse_daemon);
        let Some(raw_type) = props.u64("DeviceType") else {
            warn!(path = %origin, "device reported no type");
            self.fail_device(id);
            return;
        };
        let kind = nm::device_kind(raw_type);

        if let Some(entry) = self.devices.get_mut(id) {
            entry.raw_type = Some(raw_type);
        }
        self.update_device(id, |d| {
            d.interface = interface;
            d.kind = kind;
            if let Some(status) = status {
                d.status = status;
            }
            if mac.is_some() {
                d.mac = mac;
            }
        });
        self.recompute_names(kind);

        let Some(interface) = nm::kind_interface(kind) else {
            debug!(path = %origin, raw_type, "unsupported device type");
            if let Some(entry) = self.devices.get_mut(id) {
                entry.stage = Stage::Unsupported;
            }
            return;
        };

        self.ensure_device_subscription(id);
        let Some(entry) = self.devices.get_mut(id) else {
            return;
        };
        entry.stage = Stage::Variant;
        let call =
            MethodCall::get_all_properties(&self.config.daemon_name, entry.path.as_str(), interface);
        let purpose = Purpose::VariantProperties {
            device: id,
            epoch,
            kind,
        };
        let cancel = entry.cancel.clone();
        self.call(call, cancel, purpose);
    }

    pub(super) fn on_variant_properties(
        &mut self,
        id: DeviceId,
        epoch: u32,
        kind: DeviceKind,
        reply: &Reply,
    ) {
        let Some(entry) = self.devices.get(id) else {
            return;
        };
        if entry.epoch != epoch {
            return;
        }
        let origin = entry.path.to_string();
        let Some(props) = Props::from_reply(reply, &origin) else {
            self.fail_device(id);
            return;
        };

        if let Some(mac) = props.str("HwAddress").and_then(MacAddress::parse_daemon) {
            self.update_device(id, |d| d.mac = Some(mac));
        }

        match kind {
            DeviceKind::Wired => {
                let carrier = props.bool("Carrier").unwrap_or(false);
                self.set_stage(id, Stage::Settled);
                self.apply_carrier(id, carrier);
            }
            DeviceKind::Wifi => {
                let active = props.str("ActiveAccessPoint").and_then(ObjectPath::parse_ref);
                let Some(entry) = self.devices.get_mut(id) else {
                    return;
                };
                entry.active_path = active;
                entry.stage = Stage::Enumerating;
                let call = MethodCall::new(
                    &self.config.daemon_name,
                    entry.path.as_str(),
                    nm::WIRELESS_INTERFACE,
                    "GetAllAccessPoints",
                );
                let purpose = Purpose::AccessPointList { device: id, epoch };
                let cancel = entry.cancel.clone();
                self.call(call, cancel, purpose);
            }
            DeviceKind::Bluetooth => {
                let name = props.str("Name").map(str::to_owned);
                self.set_stage(id, Stage::Settled);
                self.add_synthetic_access_point(id, name);
            }
            DeviceKind::Unknown => {}
        }

        self.refresh_active(id);
        self.check_device_ready(id);
    }

    pub(super) fn on_access_point_list(&mut self, id: DeviceId, epoch: u32, reply: &Reply) {
        let Some(entry) = self.devices.get(id) else {
            return;
        };
        if entry.epoch != epoch {
            return;
        }
        let origin = entry.path.to_string();
        let Some(paths) = props::object_path_list(reply, &origin) else {
            self.fail_device(id);
            return;
        };
        debug!(path = %origin, count = paths.len(), "enumerated access points");

        self.set_stage(id, Stage::Settled);
        for path in paths {
            self.add_wifi_access_point(id, path);
        }
        self.refresh_active(id);
        self.check_device_ready(id);
    }

    fn ensure_device_subscription(&mut self, id: DeviceId) {
        let Some(entry) = self.devices.get(id) else {
            return;
        };
        if entry.subscription.is_some() {
            return;
        }
        let Some(filter) = self.object_filter(&entry.path) else {
            return;
        };
        let subscription = self.subscribe(filter, SubscriptionOwner::Device(id));
        if let Some(entry) = self.devices.get_mut(id) {
            entry.subscription = Some(subscription);
        }
    }

    fn set_tearing_down(&mut self, id: DeviceId, tearing_down: bool) {
        if let Some(entry) = self.devices.get_mut(id) {
            entry.tearing_down = tearing_down;
        }
    }

    fn set_stage(&mut self, id: DeviceId, stage: Stage) {
        if let Some(entry) = self.devices.get_mut(id) {
            entry.stage = stage;
        }
    }

    fn fail_device(&mut self, id: DeviceId) {
        if let Some(entry) = self.devices.get_mut(id) {
            warn!(path = %entry.path, "abandoning device initialization");
            entry.stage = Stage::Failed;
        }
    }

    // ── Live updates ─────────────────────────────────────────────────

    pub(super) fn handle_device_signal(&mut self, id: DeviceId, signal: &Signal) {
        let Some(entry) = self.devices.get(id) else {
            return;
        };
        if signal.path != entry.path.as_str() {
            return;
        }
        let kind = entry.node.load().kind;
        let raw_type = entry.raw_type;

        if signal.member == "PropertiesChanged" {
            let Some((interface, props)) = Props::from_signal(signal) else {
                return;
            };
            match interface {
                nm::DEVICE_INTERFACE => {
                    let retyped = props
                        .u64("DeviceType")
                        .is_some_and(|new_type| raw_type.is_some_and(|old| old != new_type));
                    if retyped {
                        self.reset_device_type(id);
                        return;
                    }
                    if let Some(state) = props.u64("State") {
                        self.set_device_status(id, nm::connection_status(state));
                    }
                    if let Some(name) = props.str("Interface") {
                        let name = name.to_owned();
                        self.update_device(id, |d| d.interface = Some(name));
                        self.recompute_names(kind);
                    }
                    if let Some(mac) = props.str("HwAddress").and_then(MacAddress::parse_daemon) {
                        self.update_device(id, |d| d.mac = Some(mac));
                    }
                }
                nm::WIRED_INTERFACE if kind == DeviceKind::Wired => {
                    if let Some(carrier) = props.bool("Carrier") {
                        self.apply_carrier(id, carrier);
                    }
                    if let Some(mac) = props.str("HwAddress").and_then(MacAddress::parse_daemon) {
                        self.update_device(id, |d| d.mac = Some(mac));
                    }
                }
                nm::WIRELESS_INTERFACE if kind == DeviceKind::Wifi => {
                    if let Some(raw) = props.str("ActiveAccessPoint") {
                        let active = ObjectPath::parse_ref(raw);
                        if let Some(entry) = self.devices.get_mut(id) {
                            entry.active_path = active;
                        }
                        self.refresh_active(id);
                    }
                    if let Some(mac) = props.str("HwAddress").and_then(MacAddress::parse_daemon) {
                        self.update_device(id, |d| d.mac = Some(mac));
                    }
                }
                nm::BLUETOOTH_INTERFACE if kind == DeviceKind::Bluetooth => {
                    if let Some(name) = props.str("Name") {
                        self.rename_synthetic_access_point(id, name);
                    }
                    if let Some(mac) = props.str("HwAddress").and_then(MacAddress::parse_daemon) {
                        self.update_device(id, |d| d.mac = Some(mac));
                    }
                }
                _ => {}
            }
            return;
        }

        match (signal.interface.as_str(), signal.member.as_str()) {
            (nm::DEVICE_INTERFACE, "StateChanged") => {
                if let Some(state) = signal.arg(0).and_then(serde_json::Value::as_u64) {
                    self.set_device_status(id, nm::connection_status(state));
                }
            }
            (nm::WIRELESS_INTERFACE, "AccessPointAdded") if kind == DeviceKind::Wifi => {
                if let Some(path) = signal.str_arg(0).and_then(ObjectPath::parse_ref) {
                    self.add_wifi_access_point(id, path);
                }
            }
            (nm::WIRELESS_INTERFACE, "AccessPointRemoved") => {
                let Some(path) = signal.str_arg(0).and_then(ObjectPath::parse_ref) else {
                    return;
                };
                let Some(ap) = self.access_points.key_by_path(&path) else {
                    debug!(%path, "removal for untracked access point");
                    return;
                };
                if self.access_points.get(ap).is_some_and(|a| a.device == id) {
                    self.teardown_access_point(ap, true);
                    self.check_device_ready(id);
                }
            }
            (interface, member) if interface != PROPERTIES_INTERFACE => {
                debug!(interface, member, "ignoring device signal");
            }
            _ => {}
        }
    }

    fn set_device_status(&mut self, id: DeviceId, status: ConnectionStatus) {
        self.update_device(id, |d| d.status = status);
        self.refresh_active(id);
    }

    // ── Derived state ────────────────────────────────────────────────

    /// Recompute display names for every device of `kind`. Two or more
    /// siblings get the interface appended.
    pub(super) fn recompute_names(&mut self, kind: DeviceKind) {
        let Some(label) = kind.label() else {
            return;
        };
        let siblings: Vec<DeviceId> = self
            .known
            .iter()
            .copied()
            .filter(|id| {
                self.devices
                    .get(*id)
                    .is_some_and(|entry| entry.node.load().kind == kind)
            })
            .collect();
        let shared = siblings.len() >= 2;

        for id in siblings {
            self.update_device(id, |d| {
                d.name = Some(if shared {
                    format!("{label} ({})", d.interface.as_deref().unwrap_or("unknown"))
                } else {
                    label.to_owned()
                });
            });
        }
    }

    /// Copy-on-write device update. Re-derives the icon, then notifies the
    /// fields that changed if the device is exposed.
    pub(super) fn update_device(&mut self, id: DeviceId, f: impl FnOnce(&mut Device)) {
        let Some(entry) = self.devices.get(id) else {
            return;
        };
        let node = Arc::clone(&entry.node);
        let exposed = entry.exposed();

        let before = node.update(|d| {
            f(d);
            let active_icon = d.active_access_point.as_ref().map(|ap| ap.get().icon);
            d.icon = icon::device(d.kind, d.status, active_icon);
        });
        let after = node.load();

        if exposed {
            let handle = DeviceHandle::new(id, Arc::clone(&node));
            for field in device_changes(&before, &after) {
                self.emit(&Event::DeviceChanged {
                    device: handle.clone(),
                    field,
                });
            }
        }
        if self.primary == Some(id) && before.icon != after.icon {
            self.sync_manager();
        }
    }

    // ── Actions ──────────────────────────────────────────────────────

    /// Ask a Wi-Fi device to rescan. Fire-and-forget; returns `false` for
    /// removed or non-Wi-Fi devices.
    pub fn request_scan(&mut self, device: &DeviceHandle) -> bool {
        if !device.is_alive() {
            return false;
        }
        let Some(entry) = self.devices.get(device.id()) else {
            return false;
        };
        if entry.node.load().kind != DeviceKind::Wifi {
            debug!(path = %entry.path, "scan requested on non-Wi-Fi device");
            return false;
        }
        let call = MethodCall::new(
            &self.config.daemon_name,
            entry.path.as_str(),
            nm::WIRELESS_INTERFACE,
            "RequestScan",
        )
        .arg(CallArg::EmptyOptions);
        let cancel = entry.cancel.clone();
        self.call(call, cancel, Purpose::Action { name: "RequestScan" });
        true
    }

    /// Ask the daemon to activate the best matching connection for an
    /// access point. Synthetic access points activate their device.
    pub fn request_connect(&mut self, access_point: &AccessPointHandle) -> bool {
        if !access_point.is_alive() {
            return false;
        }
        let Some(ap) = self.access_points.get(access_point.id()) else {
            return false;
        };
        let Some(device) = self.devices.get(ap.device) else {
            return false;
        };
        let specific = access_point
            .get()
            .path
            .as_ref()
            .map_or_else(|| "/".to_owned(), ToString::to_string);
        let call = MethodCall::new(
            &self.config.daemon_name,
            nm::PATH,
            nm::MANAGER_INTERFACE,
            "ActivateConnection",
        )
        .arg(CallArg::ObjectPath("/".to_owned()))
        .arg(CallArg::ObjectPath(device.path.to_string()))
        .arg(CallArg::ObjectPath(specific));
        let cancel = ap.cancel.clone();
        self.call(
            call,
            cancel,
            Purpose::Action {
                name: "ActivateConnection",
            },
        );
        true
    }
}

fn device_changes(before: &Device, after: &Device) -> Vec<DeviceField> {
    let mut fields = Vec::new();
    if before.name != after.name {
        fields.push(DeviceField::Name);
    }
    if before.mac != after.mac {
        fields.push(DeviceField::Mac);
    }
    if before.status != after.status {
        fields.push(DeviceField::Status);
    }
    if before.active_access_point != after.active_access_point {
        fields.push(DeviceField::ActiveAccessPoint);
    }
    if before.icon != after.icon {
        fields.push(DeviceField::Icon);
    }
    fields
}
