// ── Access point tracker ──
//
// Wi-Fi access points mirror daemon objects. Wired and Bluetooth devices get
// one synthetic access point each, standing for the cable or the paired
// peer. Within one device, access points sharing a (name, security) pair
// form a group whose strongest member is flagged `best`.

use std::sync::Arc;

use csk_bus::{MethodCall, Reply, Signal};
use tracing::{debug, trace};

use super::props::{Props, decode_ssid};
use super::{AccessPointEntry, Purpose, SubscriptionOwner, Tracker};
use crate::event::{AccessPointField, Event};
use crate::model::{
    AccessPoint, ConnectionStatus, DeviceKind, ETHERNET_AP_NAME, MacAddress, ObjectPath, Security,
    icon,
};
use crate::nm;
use crate::store::{AccessPointHandle, AccessPointId, DeviceId, Node};

type GroupKey = (String, Security);

fn owned_key(ap: &AccessPoint) -> Option<GroupKey> {
    ap.group_key().map(|(name, security)| (name.to_owned(), security))
}

impl Tracker {
    // ── Creation ─────────────────────────────────────────────────────

    pub(super) fn add_wifi_access_point(&mut self, device: DeviceId, path: ObjectPath) {
        if self.access_points.key_by_path(&path).is_some() {
            trace!(%path, "access point already tracked");
            return;
        }
        let Some(cancel) = self.devices.get(device).map(|d| d.cancel.child_token()) else {
            return;
        };
        let Some(filter) = self.object_filter(&path) else {
            return;
        };

        let node = Node::new(AccessPoint::new(device, DeviceKind::Wifi, Some(path.clone())));
        let id = self
            .access_points
            .insert_with(Some(path.clone()), |_| AccessPointEntry {
                node,
                device,
                cancel: cancel.clone(),
                subscription: None,
                security_flags: [0; 3],
                ready: false,
            });
        if let Some(entry) = self.devices.get_mut(device) {
            entry.access_points.push(id);
        }
        debug!(%path, access_point = %id, "tracking access point");

        let subscription = self.subscribe(filter, SubscriptionOwner::AccessPoint(id));
        if let Some(entry) = self.access_points.get_mut(id) {
            entry.subscription = Some(subscription);
        }
        let call = MethodCall::get_all_properties(
            &self.config.daemon_name,
            path.as_str(),
            nm::ACCESS_POINT_INTERFACE,
        );
        self.call(call, cancel, Purpose::AccessPointProperties { access_point: id });
    }

    /// Synthetic access points have nothing to fetch and are ready at once.
    pub(super) fn add_synthetic_access_point(&mut self, device: DeviceId, name: Option<String>) {
        let Some(entry) = self.devices.get(device) else {
            return;
        };
        let cancel = entry.cancel.child_token();
        let kind = entry.node.load().kind;

        let mut ap = AccessPoint::new(device, kind, None);
        ap.name = name;
        ap.strength = 100;
        ap.icon = icon::access_point(kind, ap.status, ap.strength);
        let node = Node::new(ap);
        let id = self.access_points.insert_with(None, |_| AccessPointEntry {
            node,
            device,
            cancel,
            subscription: None,
            security_flags: [0; 3],
            ready: false,
        });
        if let Some(entry) = self.devices.get_mut(device) {
            entry.access_points.push(id);
        }
        debug!(device = %device, access_point = %id, "synthetic access point");
        self.set_access_point_ready(id);
    }

    pub(super) fn rename_synthetic_access_point(&mut self, device: DeviceId, name: &str) {
        let Some(ap) = self.devices.get(device).and_then(|d| d.access_points.first().copied())
        else {
            return;
        };
        let name = (!name.is_empty()).then(|| name.to_owned());
        self.update_access_point_grouped(ap, |a| a.name = name);
    }

    // ── Properties ───────────────────────────────────────────────────

    pub(super) fn on_access_point_properties(&mut self, id: AccessPointId, reply: &Reply) {
        let Some(entry) = self.access_points.get(id) else {
            return;
        };
        let origin = entry
            .node
            .load()
            .path
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        let Some(props) = Props::from_reply(reply, &origin) else {
            return;
        };
        self.apply_access_point_properties(id, &props);
        self.set_access_point_ready(id);
    }

    pub(super) fn handle_access_point_signal(&mut self, id: AccessPointId, signal: &Signal) {
        let Some(entry) = self.access_points.get(id) else {
            return;
        };
        let on_path = entry
            .node
            .load()
            .path
            .as_ref()
            .is_some_and(|p| p.as_str() == signal.path);
        if !on_path {
            return;
        }
        let Some((interface, props)) = Props::from_signal(signal) else {
            return;
        };
        if interface == nm::ACCESS_POINT_INTERFACE {
            self.apply_access_point_properties(id, &props);
        }
    }

    fn apply_access_point_properties(&mut self, id: AccessPointId, props: &Props<'_>) {
        let Some(entry) = self.access_points.get_mut(id) else {
            return;
        };

        let name = props.bytes("Ssid").map(|ssid| decode_ssid(&ssid));
        let strength = props
            .u64("Strength")
            .map(|s| u8::try_from(s.min(100)).unwrap_or(100));
        let mac = props.str("HwAddress").map(MacAddress::parse_daemon);

        let mut flags_changed = false;
        for (slot, key) in ["Flags", "WpaFlags", "RsnFlags"].into_iter().enumerate() {
            if let Some(value) = props.u64(key) {
                entry.security_flags[slot] = value;
                flags_changed = true;
            }
        }
        let [flags, wpa, rsn] = entry.security_flags;
        let security = flags_changed.then(|| nm::security(flags, wpa, rsn));

        self.update_access_point_grouped(id, |ap| {
            if let Some(name) = name {
                ap.name = name;
            }
            if let Some(strength) = strength {
                ap.strength = strength;
            }
            if let Some(mac) = mac {
                ap.remote_mac = mac;
            }
            if let Some(security) = security {
                ap.security = security;
            }
        });
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    fn set_access_point_ready(&mut self, id: AccessPointId) {
        let Some(entry) = self.access_points.get(id) else {
            return;
        };
        if entry.ready {
            return;
        }
        let device = entry.device;
        let key = owned_key(&entry.node.load());

        // Derived flags settle while the entry is still unexposed.
        let Some(device_entry) = self.devices.get_mut(device) else {
            return;
        };
        device_entry.ready_access_points.push(id);
        self.regroup(device, key.as_ref());
        self.refresh_active(device);

        let Some(entry) = self.access_points.get_mut(id) else {
            return;
        };
        entry.ready = true;
        entry.node.update(|a| a.ready = true);
        let handle = AccessPointHandle::new(id, Arc::clone(&entry.node));

        let Some(device_entry) = self.devices.get_mut(device) else {
            return;
        };
        device_entry
            .node
            .update(|d| d.access_points.push(handle.clone()));

        if device_entry.exposed() {
            if let Some(device) = self.device(device) {
                self.emit(&Event::AccessPointAdded {
                    device,
                    access_point: handle,
                });
            }
        } else {
            self.check_device_ready(device);
        }
    }

    pub(super) fn teardown_access_point(&mut self, id: AccessPointId, notify: bool) {
        let Some(entry) = self.access_points.get(id) else {
            return;
        };
        let device = entry.device;
        let handle = AccessPointHandle::new(id, Arc::clone(&entry.node));
        let snapshot = entry.node.load();
        let key = owned_key(&snapshot);
        // Announced access points of announced devices get a removal even
        // while the device itself is going away.
        let announced = entry.ready && self.devices.get(device).is_some_and(|d| d.ready);

        if notify && announced {
            if let Some(device) = self.device(device) {
                self.emit(&Event::AccessPointRemoved {
                    device,
                    access_point: handle.clone(),
                });
            }
        }

        let mut was_active = false;
        if let Some(device_entry) = self.devices.get_mut(device) {
            device_entry.access_points.retain(|a| *a != id);
            device_entry.ready_access_points.retain(|a| *a != id);
            if device_entry.active == Some(id) {
                device_entry.active = None;
                was_active = true;
            }
            device_entry
                .node
                .update(|d| d.access_points.retain(|h| h.id() != id));
        }
        if was_active {
            self.update_device(device, |d| d.active_access_point = None);
        }

        if let Some(entry) = self.access_points.remove(id) {
            entry.cancel.cancel();
            if let Some(subscription) = entry.subscription {
                self.unsubscribe(subscription);
            }
        }
        trace!(access_point = %id, path = ?snapshot.path, "access point removed");
        handle.node().update(|a| a.device = None);
        handle.node().kill();

        self.regroup(device, key.as_ref());
    }

    /// Wired carrier gained: one synthetic access point. Lost: none.
    pub(super) fn apply_carrier(&mut self, device: DeviceId, carrier: bool) {
        let Some(entry) = self.devices.get(device) else {
            return;
        };
        let existing = entry.access_points.clone();
        if carrier && existing.is_empty() {
            self.add_synthetic_access_point(device, Some(ETHERNET_AP_NAME.to_owned()));
        } else if !carrier && !existing.is_empty() {
            for ap in existing {
                self.teardown_access_point(ap, true);
            }
            self.refresh_active(device);
            self.check_device_ready(device);
        }
    }

    // ── Derived state ────────────────────────────────────────────────

    /// Update an access point and keep group membership consistent when the
    /// name or security changes.
    fn update_access_point_grouped(
        &mut self,
        id: AccessPointId,
        f: impl FnOnce(&mut AccessPoint),
    ) {
        let Some(entry) = self.access_points.get(id) else {
            return;
        };
        let device = entry.device;
        let ready = entry.ready;

        let Some((before, after)) = self.update_access_point(id, f) else {
            return;
        };
        if !ready {
            return;
        }
        let old_key = owned_key(&before);
        let new_key = owned_key(&after);
        if old_key == new_key {
            if before.strength != after.strength {
                self.regroup(device, new_key.as_ref());
            }
            return;
        }
        if after.best {
            self.update_access_point(id, |a| a.best = false);
        }
        self.regroup(device, old_key.as_ref());
        self.regroup(device, new_key.as_ref());
    }

    /// Copy-on-write access point update. Re-derives the icon, notifies the
    /// fields that changed when exposed, and refreshes the device icon when
    /// this is the active access point.
    fn update_access_point(
        &mut self,
        id: AccessPointId,
        f: impl FnOnce(&mut AccessPoint),
    ) -> Option<(Arc<AccessPoint>, Arc<AccessPoint>)> {
        let entry = self.access_points.get(id)?;
        let node = Arc::clone(&entry.node);
        let device = entry.device;
        let device_entry = self.devices.get(device);
        let exposed = entry.ready && device_entry.is_some_and(|d| d.exposed());
        let active = device_entry.is_some_and(|d| d.active == Some(id));

        let before = node.update(|ap| {
            f(ap);
            ap.icon = icon::access_point(ap.kind, ap.status, ap.strength);
        });
        let after = node.load();

        if exposed {
            let handle = AccessPointHandle::new(id, Arc::clone(&node));
            for field in access_point_changes(&before, &after) {
                self.emit(&Event::AccessPointChanged {
                    access_point: handle.clone(),
                    field,
                });
            }
        }
        if active && before.icon != after.icon {
            self.update_device(device, |_| {});
        }
        Some((before, after))
    }

    /// Re-elect the best member of one group. The incumbent keeps the flag
    /// unless another member is strictly stronger; without an incumbent the
    /// first strongest member in readiness order wins.
    fn regroup(&mut self, device: DeviceId, key: Option<&GroupKey>) {
        let Some(key) = key else {
            return;
        };
        let Some(entry) = self.devices.get(device) else {
            return;
        };

        let members: Vec<(AccessPointId, u8, bool)> = entry
            .ready_access_points
            .iter()
            .filter_map(|id| {
                let ap = self.access_points.get(*id)?.node.load();
                let matches = ap
                    .group_key()
                    .is_some_and(|(name, security)| name == key.0 && security == key.1);
                matches.then_some((*id, ap.strength, ap.best))
            })
            .collect();
        let Some(strongest) = members.iter().map(|(_, strength, _)| *strength).max() else {
            return;
        };

        let incumbent = members.iter().find(|(_, _, best)| *best);
        let winner = match incumbent {
            Some((id, strength, _)) if *strength >= strongest => *id,
            _ => match members.iter().find(|(_, strength, _)| *strength == strongest) {
                Some((id, _, _)) => *id,
                None => return,
            },
        };

        for (id, _, best) in members {
            let should = id == winner;
            if best != should {
                self.update_access_point(id, |a| a.best = should);
            }
        }
    }

    /// Re-derive which access point is active and sync its status with the
    /// device's.
    pub(super) fn refresh_active(&mut self, device: DeviceId) {
        let Some(entry) = self.devices.get(device) else {
            return;
        };
        let snapshot = entry.node.load();
        let status = snapshot.status;

        let next = match snapshot.kind {
            DeviceKind::Wifi => entry
                .active_path
                .as_ref()
                .and_then(|path| self.access_points.key_by_path(path))
                .filter(|id| entry.ready_access_points.contains(id)),
            DeviceKind::Wired | DeviceKind::Bluetooth if status.is_active() => {
                entry.ready_access_points.first().copied()
            }
            _ => None,
        };
        let previous = entry.active;

        if previous != next {
            if let Some(entry) = self.devices.get_mut(device) {
                entry.active = next;
            }
            if let Some(old) = previous {
                self.update_access_point(old, |a| {
                    a.active = false;
                    a.status = ConnectionStatus::Disconnected;
                });
            }
            let handle = next.and_then(|id| self.access_point(id));
            self.update_device(device, |d| d.active_access_point = handle);
        }
        if let Some(current) = next {
            self.update_access_point(current, |a| {
                a.active = true;
                a.status = status;
            });
        }
    }
}

fn access_point_changes(before: &AccessPoint, after: &AccessPoint) -> Vec<AccessPointField> {
    let mut fields = Vec::new();
    if before.name != after.name {
        fields.push(AccessPointField::Name);
    }
    if before.remote_mac != after.remote_mac {
        fields.push(AccessPointField::Mac);
    }
    if before.strength != after.strength {
        fields.push(AccessPointField::Strength);
    }
    if before.security != after.security {
        fields.push(AccessPointField::Security);
    }
    if before.status != after.status {
        fields.push(AccessPointField::Status);
    }
    if before.best != after.best {
        fields.push(AccessPointField::Best);
    }
    if before.active != after.active {
        fields.push(AccessPointField::Active);
    }
    if before.icon != after.icon {
        fields.push(AccessPointField::Icon);
    }
    fields
}
