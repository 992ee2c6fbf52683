#![allow(clippy::unwrap_used)]
// Drives the sans-IO `Tracker` against a scripted NetworkManager: every call
// the tracker issues is answered by hand, every signal is injected through
// the subscriptions the tracker opened.

use std::sync::{Arc, Mutex};

use csk_bus::{CallArg, MethodCall, PROPERTIES_INTERFACE, Reply, Signal, SignalFilter};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use csk_network::model::icon;
use csk_network::nm;
use csk_network::{
    AccessPointField, AccessPointHandle, ConnectionStatus, DeviceField, DeviceHandle, DeviceKind,
    Event, EventFilter, ManagerField, Request, Security, SubscriptionId, Ticket, Tracker,
    TrackerConfig,
};

const OWNER: &str = ":1.42";
const PSK: u64 = 0x188;

// ── Fake daemon ─────────────────────────────────────────────────────

struct FakeDaemon {
    tracker: Tracker,
    calls: Vec<(Ticket, MethodCall, CancellationToken)>,
    subscriptions: Vec<(SubscriptionId, SignalFilter)>,
    events: Arc<Mutex<Vec<Event>>>,
}

impl FakeDaemon {
    fn new() -> Self {
        let mut tracker = Tracker::new(TrackerConfig::default());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        tracker.observe(EventFilter::All, move |event| {
            sink.lock().unwrap().push(event.clone());
        });
        Self {
            tracker,
            calls: Vec::new(),
            subscriptions: Vec::new(),
            events,
        }
    }

    /// Daemon up, no devices, no primary connection.
    fn started() -> Self {
        let mut daemon = Self::new();
        daemon.appear(OWNER);
        daemon.reply(nm::PATH, nm::MANAGER_INTERFACE, props(json!({ "PrimaryConnection": "/" })));
        daemon.take_events();
        daemon
    }

    fn pump(&mut self) {
        while let Some(request) = self.tracker.next_request() {
            match request {
                Request::Call {
                    ticket,
                    call,
                    cancel,
                } => self.calls.push((ticket, call, cancel)),
                Request::Subscribe { id, filter } => self.subscriptions.push((id, filter)),
                Request::Unsubscribe { id } => self.subscriptions.retain(|(s, _)| *s != id),
            }
        }
    }

    fn appear(&mut self, owner: &str) {
        self.tracker.daemon_appeared(owner);
        self.pump();
    }

    fn vanish(&mut self) {
        self.tracker.daemon_vanished();
        self.pump();
    }

    // ── Calls ────────────────────────────────────────────────────────

    fn position(&self, path: &str, target: &str) -> Option<usize> {
        self.calls.iter().position(|(_, call, _)| {
            call.path == path
                && (call.method == target || call.args.first() == Some(&CallArg::Str(target.into())))
        })
    }

    fn has_call(&self, path: &str, target: &str) -> bool {
        self.position(path, target).is_some()
    }

    fn count_calls(&self, path: &str, target: &str) -> usize {
        self.calls
            .iter()
            .filter(|(_, call, _)| {
                call.path == path
                    && (call.method == target
                        || call.args.first() == Some(&CallArg::Str(target.into())))
            })
            .count()
    }

    /// Remove a pending call, addressed by object path and either method
    /// name or (for `GetAll`) property interface.
    fn take(&mut self, path: &str, target: &str) -> (Ticket, MethodCall, CancellationToken) {
        let index = self.position(path, target).unwrap_or_else(|| {
            let pending: Vec<String> = self
                .calls
                .iter()
                .map(|(_, c, _)| format!("{} {} {:?}", c.path, c.method, c.args))
                .collect();
            panic!("no pending {target} on {path}; pending: {pending:?}")
        });
        self.calls.remove(index)
    }

    fn reply(&mut self, path: &str, target: &str, body: Reply) {
        let (ticket, _, _) = self.take(path, target);
        self.tracker.complete_call(ticket, Ok(body));
        self.pump();
    }

    fn fail(&mut self, path: &str, target: &str) {
        let (ticket, _, _) = self.take(path, target);
        self.tracker.complete_call(
            ticket,
            Err(csk_bus::BusError::Method {
                name: "org.freedesktop.DBus.Error.UnknownObject".into(),
                message: path.into(),
            }),
        );
        self.pump();
    }

    // ── Signals ──────────────────────────────────────────────────────

    fn emit_from(&mut self, sender: &str, path: &str, interface: &str, member: &str, args: Vec<Value>) {
        let signal = Signal {
            sender: Some(sender.into()),
            path: path.into(),
            interface: interface.into(),
            member: member.into(),
            args,
        };
        let targets: Vec<SubscriptionId> = self
            .subscriptions
            .iter()
            .filter(|(_, filter)| filter.matches(&signal))
            .map(|(id, _)| *id)
            .collect();
        for id in targets {
            self.tracker.handle_signal(id, &signal);
            self.pump();
        }
    }

    fn emit(&mut self, path: &str, interface: &str, member: &str, args: Vec<Value>) {
        self.emit_from(OWNER, path, interface, member, args);
    }

    fn properties_changed(&mut self, path: &str, interface: &str, changed: Value) {
        self.emit(
            path,
            PROPERTIES_INTERFACE,
            "PropertiesChanged",
            vec![json!(interface), changed, json!([])],
        );
    }

    // ── Daemon script ────────────────────────────────────────────────

    fn enumerate(&mut self, paths: &[&str]) {
        self.reply(nm::PATH, "GetAllDevices", vec![json!(paths)]);
    }

    fn device_props(&mut self, path: &str, device_type: u64, interface: &str, state: u64) {
        self.reply(
            path,
            nm::DEVICE_INTERFACE,
            props(json!({
                "DeviceType": device_type,
                "Interface": interface,
                "State": state,
                "HwAddress": "AA:BB:CC:00:00:01",
            })),
        );
    }

    fn wired_props(&mut self, path: &str, carrier: bool) {
        self.reply(
            path,
            nm::WIRED_INTERFACE,
            props(json!({ "Carrier": carrier, "HwAddress": "AA:BB:CC:00:00:01" })),
        );
    }

    fn wireless_props(&mut self, path: &str, active: &str) {
        self.reply(
            path,
            nm::WIRELESS_INTERFACE,
            props(json!({ "ActiveAccessPoint": active, "HwAddress": "AA:BB:CC:00:00:02" })),
        );
    }

    fn ap_list(&mut self, path: &str, aps: &[&str]) {
        self.reply(path, "GetAllAccessPoints", vec![json!(aps)]);
    }

    fn ap_props(&mut self, path: &str, ssid: &str, strength: u8) {
        self.reply(
            path,
            nm::ACCESS_POINT_INTERFACE,
            props(json!({
                "Ssid": ssid.as_bytes(),
                "Strength": strength,
                "HwAddress": "11:22:33:44:55:66",
                "Flags": 1,
                "WpaFlags": 0,
                "RsnFlags": PSK,
            })),
        );
    }

    /// A wired device with no cable, which is ready as soon as its variant
    /// properties arrive.
    fn ready_wired(&mut self, path: &str, interface: &str) {
        self.device_props(path, 1, interface, 30);
        self.wired_props(path, false);
    }

    fn ready_wifi(&mut self, path: &str, active: &str, aps: &[(&str, &str, u8)]) {
        self.device_props(path, 2, "wlan0", 100);
        self.wireless_props(path, active);
        let paths: Vec<&str> = aps.iter().map(|(p, _, _)| *p).collect();
        self.ap_list(path, &paths);
        for (ap, ssid, strength) in aps {
            self.ap_props(ap, ssid, *strength);
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    fn device(&self, path: &str) -> DeviceHandle {
        self.tracker.device_by_path(path).unwrap()
    }

    fn ap(&self, device: &str, path: &str) -> AccessPointHandle {
        self.device(device)
            .get()
            .access_points
            .iter()
            .find(|ap| ap.get().path.as_ref().is_some_and(|p| p.as_str() == path))
            .cloned()
            .unwrap()
    }

    fn take_events(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

fn props(map: Value) -> Reply {
    vec![map]
}

fn kinds(events: &[Event]) -> Vec<&'static str> {
    events.iter().map(Event::kind).collect()
}

fn best_count(device: &DeviceHandle, name: &str) -> usize {
    device
        .get()
        .access_points
        .iter()
        .filter(|ap| {
            let ap = ap.get();
            ap.best && ap.name.as_deref() == Some(name)
        })
        .count()
}

// ── Initialization and readiness ────────────────────────────────────

#[test]
fn test_wifi_device_ready_only_after_every_ap() {
    let mut daemon = FakeDaemon::started();
    daemon.enumerate(&["/d/1"]);
    daemon.device_props("/d/1", 2, "wlan0", 100);
    daemon.wireless_props("/d/1", "/ap/2");
    daemon.ap_list("/d/1", &["/ap/1", "/ap/2"]);

    daemon.ap_props("/ap/1", "Home", 40);
    assert!(daemon.tracker.devices().is_empty());
    assert!(!daemon.device("/d/1").get().ready);
    assert!(daemon.take_events().is_empty());

    daemon.ap_props("/ap/2", "Home", 70);
    let events = daemon.take_events();
    assert_eq!(kinds(&events), vec!["device-added"]);

    let device = daemon.device("/d/1");
    assert!(device.get().ready);
    assert_eq!(device.get().name.as_deref(), Some("Wi-Fi"));
    assert_eq!(device.get().kind, DeviceKind::Wifi);
    assert_eq!(daemon.tracker.devices(), vec![device.clone()]);

    let weak = daemon.ap("/d/1", "/ap/1").get();
    let strong = daemon.ap("/d/1", "/ap/2").get();
    assert!(!weak.best);
    assert!(strong.best);
    assert_eq!(strong.security, Security::WpaPsk);
    assert_eq!(strong.name.as_deref(), Some("Home"));

    // The daemon-reported active AP is resolved once it is ready.
    let active = device.get().active_access_point.clone().unwrap();
    assert_eq!(active, daemon.ap("/d/1", "/ap/2"));
    assert!(active.get().active);
    assert_eq!(active.get().status, ConnectionStatus::Connected);
    assert_eq!(device.get().icon, icon::WIRELESS_GOOD);
}

#[test]
fn test_unsupported_device_never_becomes_ready() {
    let mut daemon = FakeDaemon::started();
    daemon.enumerate(&["/d/9"]);
    daemon.device_props("/d/9", 14, "lo", 10);

    assert!(daemon.calls.is_empty());
    assert!(daemon.tracker.devices().is_empty());
    assert_eq!(daemon.tracker.manager().known_devices, 1);
    assert_eq!(daemon.tracker.active_subscriptions(), 1);
    assert!(daemon.take_events().is_empty());
}

#[test]
fn test_failed_fetch_abandons_device_but_keeps_it_known() {
    let mut daemon = FakeDaemon::started();
    daemon.enumerate(&["/d/1"]);
    daemon.fail("/d/1", nm::DEVICE_INTERFACE);

    daemon.emit(nm::PATH, nm::MANAGER_INTERFACE, "DeviceAdded", vec![json!("/d/1")]);
    assert!(!daemon.has_call("/d/1", nm::DEVICE_INTERFACE));
    assert_eq!(daemon.tracker.manager().known_devices, 1);
    assert!(daemon.tracker.devices().is_empty());
}

#[test]
fn test_malformed_field_is_skipped() {
    let mut daemon = FakeDaemon::started();
    daemon.enumerate(&["/d/1"]);
    daemon.reply(
        "/d/1",
        nm::DEVICE_INTERFACE,
        props(json!({ "DeviceType": 1, "Interface": "eth0", "State": "activated" })),
    );
    daemon.wired_props("/d/1", false);

    let device = daemon.device("/d/1").get();
    assert!(device.ready);
    assert_eq!(device.status, ConnectionStatus::Disconnected);
}

// ── Duplicate adds ──────────────────────────────────────────────────

#[test]
fn test_enumeration_then_signal_tracks_once() {
    let mut daemon = FakeDaemon::started();
    daemon.enumerate(&["/d/1"]);
    daemon.emit(nm::PATH, nm::MANAGER_INTERFACE, "DeviceAdded", vec![json!("/d/1")]);

    assert_eq!(daemon.count_calls("/d/1", nm::DEVICE_INTERFACE), 1);
    daemon.ready_wired("/d/1", "eth0");
    assert_eq!(kinds(&daemon.take_events()), vec!["device-added"]);
    assert_eq!(daemon.tracker.known_devices().len(), 1);
}

#[test]
fn test_signal_then_enumeration_tracks_once() {
    let mut daemon = FakeDaemon::started();
    daemon.emit(nm::PATH, nm::MANAGER_INTERFACE, "DeviceAdded", vec![json!("/d/1")]);
    daemon.ready_wired("/d/1", "eth0");
    daemon.enumerate(&["/d/1"]);
    daemon.emit(nm::PATH, nm::MANAGER_INTERFACE, "DeviceAdded", vec![json!("/d/1")]);

    assert!(daemon.calls.is_empty());
    assert_eq!(kinds(&daemon.take_events()), vec!["device-added"]);
    assert_eq!(daemon.tracker.known_devices().len(), 1);
}

// ── Best of group ───────────────────────────────────────────────────

#[test]
fn test_strength_change_moves_best() {
    let mut daemon = FakeDaemon::started();
    daemon.enumerate(&["/d/1"]);
    daemon.ready_wifi("/d/1", "/", &[("/ap/1", "Home", 40), ("/ap/2", "Home", 70)]);
    daemon.take_events();

    daemon.properties_changed("/ap/1", nm::ACCESS_POINT_INTERFACE, json!({ "Strength": 90 }));

    let device = daemon.device("/d/1");
    assert!(daemon.ap("/d/1", "/ap/1").get().best);
    assert!(!daemon.ap("/d/1", "/ap/2").get().best);
    assert_eq!(best_count(&device, "Home"), 1);

    let best_flips: Vec<AccessPointField> = daemon
        .take_events()
        .into_iter()
        .filter_map(|e| match e {
            Event::AccessPointChanged { field, .. } => Some(field),
            _ => None,
        })
        .filter(|f| *f == AccessPointField::Best)
        .collect();
    assert_eq!(best_flips.len(), 2);
}

#[test]
fn test_equal_strength_keeps_previous_best() {
    let mut daemon = FakeDaemon::started();
    daemon.enumerate(&["/d/1"]);
    daemon.ready_wifi("/d/1", "/", &[("/ap/1", "Home", 40), ("/ap/2", "Home", 70)]);
    daemon.take_events();

    daemon.properties_changed("/ap/1", nm::ACCESS_POINT_INTERFACE, json!({ "Strength": 70 }));

    assert!(daemon.ap("/d/1", "/ap/2").get().best);
    assert!(!daemon.ap("/d/1", "/ap/1").get().best);
    let events = daemon.take_events();
    assert!(events.iter().all(|e| !matches!(
        e,
        Event::AccessPointChanged {
            field: AccessPointField::Best,
            ..
        }
    )));
}

#[test]
fn test_unnamed_ap_is_never_best() {
    let mut daemon = FakeDaemon::started();
    daemon.enumerate(&["/d/1"]);
    daemon.ready_wifi(
        "/d/1",
        "/",
        &[("/ap/1", "Home", 40), ("/ap/2", "", 99), ("/ap/3", "Cafe", 20)],
    );

    let hidden = daemon.ap("/d/1", "/ap/2").get();
    assert_eq!(hidden.name, None);
    assert!(!hidden.best);
    assert!(daemon.ap("/d/1", "/ap/1").get().best);
    assert!(daemon.ap("/d/1", "/ap/3").get().best);
    assert_eq!(daemon.device("/d/1").get().best_access_points().len(), 2);
}

#[test]
fn test_security_change_regroups() {
    let mut daemon = FakeDaemon::started();
    daemon.enumerate(&["/d/1"]);
    daemon.ready_wifi("/d/1", "/", &[("/ap/1", "Home", 40), ("/ap/2", "Home", 70)]);

    daemon.properties_changed(
        "/ap/2",
        nm::ACCESS_POINT_INTERFACE,
        json!({ "Flags": 0, "RsnFlags": 0 }),
    );

    let open = daemon.ap("/d/1", "/ap/2").get();
    assert_eq!(open.security, Security::None);
    assert!(open.best);
    assert!(daemon.ap("/d/1", "/ap/1").get().best);
    assert!(!open.same_network(&daemon.ap("/d/1", "/ap/1").get()));
}

#[test]
fn test_ap_removal_hands_best_to_survivor() {
    let mut daemon = FakeDaemon::started();
    daemon.enumerate(&["/d/1"]);
    daemon.ready_wifi("/d/1", "/", &[("/ap/1", "Home", 40), ("/ap/2", "Home", 70)]);
    daemon.take_events();
    let removed = daemon.ap("/d/1", "/ap/2");

    daemon.emit("/d/1", nm::WIRELESS_INTERFACE, "AccessPointRemoved", vec![json!("/ap/2")]);

    let events = daemon.take_events();
    assert_eq!(events.first().map(Event::kind), Some("ap-removed"));
    assert!(daemon.ap("/d/1", "/ap/1").get().best);
    assert!(!removed.is_alive());
    assert_eq!(removed.get().name.as_deref(), Some("Home"));
    assert_eq!(removed.get().device, None);
    assert_eq!(daemon.tracker.tracked_access_points(), 1);
}

#[test]
fn test_ap_added_after_ready_is_announced() {
    let mut daemon = FakeDaemon::started();
    daemon.enumerate(&["/d/1"]);
    daemon.ready_wifi("/d/1", "/", &[("/ap/1", "Home", 40)]);
    daemon.take_events();

    daemon.emit("/d/1", nm::WIRELESS_INTERFACE, "AccessPointAdded", vec![json!("/ap/5")]);
    daemon.emit("/d/1", nm::WIRELESS_INTERFACE, "AccessPointAdded", vec![json!("/ap/5")]);
    assert_eq!(daemon.count_calls("/ap/5", nm::ACCESS_POINT_INTERFACE), 1);
    assert!(daemon.take_events().is_empty());

    daemon.ap_props("/ap/5", "Cafe", 60);
    let events = daemon.take_events();
    assert_eq!(events.first().map(Event::kind), Some("ap-added"));
    assert_eq!(daemon.device("/d/1").get().access_points.len(), 2);
}

/// Records `(best, active, ready)` of every access point as its
/// announcement is delivered.
fn observe_announcements(daemon: &mut FakeDaemon) -> Arc<Mutex<Vec<(bool, bool, bool)>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    daemon.tracker.observe(EventFilter::All, move |event| {
        if let Event::AccessPointAdded { access_point, .. } = event {
            let ap = access_point.get();
            sink.lock().unwrap().push((ap.best, ap.active, ap.ready));
        }
    });
    seen
}

#[test]
fn test_announced_ap_already_carries_best_flag() {
    let mut daemon = FakeDaemon::started();
    daemon.enumerate(&["/d/1"]);
    daemon.ready_wifi("/d/1", "/", &[("/ap/1", "Home", 40)]);
    let seen = observe_announcements(&mut daemon);
    daemon.take_events();

    daemon.emit("/d/1", nm::WIRELESS_INTERFACE, "AccessPointAdded", vec![json!("/ap/2")]);
    daemon.ap_props("/ap/2", "Home", 70);

    assert_eq!(*seen.lock().unwrap(), vec![(true, false, true)]);
    let events = daemon.take_events();
    let new_ap = daemon.ap("/d/1", "/ap/2");
    assert!(!events.iter().any(|e| matches!(
        e,
        Event::AccessPointChanged { access_point, .. } if *access_point == new_ap
    )));
    // The previous best hands its flag over.
    assert!(events.iter().any(|e| matches!(
        e,
        Event::AccessPointChanged { field: AccessPointField::Best, .. }
    )));
    assert_eq!(best_count(&daemon.device("/d/1"), "Home"), 1);
}

// ── Wired carrier ───────────────────────────────────────────────────

#[test]
fn test_carrier_toggles_synthetic_ethernet_ap() {
    let mut daemon = FakeDaemon::started();
    daemon.enumerate(&["/d/2"]);
    daemon.ready_wired("/d/2", "eth0");
    assert_eq!(kinds(&daemon.take_events()), vec!["device-added"]);
    assert!(daemon.device("/d/2").get().access_points.is_empty());

    daemon.properties_changed("/d/2", nm::WIRED_INTERFACE, json!({ "Carrier": true }));
    let events = daemon.take_events();
    assert_eq!(events.first().map(Event::kind), Some("ap-added"));

    let device = daemon.device("/d/2").get();
    assert_eq!(device.access_points.len(), 1);
    let cable = device.access_points.first().unwrap().get();
    assert_eq!(cable.name.as_deref(), Some("ethernet"));
    assert_eq!(cable.strength, 100);
    assert_eq!(cable.path, None);

    // A repeated carrier report does not add a second one.
    daemon.properties_changed("/d/2", nm::WIRED_INTERFACE, json!({ "Carrier": true }));
    assert_eq!(daemon.device("/d/2").get().access_points.len(), 1);

    daemon.properties_changed("/d/2", nm::WIRED_INTERFACE, json!({ "Carrier": false }));
    let events = daemon.take_events();
    assert_eq!(kinds(&events), vec!["ap-removed"]);
    assert!(daemon.device("/d/2").get().access_points.is_empty());
}

#[test]
fn test_cable_on_connected_device_is_announced_active() {
    let mut daemon = FakeDaemon::started();
    daemon.enumerate(&["/d/2"]);
    daemon.device_props("/d/2", 1, "eth0", 100);
    daemon.wired_props("/d/2", false);
    let seen = observe_announcements(&mut daemon);
    assert_eq!(kinds(&daemon.take_events()), vec!["device-added"]);

    daemon.properties_changed("/d/2", nm::WIRED_INTERFACE, json!({ "Carrier": true }));

    assert_eq!(*seen.lock().unwrap(), vec![(true, true, true)]);
    let events = daemon.take_events();
    assert!(kinds(&events).contains(&"ap-added"));
    assert!(!kinds(&events).contains(&"ap-changed"));
    let device = daemon.device("/d/2").get();
    assert!(device.active_access_point.is_some());
}

#[test]
fn test_wired_link_state_drives_active_ap_and_icon() {
    let mut daemon = FakeDaemon::started();
    daemon.enumerate(&["/d/2"]);
    daemon.device_props("/d/2", 1, "eth0", 30);
    daemon.wired_props("/d/2", true);
    assert_eq!(daemon.device("/d/2").get().icon, icon::WIRED_OFFLINE);
    daemon.take_events();

    daemon.emit("/d/2", nm::DEVICE_INTERFACE, "StateChanged", vec![json!(70), json!(30), json!(0)]);
    assert_eq!(daemon.device("/d/2").get().status, ConnectionStatus::Connecting);
    assert_eq!(daemon.device("/d/2").get().icon, icon::WIRED_ACQUIRING);

    daemon.emit("/d/2", nm::DEVICE_INTERFACE, "StateChanged", vec![json!(100), json!(70), json!(0)]);
    let device = daemon.device("/d/2").get();
    assert_eq!(device.status, ConnectionStatus::Connected);
    assert_eq!(device.icon, icon::WIRED);
    let active = device.active_access_point.clone().unwrap().get();
    assert!(active.active);
    assert_eq!(active.status, ConnectionStatus::Connected);

    let events = daemon.take_events();
    assert!(events.iter().any(|e| matches!(
        e,
        Event::DeviceChanged {
            field: DeviceField::Status,
            ..
        }
    )));
}

// ── Bluetooth ───────────────────────────────────────────────────────

#[test]
fn test_bluetooth_device_carries_peer_name() {
    let mut daemon = FakeDaemon::started();
    daemon.enumerate(&["/d/3"]);
    daemon.device_props("/d/3", 5, "AA:BB:CC:DD:EE:FF", 100);
    daemon.reply(
        "/d/3",
        nm::BLUETOOTH_INTERFACE,
        props(json!({ "Name": "Phone", "HwAddress": "AA:BB:CC:DD:EE:FF" })),
    );

    let device = daemon.device("/d/3").get();
    assert!(device.ready);
    assert_eq!(device.name.as_deref(), Some("Bluetooth"));
    let peer = device.active_access_point.clone().unwrap();
    assert_eq!(peer.get().name.as_deref(), Some("Phone"));
    assert_eq!(device.icon, icon::BLUETOOTH);

    daemon.properties_changed("/d/3", nm::BLUETOOTH_INTERFACE, json!({ "Name": "Pixel" }));
    assert_eq!(peer.get().name.as_deref(), Some("Pixel"));
    assert!(peer.get().best);
}

// ── Naming ──────────────────────────────────────────────────────────

#[test]
fn test_siblings_are_disambiguated_by_interface() {
    let mut daemon = FakeDaemon::started();
    daemon.enumerate(&["/d/1", "/d/2", "/d/3"]);
    daemon.ready_wired("/d/1", "eth0");
    assert_eq!(daemon.device("/d/1").get().name.as_deref(), Some("Wired"));
    daemon.ready_wired("/d/2", "eth1");
    daemon.ready_wifi("/d/3", "/", &[]);

    assert_eq!(daemon.device("/d/1").get().name.as_deref(), Some("Wired (eth0)"));
    assert_eq!(daemon.device("/d/2").get().name.as_deref(), Some("Wired (eth1)"));
    assert_eq!(daemon.device("/d/3").get().name.as_deref(), Some("Wi-Fi"));
    daemon.take_events();

    daemon.emit(nm::PATH, nm::MANAGER_INTERFACE, "DeviceRemoved", vec![json!("/d/2")]);
    assert_eq!(daemon.device("/d/1").get().name.as_deref(), Some("Wired"));
    let events = daemon.take_events();
    assert_eq!(kinds(&events), vec!["device-removed", "device-changed"]);
    assert!(matches!(
        events.last(),
        Some(Event::DeviceChanged {
            field: DeviceField::Name,
            ..
        })
    ));
}

#[test]
fn test_interface_rename_updates_sibling_names() {
    let mut daemon = FakeDaemon::started();
    daemon.enumerate(&["/d/1", "/d/2"]);
    daemon.ready_wired("/d/1", "eth0");
    daemon.ready_wired("/d/2", "eth1");

    daemon.properties_changed("/d/2", nm::DEVICE_INTERFACE, json!({ "Interface": "enp3s0" }));
    assert_eq!(daemon.device("/d/2").get().name.as_deref(), Some("Wired (enp3s0)"));
    assert_eq!(daemon.device("/d/1").get().name.as_deref(), Some("Wired (eth0)"));
}

// ── Primary device ──────────────────────────────────────────────────

#[test]
fn test_primary_resolves_after_device_becomes_ready() {
    let mut daemon = FakeDaemon::new();
    daemon.appear(OWNER);
    daemon.enumerate(&["/d/1"]);
    daemon.reply(nm::PATH, nm::MANAGER_INTERFACE, props(json!({ "PrimaryConnection": "/ac/1" })));
    daemon.reply("/ac/1", nm::ACTIVE_CONNECTION_INTERFACE, props(json!({ "Devices": ["/d/1"] })));
    assert!(daemon.tracker.primary_device().is_none());
    daemon.take_events();

    daemon.ready_wired("/d/1", "eth0");
    let primary = daemon.tracker.primary_device().unwrap();
    assert_eq!(primary, daemon.device("/d/1"));
    assert_eq!(daemon.tracker.manager().icon, icon::WIRED_OFFLINE);

    let events = daemon.take_events();
    assert_eq!(
        kinds(&events),
        vec!["device-added", "manager-changed", "manager-changed"]
    );
    assert!(matches!(
        events.get(1),
        Some(Event::ManagerChanged(ManagerField::PrimaryDevice))
    ));
}

#[test]
fn test_primary_follows_connection_changes() {
    let mut daemon = FakeDaemon::started();
    daemon.enumerate(&["/d/1", "/d/2"]);
    daemon.ready_wired("/d/1", "eth0");
    daemon.ready_wired("/d/2", "eth1");

    daemon.properties_changed(nm::PATH, nm::MANAGER_INTERFACE, json!({ "PrimaryConnection": "/ac/2" }));
    daemon.reply("/ac/2", nm::ACTIVE_CONNECTION_INTERFACE, props(json!({ "Devices": ["/d/2"] })));
    assert_eq!(daemon.tracker.primary_device(), Some(daemon.device("/d/2")));

    daemon.properties_changed(nm::PATH, nm::MANAGER_INTERFACE, json!({ "PrimaryConnection": "/" }));
    assert!(daemon.tracker.primary_device().is_none());
    assert_eq!(daemon.tracker.manager().icon, icon::OFFLINE);
}

// ── Removal and cancellation ────────────────────────────────────────

#[test]
fn test_removal_during_ap_fetch_discards_late_reply() {
    let mut daemon = FakeDaemon::started();
    daemon.enumerate(&["/d/1"]);
    daemon.device_props("/d/1", 2, "wlan0", 30);
    daemon.wireless_props("/d/1", "/");
    daemon.ap_list("/d/1", &["/ap/1"]);
    assert_eq!(daemon.tracker.active_subscriptions(), 3);

    let (ticket, _, cancel) = daemon.take("/ap/1", nm::ACCESS_POINT_INTERFACE);
    daemon.emit(nm::PATH, nm::MANAGER_INTERFACE, "DeviceRemoved", vec![json!("/d/1")]);
    assert!(cancel.is_cancelled());

    daemon.tracker.complete_call(
        ticket,
        Ok(props(json!({ "Ssid": b"Home", "Strength": 80 }))),
    );
    daemon.pump();

    assert_eq!(daemon.tracker.tracked_access_points(), 0);
    assert_eq!(daemon.tracker.active_subscriptions(), 1);
    assert_eq!(daemon.subscriptions.len(), 1);
    assert!(daemon.tracker.device_by_path("/d/1").is_none());
    // Never announced, so no removal either.
    assert!(daemon.take_events().is_empty());
}

#[test]
fn test_removed_device_is_readable_tombstone() {
    let mut daemon = FakeDaemon::started();
    daemon.enumerate(&["/d/1"]);
    daemon.ready_wifi("/d/1", "/ap/1", &[("/ap/1", "Home", 60)]);
    let device = daemon.device("/d/1");
    let ap = daemon.ap("/d/1", "/ap/1");
    daemon.take_events();

    daemon.emit(nm::PATH, nm::MANAGER_INTERFACE, "DeviceRemoved", vec![json!("/d/1")]);
    let events = daemon.take_events();
    assert_eq!(kinds(&events), vec!["ap-removed", "device-removed"]);

    assert!(!device.is_alive());
    assert!(!device.get().attached);
    assert_eq!(device.get().name.as_deref(), Some("Wi-Fi"));
    assert_eq!(device.get().interface.as_deref(), Some("wlan0"));
    assert!(!ap.is_alive());
    assert_eq!(ap.get().strength, 60);

    assert!(!daemon.tracker.request_scan(&device));
    assert!(!daemon.tracker.request_connect(&ap));
    daemon.pump();
    assert!(daemon.calls.is_empty());

    // A second removal for the same path is ignored.
    daemon.emit(nm::PATH, nm::MANAGER_INTERFACE, "DeviceRemoved", vec![json!("/d/1")]);
    assert!(daemon.take_events().is_empty());
}

// ── Type change ─────────────────────────────────────────────────────

#[test]
fn test_type_change_resets_and_reannounces() {
    let mut daemon = FakeDaemon::started();
    daemon.enumerate(&["/d/1"]);
    daemon.ready_wifi("/d/1", "/ap/2", &[("/ap/1", "Home", 40), ("/ap/2", "Home", 70)]);
    let device = daemon.device("/d/1");
    daemon.take_events();

    daemon.properties_changed("/d/1", nm::DEVICE_INTERFACE, json!({ "DeviceType": 1 }));
    let events = daemon.take_events();
    assert_eq!(
        kinds(&events),
        vec!["ap-removed", "ap-removed", "device-withdrawn"]
    );
    assert_eq!(device.get().kind, DeviceKind::Unknown);
    assert!(!device.get().ready);
    assert!(device.get().access_points.is_empty());
    assert!(device.is_alive());
    assert!(daemon.tracker.devices().is_empty());
    assert_eq!(daemon.tracker.tracked_access_points(), 0);

    daemon.device_props("/d/1", 1, "wlan0", 100);
    assert!(daemon.take_events().is_empty());
    daemon.wired_props("/d/1", true);

    let events = daemon.take_events();
    assert_eq!(kinds(&events), vec!["device-added"]);
    assert_eq!(device.get().kind, DeviceKind::Wired);
    assert_eq!(device.get().name.as_deref(), Some("Wired"));
    assert_eq!(device.get().access_points.len(), 1);
}

// ── Daemon lifecycle ────────────────────────────────────────────────

#[test]
fn test_daemon_vanish_removes_every_device_once() {
    let mut daemon = FakeDaemon::started();
    daemon.enumerate(&["/d/1", "/d/2", "/d/3"]);
    daemon.ready_wired("/d/1", "eth0");
    daemon.ready_wired("/d/2", "eth1");
    daemon.ready_wired("/d/3", "eth2");
    daemon.properties_changed(nm::PATH, nm::MANAGER_INTERFACE, json!({ "PrimaryConnection": "/ac/1" }));
    daemon.reply("/ac/1", nm::ACTIVE_CONNECTION_INTERFACE, props(json!({ "Devices": ["/d/1"] })));
    assert_ne!(daemon.tracker.manager().icon, icon::OFFLINE);
    let handles = daemon.tracker.devices();
    daemon.take_events();

    daemon.vanish();

    let events = daemon.take_events();
    let removed: Vec<&DeviceHandle> = events
        .iter()
        .filter_map(|e| match e {
            Event::DeviceRemoved(d) => Some(d),
            _ => None,
        })
        .collect();
    assert_eq!(removed.len(), 3);
    for handle in &handles {
        assert_eq!(removed.iter().filter(|r| **r == handle).count(), 1);
        assert!(!handle.is_alive());
    }
    assert!(!events.iter().any(|e| matches!(e, Event::DeviceChanged { .. })));
    assert!(events.iter().any(|e| matches!(e, Event::ManagerChanged(ManagerField::Icon))));

    let manager = daemon.tracker.manager();
    assert_eq!(manager.known_devices, 0);
    assert!(manager.devices.is_empty());
    assert!(manager.primary_device.is_none());
    assert_eq!(manager.icon, icon::OFFLINE);
    assert!(!manager.is_connected());
    assert_eq!(daemon.tracker.active_subscriptions(), 0);
}

#[test]
fn test_daemon_restart_rejects_old_owner() {
    let mut daemon = FakeDaemon::started();
    daemon.enumerate(&["/d/1"]);
    daemon.ready_wired("/d/1", "eth0");
    let old = daemon.device("/d/1");
    daemon.take_events();

    daemon.appear(":1.77");
    assert_eq!(daemon.tracker.daemon_owner(), Some(":1.77"));
    assert!(!old.is_alive());
    assert!(daemon.has_call(nm::PATH, "GetAllDevices"));
    let events = daemon.take_events();
    assert!(events.iter().any(|e| matches!(e, Event::DeviceRemoved(d) if *d == old)));

    // A straggler from the previous instance is dropped.
    let daemon_sub = daemon.subscriptions.first().unwrap().0;
    let stale = Signal {
        sender: Some(OWNER.into()),
        path: nm::PATH.into(),
        interface: nm::MANAGER_INTERFACE.into(),
        member: "DeviceAdded".into(),
        args: vec![json!("/d/5")],
    };
    daemon.tracker.handle_signal(daemon_sub, &stale);
    daemon.pump();
    assert!(!daemon.has_call("/d/5", nm::DEVICE_INTERFACE));
}

#[test]
fn test_shutdown_is_silent() {
    let mut daemon = FakeDaemon::started();
    daemon.enumerate(&["/d/1", "/d/2"]);
    daemon.ready_wired("/d/1", "eth0");
    let device = daemon.device("/d/1");
    let (pending, _, _) = daemon.take("/d/2", nm::DEVICE_INTERFACE);
    daemon.take_events();

    daemon.tracker.shutdown();
    daemon.tracker.complete_call(pending, Ok(props(json!({ "DeviceType": 1 }))));
    daemon.pump();

    assert!(daemon.take_events().is_empty());
    assert!(!device.is_alive());
    assert!(daemon.tracker.devices().is_empty());
    assert_eq!(daemon.tracker.active_subscriptions(), 0);
}

// ── Actions ─────────────────────────────────────────────────────────

#[test]
fn test_scan_and_connect_issue_daemon_calls() {
    let mut daemon = FakeDaemon::started();
    daemon.enumerate(&["/d/1", "/d/2"]);
    daemon.ready_wifi("/d/1", "/", &[("/ap/1", "Home", 50)]);
    daemon.ready_wired("/d/2", "eth0");

    let wifi = daemon.device("/d/1");
    let wired = daemon.device("/d/2");
    assert!(daemon.tracker.request_scan(&wifi));
    assert!(!daemon.tracker.request_scan(&wired));
    daemon.pump();
    let (ticket, call, _) = daemon.take("/d/1", "RequestScan");
    assert_eq!(call.interface, nm::WIRELESS_INTERFACE);
    assert_eq!(call.args, vec![CallArg::EmptyOptions]);
    daemon.tracker.complete_call(ticket, Ok(vec![]));

    let ap = daemon.ap("/d/1", "/ap/1");
    assert!(daemon.tracker.request_connect(&ap));
    daemon.pump();
    let (_, call, _) = daemon.take(nm::PATH, "ActivateConnection");
    assert_eq!(
        call.args,
        vec![
            CallArg::ObjectPath("/".into()),
            CallArg::ObjectPath("/d/1".into()),
            CallArg::ObjectPath("/ap/1".into()),
        ]
    );
    assert!(daemon.take_events().is_empty());
}

// ── Observers ───────────────────────────────────────────────────────

#[test]
fn test_device_filter_sees_only_its_device() {
    let mut daemon = FakeDaemon::started();
    daemon.enumerate(&["/d/1", "/d/2"]);
    daemon.ready_wired("/d/1", "eth0");
    daemon.ready_wired("/d/2", "eth1");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let watched = daemon.device("/d/2");
    daemon
        .tracker
        .observe(EventFilter::Device(watched), move |e| {
            sink.lock().unwrap().push(e.kind());
        });

    daemon.properties_changed("/d/1", nm::WIRED_INTERFACE, json!({ "Carrier": true }));
    daemon.properties_changed("/d/2", nm::WIRED_INTERFACE, json!({ "Carrier": true }));

    assert_eq!(*seen.lock().unwrap(), vec!["ap-added"]);
    assert_eq!(daemon.tracker.observer_count(), 2);
}
