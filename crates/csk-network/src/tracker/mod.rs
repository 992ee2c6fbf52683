// ── Network state tracker ──
//
// A sans-IO state machine that mirrors the daemon's object graph. Inputs are
// name ownership changes, signals and call completions; outputs are
// `Request`s (calls to issue, subscriptions to open or drop) and synchronous
// observer callbacks. Nothing here awaits: the `Controller` owns the I/O and
// feeds results back in, and tests drive it directly.

mod access_point;
mod device;
mod manager;
pub(crate) mod props;

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use csk_bus::{BusError, MethodCall, Reply, Signal, SignalFilter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::TrackerConfig;
use crate::event::{Event, EventFilter};
use crate::model::{AccessPoint, Device, DeviceKind, Manager, ObjectPath};
use crate::observer::{ObserverId, Observers};
use crate::store::{
    AccessPointHandle, AccessPointId, Arena, DeviceHandle, DeviceId, ManagerView, Node,
};

// ── Requests ────────────────────────────────────────────────────────

/// Identifies one issued call; hand it back with the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call#{}", self.0)
    }
}

/// Identifies one signal subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Work the tracker needs the driver to perform.
#[derive(Debug)]
pub enum Request {
    /// Issue `call`; report the outcome through
    /// [`Tracker::complete_call`]. `cancel` is the owning entity's token.
    Call {
        ticket: Ticket,
        call: MethodCall,
        cancel: CancellationToken,
    },
    /// Start delivering signals matching `filter`, tagged with `id`.
    Subscribe {
        id: SubscriptionId,
        filter: SignalFilter,
    },
    /// Stop delivering signals for `id`.
    Unsubscribe { id: SubscriptionId },
}

/// What an in-flight call's reply will be applied to.
#[derive(Debug, Clone)]
enum Purpose {
    DeviceList,
    ManagerProperties,
    PrimaryConnection { connection: ObjectPath },
    DeviceProperties { device: DeviceId, epoch: u32 },
    VariantProperties { device: DeviceId, epoch: u32, kind: DeviceKind },
    AccessPointList { device: DeviceId, epoch: u32 },
    AccessPointProperties { access_point: AccessPointId },
    Action { name: &'static str },
}

struct PendingCall {
    purpose: Purpose,
    cancel: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubscriptionOwner {
    Daemon,
    Device(DeviceId),
    AccessPoint(AccessPointId),
}

// ── Entity state ────────────────────────────────────────────────────

/// Connection to one daemon instance.
struct Session {
    owner: String,
    cancel: CancellationToken,
    subscription: SubscriptionId,
}

/// Initialization progress of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Waiting for the generic device properties.
    Properties,
    /// Waiting for the variant-specific properties.
    Variant,
    /// Waiting for the access point enumeration (Wi-Fi only).
    Enumerating,
    /// Everything fetched; readiness depends only on access points.
    Settled,
    /// A fetch failed; the device stays known but never becomes ready.
    Failed,
    /// Unsupported variant; initialization halted.
    Unsupported,
}

struct DeviceEntry {
    node: Arc<Node<Device>>,
    path: ObjectPath,
    cancel: CancellationToken,
    subscription: Option<SubscriptionId>,
    stage: Stage,
    /// Bumped on every type reset so replies for the old type are dropped.
    epoch: u32,
    raw_type: Option<u64>,
    access_points: Vec<AccessPointId>,
    ready_access_points: Vec<AccessPointId>,
    /// Active access point as last reported by the daemon (Wi-Fi only).
    active_path: Option<ObjectPath>,
    active: Option<AccessPointId>,
    ready: bool,
    tearing_down: bool,
}

impl DeviceEntry {
    fn new(path: ObjectPath, cancel: CancellationToken) -> Self {
        Self {
            node: Node::new(Device::new(path.clone())),
            path,
            cancel,
            subscription: None,
            stage: Stage::Properties,
            epoch: 0,
            raw_type: None,
            access_points: Vec::new(),
            ready_access_points: Vec::new(),
            active_path: None,
            active: None,
            ready: false,
            tearing_down: false,
        }
    }

    /// Exposed to consumers: change events are emitted.
    fn exposed(&self) -> bool {
        self.ready && !self.tearing_down
    }
}

struct AccessPointEntry {
    node: Arc<Node<AccessPoint>>,
    device: DeviceId,
    cancel: CancellationToken,
    subscription: Option<SubscriptionId>,
    /// Raw `Flags`, `WpaFlags`, `RsnFlags`, kept to re-derive security
    /// from partial updates.
    security_flags: [u64; 3],
    ready: bool,
}

// ── Tracker ─────────────────────────────────────────────────────────

/// The network state mirror. Single owner, no interior locking.
pub struct Tracker {
    config: TrackerConfig,
    root: CancellationToken,
    session: Option<Session>,
    manager: Arc<Node<Manager>>,
    known: Vec<DeviceId>,
    ready: Vec<DeviceId>,
    primary: Option<DeviceId>,
    /// Device path the primary connection resolved to, kept until that
    /// device becomes ready.
    pending_primary: Option<ObjectPath>,
    primary_connection: Option<ObjectPath>,
    devices: Arena<DeviceId, DeviceEntry>,
    access_points: Arena<AccessPointId, AccessPointEntry>,
    observers: Observers,
    quiet: bool,
    requests: VecDeque<Request>,
    pending: HashMap<Ticket, PendingCall>,
    subscriptions: HashMap<SubscriptionId, SubscriptionOwner>,
    next_ticket: u64,
    next_subscription: u64,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self::with_token(config, CancellationToken::new())
    }

    /// Build a tracker whose root token is `root`; cancelling it discards
    /// every in-flight reply.
    pub fn with_token(config: TrackerConfig, root: CancellationToken) -> Self {
        Self {
            config,
            root,
            session: None,
            manager: Node::new(Manager::new()),
            known: Vec::new(),
            ready: Vec::new(),
            primary: None,
            pending_primary: None,
            primary_connection: None,
            devices: Arena::new(),
            access_points: Arena::new(),
            observers: Observers::default(),
            quiet: false,
            requests: VecDeque::new(),
            pending: HashMap::new(),
            subscriptions: HashMap::new(),
            next_ticket: 0,
            next_subscription: 0,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    // ── Inputs ───────────────────────────────────────────────────────

    /// Apply the outcome of a call issued through [`Request::Call`].
    pub fn complete_call(&mut self, ticket: Ticket, result: Result<Reply, BusError>) {
        let Some(PendingCall { purpose, cancel }) = self.pending.remove(&ticket) else {
            debug!(%ticket, "completion for unknown call");
            return;
        };
        if cancel.is_cancelled() {
            trace!(%ticket, ?purpose, "discarding reply for torn-down entity");
            return;
        }

        let reply = match result {
            Ok(reply) => reply,
            Err(err) => {
                self.call_failed(&purpose, &err);
                return;
            }
        };

        match purpose {
            Purpose::DeviceList => self.on_device_list(&reply),
            Purpose::ManagerProperties => self.on_manager_properties(&reply),
            Purpose::PrimaryConnection { connection } => {
                self.on_primary_connection_devices(&connection, &reply);
            }
            Purpose::DeviceProperties { device, epoch } => {
                self.on_device_properties(device, epoch, &reply);
            }
            Purpose::VariantProperties {
                device,
                epoch,
                kind,
            } => self.on_variant_properties(device, epoch, kind, &reply),
            Purpose::AccessPointList { device, epoch } => {
                self.on_access_point_list(device, epoch, &reply);
            }
            Purpose::AccessPointProperties { access_point } => {
                self.on_access_point_properties(access_point, &reply);
            }
            Purpose::Action { name } => debug!(action = name, "request accepted"),
        }
    }

    /// Apply a signal delivered on subscription `id`.
    pub fn handle_signal(&mut self, id: SubscriptionId, signal: &Signal) {
        let Some(owner) = self.subscriptions.get(&id).copied() else {
            trace!(subscription = %id, "signal for dropped subscription");
            return;
        };
        let Some(session) = &self.session else {
            return;
        };
        if signal.sender.as_deref() != Some(session.owner.as_str()) {
            warn!(
                sender = ?signal.sender,
                expected = %session.owner,
                path = %signal.path,
                member = %signal.member,
                "signal from stale or foreign sender, discarding"
            );
            return;
        }

        match owner {
            SubscriptionOwner::Daemon => self.handle_daemon_signal(signal),
            SubscriptionOwner::Device(device) => self.handle_device_signal(device, signal),
            SubscriptionOwner::AccessPoint(ap) => self.handle_access_point_signal(ap, signal),
        }
    }

    /// Tear everything down without notifying observers. Used when the
    /// owning process lets go of the tracker.
    pub fn shutdown(&mut self) {
        self.quiet = true;
        self.end_session(false);
        self.root.cancel();
        self.store_manager();
    }

    // ── Outputs ──────────────────────────────────────────────────────

    /// Next piece of work for the driver, in issue order.
    pub fn next_request(&mut self) -> Option<Request> {
        self.requests.pop_front()
    }

    /// Register a synchronous observer.
    pub fn observe(
        &mut self,
        filter: EventFilter,
        callback: impl FnMut(&Event) + Send + 'static,
    ) -> ObserverId {
        self.observers.register(filter, Box::new(callback))
    }

    pub fn unobserve(&mut self, id: ObserverId) -> bool {
        self.observers.unregister(id)
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn manager(&self) -> Arc<Manager> {
        self.manager.load()
    }

    /// Shareable read side of the manager snapshot.
    pub fn manager_view(&self) -> ManagerView {
        ManagerView::new(Arc::clone(&self.manager))
    }

    /// Ready devices, in announcement order.
    pub fn devices(&self) -> Vec<DeviceHandle> {
        self.ready.iter().filter_map(|id| self.device(*id)).collect()
    }

    /// Every tracked device, ready or not.
    pub fn known_devices(&self) -> Vec<DeviceHandle> {
        self.known.iter().filter_map(|id| self.device(*id)).collect()
    }

    pub fn device(&self, id: DeviceId) -> Option<DeviceHandle> {
        self.devices
            .get(id)
            .map(|entry| DeviceHandle::new(id, Arc::clone(&entry.node)))
    }

    pub fn device_by_path(&self, path: &str) -> Option<DeviceHandle> {
        self.devices
            .key_by_path(&ObjectPath::from(path))
            .and_then(|id| self.device(id))
    }

    pub fn access_point(&self, id: AccessPointId) -> Option<AccessPointHandle> {
        self.access_points
            .get(id)
            .map(|entry| AccessPointHandle::new(id, Arc::clone(&entry.node)))
    }

    pub fn primary_device(&self) -> Option<DeviceHandle> {
        self.primary.and_then(|id| self.device(id))
    }

    pub fn daemon_owner(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.owner.as_str())
    }

    /// Open signal subscriptions.
    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.len()
    }

    /// Calls issued and not yet completed.
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    pub fn tracked_access_points(&self) -> usize {
        self.access_points.len()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    // ── Plumbing ─────────────────────────────────────────────────────

    fn call(&mut self, call: MethodCall, cancel: CancellationToken, purpose: Purpose) {
        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        trace!(%ticket, method = %call.qualified_method(), path = %call.path, "issue call");
        self.pending.insert(
            ticket,
            PendingCall {
                purpose,
                cancel: cancel.clone(),
            },
        );
        self.requests.push_back(Request::Call {
            ticket,
            call,
            cancel,
        });
    }

    fn subscribe(&mut self, filter: SignalFilter, owner: SubscriptionOwner) -> SubscriptionId {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.subscriptions.insert(id, owner);
        self.requests.push_back(Request::Subscribe { id, filter });
        id
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        if self.subscriptions.remove(&id).is_some() {
            self.requests.push_back(Request::Unsubscribe { id });
        }
    }

    /// Signal filter scoped to the current daemon owner and one object.
    fn object_filter(&self, path: &ObjectPath) -> Option<SignalFilter> {
        let session = self.session.as_ref()?;
        Some(
            SignalFilter::new()
                .sender(session.owner.clone())
                .path(path.as_str()),
        )
    }

    fn emit(&mut self, event: &Event) {
        if !self.quiet {
            self.observers.emit(event);
        }
    }

    fn call_failed(&mut self, purpose: &Purpose, err: &BusError) {
        match purpose {
            Purpose::DeviceProperties { device, .. }
            | Purpose::VariantProperties { device, .. }
            | Purpose::AccessPointList { device, .. } => {
                if let Some(entry) = self.devices.get_mut(*device) {
                    warn!(path = %entry.path, error = %err, "device fetch failed, abandoning initialization");
                    entry.stage = Stage::Failed;
                }
            }
            Purpose::AccessPointProperties { access_point } => {
                let path = self
                    .access_points
                    .get(*access_point)
                    .and_then(|entry| entry.node.load().path.clone());
                warn!(path = ?path, error = %err, "access point fetch failed");
            }
            Purpose::DeviceList => warn!(error = %err, "device enumeration failed"),
            Purpose::ManagerProperties | Purpose::PrimaryConnection { .. } => {
                warn!(error = %err, "primary connection lookup failed");
            }
            Purpose::Action { name } => debug!(action = name, error = %err, "request failed"),
        }
    }
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("daemon", &self.daemon_owner())
            .field("known", &self.known.len())
            .field("ready", &self.ready.len())
            .field("access_points", &self.access_points.len())
            .field("pending_calls", &self.pending.len())
            .field("subscriptions", &self.subscriptions.len())
            .finish_non_exhaustive()
    }
}
