// ── Entity handles ──
//
// Every entity lives in a `Node`: the current snapshot behind an `ArcSwap`
// plus an alive flag. The tracker is the only writer. Consumers hold
// cloneable handles that keep the node (not the registry slot) alive, so a
// removed entity stays readable as a tombstone for as long as anyone holds
// it.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;

use super::arena::{AccessPointId, DeviceId};
use crate::model::{AccessPoint, Device, Manager};

pub(crate) struct Node<T> {
    value: ArcSwap<T>,
    alive: AtomicBool,
}

impl<T> Node<T> {
    pub(crate) fn new(value: T) -> Arc<Self> {
        Arc::new(Self {
            value: ArcSwap::from_pointee(value),
            alive: AtomicBool::new(true),
        })
    }

    pub(crate) fn load(&self) -> Arc<T> {
        self.value.load_full()
    }

    pub(crate) fn store(&self, value: T) {
        self.value.store(Arc::new(value));
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub(crate) fn kill(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

impl<T: Clone> Node<T> {
    /// Copy-on-write mutation. Returns the previous snapshot.
    pub(crate) fn update(&self, f: impl FnOnce(&mut T)) -> Arc<T> {
        let previous = self.value.load_full();
        let mut next = T::clone(&previous);
        f(&mut next);
        self.value.store(Arc::new(next));
        previous
    }
}

// ── DeviceHandle ────────────────────────────────────────────────────

/// Cloneable reference to a device. Reads never fail; after removal the
/// handle keeps answering with the last-known snapshot.
#[derive(Clone)]
pub struct DeviceHandle {
    id: DeviceId,
    node: Arc<Node<Device>>,
}

impl DeviceHandle {
    pub(crate) fn new(id: DeviceId, node: Arc<Node<Device>>) -> Self {
        Self { id, node }
    }

    pub(crate) fn node(&self) -> &Arc<Node<Device>> {
        &self.node
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Current snapshot of every attribute.
    pub fn get(&self) -> Arc<Device> {
        self.node.load()
    }

    /// `false` once the device has been removed.
    pub fn is_alive(&self) -> bool {
        self.node.is_alive()
    }
}

impl PartialEq for DeviceHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl Eq for DeviceHandle {}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let device = self.get();
        f.debug_struct("DeviceHandle")
            .field("id", &self.id)
            .field("path", &device.path)
            .field("name", &device.name)
            .field("alive", &self.is_alive())
            .finish()
    }
}

// ── AccessPointHandle ───────────────────────────────────────────────

/// Cloneable reference to an access point. Same tombstone rules as
/// [`DeviceHandle`].
#[derive(Clone)]
pub struct AccessPointHandle {
    id: AccessPointId,
    node: Arc<Node<AccessPoint>>,
}

impl AccessPointHandle {
    pub(crate) fn new(id: AccessPointId, node: Arc<Node<AccessPoint>>) -> Self {
        Self { id, node }
    }

    pub(crate) fn node(&self) -> &Arc<Node<AccessPoint>> {
        &self.node
    }

    pub fn id(&self) -> AccessPointId {
        self.id
    }

    pub fn get(&self) -> Arc<AccessPoint> {
        self.node.load()
    }

    pub fn is_alive(&self) -> bool {
        self.node.is_alive()
    }
}

impl PartialEq for AccessPointHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl Eq for AccessPointHandle {}

impl fmt::Debug for AccessPointHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ap = self.get();
        f.debug_struct("AccessPointHandle")
            .field("id", &self.id)
            .field("name", &ap.name)
            .field("strength", &ap.strength)
            .field("alive", &self.is_alive())
            .finish()
    }
}

// ── ManagerView ─────────────────────────────────────────────────────

/// Lock-free read side of the manager root, shared between the tracker
/// and any number of readers on other tasks.
#[derive(Clone)]
pub struct ManagerView {
    node: Arc<Node<Manager>>,
}

impl ManagerView {
    pub(crate) fn new(node: Arc<Node<Manager>>) -> Self {
        Self { node }
    }

    pub fn get(&self) -> Arc<Manager> {
        self.node.load()
    }
}

impl fmt::Debug for ManagerView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ManagerView").field(&self.get()).finish()
    }
}
