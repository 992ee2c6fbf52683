// ── Generational entity arena ──
//
// Slot storage with O(1) lookups by key and by daemon object path. Keys
// carry a generation, so a key held past its entity's removal never
// resolves to whatever later reuses the slot.

use std::collections::HashMap;
use std::fmt;

use crate::model::ObjectPath;

/// Raw slot index + generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawKey {
    index: u32,
    generation: u32,
}

impl fmt::Display for RawKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Typed arena key.
pub trait ArenaKey: Copy + Eq + std::hash::Hash {
    fn from_raw(raw: RawKey) -> Self;
    fn raw(self) -> RawKey;
}

macro_rules! arena_key {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(RawKey);

        impl ArenaKey for $name {
            fn from_raw(raw: RawKey) -> Self {
                Self(raw)
            }

            fn raw(self) -> RawKey {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

arena_key!(
    /// Registry key of a tracked device.
    DeviceId,
    "device"
);
arena_key!(
    /// Registry key of a tracked access point.
    AccessPointId,
    "ap"
);

enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32 },
}

/// Owning storage for one entity kind.
pub(crate) struct Arena<K: ArenaKey, T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    by_path: HashMap<ObjectPath, K>,
    len: usize,
}

impl<K: ArenaKey, T> Arena<K, T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            by_path: HashMap::new(),
            len: 0,
        }
    }

    /// Allocate a slot. `build` receives the new key so the value can
    /// embed it.
    pub(crate) fn insert_with(&mut self, path: Option<ObjectPath>, build: impl FnOnce(K) -> T) -> K {
        let key = if let Some(index) = self.free.pop() {
            let slot_index = usize::try_from(index).unwrap_or(usize::MAX);
            let generation = match self.slots.get(slot_index) {
                Some(Slot::Vacant { generation }) => *generation,
                _ => 0,
            };
            let key = K::from_raw(RawKey { index, generation });
            if let Some(slot) = self.slots.get_mut(slot_index) {
                *slot = Slot::Occupied {
                    generation,
                    value: build(key),
                };
            }
            key
        } else {
            let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
            let key = K::from_raw(RawKey {
                index,
                generation: 0,
            });
            self.slots.push(Slot::Occupied {
                generation: 0,
                value: build(key),
            });
            key
        };

        if let Some(path) = path {
            self.by_path.insert(path, key);
        }
        self.len += 1;
        key
    }

    /// Remove an entity. Its slot's generation is bumped so stale keys
    /// stop resolving.
    pub(crate) fn remove(&mut self, key: K) -> Option<T> {
        let raw = key.raw();
        let slot_index = usize::try_from(raw.index).ok()?;
        let slot = self.slots.get_mut(slot_index)?;
        match slot {
            Slot::Occupied { generation, .. } if *generation == raw.generation => {
                let next = Slot::Vacant {
                    generation: raw.generation.wrapping_add(1),
                };
                let Slot::Occupied { value, .. } = std::mem::replace(slot, next) else {
                    return None;
                };
                self.free.push(raw.index);
                self.by_path.retain(|_, k| *k != key);
                self.len -= 1;
                Some(value)
            }
            _ => None,
        }
    }

    pub(crate) fn get(&self, key: K) -> Option<&T> {
        let raw = key.raw();
        match self.slots.get(usize::try_from(raw.index).ok()?)? {
            Slot::Occupied { generation, value } if *generation == raw.generation => Some(value),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, key: K) -> Option<&mut T> {
        let raw = key.raw();
        match self.slots.get_mut(usize::try_from(raw.index).ok()?)? {
            Slot::Occupied { generation, value } if *generation == raw.generation => Some(value),
            _ => None,
        }
    }

    pub(crate) fn key_by_path(&self, path: &ObjectPath) -> Option<K> {
        self.by_path.get(path).copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn path(s: &str) -> ObjectPath {
        ObjectPath::from(s)
    }

    #[test]
    fn insert_and_lookup_by_key_and_path() {
        let mut arena: Arena<DeviceId, &str> = Arena::new();
        let id = arena.insert_with(Some(path("/dev/1")), |_| "eth0");

        assert_eq!(arena.get(id), Some(&"eth0"));
        assert_eq!(arena.key_by_path(&path("/dev/1")), Some(id));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn remove_cleans_up_path_index() {
        let mut arena: Arena<DeviceId, &str> = Arena::new();
        let id = arena.insert_with(Some(path("/dev/1")), |_| "eth0");

        assert_eq!(arena.remove(id), Some("eth0"));
        assert!(arena.key_by_path(&path("/dev/1")).is_none());
        assert_eq!(arena.len(), 0);
    }

    #[test]
    fn stale_key_does_not_resolve_reused_slot() {
        let mut arena: Arena<AccessPointId, u8> = Arena::new();
        let old = arena.insert_with(None, |_| 1);
        arena.remove(old);
        let new = arena.insert_with(None, |_| 2);

        assert_ne!(old, new);
        assert!(arena.get(old).is_none());
        assert!(arena.remove(old).is_none());
        assert_eq!(arena.get(new), Some(&2));
    }

    #[test]
    fn builder_sees_its_own_key() {
        let mut arena: Arena<DeviceId, Option<DeviceId>> = Arena::new();
        let id = arena.insert_with(None, Some);
        assert_eq!(arena.get(id).copied().flatten(), Some(id));
    }
}
