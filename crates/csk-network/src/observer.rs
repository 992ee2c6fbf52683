// ── Observer registry ──
//
// Synchronous, in-order delivery on whatever context performs the
// mutation. The set of recipients is fixed when an emission starts.

use tracing::trace;

use crate::event::{Event, EventFilter};

/// Callback invoked for each matching event.
pub type Observer = Box<dyn FnMut(&Event) + Send>;

/// Registration handle returned by [`Observers::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

struct Entry {
    id: ObserverId,
    filter: EventFilter,
    callback: Observer,
}

#[derive(Default)]
pub(crate) struct Observers {
    next_id: u64,
    entries: Vec<Entry>,
}

impl Observers {
    pub(crate) fn register(&mut self, filter: EventFilter, callback: Observer) -> ObserverId {
        self.next_id += 1;
        let id = ObserverId(self.next_id);
        self.entries.push(Entry {
            id,
            filter,
            callback,
        });
        id
    }

    pub(crate) fn unregister(&mut self, id: ObserverId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    pub(crate) fn emit(&mut self, event: &Event) {
        trace!(event = event.kind(), "emit");
        for entry in &mut self.entries {
            if entry.filter.matches(event) {
                (entry.callback)(event);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
