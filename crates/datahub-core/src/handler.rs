//! Push handler registry
//!
//! Each resource keeps its handlers in registration order. Dispatch is
//! synchronous: the hub calls every handler from inside the push that caused
//! it, and a handler may push again through the `&mut Hub` it receives.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::hub::Hub;
use crate::sample::{DataSample, SampleValue};
use crate::tree::EntryId;

/// Type-erased handler as stored by a resource
pub type PushCallback = dyn FnMut(&mut Hub, &DataSample);

type SharedCallback = Rc<RefCell<Box<PushCallback>>>;

/// Handle returned by a subscription, used to remove it again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerRef {
    pub(crate) entry: EntryId,
    pub(crate) id: u64,
}

impl HandlerRef {
    /// The entry the handler is registered on
    pub fn entry(&self) -> EntryId {
        self.entry
    }
}

struct Handler {
    id: u64,
    callback: SharedCallback,
}

/// Ordered handler list of one resource
#[derive(Default)]
pub struct HandlerList {
    handlers: Vec<Handler>,
}

impl HandlerList {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, id: u64, callback: Box<PushCallback>) {
        self.handlers.push(Handler {
            id,
            callback: Rc::new(RefCell::new(callback)),
        });
    }

    /// Returns false if no handler with that id was registered
    pub(crate) fn remove(&mut self, id: u64) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|h| h.id != id);
        self.handlers.len() != before
    }

    pub fn contains(&self, id: u64) -> bool {
        self.handlers.iter().any(|h| h.id == id)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// The handlers registered right now, in order
    pub(crate) fn snapshot(&self) -> Vec<(u64, SharedCallback)> {
        self.handlers
            .iter()
            .map(|h| (h.id, h.callback.clone()))
            .collect()
    }
}

impl fmt::Debug for HandlerList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.handlers.iter().map(|h| h.id))
            .finish()
    }
}

/// Bind a subscriber's own context to its callback
pub(crate) fn with_context<C, F>(mut callback: F, mut context: C) -> Box<PushCallback>
where
    C: 'static,
    F: FnMut(&mut Hub, f64, &SampleValue, &mut C) + 'static,
{
    Box::new(move |hub: &mut Hub, sample: &DataSample| {
        callback(hub, sample.timestamp(), sample.value(), &mut context)
    })
}
