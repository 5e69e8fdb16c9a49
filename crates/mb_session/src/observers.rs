//! Typed observer lists with explicit unsubscribe.
//!
//! Handlers run synchronously in registration order for every emitted
//! event. Subscription ids are unique across all lists in the process, so a
//! single `unsubscribe` can search several lists.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SUBSCRIPTION: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn next() -> Self {
        Self(NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed))
    }
}

type Handler<T> = Box<dyn FnMut(&T) + Send>;

pub struct Observers<T> {
    handlers: Vec<(SubscriptionId, Handler<T>)>,
}

impl<T> Observers<T> {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn subscribe(&mut self, handler: impl FnMut(&T) + Send + 'static) -> SubscriptionId {
        let id = SubscriptionId::next();
        self.handlers.push((id, Box::new(handler)));
        id
    }

    /// Returns false if `id` was not registered here.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(sid, _)| *sid != id);
        self.handlers.len() != before
    }

    pub fn emit(&mut self, event: &T) {
        for (_, handler) in self.handlers.iter_mut() {
            handler(event);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Observers<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers").field("handlers", &self.handlers.len()).finish()
    }
}
