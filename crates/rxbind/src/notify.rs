#![forbid(unsafe_code)]

//! Event multicast: [`Publisher`] subjects and RAII [`Subscription`] guards.
//!
//! # Design
//!
//! `Publisher<E>` is a shared, single-threaded multicast point. Subscribers
//! are stored as reference-counted callbacks keyed by a monotonically
//! increasing id; the returned [`Subscription`] holds a `Weak` back-reference
//! and removes the callback on drop.
//!
//! # Invariants
//!
//! 1. Delivery is synchronous and in registration order.
//! 2. Delivery runs against a snapshot of the subscriber list, so a callback
//!    may subscribe, unsubscribe, or mutate the publishing source re-entrantly
//!    without corrupting the list. A subscriber added during delivery does not
//!    receive the in-flight event; one removed during delivery still does.
//! 3. Dropping a [`Subscription`] removes the callback before the next
//!    delivery cycle.
//! 4. A panicking callback is isolated: it is caught, reported on the
//!    process-wide [`errors`](crate::errors) channel, and later subscribers
//!    still receive the event.

use std::cell::{Cell, RefCell};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use crate::error::BindError;
use crate::errors;

/// Payload of a property-changed (or property-changing) notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyChange {
    /// Name of the changed property; [`prop::ALL`](crate::prop::ALL) (the
    /// empty string) signals a wholesale invalidation.
    pub property: &'static str,
}

impl PropertyChange {
    #[must_use]
    pub const fn new(property: &'static str) -> Self {
        Self { property }
    }
}

struct PublisherInner<E> {
    /// Short human label used when reporting a panicking subscriber.
    context: &'static str,
    subscribers: RefCell<Vec<(u64, Rc<dyn Fn(&E)>)>>,
    next_id: Cell<u64>,
}

/// A multicast subject for events of type `E`.
///
/// Cloning a `Publisher` yields another handle to the **same** subscriber
/// list.
pub struct Publisher<E> {
    inner: Rc<PublisherInner<E>>,
}

impl<E> Clone for Publisher<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E> std::fmt::Debug for Publisher<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("context", &self.inner.context)
            .field("subscribers", &self.inner.subscribers.borrow().len())
            .finish()
    }
}

// `E: 'static` because unsubscribe guards capture a `Weak<PublisherInner<E>>`.
impl<E: 'static> Publisher<E> {
    /// Create an empty publisher. `context` names the subscriber role in
    /// isolated-failure reports (e.g. `"property change subscriber"`).
    #[must_use]
    pub fn new(context: &'static str) -> Self {
        Self {
            inner: Rc::new(PublisherInner {
                context,
                subscribers: RefCell::new(Vec::new()),
                next_id: Cell::new(1),
            }),
        }
    }

    /// Register a callback. The callback runs synchronously on every
    /// [`publish`](Self::publish) until the returned guard is dropped.
    pub fn subscribe(&self, callback: impl Fn(&E) + 'static) -> Subscription {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner
            .subscribers
            .borrow_mut()
            .push((id, Rc::new(callback)));

        let weak = Rc::downgrade(&self.inner);
        Subscription::from_cancel(move || {
            if let Some(inner) = weak.upgrade() {
                inner.subscribers.borrow_mut().retain(|(sid, _)| *sid != id);
            }
        })
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    /// Deliver `event` to every subscriber, isolating per-subscriber panics.
    pub fn publish(&self, event: &E) {
        if self.inner.subscribers.borrow().is_empty() {
            return;
        }

        let snapshot: Vec<Rc<dyn Fn(&E)>> = self
            .inner
            .subscribers
            .borrow()
            .iter()
            .map(|(_, cb)| Rc::clone(cb))
            .collect();

        for callback in snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| (*callback)(event)));
            if let Err(payload) = outcome {
                let error = BindError::callback(self.inner.context, payload);
                tracing::warn!(%error, "subscriber panicked; delivery continues");
                errors::publish(&error);
            }
        }
    }
}

/// RAII guard that removes its callback from the owning [`Publisher`]
/// (or other registration point) when dropped.
#[must_use = "dropping the guard unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Build a subscription from an arbitrary cancellation action.
    pub(crate) fn from_cancel(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Cancel eagerly instead of waiting for drop.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("live", &self.cancel.is_some())
            .finish()
    }
}
