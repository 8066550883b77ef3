#![forbid(unsafe_code)]

//! Map-scoped publish/subscribe with RAII subscriptions.
//!
//! # Design
//!
//! [`EventBus<E>`] keeps, per event kind, an ordered list of weak references
//! to subscriber callbacks in shared, reference-counted storage
//! (`Rc<RefCell<..>>`). The strong reference lives inside the
//! [`Subscription`] guard handed back from [`EventBus::subscribe`]; dropping
//! the guard (or calling [`Subscription::dispose`]) unsubscribes.
//!
//! One bus belongs to one open document. Cloning an `EventBus` creates a new
//! handle to the **same** subscriber table, so the layout manager and the
//! session can both hold it.
//!
//! # Dispatch
//!
//! [`EventBus::publish`] runs synchronously on the caller's turn:
//!
//! 1. The weak subscriber list for the event's kind is snapshotted and the
//!    interior borrow is released.
//! 2. Each entry is upgraded *at call time*. A subscription dropped by an
//!    earlier handler in the same dispatch (including its own) is skipped;
//!    one added during dispatch is not part of the snapshot.
//! 3. Handlers are called in subscription order.
//!
//! Because no borrow is held while handlers run, a handler may subscribe,
//! unsubscribe, or publish again (nested dispatch completes before the outer
//! one continues).
//!
//! # Performance
//!
//! | Operation     | Complexity                     |
//! |---------------|--------------------------------|
//! | `subscribe()` | O(K) kind lookup, K = kinds    |
//! | `publish()`   | O(K + S), S = subscribers      |
//! | Memory        | one `Weak` per subscription    |

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use tracing::trace_span;

/// An event that can travel on an [`EventBus`].
pub trait BusEvent: 'static {
    /// Discriminant used to route events to subscribers.
    type Kind: Copy + Eq + Hash + fmt::Debug + 'static;

    /// The kind of this event.
    fn kind(&self) -> Self::Kind;
}

type HandlerRc<E> = Rc<dyn Fn(&E)>;
type HandlerWeak<E> = Weak<dyn Fn(&E)>;

struct Channel<E: BusEvent> {
    kind: E::Kind,
    subscribers: Vec<HandlerWeak<E>>,
}

struct BusInner<E: BusEvent> {
    /// One channel per kind, in first-subscription order.
    channels: Vec<Channel<E>>,
    /// Number of `publish` calls so far.
    published: u64,
}

/// Synchronous, per-map event bus.
///
/// # Invariants
///
/// 1. Subscribers of one kind are invoked in registration order.
/// 2. A dropped [`Subscription`] is never invoked after the drop returns.
/// 3. Publishing never panics because of subscription changes made by
///    handlers during dispatch.
pub struct EventBus<E: BusEvent> {
    inner: Rc<RefCell<BusInner<E>>>,
}

impl<E: BusEvent> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: BusEvent> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("EventBus")
            .field("kinds", &inner.channels.len())
            .field(
                "subscribers",
                &inner
                    .channels
                    .iter()
                    .map(|c| c.subscribers.len())
                    .sum::<usize>(),
            )
            .field("published", &inner.published)
            .finish()
    }
}

impl<E: BusEvent> EventBus<E> {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(BusInner {
                channels: Vec::new(),
                published: 0,
            })),
        }
    }

    /// Subscribe `handler` to events of `kind`.
    ///
    /// The returned guard keeps the subscription alive; drop it to
    /// unsubscribe.
    #[must_use = "dropping the Subscription immediately unsubscribes"]
    pub fn subscribe(&self, kind: E::Kind, handler: impl Fn(&E) + 'static) -> Subscription {
        let strong: HandlerRc<E> = Rc::new(handler);
        let weak = Rc::downgrade(&strong);
        let mut inner = self.inner.borrow_mut();
        match inner.channels.iter_mut().find(|c| c.kind == kind) {
            Some(channel) => channel.subscribers.push(weak),
            None => inner.channels.push(Channel {
                kind,
                subscribers: vec![weak],
            }),
        }
        Subscription {
            _guard: Box::new(strong),
        }
    }

    /// Deliver `event` to every live subscriber of its kind.
    ///
    /// Returns the number of handlers that were invoked.
    pub fn publish(&self, event: &E) -> usize {
        let kind = event.kind();
        let snapshot: Vec<HandlerWeak<E>> = {
            let mut inner = self.inner.borrow_mut();
            inner.published += 1;
            match inner.channels.iter_mut().find(|c| c.kind == kind) {
                Some(channel) => {
                    channel.subscribers.retain(|w| w.strong_count() > 0);
                    channel.subscribers.clone()
                }
                None => Vec::new(),
            }
        };

        if snapshot.is_empty() {
            return 0;
        }

        let _span = trace_span!(
            "event_bus.publish",
            kind = ?kind,
            subscribers = snapshot.len() as u64
        )
        .entered();

        let mut delivered = 0;
        for weak in &snapshot {
            // Upgrade late so that handlers dropped mid-dispatch are skipped.
            if let Some(handler) = weak.upgrade() {
                handler(event);
                delivered += 1;
            }
        }
        delivered
    }

    /// Number of live subscribers for `kind`.
    #[must_use]
    pub fn subscriber_count(&self, kind: E::Kind) -> usize {
        self.inner
            .borrow()
            .channels
            .iter()
            .find(|c| c.kind == kind)
            .map_or(0, |c| {
                c.subscribers
                    .iter()
                    .filter(|w| w.strong_count() > 0)
                    .count()
            })
    }

    /// Total number of `publish` calls made on this bus.
    #[must_use]
    pub fn published_count(&self) -> u64 {
        self.inner.borrow().published
    }
}

/// RAII guard for a bus subscription.
///
/// Dropping the guard drops the only strong reference to the handler, so the
/// weak entry in the bus fails to upgrade from then on and is pruned on the
/// next publish of that kind.
pub struct Subscription {
    /// Type-erased strong reference keeping the handler `Rc` alive.
    _guard: Box<dyn Any>,
}

impl Subscription {
    /// Explicitly end the subscription. Equivalent to dropping the guard.
    pub fn dispose(self) {
        drop(self);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug, Clone, PartialEq)]
    enum Ping {
        A(u32),
        B(u32),
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum PingKind {
        A,
        B,
    }

    impl BusEvent for Ping {
        type Kind = PingKind;

        fn kind(&self) -> PingKind {
            match self {
                Ping::A(_) => PingKind::A,
                Ping::B(_) => PingKind::B,
            }
        }
    }

    #[test]
    fn delivers_in_subscription_order() {
        let bus = EventBus::<Ping>::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let l1 = Rc::clone(&log);
        let _s1 = bus.subscribe(PingKind::A, move |e| l1.borrow_mut().push(("first", e.clone())));
        let l2 = Rc::clone(&log);
        let _s2 = bus.subscribe(PingKind::A, move |e| l2.borrow_mut().push(("second", e.clone())));

        assert_eq!(bus.publish(&Ping::A(7)), 2);
        assert_eq!(
            *log.borrow(),
            vec![("first", Ping::A(7)), ("second", Ping::A(7))]
        );
    }

    #[test]
    fn routes_by_kind() {
        let bus = EventBus::<Ping>::new();
        let hits = Rc::new(Cell::new(0u32));
        let h = Rc::clone(&hits);
        let _sub = bus.subscribe(PingKind::B, move |_| h.set(h.get() + 1));

        assert_eq!(bus.publish(&Ping::A(1)), 0);
        assert_eq!(bus.publish(&Ping::B(1)), 1);
        assert_eq!(hits.get(), 1);
        assert_eq!(bus.published_count(), 2);
    }

    #[test]
    fn drop_unsubscribes() {
        let bus = EventBus::<Ping>::new();
        let hits = Rc::new(Cell::new(0u32));
        let h = Rc::clone(&hits);
        let sub = bus.subscribe(PingKind::A, move |_| h.set(h.get() + 1));

        bus.publish(&Ping::A(1));
        assert_eq!(bus.subscriber_count(PingKind::A), 1);
        sub.dispose();
        assert_eq!(bus.subscriber_count(PingKind::A), 0);
        bus.publish(&Ping::A(2));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn handler_can_remove_itself_during_dispatch() {
        let bus = EventBus::<Ping>::new();
        let hits = Rc::new(Cell::new(0u32));
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let h = Rc::clone(&hits);
        let s = Rc::clone(&slot);
        let sub = bus.subscribe(PingKind::A, move |_| {
            h.set(h.get() + 1);
            s.borrow_mut().take();
        });
        *slot.borrow_mut() = Some(sub);

        let after = Rc::new(Cell::new(0u32));
        let a = Rc::clone(&after);
        let _other = bus.subscribe(PingKind::A, move |_| a.set(a.get() + 1));

        bus.publish(&Ping::A(1));
        bus.publish(&Ping::A(2));
        assert_eq!(hits.get(), 1);
        assert_eq!(after.get(), 2);
    }

    #[test]
    fn handler_dropped_by_earlier_handler_is_skipped() {
        let bus = EventBus::<Ping>::new();
        let victim_hits = Rc::new(Cell::new(0u32));
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let s = Rc::clone(&slot);
        let _killer = bus.subscribe(PingKind::A, move |_| {
            s.borrow_mut().take();
        });
        let v = Rc::clone(&victim_hits);
        *slot.borrow_mut() = Some(bus.subscribe(PingKind::A, move |_| v.set(v.get() + 1)));

        assert_eq!(bus.publish(&Ping::A(1)), 1);
        assert_eq!(victim_hits.get(), 0);
    }

    #[test]
    fn subscription_added_during_dispatch_waits_for_next_publish() {
        let bus = EventBus::<Ping>::new();
        let late_hits = Rc::new(Cell::new(0u32));
        let held: Rc<RefCell<Vec<Subscription>>> = Rc::new(RefCell::new(Vec::new()));

        let bus2 = bus.clone();
        let lh = Rc::clone(&late_hits);
        let hd = Rc::clone(&held);
        let _adder = bus.subscribe(PingKind::A, move |_| {
            if hd.borrow().is_empty() {
                let lh2 = Rc::clone(&lh);
                let sub = bus2.subscribe(PingKind::A, move |_| lh2.set(lh2.get() + 1));
                hd.borrow_mut().push(sub);
            }
        });

        bus.publish(&Ping::A(1));
        assert_eq!(late_hits.get(), 0);
        bus.publish(&Ping::A(2));
        assert_eq!(late_hits.get(), 1);
    }

    #[test]
    fn reentrant_publish_completes_nested_dispatch() {
        let bus = EventBus::<Ping>::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let bus2 = bus.clone();
        let l = Rc::clone(&log);
        let _forward = bus.subscribe(PingKind::A, move |e| {
            if let Ping::A(n) = e {
                l.borrow_mut().push(format!("a{n}"));
                bus2.publish(&Ping::B(*n));
                l.borrow_mut().push(format!("a{n}-done"));
            }
        });
        let l = Rc::clone(&log);
        let _sink = bus.subscribe(PingKind::B, move |e| {
            if let Ping::B(n) = e {
                l.borrow_mut().push(format!("b{n}"));
            }
        });

        bus.publish(&Ping::A(3));
        assert_eq!(*log.borrow(), vec!["a3", "b3", "a3-done"]);
    }

    #[test]
    fn cloned_handles_share_subscribers() {
        let bus = EventBus::<Ping>::new();
        let other = bus.clone();
        let hits = Rc::new(Cell::new(0u32));
        let h = Rc::clone(&hits);
        let _sub = other.subscribe(PingKind::A, move |_| h.set(h.get() + 1));

        bus.publish(&Ping::A(1));
        assert_eq!(hits.get(), 1);
        let dbg = format!("{bus:?}");
        assert!(dbg.contains("EventBus"));
    }
}
