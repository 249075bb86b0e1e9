//! In-process notification channel.
//!
//! Components that want a connection made (the command layer, the
//! interaction machine) never mutate the tree directly: they publish a
//! `ConnectRequested` notification and the session — the tree's owner —
//! performs the mutation when it pumps the channel. Flash and drag
//! enter/leave notifications are fire-and-forget UI cues; they are
//! never persisted and never create history entries.
//!
//! Delivery order is publish order. Each request carries a unique
//! `EventId` so a consumer that tracks handled ids can ignore
//! duplicate or re-delivered requests.

use dg_core::connect::Endpoint;
use dg_core::data::DiagramData;
use dg_core::id::DiagramId;
use std::collections::VecDeque;

/// Unique id of a published request, for duplicate detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(u64);

impl EventId {
    /// Generate a fresh id.
    pub fn next() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        EventId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A typed, fire-and-forget notification.
#[derive(Debug, Clone)]
pub enum Notification {
    /// Request that a connect line be created between two endpoints.
    ConnectRequested {
        event_id: EventId,
        source: Endpoint,
        target: Endpoint,
    },
    /// Ask the UI to flash-highlight a connect line. Carries the full
    /// record so subscribers need no tree access.
    ConnectLineFlash { line: DiagramData },
    /// The pointer entered a potential drop target during a drag.
    DragEnter { target: DiagramId },
    /// The pointer left the previous drop target.
    DragLeave { target: DiagramId },
}

type Subscriber = Box<dyn FnMut(&Notification)>;

/// Publish/subscribe channel with publish-order delivery.
///
/// Subscribers see every notification synchronously at publish time;
/// the pending queue additionally holds notifications for pull-based
/// consumers (the session drains it to process connect requests).
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Subscriber>,
    pending: VecDeque<Notification>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. Observers are called in registration order
    /// on every publish.
    pub fn subscribe(&mut self, subscriber: impl FnMut(&Notification) + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    /// Publish a notification: deliver to all subscribers, then queue
    /// it for pull-based consumers.
    pub fn publish(&mut self, notification: Notification) {
        for subscriber in &mut self.subscribers {
            subscriber(&notification);
        }
        self.pending.push_back(notification);
    }

    /// Take all queued notifications, in publish order.
    pub fn drain(&mut self) -> Vec<Notification> {
        self.pending.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn event_ids_are_unique() {
        let a = EventId::next();
        let b = EventId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn subscribers_observe_in_publish_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();

        let mut bus = EventBus::new();
        bus.subscribe(move |n| {
            if let Notification::DragEnter { target } = n {
                sink.borrow_mut().push(*target);
            }
        });

        let a = dg_core::DiagramId::intern("a");
        let b = dg_core::DiagramId::intern("b");
        bus.publish(Notification::DragEnter { target: a });
        bus.publish(Notification::DragEnter { target: b });

        assert_eq!(*seen.borrow(), vec![a, b]);
    }

    #[test]
    fn drain_empties_the_queue() {
        let mut bus = EventBus::new();
        bus.publish(Notification::DragLeave {
            target: dg_core::DiagramId::intern("x"),
        });
        assert_eq!(bus.drain().len(), 1);
        assert!(bus.is_empty());
    }
}
