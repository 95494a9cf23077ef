//! In-memory event bus for tests/dev and single-process deployments.

use std::sync::{Mutex, mpsc};

use crate::bus::{EventBus, Subscription};

#[derive(Debug)]
pub enum InMemoryBusError {
    /// Publish failed due to internal lock poisoning.
    Poisoned,
}

type Filter<M> = Box<dyn Fn(&M) -> bool + Send>;

struct Subscriber<M> {
    sender: mpsc::Sender<M>,
    filter: Option<Filter<M>>,
}

impl<M: Clone> Subscriber<M> {
    /// Deliver if the filter accepts; `false` once the receiver is gone.
    fn offer(&self, message: &M) -> bool {
        match &self.filter {
            Some(accept) if !accept(message) => true,
            _ => self.sender.send(message.clone()).is_ok(),
        }
    }
}

/// In-memory pub/sub bus.
///
/// - No IO / no async; delivery happens on the publishing thread
/// - Subscribers may filter (e.g. one unit, or only low-stock events)
/// - Subscribers whose receiver was dropped are pruned on publish
pub struct InMemoryEventBus<M> {
    subscribers: Mutex<Vec<Subscriber<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribers registered and still alive at the last publish.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Subscribe to the messages `accept` returns `true` for.
    pub fn subscribe_where(&self, accept: impl Fn(&M) -> bool + Send + 'static) -> Subscription<M> {
        self.register(Some(Box::new(accept)))
    }

    fn register(&self, filter: Option<Filter<M>>) -> Subscription<M> {
        let (sender, receiver) = mpsc::channel();

        // A poisoned lock still yields a subscription; it just never receives.
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(Subscriber { sender, filter });
        }

        Subscription::new(receiver)
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<M> core::fmt::Debug for InMemoryEventBus<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryEventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut subs = self.subscribers.lock().map_err(|_| InMemoryBusError::Poisoned)?;
        subs.retain(|s| s.offer(&message));
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        self.register(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_receives_each_message() {
        let bus = InMemoryEventBus::<u32>::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.publish(7).unwrap();
        bus.publish(8).unwrap();

        assert_eq!(a.drain(), vec![7, 8]);
        assert_eq!(b.drain(), vec![7, 8]);
    }

    #[test]
    fn filtered_subscribers_only_see_accepted_messages() {
        let bus = InMemoryEventBus::<u32>::new();
        let even = bus.subscribe_where(|n| n % 2 == 0);
        let all = bus.subscribe();

        for n in 1..=4 {
            bus.publish(n).unwrap();
        }

        assert_eq!(even.drain(), vec![2, 4]);
        assert_eq!(all.drain(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = InMemoryEventBus::<u32>::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());

        bus.publish(1).unwrap();

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.try_recv().unwrap(), 1);
    }
}
