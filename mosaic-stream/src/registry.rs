//! The set of connected consumers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

pub type ConnectionId = u64;

/// A message queued for a consumer's socket.
#[derive(Clone, Debug, PartialEq)]
pub enum Outgoing {
    Text(String),
    Binary(Vec<u8>),
}

/// Thread-safe registry of consumer queues.
///
/// Every consumer gets an unbounded queue; a socket task drains it. A single
/// mutex guards add, remove and broadcast, so every consumer sees messages
/// in the same order.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    connections: Mutex<HashMap<ConnectionId, UnboundedSender<Outgoing>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn connections(&self) -> std::sync::MutexGuard<'_, HashMap<ConnectionId, UnboundedSender<Outgoing>>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a consumer and return its id and queue.
    pub fn register(&self) -> (ConnectionId, UnboundedReceiver<Outgoing>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = unbounded_channel();
        let count = {
            let mut connections = self.connections();
            connections.insert(id, tx);
            connections.len()
        };
        tracing::info!(id, consumers = count, "consumer connected");
        (id, rx)
    }

    pub fn unregister(&self, id: ConnectionId) {
        let (removed, count) = {
            let mut connections = self.connections();
            let removed = connections.remove(&id).is_some();
            (removed, connections.len())
        };
        if removed {
            tracing::info!(id, consumers = count, "consumer disconnected");
        }
    }

    pub fn len(&self) -> usize {
        self.connections().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue `message` for every consumer. Consumers whose queue is closed
    /// are dropped. Returns the number of consumers reached.
    pub fn broadcast(&self, message: Outgoing) -> usize {
        let mut connections = self.connections();
        connections.retain(|id, tx| {
            let open = tx.send(message.clone()).is_ok();
            if !open {
                tracing::debug!(id, "dropping closed consumer");
            }
            open
        });
        connections.len()
    }

    /// Queue `message` for one consumer.
    pub fn send_to(&self, id: ConnectionId, message: Outgoing) -> bool {
        self.connections()
            .get(&id)
            .is_some_and(|tx| tx.send(message).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_reaches_every_consumer() {
        let registry = ConnectionRegistry::new();
        let (_, mut a) = registry.register();
        let (_, mut b) = registry.register();

        assert_eq!(registry.broadcast(Outgoing::Text("one".into())), 2);
        assert_eq!(registry.broadcast(Outgoing::Binary(vec![1, 2])), 2);

        for rx in [&mut a, &mut b] {
            assert_eq!(rx.try_recv().unwrap(), Outgoing::Text("one".into()));
            assert_eq!(rx.try_recv().unwrap(), Outgoing::Binary(vec![1, 2]));
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn unregistered_and_closed_consumers_stop_receiving() {
        let registry = ConnectionRegistry::new();
        let (a_id, mut a) = registry.register();
        let (_, b) = registry.register();
        let (_, mut c) = registry.register();
        assert_eq!(registry.len(), 3);

        registry.unregister(a_id);
        drop(b);
        assert_eq!(registry.broadcast(Outgoing::Text("hi".into())), 1);
        assert_eq!(registry.len(), 1);

        assert!(a.try_recv().is_err());
        assert_eq!(c.try_recv().unwrap(), Outgoing::Text("hi".into()));
    }

    #[test]
    fn send_to_targets_one_consumer() {
        let registry = ConnectionRegistry::new();
        let (a_id, mut a) = registry.register();
        let (_, mut b) = registry.register();

        assert!(registry.send_to(a_id, Outgoing::Text("only a".into())));
        assert!(!registry.send_to(99, Outgoing::Text("nobody".into())));

        assert!(a.try_recv().is_ok());
        assert!(b.try_recv().is_err());
    }
}
