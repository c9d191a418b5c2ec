//! Packet-identifier keyed correlation of requests with their acknowledgments.
//!
//! Every outstanding SUBSCRIBE or UNSUBSCRIBE owns one entry in an
//! [`AckTable`], keyed by its packet identifier. The dispatch path settles the
//! entry's waiter when the acknowledgment arrives; the requester removes the
//! entry once it has consumed the outcome. Matching by identifier means
//! acknowledgments may arrive in any order.

use ahash::AHashMap;
use mqlink_core::{PacketType, ProtocolError};
use parking_lot::Mutex;

use crate::error::{ClientError, Result};
use crate::waiter::{Outcome, Waiter};

struct TableInner<T> {
    open: bool,
    waiters: AHashMap<u16, Waiter<T>>,
}

/// Pending acknowledgments for one exchange kind.
pub struct AckTable<T> {
    /// Acknowledgment kind this table waits for (for log lines).
    ack_type: PacketType,
    inner: Mutex<TableInner<T>>,
}

impl<T> AckTable<T> {
    /// Create a closed table; registrations are refused until [`open`](Self::open).
    pub fn new(ack_type: PacketType) -> Self {
        Self {
            ack_type,
            inner: Mutex::new(TableInner {
                open: false,
                waiters: AHashMap::new(),
            }),
        }
    }

    /// Accept registrations.
    pub fn open(&self) {
        self.inner.lock().open = true;
    }

    /// Register a waiter for `packet_id`.
    ///
    /// A live entry under the same identifier is replaced and its waiter
    /// cancelled. Fails with `ConnectionClosed` while the table is closed.
    pub fn register(&self, packet_id: u16) -> Result<Registration<'_, T>> {
        let waiter = Waiter::new();
        let previous = {
            let mut inner = self.inner.lock();
            if !inner.open {
                return Err(ClientError::ConnectionClosed);
            }
            inner.waiters.insert(packet_id, waiter.clone())
        };

        if let Some(previous) = previous {
            if previous.cancel() {
                log::warn!(
                    "Packet id {} reused while awaiting {}, cancelling the earlier request",
                    packet_id,
                    self.ack_type
                );
            }
        }

        Ok(Registration {
            table: self,
            packet_id,
            waiter,
        })
    }

    /// Resolve the waiter for `packet_id`.
    ///
    /// The entry stays in place for its requester to remove. Returns false if
    /// no pending waiter matched (unknown identifier or already settled).
    pub fn resolve(&self, packet_id: u16, value: T) -> bool {
        match self.lookup(packet_id) {
            Some(waiter) => waiter.resolve(value),
            None => false,
        }
    }

    /// Fail the waiter for `packet_id`. Same matching rules as [`resolve`](Self::resolve).
    pub fn fail(&self, packet_id: u16, error: ProtocolError) -> bool {
        match self.lookup(packet_id) {
            Some(waiter) => waiter.fail(error),
            None => false,
        }
    }

    /// Refuse new registrations and cancel every pending waiter.
    ///
    /// Returns the number of waiters that were still pending.
    pub fn close(&self) -> usize {
        let drained: Vec<Waiter<T>> = {
            let mut inner = self.inner.lock();
            inner.open = false;
            inner.waiters.drain().map(|(_, waiter)| waiter).collect()
        };

        let cancelled = drained.iter().filter(|waiter| waiter.cancel()).count();
        if cancelled > 0 {
            log::debug!("Cancelled {} requests awaiting {}", cancelled, self.ack_type);
        }
        cancelled
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.inner.lock().waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an entry is registered under `packet_id`.
    pub fn contains(&self, packet_id: u16) -> bool {
        self.inner.lock().waiters.contains_key(&packet_id)
    }

    fn lookup(&self, packet_id: u16) -> Option<Waiter<T>> {
        self.inner.lock().waiters.get(&packet_id).cloned()
    }

    /// Remove the entry only if it still belongs to `waiter`.
    fn release(&self, packet_id: u16, waiter: &Waiter<T>) {
        let mut inner = self.inner.lock();
        if inner
            .waiters
            .get(&packet_id)
            .is_some_and(|current| current.same_as(waiter))
        {
            inner.waiters.remove(&packet_id);
        }
    }
}

/// A registered entry. Dropping it removes the entry from its table.
pub struct Registration<'a, T> {
    table: &'a AckTable<T>,
    packet_id: u16,
    waiter: Waiter<T>,
}

impl<T> Registration<'_, T> {
    pub fn packet_id(&self) -> u16 {
        self.packet_id
    }
}

impl<T: Clone> Registration<'_, T> {
    /// Suspend until the acknowledgment arrives or the table is closed.
    pub async fn wait(&self) -> Outcome<T> {
        self.waiter.wait().await
    }
}

impl<T> Drop for Registration<'_, T> {
    fn drop(&mut self) {
        self.table.release(self.packet_id, &self.waiter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_table() -> AckTable<Vec<u8>> {
        let table = AckTable::new(PacketType::Suback);
        table.open();
        table
    }

    #[test]
    fn test_closed_table_refuses_registration() {
        let table: AckTable<()> = AckTable::new(PacketType::Unsuback);
        assert!(matches!(
            table.register(1),
            Err(ClientError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_out_of_order_resolution() {
        let table = open_table();
        let a = table.register(1).unwrap();
        let b = table.register(2).unwrap();

        assert!(table.resolve(2, vec![0x02]));
        assert_eq!(b.wait().await, Outcome::Resolved(vec![0x02]));
        assert!(a.waiter.outcome().is_none());

        assert!(table.resolve(1, vec![0x00]));
        assert_eq!(a.wait().await, Outcome::Resolved(vec![0x00]));
    }

    #[test]
    fn test_resolve_unknown_or_settled() {
        let table = open_table();
        assert!(!table.resolve(5, vec![0x01]));

        let pending = table.register(5).unwrap();
        assert!(table.resolve(5, vec![0x01]));
        assert!(!table.resolve(5, vec![0x02]));
        assert_eq!(pending.waiter.outcome(), Some(Outcome::Resolved(vec![0x01])));
    }

    #[test]
    fn test_drop_removes_entry() {
        let table = open_table();
        {
            let pending = table.register(3).unwrap();
            assert_eq!(pending.packet_id(), 3);
            assert!(table.contains(3));
        }
        assert!(!table.contains(3));
        assert!(table.is_empty());
    }

    #[test]
    fn test_reused_id_cancels_earlier_request() {
        let table = open_table();
        let first = table.register(4).unwrap();
        let other = table.register(8).unwrap();
        let second = table.register(4).unwrap();

        assert_eq!(first.waiter.outcome(), Some(Outcome::Cancelled));
        assert!(other.waiter.outcome().is_none());

        // The earlier request's cleanup must leave the newer entry alone.
        drop(first);
        assert!(table.contains(4));
        assert!(table.resolve(4, vec![0x01]));
        assert_eq!(second.waiter.outcome(), Some(Outcome::Resolved(vec![0x01])));
    }

    #[test]
    fn test_fail_entry() {
        let table = open_table();
        let pending = table.register(6).unwrap();
        assert!(table.fail(6, ProtocolError::MalformedPacket("bad".into())));
        assert!(matches!(
            pending.waiter.outcome(),
            Some(Outcome::Failed(ProtocolError::MalformedPacket(_)))
        ));
    }

    #[tokio::test]
    async fn test_close_cancels_and_drains() {
        let table = open_table();
        let a = table.register(1).unwrap();
        let b = table.register(2).unwrap();
        table.resolve(2, vec![0x00]);

        assert_eq!(table.close(), 1);
        assert!(table.is_empty());
        assert_eq!(a.wait().await, Outcome::Cancelled);
        assert_eq!(b.wait().await, Outcome::Resolved(vec![0x00]));
        assert!(matches!(
            table.register(3),
            Err(ClientError::ConnectionClosed)
        ));

        table.open();
        assert!(table.register(3).is_ok());
    }
}
