//! In-flight transactions awaiting a broker acknowledgment.

use embassy_time::Instant;
use heapless::{LinearMap, Vec};

use super::mailbox::Request;
use crate::client::MessageHandler;

/// Default number of concurrently pending transactions.
pub const MAX_PENDING_TRANSACTIONS: usize = 5;

/// The acknowledgment a pending transaction is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Awaiting {
    PubAck,
    PubRec,
    PubComp,
    SubAck,
    UnsubAck,
}

/// A request that has been sent and not yet acknowledged.
pub struct Pending<'h> {
    pub packet_id: u16,
    pub request: Request<'h>,
    pub awaiting: Awaiting,
    /// For a subscribe, the handler it replaced; put back if the subscription fails.
    pub previous: Option<&'h dyn MessageHandler>,
    pub deadline: Instant,
}

/// A fixed-capacity table of pending transactions keyed by packet identifier.
///
/// Entries live in a slot array; a free list hands out slots and an index maps
/// packet identifiers to slots.
pub struct PendingTable<'h, const N: usize> {
    slots: [Option<Pending<'h>>; N],
    free: Vec<usize, N>,
    index: LinearMap<u16, usize, N>,
}

impl<const N: usize> Default for PendingTable<'_, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'h, const N: usize> PendingTable<'h, N> {
    pub fn new() -> Self {
        let mut free = Vec::new();
        for slot in (0..N).rev() {
            let _ = free.push(slot);
        }
        Self {
            slots: [const { None }; N],
            free,
            index: LinearMap::new(),
        }
    }

    /// Adds `entry`, handing it back if the table is full or its packet
    /// identifier is already pending.
    pub fn register(&mut self, entry: Pending<'h>) -> Result<(), Pending<'h>> {
        if self.index.contains_key(&entry.packet_id) {
            return Err(entry);
        }
        let Some(slot) = self.free.pop() else {
            return Err(entry);
        };
        if self.index.insert(entry.packet_id, slot).is_err() {
            let _ = self.free.push(slot);
            return Err(entry);
        }
        self.slots[slot] = Some(entry);
        Ok(())
    }

    /// Removes and returns the entry for `packet_id`, if any.
    pub fn resolve(&mut self, packet_id: u16) -> Option<Pending<'h>> {
        let slot = self.index.remove(&packet_id)?;
        let entry = self.slots[slot].take();
        let _ = self.free.push(slot);
        entry
    }

    pub fn get(&self, packet_id: u16) -> Option<&Pending<'h>> {
        let slot = *self.index.get(&packet_id)?;
        self.slots[slot].as_ref()
    }

    /// What the entry for `packet_id` is waiting for.
    pub fn awaiting(&self, packet_id: u16) -> Option<Awaiting> {
        self.get(packet_id).map(|entry| entry.awaiting)
    }

    /// Moves a QoS 2 publish from awaiting PUBREC to awaiting PUBCOMP.
    ///
    /// Returns `false` if no entry for `packet_id` is awaiting PUBREC.
    pub fn advance(&mut self, packet_id: u16, deadline: Instant) -> bool {
        let Some(&slot) = self.index.get(&packet_id) else {
            return false;
        };
        match &mut self.slots[slot] {
            Some(entry) if entry.awaiting == Awaiting::PubRec => {
                entry.awaiting = Awaiting::PubComp;
                entry.deadline = deadline;
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, packet_id: u16) -> bool {
        self.index.contains_key(&packet_id)
    }

    /// Removes every entry whose deadline is at or before `now`, passing each to `on_expired`.
    pub fn expire(&mut self, now: Instant, mut on_expired: impl FnMut(Pending<'h>)) {
        for slot in 0..N {
            let overdue = self.slots[slot]
                .as_ref()
                .is_some_and(|entry| entry.deadline <= now);
            if overdue && let Some(entry) = self.take_slot(slot) {
                on_expired(entry);
            }
        }
    }

    /// Removes every entry, passing each to `on_abort`.
    pub fn abort_all(&mut self, mut on_abort: impl FnMut(Pending<'h>)) {
        for slot in 0..N {
            if let Some(entry) = self.take_slot(slot) {
                on_abort(entry);
            }
        }
    }

    fn take_slot(&mut self, slot: usize) -> Option<Pending<'h>> {
        let entry = self.slots[slot].take()?;
        self.index.remove(&entry.packet_id);
        let _ = self.free.push(slot);
        Some(entry)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::mailbox::RequestKind;
    use embassy_time::Duration;

    fn entry(packet_id: u16, awaiting: Awaiting, deadline: Instant) -> Pending<'static> {
        Pending {
            packet_id,
            request: Request::new(RequestKind::Unsubscribe { filter: "t" }),
            awaiting,
            previous: None,
            deadline,
        }
    }

    fn later() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[test]
    fn register_and_resolve() {
        let mut table = PendingTable::<'_, 3>::new();
        assert!(table.register(entry(7, Awaiting::PubAck, later())).is_ok());
        assert!(table.contains(7));
        assert_eq!(table.awaiting(7), Some(Awaiting::PubAck));

        let resolved = table.resolve(7).unwrap();
        assert_eq!(resolved.packet_id, 7);
        assert!(table.is_empty());
        // A late duplicate finds nothing.
        assert!(table.resolve(7).is_none());
    }

    #[test]
    fn rejects_duplicates_and_overflow() {
        let mut table = PendingTable::<'_, 2>::new();
        assert!(table.register(entry(1, Awaiting::PubAck, later())).is_ok());
        assert!(table.register(entry(1, Awaiting::SubAck, later())).is_err());
        assert!(table.register(entry(2, Awaiting::PubAck, later())).is_ok());
        assert!(table.is_full());
        let rejected = table.register(entry(3, Awaiting::PubAck, later()));
        assert_eq!(rejected.err().map(|e| e.packet_id), Some(3));
        assert_eq!(table.len(), 2);

        // Slots freed by resolve are reused.
        table.resolve(1).unwrap();
        assert!(table.register(entry(3, Awaiting::PubAck, later())).is_ok());
        assert!(table.contains(3));
    }

    #[test]
    fn advance_only_from_pubrec() {
        let mut table = PendingTable::<'_, 2>::new();
        assert!(table.register(entry(4, Awaiting::PubRec, later())).is_ok());
        assert!(table.register(entry(5, Awaiting::PubAck, later())).is_ok());
        assert!(table.advance(4, later()));
        assert_eq!(table.awaiting(4), Some(Awaiting::PubComp));
        assert!(!table.advance(4, later()));
        assert!(!table.advance(5, later()));
        assert!(!table.advance(6, later()));
    }

    #[test]
    fn expire_removes_only_overdue_entries() {
        let mut table = PendingTable::<'_, 3>::new();
        let now = Instant::now();
        assert!(table.register(entry(1, Awaiting::PubAck, now)).is_ok());
        assert!(table.register(entry(2, Awaiting::SubAck, later())).is_ok());

        let mut expired = heapless::Vec::<u16, 3>::new();
        table.expire(now, |e| expired.push(e.packet_id).unwrap());
        assert_eq!(expired.as_slice(), &[1]);
        assert!(table.contains(2));
        assert!(!table.contains(1));
    }

    #[test]
    fn abort_all_empties_the_table() {
        let mut table = PendingTable::<'_, 3>::new();
        for id in 1..=3 {
            assert!(table.register(entry(id, Awaiting::PubAck, later())).is_ok());
        }
        let mut aborted = 0;
        table.abort_all(|_| aborted += 1);
        assert_eq!(aborted, 3);
        assert!(table.is_empty());
        assert!(!table.is_full());
    }
}
