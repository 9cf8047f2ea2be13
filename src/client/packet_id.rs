//! Packet identifier allocation.

/// Largest packet identifier allowed by MQTT.
pub const MAX_PACKET_ID: u16 = 65535;

/// Hands out 16-bit packet identifiers for QoS 1/2 publishes and (un)subscribes.
///
/// The counter cycles through `1..=65535`; zero is reserved for "no identifier".
/// Callers that track in-flight identifiers pass a predicate so a wrapped counter
/// skips identifiers that are still pending.
#[derive(Debug, Clone)]
pub struct PacketIdAllocator {
    next_id: u16,
}

impl Default for PacketIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketIdAllocator {
    pub const fn new() -> Self {
        Self { next_id: 1 }
    }

    /// Allocates the next identifier that `in_use` does not claim.
    ///
    /// Returns `None` only if every identifier is in use.
    pub fn allocate(&mut self, in_use: impl Fn(u16) -> bool) -> Option<u16> {
        for _ in 0..MAX_PACKET_ID {
            let id = self.next_id;
            self.advance();
            if !in_use(id) {
                return Some(id);
            }
        }
        None
    }

    /// The identifier the next call to `allocate` will try first.
    pub fn peek(&self) -> u16 {
        self.next_id
    }

    fn advance(&mut self) {
        self.next_id = if self.next_id == MAX_PACKET_ID {
            1
        } else {
            self.next_id + 1
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_allocation() {
        let mut ids = PacketIdAllocator::new();
        assert_eq!(ids.allocate(|_| false), Some(1));
        assert_eq!(ids.allocate(|_| false), Some(2));
        assert_eq!(ids.allocate(|_| false), Some(3));
    }

    #[test]
    fn wraps_to_one_never_zero() {
        let mut ids = PacketIdAllocator { next_id: 65534 };
        assert_eq!(ids.allocate(|_| false), Some(65534));
        assert_eq!(ids.allocate(|_| false), Some(65535));
        assert_eq!(ids.allocate(|_| false), Some(1));
    }

    #[test]
    fn skips_pending_identifiers() {
        let mut ids = PacketIdAllocator { next_id: 65535 };
        let pending = [65535, 1, 2];
        assert_eq!(ids.allocate(|id| pending.contains(&id)), Some(3));
        assert_eq!(ids.peek(), 4);
    }

    #[test]
    fn concurrent_allocations_are_distinct_and_nonzero() {
        let mut ids = PacketIdAllocator { next_id: 65533 };
        let mut pending: heapless::Vec<u16, 5> = heapless::Vec::new();
        for _ in 0..5 {
            let id = ids.allocate(|id| pending.contains(&id)).unwrap();
            assert_ne!(id, 0);
            assert!(!pending.contains(&id));
            pending.push(id).unwrap();
        }
        assert_eq!(pending.as_slice(), &[65533, 65534, 65535, 1, 2]);
    }

    #[test]
    fn released_identifier_waits_for_the_cycle() {
        let mut ids = PacketIdAllocator::new();
        let first = ids.allocate(|_| false).unwrap();
        // `first` is released right away, but the counter has moved past it.
        assert_ne!(ids.allocate(|_| false), Some(first));
    }

    #[test]
    fn exhausted_when_everything_is_pending() {
        let mut ids = PacketIdAllocator::new();
        assert_eq!(ids.allocate(|_| true), None);
    }
}
