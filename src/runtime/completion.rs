//! Per-request completion slots.
//!
//! A caller claims a slot before posting its request and waits on the slot's
//! signal; the runtime completes the slot when the acknowledgment arrives. Slots
//! carry a generation so a result for a caller that gave up (its future was
//! dropped, releasing the slot) is discarded instead of waking the next owner.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

/// Identifies one claim of one completion slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ticket {
    index: usize,
    generation: u32,
}

#[derive(Clone, Copy)]
struct Slot {
    claimed: bool,
    generation: u32,
}

impl Slot {
    const FREE: Slot = Slot {
        claimed: false,
        generation: 0,
    };

    fn holds(&self, ticket: Ticket) -> bool {
        self.claimed && self.generation == ticket.generation
    }
}

/// A fixed set of `N` completion slots carrying values of type `R`.
pub struct CompletionPool<R, const N: usize> {
    signals: [Signal<CriticalSectionRawMutex, R>; N],
    slots: Mutex<CriticalSectionRawMutex, RefCell<[Slot; N]>>,
}

impl<R: Send, const N: usize> Default for CompletionPool<R, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Send, const N: usize> CompletionPool<R, N> {
    pub const fn new() -> Self {
        Self {
            signals: [const { Signal::new() }; N],
            slots: Mutex::new(RefCell::new([Slot::FREE; N])),
        }
    }

    /// Claims a free slot, or `None` if all are in use.
    pub fn claim(&self) -> Option<Claim<'_, R, N>> {
        let ticket = self.slots.lock(|slots| {
            let mut slots = slots.borrow_mut();
            let (index, slot) = slots.iter_mut().enumerate().find(|(_, s)| !s.claimed)?;
            slot.claimed = true;
            slot.generation = slot.generation.wrapping_add(1);
            self.signals[index].reset();
            Some(Ticket {
                index,
                generation: slot.generation,
            })
        })?;
        Some(Claim { pool: self, ticket })
    }

    /// Delivers `value` to the holder of `ticket`.
    ///
    /// Returns `false`, dropping the value, if the claim was already released.
    pub fn complete(&self, ticket: Ticket, value: R) -> bool {
        self.slots.lock(|slots| {
            let live = slots
                .borrow()
                .get(ticket.index)
                .is_some_and(|slot| slot.holds(ticket));
            if live {
                self.signals[ticket.index].signal(value);
            } else {
                debug!("completion: slot {} abandoned, result dropped", ticket.index);
            }
            live
        })
    }

    /// Number of slots currently claimed.
    pub fn claimed(&self) -> usize {
        self.slots
            .lock(|slots| slots.borrow().iter().filter(|s| s.claimed).count())
    }

    fn release(&self, ticket: Ticket) {
        self.slots.lock(|slots| {
            let mut slots = slots.borrow_mut();
            if let Some(slot) = slots.get_mut(ticket.index)
                && slot.holds(ticket)
            {
                slot.claimed = false;
                self.signals[ticket.index].reset();
            }
        });
    }
}

/// A claimed slot. Dropping it releases the slot.
pub struct Claim<'p, R: Send, const N: usize> {
    pool: &'p CompletionPool<R, N>,
    ticket: Ticket,
}

impl<R: Send, const N: usize> Claim<'_, R, N> {
    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    /// Waits until the slot is completed.
    pub async fn wait(&self) -> R {
        self.pool.signals[self.ticket.index].wait().await
    }
}

impl<R: Send, const N: usize> Drop for Claim<'_, R, N> {
    fn drop(&mut self) {
        self.pool.release(self.ticket);
    }
}
