//! Thread → team registry
//!
//! Fixed-capacity open-addressing table keyed by kernel thread id. Each
//! slot is one `AtomicU64` packing `tid | team | index`, so a lookup is a
//! handful of atomic loads with no locks or allocation and is safe to run
//! inside a signal handler.

use crate::errors::{Result, SortError};
use crate::signals::TeamId;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

const EMPTY: u64 = 0;
const TOMBSTONE: u64 = u64::MAX;
const TEAM_SHIFT: u32 = 24;
const INDEX_MASK: u64 = (1 << TEAM_SHIFT) - 1;
const TEAM_MASK: u64 = 0xFF;

/// Where a thread sits: its team and its position inside the team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Placement {
    pub team: TeamId,
    pub index: usize,
}

impl Placement {
    pub fn new(team: TeamId, index: usize) -> Self {
        Self { team, index }
    }

    fn pack(self, tid: i32) -> u64 {
        ((tid as u32 as u64) << 32)
            | ((self.team as u64 & TEAM_MASK) << TEAM_SHIFT)
            | (self.index as u64 & INDEX_MASK)
    }

    fn unpack(entry: u64) -> Self {
        Self {
            team: ((entry >> TEAM_SHIFT) & TEAM_MASK) as usize,
            index: (entry & INDEX_MASK) as usize,
        }
    }
}

#[inline]
fn entry_tid(entry: u64) -> i32 {
    (entry >> 32) as u32 as i32
}

/// Lock-free tid → [`Placement`] map
#[derive(Debug)]
pub struct ThreadRegistry {
    slots: Box<[AtomicU64]>,
    mask: usize,
}

impl ThreadRegistry {
    /// Room for at least `threads` registrations at load factor ≤ 0.5
    pub fn with_capacity(threads: usize) -> Self {
        let capacity = (threads.max(4) * 2).next_power_of_two();
        let slots = (0..capacity).map(|_| AtomicU64::new(EMPTY)).collect();
        Self {
            slots,
            mask: capacity - 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn home(&self, tid: i32) -> usize {
        (tid as u32).wrapping_mul(0x9E37_79B1) as usize & self.mask
    }

    /// Record the calling thread's placement. Must run before the thread
    /// unblocks any routed signal.
    pub fn register(&self, tid: i32, placement: Placement) -> Result<()> {
        debug_assert!(tid > 0, "kernel thread ids are positive");
        debug_assert!((placement.index as u64) <= INDEX_MASK);
        let entry = placement.pack(tid);
        let start = self.home(tid);

        for probe in 0..self.slots.len() {
            let slot = &self.slots[(start + probe) & self.mask];
            let current = slot.load(Ordering::Acquire);
            if current != EMPTY && current != TOMBSTONE && entry_tid(current) == tid {
                slot.store(entry, Ordering::Release);
                return Ok(());
            }
            if current == EMPTY
                && slot
                    .compare_exchange(EMPTY, entry, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                return Ok(());
            }
        }
        Err(SortError::RegistryFull {
            capacity: self.slots.len(),
        })
    }

    /// Async-signal-safe lookup
    #[inline]
    pub fn lookup(&self, tid: i32) -> Option<Placement> {
        let start = self.home(tid);
        for probe in 0..self.slots.len() {
            let entry = self.slots[(start + probe) & self.mask].load(Ordering::Acquire);
            if entry == EMPTY {
                return None;
            }
            if entry != TOMBSTONE && entry_tid(entry) == tid {
                return Some(Placement::unpack(entry));
            }
        }
        None
    }

    /// Reverse lookup: the thread registered at `placement`. Scans the whole
    /// table, so it is meant for reporting, not signal context.
    pub fn tid_of(&self, placement: Placement) -> Option<i32> {
        self.slots
            .iter()
            .map(|slot| slot.load(Ordering::Acquire))
            .filter(|entry| *entry != EMPTY && *entry != TOMBSTONE)
            .find(|entry| Placement::unpack(*entry) == placement)
            .map(entry_tid)
    }

    /// Drop a joined thread's entry. Probe chains stay intact.
    pub fn unregister(&self, tid: i32) -> bool {
        let start = self.home(tid);
        for probe in 0..self.slots.len() {
            let slot = &self.slots[(start + probe) & self.mask];
            let entry = slot.load(Ordering::Acquire);
            if entry == EMPTY {
                return false;
            }
            if entry != TOMBSTONE && entry_tid(entry) == tid {
                return slot
                    .compare_exchange(entry, TOMBSTONE, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok();
            }
        }
        false
    }

    /// Live entries, in slot order
    pub fn snapshot(&self) -> Vec<(i32, Placement)> {
        self.slots
            .iter()
            .map(|slot| slot.load(Ordering::Acquire))
            .filter(|entry| *entry != EMPTY && *entry != TOMBSTONE)
            .map(|entry| (entry_tid(entry), Placement::unpack(entry)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Kernel id of the calling thread
#[inline]
pub fn current_tid() -> i32 {
    nix::unistd::gettid().as_raw()
}
