//! Pre-allocated event ring written from signal context
//!
//! The handler claims a sequence number with a single `fetch_add` on the
//! ring head; that number is the running total of received signals and
//! also selects the slot. Each slot is guarded by a stamp that is set to
//! `BUSY` while fields are written and to the sequence number once they
//! are complete, so the drain thread can detect torn or overwritten slots.

use crate::registry::Placement;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{fence, AtomicI32, AtomicI64, AtomicU32, AtomicU64, AtomicU8, Ordering};

const BUSY: u64 = u64::MAX;
const NO_OWNER: u64 = u64::MAX;

/// How a delivery relates to the receiving thread's team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// The receiving team claims this signal
    Expected,
    /// The receiving team does not claim this signal
    Stray,
    /// The receiving thread is not a registered worker
    Unowned,
}

impl Classification {
    fn to_raw(self) -> u8 {
        match self {
            Self::Expected => 0,
            Self::Stray => 1,
            Self::Unowned => 2,
        }
    }

    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Expected,
            1 => Self::Stray,
            _ => Self::Unowned,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expected => write!(f, "expected"),
            Self::Stray => write!(f, "stray"),
            Self::Unowned => write!(f, "unowned"),
        }
    }
}

/// One delivery as captured by the handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    /// Running total of received signals after this delivery
    pub sequence: u64,
    pub tid: i32,
    pub owner: Option<Placement>,
    pub signo: i32,
    pub classification: Classification,
    /// Wall clock at delivery (seconds, nanoseconds since the epoch)
    pub secs: i64,
    pub nanos: u32,
}

/// Result of reading one sequence number back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Ready(RawEvent),
    /// Claimed but not fully written yet
    Pending,
    /// Reused by a later delivery before it was drained
    Overwritten,
}

#[derive(Debug)]
struct EventSlot {
    stamp: AtomicU64,
    tid: AtomicI32,
    owner: AtomicU64,
    signo: AtomicI32,
    classification: AtomicU8,
    secs: AtomicI64,
    nanos: AtomicU32,
}

impl EventSlot {
    fn new() -> Self {
        Self {
            stamp: AtomicU64::new(0),
            tid: AtomicI32::new(0),
            owner: AtomicU64::new(NO_OWNER),
            signo: AtomicI32::new(0),
            classification: AtomicU8::new(0),
            secs: AtomicI64::new(0),
            nanos: AtomicU32::new(0),
        }
    }
}

fn pack_owner(owner: Option<Placement>) -> u64 {
    match owner {
        Some(p) => ((p.team as u64) << 32) | (p.index as u32 as u64),
        None => NO_OWNER,
    }
}

fn unpack_owner(raw: u64) -> Option<Placement> {
    if raw == NO_OWNER {
        None
    } else {
        Some(Placement::new((raw >> 32) as usize, (raw & 0xFFFF_FFFF) as usize))
    }
}

#[derive(Debug)]
pub struct EventRing {
    slots: Box<[EventSlot]>,
    mask: u64,
    head: AtomicU64,
}

impl EventRing {
    /// `capacity` is rounded up to a power of two
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let slots = (0..capacity).map(|_| EventSlot::new()).collect();
        Self {
            slots,
            mask: capacity as u64 - 1,
            head: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of events claimed so far, i.e. the received-signal total
    pub fn published(&self) -> u64 {
        self.head.load(Ordering::Acquire)
    }

    #[inline]
    fn slot_for(&self, sequence: u64) -> &EventSlot {
        &self.slots[((sequence - 1) & self.mask) as usize]
    }

    /// Record a delivery. Async-signal-safe: atomics only.
    ///
    /// Returns the running total including this event.
    pub fn publish(
        &self,
        tid: i32,
        owner: Option<Placement>,
        signo: i32,
        classification: Classification,
        secs: i64,
        nanos: u32,
    ) -> u64 {
        let sequence = self.head.fetch_add(1, Ordering::AcqRel) + 1;
        let slot = self.slot_for(sequence);

        slot.stamp.store(BUSY, Ordering::Relaxed);
        fence(Ordering::Release);
        slot.tid.store(tid, Ordering::Relaxed);
        slot.owner.store(pack_owner(owner), Ordering::Relaxed);
        slot.signo.store(signo, Ordering::Relaxed);
        slot.classification
            .store(classification.to_raw(), Ordering::Relaxed);
        slot.secs.store(secs, Ordering::Relaxed);
        slot.nanos.store(nanos, Ordering::Relaxed);
        slot.stamp.store(sequence, Ordering::Release);

        sequence
    }

    /// Read back the event with the given sequence number (1-based)
    pub fn read(&self, sequence: u64) -> Slot {
        debug_assert!(sequence > 0);
        let slot = self.slot_for(sequence);
        let before = slot.stamp.load(Ordering::Acquire);

        if before == BUSY || before < sequence {
            return Slot::Pending;
        }
        if before > sequence {
            return Slot::Overwritten;
        }

        let event = RawEvent {
            sequence,
            tid: slot.tid.load(Ordering::Relaxed),
            owner: unpack_owner(slot.owner.load(Ordering::Relaxed)),
            signo: slot.signo.load(Ordering::Relaxed),
            classification: Classification::from_raw(slot.classification.load(Ordering::Relaxed)),
            secs: slot.secs.load(Ordering::Relaxed),
            nanos: slot.nanos.load(Ordering::Relaxed),
        };

        fence(Ordering::Acquire);
        if slot.stamp.load(Ordering::Relaxed) == sequence {
            Slot::Ready(event)
        } else {
            Slot::Overwritten
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_publish_returns_running_total() {
        let ring = EventRing::with_capacity(8);
        let first = ring.publish(10, None, 2, Classification::Unowned, 1, 0);
        let second = ring.publish(
            11,
            Some(Placement::new(1, 0)),
            8,
            Classification::Expected,
            2,
            5,
        );
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(ring.published(), 2);

        match ring.read(2) {
            Slot::Ready(event) => {
                assert_eq!(event.tid, 11);
                assert_eq!(event.owner, Some(Placement::new(1, 0)));
                assert_eq!(event.signo, 8);
                assert_eq!(event.classification, Classification::Expected);
                assert_eq!((event.secs, event.nanos), (2, 5));
            }
            other => panic!("unexpected slot state {:?}", other),
        }
    }

    #[test]
    fn test_unclaimed_sequence_is_pending() {
        let ring = EventRing::with_capacity(4);
        assert_eq!(ring.read(1), Slot::Pending);
        ring.publish(1, None, 1, Classification::Unowned, 0, 0);
        assert!(matches!(ring.read(1), Slot::Ready(_)));
        assert_eq!(ring.read(2), Slot::Pending);
    }

    #[test]
    fn test_overflow_marks_old_events_overwritten() {
        let ring = EventRing::with_capacity(4);
        for i in 0..6 {
            ring.publish(i, None, 2, Classification::Unowned, 0, 0);
        }
        assert_eq!(ring.read(1), Slot::Overwritten);
        assert_eq!(ring.read(2), Slot::Overwritten);
        for sequence in 3..=6 {
            assert!(matches!(ring.read(sequence), Slot::Ready(e) if e.sequence == sequence));
        }
    }

    #[test]
    fn test_concurrent_publishers_get_distinct_totals() {
        let ring = Arc::new(EventRing::with_capacity(1024));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let ring = ring.clone();
                thread::spawn(move || {
                    (0..100)
                        .map(|_| ring.publish(t, None, 1, Classification::Unowned, 0, 0))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut totals: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        totals.sort_unstable();
        assert_eq!(totals, (1..=800).collect::<Vec<u64>>());
    }
}
