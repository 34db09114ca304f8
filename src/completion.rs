//! Completion tracking
//!
//! [`CompletionLedger`] records who finished and how long it took.
//! [`CompletionLatch`] lets team members (or the whole roster) wait for
//! their leader without polling. [`StartGate`] holds workers back until the
//! orchestrator has spawned the full roster.

use crate::signals::TeamId;
use serde::Serialize;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{info, warn};

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
/// Every structure guarded here stays consistent between statements.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Who a completion entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "team")]
pub enum CompletionScope {
    /// One team finished its private sort
    Team(TeamId),
    /// The cooperative sort finished for every thread
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompletionEntry {
    pub scope: CompletionScope,
    /// 1-based position in completion order
    pub position: usize,
    pub elapsed: Duration,
}

#[derive(Debug)]
struct LedgerState {
    slots: Vec<Option<CompletionEntry>>,
    next: usize,
    dropped: usize,
}

/// Fixed-capacity, append-only, mutex-guarded completion record
#[derive(Debug)]
pub struct CompletionLedger {
    state: Mutex<LedgerState>,
}

impl CompletionLedger {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                slots: vec![None; capacity],
                next: 0,
                dropped: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        lock(&self.state).slots.len()
    }

    /// Append an entry. Writes past capacity are dropped; the return value
    /// is the 1-based position or `None` when dropped.
    pub fn record(&self, scope: CompletionScope, elapsed: Duration) -> Option<usize> {
        let mut state = lock(&self.state);
        if state.next >= state.slots.len() {
            state.dropped += 1;
            warn!("[COMPLETED] Ledger full, dropping completion of {:?}", scope);
            return None;
        }

        let position = state.next + 1;
        let index = state.next;
        state.slots[index] = Some(CompletionEntry {
            scope,
            position,
            elapsed,
        });
        state.next += 1;

        match scope {
            CompletionScope::Team(team) => info!(
                "[COMPLETED] Team {} finished in {:.6} seconds (position {})",
                team,
                elapsed.as_secs_f64(),
                position
            ),
            CompletionScope::Global => info!(
                "[COMPLETED] Cooperative sort finished in {:.6} seconds",
                elapsed.as_secs_f64()
            ),
        }
        Some(position)
    }

    /// Every slot, including unset ones, in order
    pub fn slots(&self) -> Vec<Option<CompletionEntry>> {
        lock(&self.state).slots.clone()
    }

    /// Populated entries in completion order
    pub fn entries(&self) -> Vec<CompletionEntry> {
        lock(&self.state).slots.iter().flatten().copied().collect()
    }

    /// Writes rejected because the ledger was full
    pub fn dropped(&self) -> usize {
        lock(&self.state).dropped
    }
}

/// One-shot completion flag that waiters block on
#[derive(Debug, Default)]
pub struct CompletionLatch {
    done: Mutex<bool>,
    cond: Condvar,
}

impl CompletionLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark complete and wake every waiter
    pub fn complete(&self) {
        *lock(&self.done) = true;
        self.cond.notify_all();
    }

    pub fn is_complete(&self) -> bool {
        *lock(&self.done)
    }

    /// Block until [`complete`](Self::complete) has been called
    pub fn wait(&self) {
        let mut done = lock(&self.done);
        while !*done {
            done = self.cond.wait(done).unwrap_or_else(|e| e.into_inner());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Closed,
    Open,
    Aborted,
}

/// Releases workers once the whole roster exists, or tells them to leave
/// if startup failed part-way.
#[derive(Debug)]
pub struct StartGate {
    state: Mutex<GateState>,
    cond: Condvar,
}

impl Default for StartGate {
    fn default() -> Self {
        Self::new()
    }
}

impl StartGate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState::Closed),
            cond: Condvar::new(),
        }
    }

    pub fn open(&self) {
        self.settle(GateState::Open);
    }

    pub fn abort(&self) {
        self.settle(GateState::Aborted);
    }

    fn settle(&self, next: GateState) {
        let mut state = lock(&self.state);
        if *state == GateState::Closed {
            *state = next;
        }
        self.cond.notify_all();
    }

    /// Wait for the orchestrator's verdict. `true` means proceed.
    pub fn wait(&self) -> bool {
        let mut state = lock(&self.state);
        while *state == GateState::Closed {
            state = self.cond.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        *state == GateState::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_ledger_records_in_order() {
        let ledger = CompletionLedger::with_capacity(4);
        assert_eq!(ledger.record(CompletionScope::Team(2), Duration::from_millis(5)), Some(1));
        assert_eq!(ledger.record(CompletionScope::Team(0), Duration::from_millis(7)), Some(2));

        let entries = ledger.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].scope, CompletionScope::Team(2));
        assert_eq!(entries[1].position, 2);

        let slots = ledger.slots();
        assert_eq!(slots.len(), 4);
        assert!(slots[2].is_none() && slots[3].is_none());
    }

    #[test]
    fn test_ledger_drops_past_capacity() {
        let ledger = CompletionLedger::with_capacity(1);
        assert_eq!(ledger.record(CompletionScope::Global, Duration::ZERO), Some(1));
        assert_eq!(ledger.record(CompletionScope::Team(1), Duration::ZERO), None);
        assert_eq!(ledger.entries().len(), 1);
        assert_eq!(ledger.dropped(), 1);
    }

    #[test]
    fn test_concurrent_records_fill_every_slot_once() {
        let ledger = Arc::new(CompletionLedger::with_capacity(4));
        let handles: Vec<_> = (0..4)
            .map(|team| {
                let ledger = ledger.clone();
                thread::spawn(move || ledger.record(CompletionScope::Team(team), Duration::ZERO))
            })
            .collect();
        let mut positions: Vec<usize> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();
        positions.sort_unstable();
        assert_eq!(positions, vec![1, 2, 3, 4]);

        let mut teams: Vec<_> = ledger
            .entries()
            .iter()
            .map(|e| match e.scope {
                CompletionScope::Team(t) => t,
                CompletionScope::Global => usize::MAX,
            })
            .collect();
        teams.sort_unstable();
        assert_eq!(teams, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_latch_releases_all_waiters() {
        let latch = Arc::new(CompletionLatch::new());
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let latch = latch.clone();
                thread::spawn(move || {
                    latch.wait();
                    latch.is_complete()
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        latch.complete();
        for waiter in waiters {
            assert!(waiter.join().unwrap());
        }
        // 完了後の wait は即座に戻る
        latch.wait();
    }

    #[test]
    fn test_gate_verdict_is_final() {
        let gate = Arc::new(StartGate::new());
        let worker = {
            let gate = gate.clone();
            thread::spawn(move || gate.wait())
        };
        gate.abort();
        gate.open();
        assert!(!worker.join().unwrap());
        assert!(!gate.wait());
    }
}
