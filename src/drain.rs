//! Signal event drain
//!
//! Runs on an ordinary thread, reads the event ring in sequence order and
//! turns each raw event into a [`SignalRecord`] plus the attributed log
//! lines. Because records are consumed by sequence number, the running
//! totals appear in exactly the order the handler produced them.

use crate::events::{Classification, RawEvent, Slot};
use crate::registry::Placement;
use crate::router::RouterShared;
use chrono::{DateTime, Local};
use nix::sys::signal::Signal;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{info, warn};

/// Attempts made on a still-pending slot during the final drain
const FINAL_DRAIN_RETRIES: usize = 100;

/// One routed signal, ready for reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalRecord {
    /// Running total of received signals including this one
    pub total: u64,
    pub tid: i32,
    pub owner: Option<Placement>,
    pub signal: i32,
    pub signal_name: String,
    pub classification: Classification,
    pub timestamp: DateTime<Local>,
}

impl SignalRecord {
    pub fn from_raw(event: &RawEvent) -> Self {
        let signal_name = Signal::try_from(event.signo)
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|_| format!("signal {}", event.signo));
        let timestamp = DateTime::from_timestamp(event.secs, event.nanos)
            .map(|utc| utc.with_timezone(&Local))
            .unwrap_or_else(Local::now);

        Self {
            total: event.sequence,
            tid: event.tid,
            owner: event.owner,
            signal: event.signo,
            signal_name,
            classification: event.classification,
            timestamp,
        }
    }

    /// Emit the attributed log lines for this delivery
    pub fn log(&self) {
        let ts = self.timestamp.format("%Y-%m-%d %H:%M:%S");
        match self.owner {
            None => info!(
                "[SIGNAL {}] MAIN THREAD caught signal {} ({})",
                ts, self.signal, self.signal_name
            ),
            Some(owner) => {
                info!(
                    "[SIGNAL {}] Team {}, Thread {} caught signal {} ({})",
                    ts, owner.team, owner.index, self.signal, self.signal_name
                );
                if self.classification == Classification::Expected {
                    info!(
                        "[SIGNAL {}] ✓ Signal {} handled correctly by Team {}",
                        ts, self.signal, owner.team
                    );
                } else {
                    warn!(
                        "[SIGNAL {}] ⚠ Signal {} received by Team {} (not assigned)",
                        ts, self.signal, owner.team
                    );
                }
            }
        }
        info!("[SIGNAL {}] Total signals received: {}", ts, self.total);
    }
}

/// Everything the drain collected
#[derive(Debug, Clone, Default, Serialize)]
pub struct DrainSummary {
    pub records: Vec<SignalRecord>,
    /// Events overwritten in the ring before they could be drained
    pub lost: u64,
}

struct Cursor {
    next: u64,
    summary: DrainSummary,
}

impl Cursor {
    fn new() -> Self {
        Self {
            next: 1,
            summary: DrainSummary::default(),
        }
    }

    /// Consume every ready event; stop at the first pending one
    fn drain(&mut self, shared: &RouterShared) -> bool {
        let published = shared.events().published();
        while self.next <= published {
            match shared.events().read(self.next) {
                Slot::Ready(event) => {
                    let record = SignalRecord::from_raw(&event);
                    record.log();
                    self.summary.records.push(record);
                }
                Slot::Overwritten => {
                    warn!("[SIGNAL] Event {} overwritten before it was drained", self.next);
                    self.summary.lost += 1;
                }
                Slot::Pending => return false,
            }
            self.next += 1;
        }
        true
    }
}

/// Background thread draining the router's event ring
pub struct EventDrain {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<DrainSummary>>,
}

impl EventDrain {
    pub fn spawn(shared: Arc<RouterShared>, interval: Duration) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = thread::Builder::new()
            .name("signal-drain".into())
            .spawn(move || {
                let mut cursor = Cursor::new();
                while !stop_flag.load(Ordering::Acquire) {
                    cursor.drain(&shared);
                    thread::sleep(interval);
                }

                // 残りを回収する
                for _ in 0..FINAL_DRAIN_RETRIES {
                    if cursor.drain(&shared) {
                        break;
                    }
                    thread::yield_now();
                }
                let remaining = shared.events().published() + 1 - cursor.next;
                if remaining > 0 {
                    warn!("[SIGNAL] {} events never completed", remaining);
                    cursor.summary.lost += remaining;
                }
                cursor.summary
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stop after one final pass and return everything collected
    pub fn finish(mut self) -> DrainSummary {
        self.shutdown().unwrap_or_default()
    }

    fn shutdown(&mut self) -> Option<DrainSummary> {
        self.stop.store(true, Ordering::Release);
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(summary) => Some(summary),
            Err(_) => {
                warn!("[SIGNAL] Drain thread panicked; signal records lost");
                None
            }
        }
    }
}

impl Drop for EventDrain {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::SignalAssignmentTable;

    #[test]
    fn test_drain_collects_in_sequence_order() {
        let shared = Arc::new(RouterShared::new(SignalAssignmentTable::standard(), 4, 64));
        shared.registry().register(42, Placement::new(0, 2)).unwrap();

        let drain = EventDrain::spawn(shared.clone(), Duration::from_millis(1)).unwrap();
        shared.route(42, libc::SIGILL, 1_700_000_000, 0);
        shared.route(42, libc::SIGCHLD, 1_700_000_001, 0);
        shared.route(7, libc::SIGINT, 1_700_000_002, 0);

        let summary = drain.finish();
        assert_eq!(summary.lost, 0);
        let totals: Vec<u64> = summary.records.iter().map(|r| r.total).collect();
        assert_eq!(totals, vec![1, 2, 3]);

        assert_eq!(summary.records[0].classification, Classification::Expected);
        assert_eq!(summary.records[0].signal_name, "SIGILL");
        assert_eq!(summary.records[1].classification, Classification::Stray);
        assert_eq!(summary.records[2].classification, Classification::Unowned);
        assert_eq!(summary.records[2].owner, None);
    }

    #[test]
    fn test_overflowed_events_are_counted_as_lost() {
        let shared = Arc::new(RouterShared::new(SignalAssignmentTable::standard(), 4, 2));
        for _ in 0..5 {
            shared.route(1, libc::SIGHUP, 0, 0);
        }
        let drain = EventDrain::spawn(shared, Duration::from_millis(1)).unwrap();
        let summary = drain.finish();
        assert_eq!(summary.lost, 3);
        assert_eq!(summary.records.len(), 2);
        assert_eq!(summary.records[1].total, 5);
    }

    #[test]
    fn test_record_from_unknown_signal_number() {
        let event = RawEvent {
            sequence: 1,
            tid: 3,
            owner: None,
            signo: 200,
            classification: Classification::Unowned,
            secs: 0,
            nanos: 0,
        };
        let record = SignalRecord::from_raw(&event);
        assert_eq!(record.signal_name, "signal 200");
    }
}
