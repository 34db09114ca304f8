//! Process-wide signal router
//!
//! One `sigaction` handler (with `SA_RESTART`) is installed for every signal
//! in the assignment table. On delivery the handler looks up the receiving
//! thread in the [`ThreadRegistry`], classifies the signal against that
//! thread's team, and publishes a [`RawEvent`](crate::events::RawEvent) to
//! the ring. Nothing else happens in signal context; formatting and logging
//! are done by [`EventDrain`](crate::drain::EventDrain).

use crate::errors::{Result, SortError};
use crate::events::{Classification, EventRing};
use crate::registry::{current_tid, Placement, ThreadRegistry};
use crate::signals::SignalAssignmentTable;
use nix::errno::Errno;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::time::{clock_gettime, ClockId};
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// State the handler reads. Published through [`ACTIVE_ROUTER`] while a
/// [`SignalRouter`] is alive.
#[derive(Debug)]
pub struct RouterShared {
    table: SignalAssignmentTable,
    registry: ThreadRegistry,
    events: EventRing,
}

/// Classify a delivery of `signo` to a thread with the given placement
#[inline]
pub fn classify(
    table: &SignalAssignmentTable,
    owner: Option<Placement>,
    signo: i32,
) -> Classification {
    match owner {
        None => Classification::Unowned,
        Some(placement) if table.is_assigned_raw(placement.team, signo) => Classification::Expected,
        Some(_) => Classification::Stray,
    }
}

impl RouterShared {
    pub fn new(table: SignalAssignmentTable, threads: usize, event_capacity: usize) -> Self {
        Self {
            table,
            registry: ThreadRegistry::with_capacity(threads),
            events: EventRing::with_capacity(event_capacity),
        }
    }

    pub fn table(&self) -> &SignalAssignmentTable {
        &self.table
    }

    pub fn registry(&self) -> &ThreadRegistry {
        &self.registry
    }

    pub fn events(&self) -> &EventRing {
        &self.events
    }

    /// Total signals routed so far
    pub fn received(&self) -> u64 {
        self.events.published()
    }

    /// Attribute, classify and record one delivery. Async-signal-safe.
    ///
    /// Returns the running total including this delivery.
    pub fn route(&self, tid: i32, signo: i32, secs: i64, nanos: u32) -> u64 {
        let owner = self.registry.lookup(tid);
        let classification = classify(&self.table, owner, signo);
        self.events
            .publish(tid, owner, signo, classification, secs, nanos)
    }
}

/// Router state the handler dereferences; null when no router is installed
static ACTIVE_ROUTER: AtomicPtr<RouterShared> = AtomicPtr::new(ptr::null_mut());

extern "C" fn route_signal(signo: libc::c_int) {
    let shared = ACTIVE_ROUTER.load(Ordering::Acquire);
    if shared.is_null() {
        return;
    }
    let saved_errno = Errno::last_raw();

    // SAFETY: the pointer comes from an `Arc` owned by the installed
    // `SignalRouter`, which restores the previous dispositions and clears
    // the pointer before releasing it.
    let shared = unsafe { &*shared };
    let (secs, nanos) = match clock_gettime(ClockId::CLOCK_REALTIME) {
        Ok(ts) => (ts.tv_sec() as i64, ts.tv_nsec() as u32),
        Err(_) => (0, 0),
    };
    shared.route(current_tid(), signo, secs, nanos);

    Errno::set_raw(saved_errno);
}

/// Owns the installed handlers. Dropping it restores the displaced actions.
pub struct SignalRouter {
    shared: Arc<RouterShared>,
    previous: Vec<(Signal, SigAction)>,
}

impl SignalRouter {
    /// Install handlers for every signal in `table`.
    ///
    /// Only one router may be installed per process at a time.
    pub fn install(
        table: SignalAssignmentTable,
        threads: usize,
        event_capacity: usize,
    ) -> Result<Self> {
        let shared = Arc::new(RouterShared::new(table, threads, event_capacity));
        let raw = Arc::as_ptr(&shared) as *mut RouterShared;
        ACTIVE_ROUTER
            .compare_exchange(ptr::null_mut(), raw, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SortError::RouterInstalled)?;

        info!("[SETUP] Setting up signal handlers");
        let action = SigAction::new(
            SigHandler::Handler(route_signal),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );

        let mut previous = Vec::new();
        for signal in table.all_signals() {
            // SAFETY: the handler only touches atomics and async-signal-safe
            // syscalls (clock_gettime, gettid).
            match unsafe { sigaction(signal, &action) } {
                Ok(old) => {
                    info!("[SETUP] Handler set for signal {} ({})", signal as i32, signal.as_str());
                    previous.push((signal, old));
                }
                Err(e) => {
                    error!("[ERROR] Failed to set handler for signal {}: {}", signal as i32, e);
                }
            }
        }

        Ok(Self { shared, previous })
    }

    pub fn shared(&self) -> &Arc<RouterShared> {
        &self.shared
    }

    pub fn received(&self) -> u64 {
        self.shared.received()
    }

    /// Signals that currently route through this router
    pub fn installed_signals(&self) -> Vec<Signal> {
        self.previous.iter().map(|(signal, _)| *signal).collect()
    }

    /// Restore the displaced actions now
    pub fn uninstall(self) {
        drop(self);
    }

    fn restore_actions(&mut self) {
        info!("[CLEANUP] Restoring previous signal handlers...");
        for (signal, old) in self.previous.drain(..).rev() {
            // SAFETY: reinstalling an action previously returned by sigaction
            if let Err(e) = unsafe { sigaction(signal, &old) } {
                warn!("[CLEANUP] Failed to restore handler for {}: {}", signal.as_str(), e);
            }
        }
    }
}

impl Drop for SignalRouter {
    fn drop(&mut self) {
        self.restore_actions();
        let raw = Arc::as_ptr(&self.shared) as *mut RouterShared;
        let _ = ACTIVE_ROUTER.compare_exchange(
            raw,
            ptr::null_mut(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}
