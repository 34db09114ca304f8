//! Worker thread body
//!
//! Every worker registers itself with the router, waits at the start gate,
//! adjusts its signal mask for its team, then runs its part of the sort.

use crate::completion::{CompletionLatch, CompletionLedger, CompletionScope, StartGate};
use crate::config::{RunConfig, SortMode};
use crate::mask::{MaskOutcome, SignalMaskCoordinator};
use crate::partition::{global_thread_index, PaddedArray};
use crate::registry::{current_tid, Placement};
use crate::router::RouterShared;
use crate::sort::{
    quicksort, verify_ascending, verify_prefix, BitonicWorker, Verification,
    QUICKSORT_VERIFY_PREFIX,
};
use crate::team::{lock_slice, Team, TeamWork};
use serde::Serialize;
use std::sync::{Arc, Barrier, OnceLock};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Shared state of the cooperative (bitonic) mode
#[derive(Debug)]
pub struct CooperativeSort {
    pub array: PaddedArray,
    pub barrier: Barrier,
    pub total_threads: usize,
    done: CompletionLatch,
    started_at: OnceLock<Instant>,
    elapsed: OnceLock<Duration>,
    verification: OnceLock<Verification>,
}

impl CooperativeSort {
    pub fn new(values: &[i32], total_threads: usize) -> Self {
        Self {
            array: PaddedArray::new(values),
            barrier: Barrier::new(total_threads),
            total_threads,
            done: CompletionLatch::new(),
            started_at: OnceLock::new(),
            elapsed: OnceLock::new(),
            verification: OnceLock::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.done.is_complete()
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed.get().copied()
    }

    pub fn verification(&self) -> Option<Verification> {
        self.verification.get().copied()
    }
}

/// Everything a worker needs, owned by the orchestrator and shared by `Arc`
#[derive(Debug)]
pub struct RunContext {
    pub config: RunConfig,
    pub router: Arc<RouterShared>,
    pub masks: SignalMaskCoordinator,
    pub teams: Vec<Team>,
    pub ledger: CompletionLedger,
    pub gate: StartGate,
    pub cooperative: Option<CooperativeSort>,
}

/// What a worker reports back when joined
#[derive(Debug, Clone, Serialize)]
pub struct WorkerOutcome {
    pub placement: Placement,
    pub global_index: usize,
    pub tid: i32,
    /// Barrier rendezvous taken (cooperative mode only)
    pub rendezvous: usize,
    pub mask_failures: usize,
    /// The start gate was aborted and the worker never ran
    pub aborted: bool,
}

/// Thread entry point
pub fn run_worker(ctx: &RunContext, placement: Placement) -> WorkerOutcome {
    let tid = current_tid();
    let mut outcome = WorkerOutcome {
        placement,
        global_index: global_thread_index(
            placement.team,
            ctx.config.threads_per_team,
            placement.index,
        ),
        tid,
        rendezvous: 0,
        mask_failures: 0,
        aborted: false,
    };

    // Registration happens while every recognized signal is still blocked
    if let Err(e) = ctx.router.registry().register(tid, placement) {
        warn!(
            "[THREAD] Team {} thread {} not registered, its signals will look unowned: {}",
            placement.team, placement.index, e
        );
    }
    ctx.teams[placement.team].record_member(placement.index, tid);

    if !ctx.gate.wait() {
        debug!(
            "[THREAD] Team {} thread {} released without running",
            placement.team, placement.index
        );
        outcome.aborted = true;
        return outcome;
    }

    let team = &ctx.teams[placement.team];
    info!(
        "[THREAD] Team {} starting (subarray size: {})",
        team.id,
        team.elements()
    );

    let mask: MaskOutcome = ctx.masks.apply_team_mask(team.id);
    outcome.mask_failures = mask.failures;

    match ctx.config.mode {
        SortMode::Quicksort => quicksort_member(ctx, team, placement),
        SortMode::Bitonic => {
            let rendezvous = bitonic_member(ctx, team, &outcome);
            outcome.rendezvous = rendezvous;
        }
    }

    if !ctx.config.linger.is_zero() {
        info!("[SIGNAL_TEST] Team {} staying alive for signals", team.id);
        thread::sleep(ctx.config.linger);
    }

    info!("[THREAD] Team {} thread exiting", team.id);
    outcome
}

/// The lowest-indexed member sorts the team's slice; the others wait for it
fn quicksort_member(ctx: &RunContext, team: &Team, placement: Placement) {
    if placement.index != 0 {
        team.completion().wait();
        return;
    }

    let slice = match &team.work {
        TeamWork::Owned(slice) => slice,
        TeamWork::Shared => {
            error!("[ERROR] Team {}: no private slice to sort", team.id);
            team.completion().complete();
            return;
        }
    };

    info!("[SORT] Team {} starting quicksort", team.id);
    team.mark_started();
    let mut guard = lock_slice(slice);
    quicksort(&mut guard.values);
    let elapsed = team.mark_finished();

    ctx.ledger.record(CompletionScope::Team(team.id), elapsed);
    team.completion().complete();

    let verification = verify_prefix(&guard.values, QUICKSORT_VERIFY_PREFIX);
    team.set_verification(verification);
    info!("[VERIFY] Team {} sort: {}", team.id, verification);
}

/// Every thread of every team joins the one cooperative sort. Thread 0
/// records timing, reports completion and verifies.
fn bitonic_member(ctx: &RunContext, team: &Team, outcome: &WorkerOutcome) -> usize {
    let Some(coop) = ctx.cooperative.as_ref() else {
        error!("[ERROR] Team {}: cooperative state missing", team.id);
        return 0;
    };

    let global = outcome.global_index;
    if global == 0 {
        info!(
            "[SORT] Cooperative bitonic sort starting ({} threads, {} slots)",
            coop.total_threads,
            coop.array.len()
        );
        let _ = coop.started_at.set(Instant::now());
        team.mark_started();
    }

    let rendezvous =
        BitonicWorker::new(&coop.array, &coop.barrier, global, coop.total_threads).run();

    if global == 0 {
        let start = coop.started_at.get().copied().unwrap_or_else(Instant::now);
        let elapsed = start.elapsed();
        let _ = coop.elapsed.set(elapsed);
        team.mark_finished();
        ctx.ledger.record(CompletionScope::Global, elapsed);

        let verification = verify_ascending(&coop.array.logical_values());
        let _ = coop.verification.set(verification);
        info!("[VERIFY] Cooperative sort: {}", verification);
        coop.done.complete();
    } else {
        coop.done.wait();
    }

    if outcome.placement.index == 0 {
        team.completion().complete();
    }
    rendezvous
}
