//! Per-thread signal mask coordination
//!
//! The orchestrator blocks every recognized signal on its own thread before
//! spawning workers, so each worker starts with all of them blocked. A
//! worker then blocks the signals of other teams that its own team does not
//! share and unblocks its own three. Signal kinds no team claims are left
//! alone.

use crate::errors::{ErrorContext, Result};
use crate::signals::{SignalAssignmentTable, TeamId};
use nix::sys::signal::{pthread_sigmask, SigSet, SigmaskHow, Signal};
use tracing::{debug, info, warn};

/// What a worker's mask adjustment actually did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaskOutcome {
    /// Foreign signals added to the thread's mask
    pub blocked: Vec<Signal>,
    /// Own signals removed from the mask (only those that were blocked)
    pub unblocked: Vec<Signal>,
    /// Number of `pthread_sigmask` calls that failed
    pub failures: usize,
}

impl MaskOutcome {
    pub fn is_clean(&self) -> bool {
        self.failures == 0
    }
}

/// Restores the calling thread's previous mask when dropped.
///
/// Must be dropped (or [`restore`](MaskGuard::restore)d) on the thread that
/// created it, since signal masks are per thread.
#[derive(Debug)]
pub struct MaskGuard {
    previous: Option<SigSet>,
}

impl MaskGuard {
    /// The mask that was in effect before blocking
    pub fn previous(&self) -> Option<&SigSet> {
        self.previous.as_ref()
    }

    /// Restore now and report failure instead of swallowing it
    pub fn restore(mut self) -> Result<()> {
        match self.previous.take() {
            Some(previous) => pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&previous), None)
                .context("Failed to restore original signal mask"),
            None => Ok(()),
        }
    }
}

impl Drop for MaskGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            if let Err(e) = pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&previous), None) {
                warn!("[CLEANUP] Failed to restore signal mask: {}", e);
            }
        }
    }
}

/// Computes and applies team signal masks from an assignment table
#[derive(Debug, Clone, Copy)]
pub struct SignalMaskCoordinator {
    table: SignalAssignmentTable,
}

impl SignalMaskCoordinator {
    pub fn new(table: SignalAssignmentTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &SignalAssignmentTable {
        &self.table
    }

    /// Block every recognized signal on the calling thread, remembering the
    /// previous mask. Threads spawned afterwards inherit the block.
    pub fn block_recognized(&self) -> Result<MaskGuard> {
        let recognized = self.table.all_signals_set();
        let mut previous = SigSet::empty();
        pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&recognized), Some(&mut previous))
            .context("Failed to block recognized signals")?;

        info!(
            "[SETUP] Blocked {} recognized signals on the orchestrating thread",
            self.table.all_signals().len()
        );
        Ok(MaskGuard {
            previous: Some(previous),
        })
    }

    /// Signals `team` must block: those of other teams it does not share
    pub fn block_set_for(&self, team: TeamId) -> SigSet {
        let mut set = SigSet::empty();
        for signal in self.table.foreign_signals(team) {
            set.add(signal);
        }
        set
    }

    /// The team's own signals
    pub fn own_set_for(&self, team: TeamId) -> SigSet {
        let mut set = SigSet::empty();
        for signal in self.table.signals_of(team) {
            set.add(*signal);
        }
        set
    }

    /// Adjust the calling thread's mask for `team`.
    ///
    /// Failures are logged and counted; the thread keeps whatever mask
    /// resulted.
    pub fn apply_team_mask(&self, team: TeamId) -> MaskOutcome {
        let mut outcome = MaskOutcome::default();

        let block_set = self.block_set_for(team);
        let mut before = SigSet::empty();
        match pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&block_set), Some(&mut before)) {
            Ok(()) => {
                outcome.blocked = self.table.foreign_signals(team);
                info!(
                    "[SETUP] Team {}: Blocked {} signals from other teams",
                    team,
                    outcome.blocked.len()
                );
            }
            Err(e) => {
                outcome.failures += 1;
                warn!("[SETUP] Team {}: Failed to block signals: {}", team, e);
            }
        }

        let mut unblock_set = SigSet::empty();
        let mut pending_unblock = Vec::new();
        for signal in self.table.signals_of(team) {
            if before.contains(*signal) {
                unblock_set.add(*signal);
                pending_unblock.push(*signal);
            }
        }

        if pending_unblock.is_empty() {
            debug!("[SETUP] Team {}: own signals already unblocked", team);
            return outcome;
        }

        match pthread_sigmask(SigmaskHow::SIG_UNBLOCK, Some(&unblock_set), None) {
            Ok(()) => {
                info!(
                    "[SETUP] Team {}: Unblocked team signals {:?}",
                    team, pending_unblock
                );
                outcome.unblocked = pending_unblock;
            }
            Err(e) => {
                outcome.failures += 1;
                warn!(
                    "[SETUP] Team {}: Failed to unblock team signals: {}",
                    team, e
                );
            }
        }
        outcome
    }
}

/// Current mask of the calling thread
pub fn current_mask() -> Result<SigSet> {
    let mut current = SigSet::empty();
    pthread_sigmask(SigmaskHow::SIG_BLOCK, None, Some(&mut current))
        .context("Failed to read signal mask")?;
    Ok(current)
}
