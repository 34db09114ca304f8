//! Team records
//!
//! A team is created once by the orchestrator. Its timestamps, completion
//! latch and verification result are written only by its own members; the
//! router never touches it (attribution goes through the registry).

use crate::completion::CompletionLatch;
use crate::partition::TeamSlice;
use crate::signals::{SignalAssignmentTable, TeamId, SIGNALS_PER_TEAM};
use crate::sort::Verification;
use nix::sys::signal::Signal;
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};

/// What the team sorts
#[derive(Debug)]
pub enum TeamWork {
    /// Private copy of a contiguous slice, sorted by the team leader
    Owned(Mutex<TeamSlice>),
    /// Shared-array mode; the team only contributes threads
    Shared,
}

#[derive(Debug)]
pub struct Team {
    pub id: TeamId,
    pub signals: [Signal; SIGNALS_PER_TEAM],
    pub threads: usize,
    pub work: TeamWork,
    /// Kernel tid of each member, by intra-team index, once registered
    members: Box<[OnceLock<i32>]>,
    started_at: OnceLock<Instant>,
    finished_at: OnceLock<Instant>,
    verification: OnceLock<Verification>,
    completion: CompletionLatch,
}

impl Team {
    pub fn new(id: TeamId, table: &SignalAssignmentTable, threads: usize, work: TeamWork) -> Self {
        Self {
            id,
            signals: *table.signals_of(id),
            threads,
            work,
            members: (0..threads).map(|_| OnceLock::new()).collect(),
            started_at: OnceLock::new(),
            finished_at: OnceLock::new(),
            verification: OnceLock::new(),
            completion: CompletionLatch::new(),
        }
    }

    /// Elements the team owns (0 in shared mode)
    pub fn elements(&self) -> usize {
        match &self.work {
            TeamWork::Owned(slice) => lock_slice(slice).len(),
            TeamWork::Shared => 0,
        }
    }

    /// Record member `index`'s thread id. The first record for a slot wins;
    /// returns `false` for an out-of-range index or an occupied slot.
    pub fn record_member(&self, index: usize, tid: i32) -> bool {
        self.members
            .get(index)
            .map_or(false, |slot| slot.set(tid).is_ok())
    }

    pub fn member_tid(&self, index: usize) -> Option<i32> {
        self.members.get(index)?.get().copied()
    }

    /// Thread ids of every member that has started, in index order
    pub fn members(&self) -> Vec<i32> {
        self.members.iter().filter_map(|slot| slot.get().copied()).collect()
    }

    /// Record the start time. Later calls keep the first value.
    pub fn mark_started(&self) -> Instant {
        *self.started_at.get_or_init(Instant::now)
    }

    /// Record the end time and return the elapsed duration since start
    pub fn mark_finished(&self) -> Duration {
        let end = *self.finished_at.get_or_init(Instant::now);
        let start = self.started_at.get().copied().unwrap_or(end);
        end.saturating_duration_since(start)
    }

    pub fn elapsed(&self) -> Option<Duration> {
        let start = self.started_at.get()?;
        let end = self.finished_at.get()?;
        Some(end.saturating_duration_since(*start))
    }

    pub fn set_verification(&self, verification: Verification) {
        let _ = self.verification.set(verification);
    }

    pub fn verification(&self) -> Option<Verification> {
        self.verification.get().copied()
    }

    pub fn completion(&self) -> &CompletionLatch {
        &self.completion
    }

    pub fn is_completed(&self) -> bool {
        self.completion.is_complete()
    }

    /// Copy of the team's slice in its current state
    pub fn slice_snapshot(&self) -> Option<TeamSlice> {
        match &self.work {
            TeamWork::Owned(slice) => Some(lock_slice(slice).clone()),
            TeamWork::Shared => None,
        }
    }
}

pub(crate) fn lock_slice(slice: &Mutex<TeamSlice>) -> MutexGuard<'_, TeamSlice> {
    slice.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_takes_signals_from_table() {
        let table = SignalAssignmentTable::standard();
        let team = Team::new(2, &table, 4, TeamWork::Shared);
        assert_eq!(team.signals, [Signal::SIGHUP, Signal::SIGTSTP, Signal::SIGINT]);
        assert_eq!(team.elements(), 0);
        assert!(team.slice_snapshot().is_none());
    }

    #[test]
    fn test_member_identities() {
        let table = SignalAssignmentTable::standard();
        let team = Team::new(1, &table, 3, TeamWork::Shared);
        assert!(team.members().is_empty());

        assert!(team.record_member(0, 4100));
        assert!(team.record_member(2, 4102));
        assert!(!team.record_member(2, 9999));
        assert!(!team.record_member(3, 4103));

        assert_eq!(team.member_tid(0), Some(4100));
        assert_eq!(team.member_tid(1), None);
        assert_eq!(team.members(), vec![4100, 4102]);
    }

    #[test]
    fn test_timestamps_and_completion() {
        let table = SignalAssignmentTable::standard();
        let slice = TeamSlice {
            team: 0,
            start: 0,
            values: vec![3, 1, 2],
        };
        let team = Team::new(0, &table, 2, TeamWork::Owned(Mutex::new(slice)));
        assert_eq!(team.elements(), 3);
        assert!(team.elapsed().is_none());

        team.mark_started();
        let elapsed = team.mark_finished();
        assert_eq!(team.elapsed(), Some(elapsed));

        assert!(!team.is_completed());
        team.completion().complete();
        assert!(team.is_completed());

        team.set_verification(Verification::Passed);
        team.set_verification(Verification::Failed);
        assert_eq!(team.verification(), Some(Verification::Passed));
    }
}
