//! Static team → signal assignments
//!
//! Every team owns exactly three distinct signal kinds. Assignments may
//! overlap between teams; the union of all sets is the list of recognized
//! signals the router installs handlers for.

use crate::config::TEAM_COUNT;
use nix::sys::signal::{SigSet, Signal};

/// Team identity, `0..TEAM_COUNT`
pub type TeamId = usize;

/// Signals per team
pub const SIGNALS_PER_TEAM: usize = 3;

/// The signal kinds any team may claim, in the order handlers are installed
pub const RECOGNIZED_SIGNALS: [Signal; 8] = [
    Signal::SIGINT,
    Signal::SIGABRT,
    Signal::SIGILL,
    Signal::SIGCHLD,
    Signal::SIGSEGV,
    Signal::SIGFPE,
    Signal::SIGHUP,
    Signal::SIGTSTP,
];

const STANDARD_ASSIGNMENTS: [[Signal; SIGNALS_PER_TEAM]; TEAM_COUNT] = [
    [Signal::SIGINT, Signal::SIGABRT, Signal::SIGILL],
    [Signal::SIGCHLD, Signal::SIGSEGV, Signal::SIGFPE],
    [Signal::SIGHUP, Signal::SIGTSTP, Signal::SIGINT],
    [Signal::SIGABRT, Signal::SIGFPE, Signal::SIGHUP],
];

/// Immutable mapping from team id to its three signals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalAssignmentTable {
    assignments: [[Signal; SIGNALS_PER_TEAM]; TEAM_COUNT],
}

impl Default for SignalAssignmentTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl SignalAssignmentTable {
    /// The fixed configuration teams are built with
    pub const fn standard() -> Self {
        Self {
            assignments: STANDARD_ASSIGNMENTS,
        }
    }

    /// Build a custom table. Returns `None` if any team repeats a signal.
    pub fn new(assignments: [[Signal; SIGNALS_PER_TEAM]; TEAM_COUNT]) -> Option<Self> {
        let distinct = assignments
            .iter()
            .all(|set| set[0] != set[1] && set[0] != set[2] && set[1] != set[2]);
        distinct.then_some(Self { assignments })
    }

    pub fn signals_of(&self, team: TeamId) -> &[Signal; SIGNALS_PER_TEAM] {
        &self.assignments[team]
    }

    pub fn team_count(&self) -> usize {
        self.assignments.len()
    }

    /// Whether `signal` belongs to `team`'s set.
    ///
    /// Plain array scan with no allocation, so the router can call it from
    /// signal context.
    #[inline]
    pub fn is_assigned(&self, team: TeamId, signal: Signal) -> bool {
        match self.assignments.get(team) {
            Some(set) => set.iter().any(|s| *s == signal),
            None => false,
        }
    }

    /// Same as [`is_assigned`](Self::is_assigned) for a raw signal number
    #[inline]
    pub fn is_assigned_raw(&self, team: TeamId, signo: i32) -> bool {
        match self.assignments.get(team) {
            Some(set) => set.iter().any(|s| *s as i32 == signo),
            None => false,
        }
    }

    /// Teams that claim `signal`, ascending
    pub fn owners_of(&self, signal: Signal) -> Vec<TeamId> {
        (0..self.team_count())
            .filter(|team| self.is_assigned(*team, signal))
            .collect()
    }

    /// Union of every team's set, deduplicated, in first-seen order
    pub fn all_signals(&self) -> Vec<Signal> {
        let mut all = Vec::with_capacity(RECOGNIZED_SIGNALS.len());
        for set in &self.assignments {
            for signal in set {
                if !all.contains(signal) {
                    all.push(*signal);
                }
            }
        }
        all
    }

    /// The union as a `SigSet`
    pub fn all_signals_set(&self) -> SigSet {
        let mut set = SigSet::empty();
        for signal in self.all_signals() {
            set.add(signal);
        }
        set
    }

    /// Signals owned by other teams that `team` does not also own
    pub fn foreign_signals(&self, team: TeamId) -> Vec<Signal> {
        let mut foreign = Vec::new();
        for (other, set) in self.assignments.iter().enumerate() {
            if other == team {
                continue;
            }
            for signal in set {
                if !self.is_assigned(team, *signal) && !foreign.contains(signal) {
                    foreign.push(*signal);
                }
            }
        }
        foreign
    }
}
