//! Run report
//!
//! Collected by the orchestrator after every worker has been joined.
//! Serializable for `--json` output; `Display` gives the human summary.

use crate::completion::{CompletionEntry, CompletionScope};
use crate::config::SortMode;
use crate::drain::{DrainSummary, SignalRecord};
use crate::events::Classification;
use crate::partition::TeamSlice;
use crate::signals::TeamId;
use crate::sort::Verification;
use crate::worker::WorkerOutcome;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct TeamReport {
    pub team: TeamId,
    pub signals: Vec<String>,
    /// Kernel tids of the members, by intra-team index
    pub members: Vec<i32>,
    /// Elements in the team's private slice (0 in cooperative mode)
    pub elements: usize,
    pub completed: bool,
    pub elapsed: Option<Duration>,
    pub verification: Option<Verification>,
    pub mask_failures: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SignalSummary {
    pub total: u64,
    pub expected: usize,
    pub stray: usize,
    pub unowned: usize,
    pub lost: u64,
    pub records: Vec<SignalRecord>,
}

impl SignalSummary {
    pub fn new(total: u64, drain: DrainSummary) -> Self {
        let count = |class: Classification| {
            drain
                .records
                .iter()
                .filter(|r| r.classification == class)
                .count()
        };
        Self {
            total,
            expected: count(Classification::Expected),
            stray: count(Classification::Stray),
            unowned: count(Classification::Unowned),
            lost: drain.lost,
            records: drain.records,
        }
    }
}

/// Final array contents
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOutput {
    /// One sorted private slice per team
    Partitioned(Vec<TeamSlice>),
    /// The padded shared array, sentinel tail included
    Padded { values: Vec<i32>, logical_len: usize },
}

impl SortOutput {
    /// Values that came from the input, in output order
    pub fn logical_values(&self) -> Vec<i32> {
        match self {
            Self::Partitioned(slices) => slices
                .iter()
                .flat_map(|s| s.values.iter().copied())
                .collect(),
            Self::Padded { values, logical_len } => values[..*logical_len].to_vec(),
        }
    }
}

/// Fastest/slowest comparison over per-team completions
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Performance {
    pub fastest_team: TeamId,
    pub fastest: Duration,
    pub slowest_team: TeamId,
    pub slowest: Duration,
    pub speed_ratio: f64,
    pub elements_per_second: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub pid: u32,
    pub mode: SortMode,
    pub array_size: usize,
    pub threads_per_team: usize,
    pub total_threads: usize,
    pub total_elapsed: Duration,
    /// Every ledger slot, unset ones as `None`
    pub ledger: Vec<Option<CompletionEntry>>,
    pub ledger_dropped: usize,
    pub teams: Vec<TeamReport>,
    /// Full-prefix check of the cooperative sort
    pub cooperative_verification: Option<Verification>,
    pub workers: Vec<WorkerOutcome>,
    pub signals: SignalSummary,
    pub output: SortOutput,
}

impl RunReport {
    pub fn completions(&self) -> Vec<CompletionEntry> {
        self.ledger.iter().flatten().copied().collect()
    }

    pub fn completion_order(&self) -> Vec<CompletionScope> {
        self.completions().iter().map(|e| e.scope).collect()
    }

    /// Whether every verification that ran passed
    pub fn all_verified(&self) -> bool {
        self.teams
            .iter()
            .filter_map(|t| t.verification)
            .chain(self.cooperative_verification)
            .all(Verification::passed)
    }

    /// Only meaningful in quicksort mode with at least one completion
    pub fn performance(&self) -> Option<Performance> {
        let completions = self.completions();
        let team_of = |entry: &CompletionEntry| match entry.scope {
            CompletionScope::Team(team) => Some(team),
            CompletionScope::Global => None,
        };
        let first = completions.first()?;
        let last = completions.last()?;
        let fastest_team = team_of(first)?;
        let slowest_team = team_of(last)?;

        let fastest_secs = first.elapsed.as_secs_f64();
        let elements = self.teams.get(fastest_team).map_or(0, |t| t.elements);
        Some(Performance {
            fastest_team,
            fastest: first.elapsed,
            slowest_team,
            slowest: last.elapsed,
            speed_ratio: if fastest_secs > 0.0 {
                last.elapsed.as_secs_f64() / fastest_secs
            } else {
                1.0
            },
            elements_per_second: if fastest_secs > 0.0 {
                elements as f64 / fastest_secs
            } else {
                0.0
            },
        })
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n=== FINAL RESULTS ===")?;
        writeln!(f, "Mode: {}", self.mode)?;
        writeln!(f, "Total execution time: {:.6} seconds", self.total_elapsed.as_secs_f64())?;
        writeln!(f, "Completion order:")?;
        for (i, slot) in self.ledger.iter().enumerate() {
            match slot {
                Some(entry) => match entry.scope {
                    CompletionScope::Team(team) => writeln!(
                        f,
                        "  Position {}: Team {} ({:.6} seconds)",
                        i + 1,
                        team,
                        entry.elapsed.as_secs_f64()
                    )?,
                    CompletionScope::Global => writeln!(
                        f,
                        "  Position {}: all teams ({:.6} seconds)",
                        i + 1,
                        entry.elapsed.as_secs_f64()
                    )?,
                },
                None if self.mode == SortMode::Quicksort => {
                    writeln!(f, "  Position {}: [ERROR - Team not recorded]", i + 1)?
                }
                None => {}
            }
        }

        if let Some(perf) = self.performance() {
            writeln!(f, "\nPerformance Analysis:")?;
            writeln!(
                f,
                "  Fastest team: {} ({:.6} seconds)",
                perf.fastest_team,
                perf.fastest.as_secs_f64()
            )?;
            writeln!(
                f,
                "  Slowest team: {} ({:.6} seconds)",
                perf.slowest_team,
                perf.slowest.as_secs_f64()
            )?;
            writeln!(f, "  Speed difference: {:.2}x", perf.speed_ratio)?;
            writeln!(f, "  Elements per second (fastest): {:.0}", perf.elements_per_second)?;
        }

        writeln!(f, "\nVerification:")?;
        for team in &self.teams {
            if let Some(verification) = team.verification {
                writeln!(f, "  Team {}: {}", team.team, verification)?;
            }
        }
        if let Some(verification) = self.cooperative_verification {
            writeln!(f, "  Cooperative sort: {}", verification)?;
        }

        writeln!(f, "\nSignals:")?;
        writeln!(f, "  Total signals received: {}", self.signals.total)?;
        writeln!(
            f,
            "  Expected: {}, Stray: {}, Main thread: {}",
            self.signals.expected, self.signals.stray, self.signals.unowned
        )?;
        if self.signals.lost > 0 {
            writeln!(f, "  Lost before drain: {}", self.signals.lost)?;
        }

        writeln!(f, "\nThreads: {}, Elements: {}", self.total_threads, self.array_size)
    }
}
