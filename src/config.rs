//! Run configuration
//!
//! Values normally come from the command line; a JSON file can supply the
//! same fields. Everything is checked by [`RunConfig::validate`] before the
//! orchestrator allocates anything.

use crate::errors::{Result, SortError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Number of teams. Fixed by the signal assignment table.
pub const TEAM_COUNT: usize = 4;
pub const DEFAULT_ARRAY_SIZE: usize = 10_000;
pub const DEFAULT_THREADS_PER_TEAM: usize = 4;
pub const MAX_ARRAY_SIZE: usize = 10_000_000;
pub const MAX_THREADS_PER_TEAM: usize = 10_000;
/// Above this many threads a warning is logged.
pub const HIGH_THREAD_COUNT: usize = 1_000;
/// Generated values are drawn from `0..VALUE_RANGE`.
pub const VALUE_RANGE: i32 = 10_000;

/// Which sorting strategy the teams run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    /// Each team quicksorts a private copy of its contiguous slice
    #[default]
    Quicksort,
    /// All threads cooperate on one padded shared array
    Bitonic,
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quicksort => write!(f, "quicksort"),
            Self::Bitonic => write!(f, "bitonic"),
        }
    }
}

impl FromStr for SortMode {
    type Err = SortError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "quicksort" | "quick" => Ok(Self::Quicksort),
            "bitonic" => Ok(Self::Bitonic),
            other => Err(SortError::InvalidConfig(format!(
                "unknown sort mode '{}'",
                other
            ))),
        }
    }
}

/// Parameters of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Total number of elements to sort
    pub array_size: usize,
    /// Worker threads in each of the [`TEAM_COUNT`] teams
    pub threads_per_team: usize,
    pub mode: SortMode,
    /// How long workers stay alive after completion to receive external signals
    #[serde(with = "duration_millis")]
    pub linger: Duration,
    /// Seed for the generated workload; random when absent
    pub seed: Option<u64>,
    /// Poll interval of the signal event drain thread
    #[serde(with = "duration_millis")]
    pub drain_interval: Duration,
    /// Slots in the signal event ring (rounded up to a power of two)
    pub event_capacity: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            array_size: DEFAULT_ARRAY_SIZE,
            threads_per_team: DEFAULT_THREADS_PER_TEAM,
            mode: SortMode::default(),
            linger: Duration::ZERO,
            seed: None,
            drain_interval: Duration::from_millis(5),
            event_capacity: 1024,
        }
    }
}

impl RunConfig {
    pub fn new(array_size: usize, threads_per_team: usize, mode: SortMode) -> Self {
        Self {
            array_size,
            threads_per_team,
            mode,
            ..Self::default()
        }
    }

    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let display = path.to_string_lossy().to_string();

        let content = fs::read_to_string(path).map_err(|e| SortError::Config {
            path: display.clone(),
            reason: e.to_string(),
        })?;

        serde_json::from_str(&content).map_err(|e| SortError::Config {
            path: display,
            reason: e.to_string(),
        })
    }

    pub fn total_threads(&self) -> usize {
        TEAM_COUNT * self.threads_per_team
    }

    /// Check bounds before any allocation happens
    pub fn validate(&self) -> Result<()> {
        if self.array_size == 0 || self.array_size > MAX_ARRAY_SIZE {
            return Err(SortError::InvalidConfig(format!(
                "array size {} must be within 1..={}",
                self.array_size, MAX_ARRAY_SIZE
            )));
        }
        if self.threads_per_team == 0 || self.threads_per_team > MAX_THREADS_PER_TEAM {
            return Err(SortError::InvalidConfig(format!(
                "threads per team {} must be within 1..={}",
                self.threads_per_team, MAX_THREADS_PER_TEAM
            )));
        }
        if self.event_capacity == 0 {
            return Err(SortError::InvalidConfig(
                "event capacity must be positive".into(),
            ));
        }
        if self.drain_interval.is_zero() {
            return Err(SortError::InvalidConfig(
                "drain interval must be positive".into(),
            ));
        }
        Ok(())
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
