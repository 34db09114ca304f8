//! Workload partitioning
//!
//! Two strategies: contiguous private copies per team (quicksort mode) and
//! a single power-of-two padded array shared by every thread (bitonic mode).

use crate::signals::TeamId;
use serde::Serialize;
use std::ops::Range;
use std::sync::atomic::{AtomicI32, Ordering};

/// Filler for padding slots; sorts to the tail in ascending order
pub const SENTINEL: i32 = i32::MAX;

/// A team's private copy of its contiguous share of the input
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamSlice {
    pub team: TeamId,
    /// Offset of the first element in the input array
    pub start: usize,
    pub values: Vec<i32>,
}

impl TeamSlice {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Positions this slice covers in the input array
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.values.len()
    }
}

/// Range of the input array handed to `team` when `n` elements are
/// split across `teams`: the first `n % teams` teams get one extra element.
pub fn contiguous_range(n: usize, teams: usize, team: TeamId) -> Range<usize> {
    let share = n / teams;
    let remainder = n % teams;
    let start = team * share + team.min(remainder);
    let len = share + usize::from(team < remainder);
    start..start + len
}

/// Deep-copy each team's contiguous share into private storage
pub fn contiguous_copy(values: &[i32], teams: usize) -> Vec<TeamSlice> {
    (0..teams)
        .map(|team| {
            let range = contiguous_range(values.len(), teams, team);
            TeamSlice {
                team,
                start: range.start,
                values: values[range].to_vec(),
            }
        })
        .collect()
}

/// One array shared by all threads, padded with [`SENTINEL`] up to the
/// next power of two.
///
/// Slots are atomics accessed with relaxed ordering; the bitonic engine's
/// barrier provides the happens-before edges between phases and each
/// phase writes a disjoint set of indices.
#[derive(Debug)]
pub struct PaddedArray {
    slots: Box<[AtomicI32]>,
    logical_len: usize,
}

impl PaddedArray {
    pub fn new(values: &[i32]) -> Self {
        let padded = values.len().next_power_of_two();
        let slots = values
            .iter()
            .copied()
            .chain(std::iter::repeat(SENTINEL))
            .take(padded)
            .map(AtomicI32::new)
            .collect();
        Self {
            slots,
            logical_len: values.len(),
        }
    }

    /// Number of input values
    pub fn logical_len(&self) -> usize {
        self.logical_len
    }

    /// Padded size, always a power of two
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> i32 {
        self.slots[index].load(Ordering::Relaxed)
    }

    /// Order the pair `(i, j)` with `i < j` according to `ascending`
    #[inline]
    pub fn compare_exchange(&self, i: usize, j: usize, ascending: bool) {
        let a = self.slots[i].load(Ordering::Relaxed);
        let b = self.slots[j].load(Ordering::Relaxed);
        if (a > b) == ascending && a != b {
            self.slots[i].store(b, Ordering::Relaxed);
            self.slots[j].store(a, Ordering::Relaxed);
        }
    }

    /// Copy out the whole padded array
    pub fn to_vec(&self) -> Vec<i32> {
        self.slots.iter().map(|slot| slot.load(Ordering::Relaxed)).collect()
    }

    /// Copy out only the input-length prefix
    pub fn logical_values(&self) -> Vec<i32> {
        self.slots[..self.logical_len]
            .iter()
            .map(|slot| slot.load(Ordering::Relaxed))
            .collect()
    }
}

/// Flatten (team, local index) into one roster-wide thread index
#[inline]
pub fn global_thread_index(team: TeamId, threads_per_team: usize, local: usize) -> usize {
    team * threads_per_team + local
}

/// Contiguous block of `0..work` that thread `thread` of `total_threads`
/// handles in one phase. Blocks are `ceil(work / total_threads)` long and
/// clipped to `work`; trailing threads may get an empty range.
#[inline]
pub fn phase_block(work: usize, total_threads: usize, thread: usize) -> Range<usize> {
    let block = work.div_ceil(total_threads);
    let start = (thread * block).min(work);
    let end = (start + block).min(work);
    start..end
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_contiguous_sizes_front_load_remainder() {
        let values: Vec<i32> = (0..10).collect();
        let slices = contiguous_copy(&values, 4);
        let sizes: Vec<usize> = slices.iter().map(TeamSlice::len).collect();
        assert_eq!(sizes, vec![3, 3, 2, 2]);
        assert_eq!(slices[2].range(), 6..8);
        assert_eq!(slices[3].values, vec![8, 9]);
    }

    #[test]
    fn test_fewer_elements_than_teams() {
        let slices = contiguous_copy(&[5, 6], 4);
        assert_eq!(slices[0].values, vec![5]);
        assert_eq!(slices[1].values, vec![6]);
        assert!(slices[2].is_empty());
        assert!(slices[3].is_empty());
    }

    #[test]
    fn test_padding_to_power_of_two() {
        let padded = PaddedArray::new(&[7, 3, 9, 1, 4, 8, 2]);
        assert_eq!(padded.len(), 8);
        assert_eq!(padded.logical_len(), 7);
        assert_eq!(padded.get(7), SENTINEL);
        assert_eq!(padded.logical_values(), vec![7, 3, 9, 1, 4, 8, 2]);

        let exact = PaddedArray::new(&[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(exact.len(), 8);
        assert!(exact.to_vec().iter().all(|v| *v != SENTINEL));
    }

    #[test]
    fn test_compare_exchange_direction() {
        let padded = PaddedArray::new(&[5, 2]);
        padded.compare_exchange(0, 1, true);
        assert_eq!(padded.to_vec(), vec![2, 5]);
        padded.compare_exchange(0, 1, false);
        assert_eq!(padded.to_vec(), vec![5, 2]);
    }

    #[test]
    fn test_global_thread_index() {
        assert_eq!(global_thread_index(0, 4, 0), 0);
        assert_eq!(global_thread_index(2, 4, 3), 11);
        assert_eq!(global_thread_index(3, 1, 0), 3);
    }

    #[test]
    fn test_phase_block_clips_tail() {
        assert_eq!(phase_block(10, 4, 0), 0..3);
        assert_eq!(phase_block(10, 4, 3), 9..10);
        assert_eq!(phase_block(2, 16, 1), 1..2);
        assert!(phase_block(2, 16, 5).is_empty());
    }

    proptest! {
        #[test]
        fn prop_contiguous_has_no_gaps_or_overlap(n in 0usize..2000, teams in 1usize..9) {
            let values: Vec<i32> = (0..n as i32).collect();
            let slices = contiguous_copy(&values, teams);
            let mut next = 0;
            for slice in &slices {
                prop_assert_eq!(slice.start, next);
                prop_assert_eq!(&slice.values[..], &values[slice.range()]);
                next = slice.range().end;
            }
            prop_assert_eq!(next, n);
            let max = slices.iter().map(TeamSlice::len).max().unwrap_or(0);
            let min = slices.iter().map(TeamSlice::len).min().unwrap_or(0);
            prop_assert!(max - min <= 1);
        }

        #[test]
        fn prop_phase_blocks_are_disjoint_and_cover(work in 0usize..5000, threads in 1usize..64) {
            let mut covered = 0;
            for t in 0..threads {
                let block = phase_block(work, threads, t);
                prop_assert!(block.is_empty() || block.start == covered);
                covered = covered.max(block.end);
            }
            prop_assert_eq!(covered, work);
        }
    }
}
