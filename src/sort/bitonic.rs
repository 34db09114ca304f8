//! Cooperative bitonic sort over a shared padded array
//!
//! The recursive schedule (sort halves in opposite directions, then merge)
//! is walked level by level. Every level is one compare-and-swap phase in
//! which the `P/2` comparisons of that level are split contiguously across
//! the whole roster with [`phase_block`]. Comparison `c` at stride `s`
//! touches indices `i = (c / s) * 2s + c % s` and `i + s`; distinct `c`
//! map to disjoint index pairs, so threads never touch the same slot within
//! a phase. Each phase is bracketed by two barrier rendezvous, which order
//! all writes of one phase before all reads of the next.

use crate::partition::{phase_block, PaddedArray};
use std::sync::Barrier;
use std::thread;

/// Index pair compared by comparison `c` at the given stride
#[inline]
pub fn comparison_pair(c: usize, stride: usize) -> (usize, usize) {
    let i = (c / stride) * 2 * stride + c % stride;
    (i, i + stride)
}

/// Number of compare-and-swap phases for a padded length of `2^k`: k(k+1)/2
pub fn phase_count(padded_len: usize) -> usize {
    debug_assert!(padded_len.is_power_of_two());
    let k = padded_len.trailing_zeros() as usize;
    k * (k + 1) / 2
}

/// Barrier rendezvous each participating thread performs
pub fn rendezvous_per_thread(padded_len: usize) -> usize {
    phase_count(padded_len) * 2
}

/// One thread's share of the cooperative sort
pub struct BitonicWorker<'a> {
    array: &'a PaddedArray,
    barrier: &'a Barrier,
    thread: usize,
    total_threads: usize,
    rendezvous: usize,
}

impl<'a> BitonicWorker<'a> {
    /// `barrier` must have been created for exactly `total_threads` parties
    pub fn new(
        array: &'a PaddedArray,
        barrier: &'a Barrier,
        thread: usize,
        total_threads: usize,
    ) -> Self {
        debug_assert!(thread < total_threads);
        Self {
            array,
            barrier,
            thread,
            total_threads,
            rendezvous: 0,
        }
    }

    fn rendezvous(&mut self) {
        self.barrier.wait();
        self.rendezvous += 1;
    }

    fn compare_phase(&self, size: usize, stride: usize) {
        let pairs = self.array.len() / 2;
        for c in phase_block(pairs, self.total_threads, self.thread) {
            let (i, j) = comparison_pair(c, stride);
            // Blocks of length `size` alternate ascending/descending; at the
            // top level every index has that bit clear.
            let ascending = i & size == 0;
            self.array.compare_exchange(i, j, ascending);
        }
    }

    /// Run every phase to completion. Returns the number of rendezvous
    /// this thread took part in.
    pub fn run(mut self) -> usize {
        let len = self.array.len();
        let mut size = 2;
        while size <= len {
            let mut stride = size / 2;
            while stride >= 1 {
                self.rendezvous();
                self.compare_phase(size, stride);
                self.rendezvous();
                stride /= 2;
            }
            size *= 2;
        }
        self.rendezvous
    }
}

/// Sort `values` with `threads` cooperating scoped threads. Returns the
/// padded array; its logical prefix holds the sorted input.
pub fn parallel_bitonic_sort(values: &[i32], threads: usize) -> PaddedArray {
    let threads = threads.max(1);
    let array = PaddedArray::new(values);
    let barrier = Barrier::new(threads);

    thread::scope(|scope| {
        for t in 0..threads {
            let array = &array;
            let barrier = &barrier;
            scope.spawn(move || BitonicWorker::new(array, barrier, t, threads).run());
        }
    });
    array
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::SENTINEL;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_phase_pairs_are_disjoint() {
        let len = 64;
        let mut size = 2;
        while size <= len {
            let mut stride = size / 2;
            while stride >= 1 {
                let mut seen = HashSet::new();
                for c in 0..len / 2 {
                    let (i, j) = comparison_pair(c, stride);
                    assert!(j < len);
                    assert!(seen.insert(i), "index {} touched twice", i);
                    assert!(seen.insert(j), "index {} touched twice", j);
                }
                assert_eq!(seen.len(), len);
                stride /= 2;
            }
            size *= 2;
        }
    }

    #[test]
    fn test_phase_count() {
        assert_eq!(phase_count(1), 0);
        assert_eq!(phase_count(2), 1);
        assert_eq!(phase_count(8), 6);
        assert_eq!(phase_count(16_384), 105);
        assert_eq!(rendezvous_per_thread(8), 12);
    }

    #[test]
    fn test_eight_elements_four_threads() {
        let values = [8, 3, 5, 1, 7, 2, 6, 4];
        let sorted = parallel_bitonic_sort(&values, 4);
        assert_eq!(sorted.to_vec(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_seven_elements_padded_with_sentinel() {
        let values = [9, -4, 12, 0, 3, 3, 7];
        let sorted = parallel_bitonic_sort(&values, 3);
        assert_eq!(sorted.len(), 8);
        assert_eq!(sorted.logical_values(), vec![-4, 0, 3, 3, 7, 9, 12]);
        assert_eq!(sorted.get(7), SENTINEL);
    }

    #[test]
    fn test_more_threads_than_comparisons() {
        let sorted = parallel_bitonic_sort(&[2, 1], 16);
        assert_eq!(sorted.to_vec(), vec![1, 2]);
    }

    #[test]
    fn test_every_thread_counts_the_same_rendezvous() {
        let array = Arc::new(PaddedArray::new(&(0..100).rev().collect::<Vec<i32>>()));
        let barrier = Arc::new(Barrier::new(5));
        let handles: Vec<_> = (0..5)
            .map(|t| {
                let array = array.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || BitonicWorker::new(&array, &barrier, t, 5).run())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), rendezvous_per_thread(128));
        }
        assert_eq!(array.logical_values(), (0..100).collect::<Vec<i32>>());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]
        #[test]
        fn prop_bitonic_matches_std_sort(
            values in proptest::collection::vec(-500i32..500, 1..300),
            threads in 1usize..9,
        ) {
            let mut expected = values.clone();
            expected.sort_unstable();
            let sorted = parallel_bitonic_sort(&values, threads);
            prop_assert_eq!(sorted.logical_values(), expected);
            for i in values.len()..sorted.len() {
                prop_assert_eq!(sorted.get(i), SENTINEL);
            }
        }
    }
}
