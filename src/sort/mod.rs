//! Sort engines and their advisory verification

pub mod bitonic;
pub mod quicksort;

pub use bitonic::{parallel_bitonic_sort, rendezvous_per_thread, BitonicWorker};
pub use quicksort::{partition, quicksort};

use serde::Serialize;
use std::fmt;

/// Elements checked after a team quicksort
pub const QUICKSORT_VERIFY_PREFIX: usize = 100;

/// Result of the post-sort order check. Advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verification {
    Passed,
    Failed,
}

impl Verification {
    pub fn passed(self) -> bool {
        self == Self::Passed
    }
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "PASSED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Check that `values` is in ascending order
pub fn verify_ascending(values: &[i32]) -> Verification {
    if values.windows(2).all(|pair| pair[0] <= pair[1]) {
        Verification::Passed
    } else {
        Verification::Failed
    }
}

/// Check only the first `limit` elements (or all of them if fewer)
pub fn verify_prefix(values: &[i32], limit: usize) -> Verification {
    verify_ascending(&values[..values.len().min(limit)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_ascending() {
        assert_eq!(verify_ascending(&[]), Verification::Passed);
        assert_eq!(verify_ascending(&[3]), Verification::Passed);
        assert_eq!(verify_ascending(&[1, 1, 2]), Verification::Passed);
        assert_eq!(verify_ascending(&[2, 1]), Verification::Failed);
    }

    #[test]
    fn test_verify_prefix_ignores_tail() {
        let mut values: Vec<i32> = (0..150).collect();
        values[120] = -1;
        assert_eq!(verify_prefix(&values, QUICKSORT_VERIFY_PREFIX), Verification::Passed);
        values[50] = -1;
        assert_eq!(verify_prefix(&values, QUICKSORT_VERIFY_PREFIX), Verification::Failed);
        assert_eq!(verify_prefix(&[2, 1], QUICKSORT_VERIFY_PREFIX), Verification::Failed);
    }
}
