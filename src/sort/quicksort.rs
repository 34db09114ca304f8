//! Partition-exchange sort with a fixed last-element pivot
//!
//! The pivot choice is deliberate: already-sorted and reverse-sorted input
//! take quadratic time. Recursion descends into the smaller partition and
//! loops over the larger one, which bounds stack depth to O(log n) without
//! changing which partitions are produced.

/// Lomuto partition around `values[last]`. Returns the pivot's final index.
pub fn partition(values: &mut [i32]) -> usize {
    let high = values.len() - 1;
    let pivot = values[high];
    let mut store = 0;

    for j in 0..high {
        if values[j] < pivot {
            values.swap(store, j);
            store += 1;
        }
    }
    values.swap(store, high);
    store
}

/// Sort ascending in place
pub fn quicksort(values: &mut [i32]) {
    let mut rest = values;
    while rest.len() > 1 {
        let pivot = partition(rest);
        let (left, right) = std::mem::take(&mut rest).split_at_mut(pivot);
        let right = &mut right[1..];

        if left.len() < right.len() {
            quicksort(left);
            rest = right;
        } else {
            quicksort(right);
            rest = left;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_partition_places_pivot() {
        let mut values = vec![7, 2, 9, 4, 5];
        let pivot = partition(&mut values);
        assert_eq!(pivot, 2);
        assert_eq!(values[pivot], 5);
        assert!(values[..pivot].iter().all(|v| *v < 5));
        assert!(values[pivot + 1..].iter().all(|v| *v >= 5));
    }

    #[test]
    fn test_small_inputs() {
        let mut empty: Vec<i32> = vec![];
        quicksort(&mut empty);
        assert!(empty.is_empty());

        let mut one = vec![42];
        quicksort(&mut one);
        assert_eq!(one, vec![42]);

        let mut dupes = vec![3, 3, 1, 3, 1];
        quicksort(&mut dupes);
        assert_eq!(dupes, vec![1, 1, 3, 3, 3]);
    }

    #[test]
    fn test_adversarial_input_does_not_overflow_stack() {
        // 最悪ケース（整列済み・逆順）でもスタックを使い切らない
        let mut sorted: Vec<i32> = (0..10_000).collect();
        quicksort(&mut sorted);
        assert!(sorted.windows(2).all(|w| w[0] <= w[1]));

        let mut reversed: Vec<i32> = (0..10_000).rev().collect();
        quicksort(&mut reversed);
        assert_eq!(reversed, (0..10_000).collect::<Vec<_>>());
    }

    proptest! {
        #[test]
        fn prop_sorts_a_permutation(
            mut values in proptest::collection::vec(-1000i32..1000, 0..500)
        ) {
            let mut expected = values.clone();
            expected.sort_unstable();
            quicksort(&mut values);
            prop_assert_eq!(values, expected);
        }
    }
}
