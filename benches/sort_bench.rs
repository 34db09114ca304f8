//! Performance benchmarks for the two sort engines

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use team_signal_sort::partition::contiguous_copy;
use team_signal_sort::sort::{parallel_bitonic_sort, quicksort};

fn workload(n: usize) -> Vec<i32> {
    let mut rng = StdRng::seed_from_u64(1);
    (0..n).map(|_| rng.gen_range(0..10_000)).collect()
}

fn benchmark_quicksort(c: &mut Criterion) {
    let mut group = c.benchmark_group("quicksort_team_slices");
    for n in [10_000usize, 100_000] {
        let values = workload(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &values, |b, values| {
            b.iter(|| {
                for mut slice in contiguous_copy(values, 4) {
                    quicksort(&mut slice.values);
                    black_box(&slice);
                }
            });
        });
    }
    group.finish();
}

fn benchmark_bitonic(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_bitonic");
    group.sample_size(20);
    let values = workload(10_000);
    for threads in [1usize, 4, 16] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            b.iter(|| black_box(parallel_bitonic_sort(&values, threads)));
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_quicksort, benchmark_bitonic);
criterion_main!(benches);
