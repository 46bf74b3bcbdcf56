//! Batch throughput benchmarks across thread counts
//!
//! Run with: cargo bench --package annbatch-index

use annbatch_core::config::SpaceKind;
use annbatch_index::{BatchIndex, FlatIndex, IndexOptions, MatrixView, VamanaIndex};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;

const DIM: usize = 64;

fn random_vectors(n: usize, dim: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..n * dim).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn bench_distance_kernels(c: &mut Criterion) {
    let mut group = c.benchmark_group("kernels");

    for dim in [64, 384, 1536] {
        let a = random_vectors(1, dim);
        let b = random_vectors(1, dim);

        group.throughput(Throughput::Elements(1));
        group.bench_function(format!("l2_dim_{}", dim), |bencher| {
            bencher.iter(|| annbatch_index::l2_distance_squared(black_box(&a), black_box(&b)))
        });
        group.bench_function(format!("dot_dim_{}", dim), |bencher| {
            bencher.iter(|| annbatch_index::dot_product(black_box(&a), black_box(&b)))
        });
    }

    group.finish();
}

fn bench_add_items(c: &mut Criterion) {
    let n = 2_000;
    let data = random_vectors(n, DIM);
    let batch = MatrixView::row_major(&data, n, DIM).unwrap();

    let mut group = c.benchmark_group("add_items_vamana");
    group.sample_size(10);
    group.throughput(Throughput::Elements(n as u64));

    for threads in [0, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |bencher, &threads| {
            bencher.iter(|| {
                let options = IndexOptions::new(SpaceKind::L2, DIM, n).with_ef_construction(64);
                let mut index = BatchIndex::<VamanaIndex>::new(options).unwrap();
                index.set_num_threads(threads);
                index.add_items(&batch).unwrap();
                black_box(index.size())
            })
        });
    }

    group.finish();
}

fn bench_get_all_nns(c: &mut Criterion) {
    let n = 10_000;
    let nq = 200;
    let k = 10;
    let data = random_vectors(n, DIM);
    let queries = random_vectors(nq, DIM);
    let queries = MatrixView::row_major(&queries, nq, DIM).unwrap();

    let mut index = BatchIndex::<FlatIndex>::new(IndexOptions::new(SpaceKind::L2, DIM, n)).unwrap();
    index.set_num_threads(8);
    index.add_items(&MatrixView::row_major(&data, n, DIM).unwrap()).unwrap();

    let mut group = c.benchmark_group("get_all_nns_flat");
    group.throughput(Throughput::Elements(nq as u64));

    for threads in [0, 2, 4, 8] {
        index.set_num_threads(threads);
        group.bench_function(BenchmarkId::from_parameter(threads), |bencher| {
            bencher.iter(|| black_box(index.get_all_nns(&queries, k).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_distance_kernels, bench_add_items, bench_get_all_nns);
criterion_main!(benches);
