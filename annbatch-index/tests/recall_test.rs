//! # Recall Tests
//!
//! Compare the graph engine (Vamana) against the flat engine (ground truth),
//! both driven through `BatchIndex`.
//! Metric: Recall@K = |graph results ∩ flat results| / K

use std::collections::HashSet;

use annbatch_core::config::SpaceKind;
use annbatch_index::{BatchIndex, FlatIndex, IndexOptions, MatrixView, VamanaIndex};
use rand::Rng;

fn random_vectors(n: usize, dim: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..n * dim).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn recall_at_k(graph_results: &[i64], flat_results: &[i64], k: usize) -> f32 {
    let graph_set: HashSet<_> = graph_results.iter().take(k).collect();
    let flat_set: HashSet<_> = flat_results.iter().take(k).collect();
    graph_set.intersection(&flat_set).count() as f32 / k as f32
}

fn average_recall(space: SpaceKind, threads: usize) -> f32 {
    let n = 2_000;
    let dim = 32;
    let k = 10;
    let num_queries = 50;

    let data = random_vectors(n, dim);
    let batch = MatrixView::row_major(&data, n, dim).unwrap();
    let options = IndexOptions::new(space, dim, n).with_m(16).with_ef_construction(100);

    let mut flat = BatchIndex::<FlatIndex>::new(options).unwrap();
    flat.set_num_threads(threads);
    flat.add_items(&batch).unwrap();

    let mut graph = BatchIndex::<VamanaIndex>::new(options).unwrap();
    graph.set_num_threads(threads);
    graph.set_ef(64);
    graph.add_items(&batch).unwrap();
    assert_eq!(graph.size(), n);

    let queries = random_vectors(num_queries, dim);
    let queries = MatrixView::row_major(&queries, num_queries, dim).unwrap();
    let truth = flat.get_all_nns(&queries, k).unwrap();
    let found = graph.get_all_nns(&queries, k).unwrap();

    let total: f32 = (0..num_queries)
        .map(|q| recall_at_k(&found.item(q), &truth.item(q), k))
        .sum();
    total / num_queries as f32
}

#[test]
fn test_recall_l2_sequential_build() {
    let recall = average_recall(SpaceKind::L2, 0);
    println!("Recall@10 (L2, sequential): {:.1}%", recall * 100.0);
    assert!(recall >= 0.7, "Recall too low: {:.1}%", recall * 100.0);
}

#[test]
fn test_recall_l2_threaded_build() {
    let recall = average_recall(SpaceKind::L2, 4);
    println!("Recall@10 (L2, 4 threads): {:.1}%", recall * 100.0);
    assert!(recall >= 0.7, "Recall too low: {:.1}%", recall * 100.0);
}

#[test]
fn test_recall_cosine_threaded_build() {
    let recall = average_recall(SpaceKind::Cosine, 4);
    println!("Recall@10 (cosine, 4 threads): {:.1}%", recall * 100.0);
    assert!(recall >= 0.7, "Recall too low: {:.1}%", recall * 100.0);
}
