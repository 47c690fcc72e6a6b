//! End-to-end behavior of the `Index` facade: self-recall, label uniqueness,
//! capacity, persistence, recall against brute force, and concurrent use.

use hnsw_index::{DistanceKind, HnswError, Index};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

fn random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
        .collect()
}

fn normalized(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    v.iter().map(|x| x / norm).collect()
}

fn build(kind: DistanceKind, data: &[Vec<f32>], m: usize, ef_construction: usize) -> Index {
    let index = Index::new(kind, data[0].len());
    index
        .init_new_index(data.len(), m, ef_construction, 100)
        .unwrap();
    for (i, v) in data.iter().enumerate() {
        index.add_item(v, i as u64).unwrap();
    }
    index
}

fn manhattan(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

#[test]
fn test_self_query_returns_own_label() {
    let raw = random_vectors(500, 16, 1);
    let unit: Vec<Vec<f32>> = raw.iter().map(|v| normalized(v)).collect();

    for (kind, data) in [
        (DistanceKind::Euclidean, &raw),
        (DistanceKind::InnerProduct, &unit),
        (DistanceKind::Custom(manhattan), &raw),
    ] {
        let index = build(kind, data, 16, 100);
        index.set_ef(64).unwrap();
        for (i, v) in data.iter().enumerate() {
            let (labels, distances) = index.knn_query(v, 1).unwrap();
            assert_eq!(labels[0], i as u64, "{kind:?}");
            assert!(distances[0].abs() < 1e-4, "{kind:?}: {}", distances[0]);
        }
    }
}

#[test]
fn test_duplicate_label_leaves_index_unchanged() {
    let data = random_vectors(20, 4, 2);
    let index = build(DistanceKind::Euclidean, &data[..10], 8, 50);
    let before = index.labels().unwrap();

    let err = index.add_item(&data[15], 3).unwrap_err();
    assert!(matches!(err, HnswError::DuplicateLabel(3)));
    assert_eq!(index.len(), 10);
    assert_eq!(index.labels().unwrap(), before);
    assert_eq!(index.get_vector(3).unwrap(), data[3]);
}

#[test]
fn test_capacity_boundary() {
    let data = random_vectors(6, 3, 3);
    let index = Index::new(DistanceKind::Euclidean, 3);
    index.init_new_index(5, 4, 20, 7).unwrap();
    for (i, v) in data[..5].iter().enumerate() {
        index.add_item(v, i as u64).unwrap();
    }
    let query = [0.1, 0.2, 0.3];
    let before = index.knn_query(&query, 5).unwrap();

    let err = index.add_item(&data[5], 5).unwrap_err();
    assert!(matches!(err, HnswError::CapacityExceeded { capacity: 5 }));
    assert_eq!(index.len(), 5);
    assert_eq!(index.labels().unwrap(), vec![0, 1, 2, 3, 4]);
    assert_eq!(index.knn_query(&query, 5).unwrap(), before);
    // the rejected label was never bound
    assert!(matches!(
        index.get_vector(5),
        Err(HnswError::LabelNotFound(5))
    ));
}

#[test]
fn test_save_load_reproduces_queries() {
    let data = random_vectors(800, 12, 4);
    let index = build(DistanceKind::Euclidean, &data, 12, 80);
    index.set_ef(40).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.bin");
    index.save(&path).unwrap();

    let restored = Index::new(DistanceKind::Euclidean, 12);
    restored.load(&path).unwrap();
    restored.set_ef(40).unwrap();

    assert_eq!(restored.labels().unwrap(), index.labels().unwrap());
    assert_eq!(restored.max_elements().unwrap(), 800);
    for query in random_vectors(50, 12, 44) {
        let (la, da) = index.knn_query(&query, 10).unwrap();
        let (lb, db) = restored.knn_query(&query, 10).unwrap();
        assert_eq!(la, lb);
        for (a, b) in da.iter().zip(&db) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}

#[test]
fn test_load_rejects_mismatched_space() {
    let data = random_vectors(10, 5, 5);
    let index = build(DistanceKind::Euclidean, &data, 4, 20);
    let mut snapshot = Vec::new();
    index.save_to_writer(&mut snapshot).unwrap();

    let wrong_dim = Index::new(DistanceKind::Euclidean, 6);
    assert!(matches!(
        wrong_dim.load_from_reader(snapshot.as_slice()),
        Err(HnswError::CorruptFormat(_))
    ));
    let wrong_metric = Index::new(DistanceKind::InnerProduct, 5);
    assert!(matches!(
        wrong_metric.load_from_reader(snapshot.as_slice()),
        Err(HnswError::CorruptFormat(_))
    ));
    assert!(!wrong_metric.is_initialized());
}

fn exact_knn(data: &[Vec<f32>], query: &[f32], k: usize) -> Vec<u64> {
    let mut scored: Vec<(f32, u64)> = data
        .iter()
        .zip(0u64..)
        .map(|(v, label)| {
            let d = v.iter().zip(query).map(|(a, b)| (a - b) * (a - b)).sum();
            (d, label)
        })
        .collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    scored.into_iter().take(k).map(|(_, label)| label).collect()
}

fn recall(index: &Index, truth: &[Vec<u64>], queries: &[Vec<f32>], k: usize) -> f64 {
    let mut hits = 0usize;
    for (q, expected) in queries.iter().zip(truth) {
        let (labels, _) = index.knn_query(q, k).unwrap();
        let expected: HashSet<u64> = expected.iter().copied().collect();
        hits += labels.iter().filter(|l| expected.contains(l)).count();
    }
    hits as f64 / (queries.len() * k) as f64
}

#[test]
fn test_recall_does_not_drop_with_wider_beam() {
    let (n, dim, k) = (3000, 32, 10);
    let data = random_vectors(n, dim, 6);
    let queries = random_vectors(100, dim, 66);

    let index = Index::new(DistanceKind::Euclidean, dim);
    index.init_new_index(n, 16, 100, 100).unwrap();
    let items: Vec<(Vec<f32>, u64)> = data.iter().cloned().zip(0u64..).collect();
    index.add_items(&items).unwrap();

    let truth: Vec<Vec<u64>> = queries.iter().map(|q| exact_knn(&data, q, k)).collect();

    index.set_ef(10).unwrap();
    let low = recall(&index, &truth, &queries, k);
    index.set_ef(100).unwrap();
    let high = recall(&index, &truth, &queries, k);

    assert!(high >= low, "recall@ef=100 {high} < recall@ef=10 {low}");
    assert!(high > 0.85, "recall@ef=100 too low: {high}");
}

#[test]
fn test_concurrent_inserts_and_searches() {
    let (n, dim, writers) = (2000, 8, 4);
    let data = random_vectors(n, dim, 7);
    let index = Index::new(DistanceKind::Euclidean, dim);
    index.init_new_index(n, 12, 64, 100).unwrap();

    std::thread::scope(|s| {
        for w in 0..writers {
            let (index, data) = (&index, &data);
            s.spawn(move || {
                for i in (w..n).step_by(writers) {
                    index.add_item(&data[i], i as u64).unwrap();
                }
            });
        }
        for r in 0..2 {
            let index = &index;
            s.spawn(move || {
                let queries = random_vectors(64, dim, 100 + r);
                while index.len() < n {
                    for p in &queries {
                        let (labels, distances) = index.knn_query(p, 5).unwrap();
                        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
                        for l in labels {
                            assert!((l as usize) < n);
                            // every label a search surfaces is already bound
                            assert!(index.get_vector(l).is_ok(), "uncommitted label {l}");
                        }
                    }
                }
            });
        }
    });

    let expected: Vec<u64> = (0..n as u64).collect();
    assert_eq!(index.labels().unwrap(), expected);

    index.set_ef(64).unwrap();
    let found = data
        .iter()
        .enumerate()
        .filter(|(i, v)| index.knn_query(v, 1).unwrap().0[0] == *i as u64)
        .count();
    assert!(found as f64 >= 0.99 * n as f64, "self recall {found}/{n}");
}

#[test]
fn test_distance_symmetry_between_labels() {
    let data = random_vectors(40, 9, 8);
    for kind in [DistanceKind::Euclidean, DistanceKind::InnerProduct] {
        let index = build(kind, &data, 6, 30);
        for a in 0..40u64 {
            for b in 0..40u64 {
                let ab = index.distance_between_labels(a, b).unwrap();
                let ba = index.distance_between_labels(b, a).unwrap();
                assert!((ab - ba).abs() < 1e-5, "{kind:?} {a},{b}: {ab} vs {ba}");
            }
        }
    }
}

#[test]
fn test_filtered_query_only_returns_accepted_labels() {
    let data = random_vectors(600, 6, 9);
    let index = build(DistanceKind::Euclidean, &data, 8, 60);
    let (labels, _) = index
        .knn_query_filtered(&data[10], 5, |l| l % 3 == 0)
        .unwrap();
    assert_eq!(labels.len(), 5);
    assert!(labels.iter().all(|l| l % 3 == 0));
}

#[test]
fn test_fewer_results_than_k_is_not_an_error() {
    let data = random_vectors(3, 4, 10);
    let index = build(DistanceKind::Euclidean, &data, 4, 10);
    let (labels, distances) = index.knn_query(&data[0], 10).unwrap();
    assert_eq!(labels.len(), 3);
    assert_eq!(distances.len(), 3);
    assert_eq!(labels[0], 0);
}
