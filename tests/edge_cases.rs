//! Edge case tests for wordforest.
//!
//! Boundary inputs for the forest and the vector store, without going
//! through the on-disk pipeline.

use std::collections::HashSet;
use wordforest::forest::{Forest, ForestParams};
use wordforest::store::VectorStore;
use wordforest::Error;

fn store_from(vectors: &[Vec<f32>]) -> VectorStore {
    let mut store = VectorStore::new();
    for v in vectors {
        store.append(v).expect("append");
    }
    store
}

fn small_leaves(num_trees: usize) -> ForestParams {
    ForestParams {
        leaf_capacity: Some(2),
        ..ForestParams::with_trees(num_trees)
    }
}

// =============================================================================
// Dimension edge cases
// =============================================================================

#[test]
fn one_dimensional() {
    let vectors: Vec<Vec<f32>> = (0..64).map(|i| vec![i as f32]).collect();
    let store = store_from(&vectors);
    let forest = Forest::build(&store, &small_leaves(5)).unwrap();

    let results = forest.search(&store, &[10.2], 3, Some(64)).unwrap();
    let ids: Vec<u32> = results.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![10, 11, 9]);
}

#[test]
fn high_dimension() {
    let dim = 1024;
    let vectors: Vec<Vec<f32>> = (0..40)
        .map(|i| (0..dim).map(|d| ((i * d) as f32 * 0.001).sin()).collect())
        .collect();
    let store = store_from(&vectors);
    let forest = Forest::build(&store, &small_leaves(4)).unwrap();

    let results = forest.search(&store, &vectors[7], 5, None).unwrap();
    assert_eq!(results[0].0, 7);
    assert_eq!(results[0].1, 0.0);
}

#[test]
fn wrong_query_dimension() {
    let store = store_from(&[vec![0.0, 1.0], vec![1.0, 0.0]]);
    let forest = Forest::build(&store, &ForestParams::with_trees(2)).unwrap();
    let err = forest.search(&store, &[1.0, 2.0, 3.0], 1, None).unwrap_err();
    assert!(matches!(
        err,
        Error::DimensionMismatch {
            expected: 2,
            actual: 3
        }
    ));
}

// =============================================================================
// Collection size edge cases
// =============================================================================

#[test]
fn single_item() {
    let store = store_from(&[vec![3.0, 4.0]]);
    let forest = Forest::build(&store, &ForestParams::with_trees(3)).unwrap();
    for tree in forest.trees() {
        assert_eq!(tree.nodes().len(), 1);
    }
    let results = forest.search(&store, &[0.0, 0.0], 10, None).unwrap();
    assert_eq!(results, vec![(0, 5.0)]);
}

#[test]
fn empty_store_cannot_build() {
    let store = VectorStore::new();
    assert!(matches!(
        Forest::build(&store, &ForestParams::default()),
        Err(Error::EmptyIndex)
    ));
}

#[test]
fn zero_trees_is_rejected() {
    let store = store_from(&[vec![1.0]]);
    assert!(matches!(
        Forest::build(&store, &ForestParams::with_trees(0)),
        Err(Error::InvalidParameter(_))
    ));
}

#[test]
fn k_zero_is_empty() {
    let store = store_from(&[vec![1.0], vec![2.0]]);
    let forest = Forest::build(&store, &ForestParams::with_trees(1)).unwrap();
    assert!(forest.search(&store, &[1.0], 0, None).unwrap().is_empty());
}

// =============================================================================
// Degenerate data
// =============================================================================

#[test]
fn all_identical_vectors() {
    let vectors = vec![vec![0.5, 0.5, 0.5]; 50];
    let store = store_from(&vectors);
    let forest = Forest::build(&store, &small_leaves(3)).unwrap();

    assert!(forest.stats().forced_leaves >= 3);
    let results = forest.search(&store, &[0.5, 0.5, 0.5], 50, None).unwrap();
    assert_eq!(results.len(), 50);
    // Equal distances fall back to id order.
    let ids: Vec<u32> = results.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, (0..50).collect::<Vec<u32>>());
}

#[test]
fn duplicate_clusters_still_partition() {
    // Two tight clusters of exact duplicates.
    let mut vectors = vec![vec![0.0, 0.0]; 20];
    vectors.extend(vec![vec![10.0, 10.0]; 20]);
    let store = store_from(&vectors);
    let forest = Forest::build(&store, &small_leaves(4)).unwrap();

    for tree in forest.trees() {
        let mut seen = HashSet::new();
        for leaf in tree.leaves() {
            for &id in leaf {
                assert!(seen.insert(id), "id {id} in two leaves");
            }
        }
        assert_eq!(seen.len(), 40);
    }

    let near_origin = forest.search(&store, &[0.1, 0.1], 20, Some(40)).unwrap();
    assert!(near_origin.iter().all(|(id, _)| *id < 20));
}

#[test]
fn zero_vectors_are_indexable() {
    let store = store_from(&[vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]]);
    let forest = Forest::build(&store, &ForestParams::with_trees(2)).unwrap();
    let results = forest.search_by_id(&store, 0, 1, None).unwrap();
    assert_eq!(results, vec![(0, 0.0)]);
}

#[test]
fn store_rejects_mismatched_append() {
    let mut store = VectorStore::new();
    store.append(&[1.0, 2.0]).unwrap();
    let err = store.append(&[1.0, 2.0, 3.0]).unwrap_err();
    assert!(matches!(
        err,
        Error::DimensionMismatch {
            expected: 2,
            actual: 3
        }
    ));
    assert_eq!(store.len(), 1);
    assert!(store.get(1).unwrap_err().is_not_found());
}
