//! Property-based tests for wordforest.
//!
//! These tests verify invariants that should hold regardless of input:
//! - Every tree partitions the full id set
//! - Search results are sorted, distinct, in range, and exactly scored
//! - A stored vector finds itself at distance zero
//! - The token directory is a bijection

use proptest::prelude::*;
use std::collections::HashSet;
use tempfile::TempDir;
use wordforest::distance::l2_distance;
use wordforest::forest::{Forest, ForestParams};
use wordforest::store::VectorStore;
use wordforest::TokenDirectory;

prop_compose! {
    fn arb_vectors(dim: usize, max_len: usize)
        (vectors in prop::collection::vec(
            prop::collection::vec(-10.0f32..10.0, dim),
            1..max_len,
        )) -> Vec<Vec<f32>> {
        vectors
    }
}

fn build(vectors: &[Vec<f32>], num_trees: usize, leaf_capacity: usize, seed: u64) -> (VectorStore, Forest) {
    let mut store = VectorStore::new();
    for v in vectors {
        store.append(v).unwrap();
    }
    let params = ForestParams {
        leaf_capacity: Some(leaf_capacity),
        seed,
        ..ForestParams::with_trees(num_trees)
    };
    let forest = Forest::build(&store, &params).unwrap();
    (store, forest)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn every_tree_partitions_all_ids(
        vectors in arb_vectors(3, 80),
        num_trees in 1usize..6,
        leaf_capacity in 1usize..8,
        seed in any::<u64>(),
    ) {
        let (store, forest) = build(&vectors, num_trees, leaf_capacity, seed);
        prop_assert_eq!(forest.num_trees(), num_trees);
        for tree in forest.trees() {
            let mut seen = HashSet::new();
            for leaf in tree.leaves() {
                prop_assert!(!leaf.is_empty());
                for &id in leaf {
                    prop_assert!(seen.insert(id), "id {} appears twice", id);
                }
            }
            prop_assert_eq!(seen.len(), store.len());
        }
    }

    #[test]
    fn search_results_are_well_formed(
        vectors in arb_vectors(4, 60),
        query in prop::collection::vec(-10.0f32..10.0, 4),
        k in 1usize..20,
        seed in any::<u64>(),
    ) {
        let (store, forest) = build(&vectors, 4, 3, seed);
        let results = forest.search(&store, &query, k, None).unwrap();

        prop_assert!(results.len() <= k);
        prop_assert!(!results.is_empty());
        let mut ids = HashSet::new();
        for &(id, distance) in &results {
            prop_assert!((id as usize) < store.len());
            prop_assert!(ids.insert(id));
            let exact = l2_distance(&query, store.get(id).unwrap());
            prop_assert_eq!(distance, exact);
        }
        for pair in results.windows(2) {
            prop_assert!(
                pair[0].1 < pair[1].1 || (pair[0].1 == pair[1].1 && pair[0].0 < pair[1].0),
                "not sorted: {:?}",
                pair
            );
        }
    }

    #[test]
    fn stored_vector_finds_itself(
        vectors in arb_vectors(3, 60),
        pick in any::<prop::sample::Index>(),
        seed in any::<u64>(),
    ) {
        let (store, forest) = build(&vectors, 3, 2, seed);
        let id = pick.index(store.len()) as u32;
        let results = forest.search_by_id(&store, id, 1, None).unwrap();
        prop_assert_eq!(results.len(), 1);
        prop_assert_eq!(results[0].1, 0.0);
    }

    #[test]
    fn full_search_k_is_exact(
        vectors in arb_vectors(2, 50),
        query in prop::collection::vec(-10.0f32..10.0, 2),
        k in 1usize..10,
    ) {
        let (store, forest) = build(&vectors, 2, 2, 1);
        let approx = forest.search(&store, &query, k, Some(store.len())).unwrap();

        let mut exact: Vec<(u32, f32)> = (0..store.len() as u32)
            .map(|id| (id, l2_distance(&query, store.get(id).unwrap())))
            .collect();
        exact.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        exact.truncate(k);
        prop_assert_eq!(approx, exact);
    }

    #[test]
    fn same_seed_same_forest(
        vectors in arb_vectors(3, 40),
        seed in any::<u64>(),
    ) {
        let (_, a) = build(&vectors, 3, 2, seed);
        let (_, b) = build(&vectors, 3, 2, seed);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn directory_is_a_bijection(
        tokens in prop::collection::hash_set("[a-z]{1,8}", 1..40),
    ) {
        let tmp = TempDir::new().unwrap();
        let directory = TokenDirectory::create(tmp.path().join("tokens")).unwrap();
        let tokens: Vec<String> = tokens.into_iter().collect();
        let mut writer = directory.writer().unwrap();
        for (id, token) in tokens.iter().enumerate() {
            writer.put(token, id as u32).unwrap();
        }
        writer.commit().unwrap();

        prop_assert_eq!(directory.len().unwrap(), tokens.len());
        for (id, token) in tokens.iter().enumerate() {
            let id = id as u32;
            prop_assert_eq!(directory.resolve_token(token).unwrap(), id);
            prop_assert_eq!(&directory.resolve_id(id).unwrap(), token);
        }
    }
}
