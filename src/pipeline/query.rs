//! Query side: a loaded, read-only index.

use crate::config;
use crate::error::{Error, Result};
use crate::forest::Forest;
use crate::persistence::{FsDirectory, IndexManifest, PersistenceError, SegmentReader};
use crate::store::VectorStore;
use crate::tokens::{DirectoryReader, TokenDirectory};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Per-query knobs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Candidate pool size before re-ranking. `None` uses `k * num_trees`.
    pub search_k: Option<usize>,
    /// Drop the query token from its own results.
    pub exclude_self: bool,
}

/// One ranked result.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Neighbor {
    pub token: String,
    pub id: u32,
    /// Euclidean distance to the query vector.
    pub distance: f32,
}

/// A published index, opened for queries.
///
/// Immutable after [`open`](Self::open); share it across threads freely.
pub struct WordIndex {
    manifest: IndexManifest,
    store: VectorStore,
    forest: Forest,
    tokens: TokenDirectory,
}

impl WordIndex {
    /// Load every artifact and cross-check them against the manifest.
    ///
    /// The token directory is an LMDB environment, which a process opens
    /// once: share one `WordIndex` (e.g. behind an `Arc`) rather than opening
    /// the same path twice.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let directory = Arc::new(FsDirectory::open(path)?);
        let segments = SegmentReader::new(directory);

        let manifest = segments.read_manifest(config::MANIFEST_FILE)?;
        let store = segments.read_vectors(config::VECTORS_FILE)?;
        let forest = segments.read_forest(config::FOREST_FILE)?;
        let tokens = TokenDirectory::open_read_only(path.join(config::TOKENS_DIR))?;

        let count = manifest.count as usize;
        let dimension = manifest.dimension as usize;
        let token_count = tokens.len()?;
        if store.len() != count
            || store.dimension() != dimension
            || forest.num_items() != count
            || forest.dimension() != dimension
            || forest.num_trees() != manifest.num_trees as usize
            || token_count != count
        {
            return Err(PersistenceError::Format(format!(
                "index at {} is inconsistent: manifest {count}x{dimension}, vectors {}x{}, \
                 forest {}x{}, tokens {token_count}",
                path.display(),
                store.len(),
                store.dimension(),
                forest.num_items(),
                forest.dimension(),
            ))
            .into());
        }

        tracing::info!(
            index = %path.display(),
            count,
            dimension,
            num_trees = forest.num_trees(),
            "index loaded"
        );
        Ok(Self {
            manifest,
            store,
            forest,
            tokens,
        })
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    /// Number of indexed tokens.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.store.dimension()
    }

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn tokens(&self) -> &TokenDirectory {
        &self.tokens
    }

    /// Up to `k` nearest tokens to `token`, nearest first. The token itself
    /// is normally the first result.
    pub fn query(&self, token: &str, k: usize) -> Result<Vec<String>> {
        Ok(self
            .query_with(token, k, &QueryOptions::default())?
            .into_iter()
            .map(|n| n.token)
            .collect())
    }

    pub fn query_with(&self, token: &str, k: usize, options: &QueryOptions) -> Result<Vec<Neighbor>> {
        // One read transaction for the forward lookup and every reverse
        // lookup, released on every exit path.
        let reader = self.tokens.reader()?;
        let id = reader.resolve_token(token)?;
        let vector = self.store.get(id)?;
        tracing::debug!(token, id, k, "query");
        let exclude = options.exclude_self.then_some(id);
        self.neighbors(&reader, vector, k, options.search_k, exclude)
    }

    /// Nearest tokens to an arbitrary vector. `exclude_self` has no effect.
    pub fn query_vector(
        &self,
        vector: &[f32],
        k: usize,
        options: &QueryOptions,
    ) -> Result<Vec<Neighbor>> {
        if vector.len() != self.dimension() {
            return Err(Error::DimensionMismatch {
                expected: self.dimension(),
                actual: vector.len(),
            });
        }
        let reader = self.tokens.reader()?;
        self.neighbors(&reader, vector, k, options.search_k, None)
    }

    fn neighbors(
        &self,
        reader: &DirectoryReader<'_>,
        vector: &[f32],
        k: usize,
        search_k: Option<usize>,
        exclude: Option<u32>,
    ) -> Result<Vec<Neighbor>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let fetch = if exclude.is_some() { k.saturating_add(1) } else { k };
        let hits = self.forest.search(&self.store, vector, fetch, search_k)?;
        hits.into_iter()
            .filter(|&(id, _)| Some(id) != exclude)
            .take(k)
            .map(|(id, distance)| {
                Ok(Neighbor {
                    token: reader.resolve_id(id)?,
                    id,
                    distance,
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for WordIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WordIndex")
            .field("count", &self.store.len())
            .field("dimension", &self.store.dimension())
            .field("num_trees", &self.forest.num_trees())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::IngestError;
    use crate::pipeline::{BuildOptions, BuildPipeline};
    use tempfile::TempDir;

    fn build(pairs: &[(&str, &[f32])]) -> (TempDir, WordIndex) {
        let tmp = TempDir::new().unwrap();
        let index = tmp.path().join("words.index");
        let source = pairs
            .iter()
            .map(|(t, v)| Ok::<_, IngestError>((t.to_string(), v.to_vec())));
        BuildPipeline::new(&index, BuildOptions::default())
            .build(source)
            .unwrap();
        let loaded = WordIndex::open(&index).unwrap();
        (tmp, loaded)
    }

    #[test]
    fn cat_dog_car() {
        let (_tmp, index) = build(&[
            ("cat", &[0.0, 1.0]),
            ("dog", &[0.0, 0.9]),
            ("car", &[1.0, 0.0]),
        ]);
        assert_eq!(index.query("cat", 2).unwrap(), vec!["cat", "dog"]);
        assert_eq!(index.query("car", 1).unwrap(), vec!["car"]);
        assert!(index.query("xyzzy", 3).unwrap_err().is_not_found());
    }

    #[test]
    fn exclude_self_drops_query_token() {
        let (_tmp, index) = build(&[
            ("cat", &[0.0, 1.0]),
            ("dog", &[0.0, 0.9]),
            ("car", &[1.0, 0.0]),
        ]);
        let options = QueryOptions {
            exclude_self: true,
            ..QueryOptions::default()
        };
        let hits = index.query_with("cat", 2, &options).unwrap();
        let tokens: Vec<_> = hits.iter().map(|n| n.token.as_str()).collect();
        assert_eq!(tokens, vec!["dog", "car"]);
        assert!((hits[0].distance - 0.1).abs() < 1e-6);
    }

    #[test]
    fn k_zero_and_oversized_k() {
        let (_tmp, index) = build(&[("a", &[0.0]), ("b", &[1.0])]);
        assert!(index.query("a", 0).unwrap().is_empty());
        assert_eq!(index.query("a", 10).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn query_vector_checks_dimension() {
        let (_tmp, index) = build(&[("a", &[0.0, 0.0]), ("b", &[1.0, 1.0])]);
        let err = index
            .query_vector(&[1.0, 1.0, 1.0], 1, &QueryOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
        let hits = index
            .query_vector(&[0.9, 0.9], 1, &QueryOptions::default())
            .unwrap();
        assert_eq!(hits[0].token, "b");
    }

    #[test]
    fn missing_index_fails_to_open() {
        let tmp = TempDir::new().unwrap();
        assert!(WordIndex::open(tmp.path().join("nope")).is_err());
    }
}
