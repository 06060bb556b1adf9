//! Build pipeline: ingest, index, persist, publish.

use crate::config;
use crate::error::{Error, Result};
use crate::forest::{Forest, ForestParams};
use crate::ingest::{Embedding, IngestError};
use crate::persistence::format::FORMAT_VERSION;
use crate::persistence::{Directory, FsDirectory, IndexManifest, SegmentWriter};
use crate::store::VectorStore;
use crate::tokens::TokenDirectory;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Build configuration.
#[derive(Clone, Debug, Default)]
pub struct BuildOptions {
    pub forest: ForestParams,
    /// Log ingestion progress every [`config::PROGRESS_EVERY`] items.
    pub verbose: bool,
}

/// Summary of a completed build.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildStats {
    pub count: usize,
    pub dimension: usize,
    pub num_trees: usize,
    pub leaf_capacity: usize,
    pub forced_leaves: usize,
    pub elapsed: Duration,
}

/// What [`BuildPipeline::build`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
    /// A new index was published.
    Built(BuildStats),
    /// A complete index was already present; nothing was touched.
    AlreadyBuilt(IndexManifest),
}

/// Builds an index directory from a stream of embeddings.
///
/// Artifacts are written into `<index>.staging` and renamed into place only
/// after every one of them is on disk, so a failed build never leaves a
/// partial index where readers look.
#[derive(Debug, Clone)]
pub struct BuildPipeline {
    index_path: PathBuf,
    options: BuildOptions,
}

impl BuildPipeline {
    pub fn new(index_path: impl Into<PathBuf>, options: BuildOptions) -> Self {
        Self {
            index_path: index_path.into(),
            options,
        }
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Manifest of the published index, `None` if there is none yet.
    ///
    /// A manifest that exists but cannot be read is an error rather than
    /// "absent", so a damaged index is never silently rebuilt over.
    pub fn existing_manifest(&self) -> Result<Option<IndexManifest>> {
        let path = self.index_path.join(config::MANIFEST_FILE);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let manifest = IndexManifest::from_json(&raw)?;
        Ok((manifest.count > 0).then_some(manifest))
    }

    /// Build unless a complete index is already published.
    pub fn build<I>(&self, source: I) -> Result<BuildOutcome>
    where
        I: IntoIterator<Item = std::result::Result<Embedding, IngestError>>,
    {
        if let Some(manifest) = self.existing_manifest()? {
            tracing::info!(
                index = %self.index_path.display(),
                count = manifest.count,
                "index already built, skipping"
            );
            return Ok(BuildOutcome::AlreadyBuilt(manifest));
        }
        self.run(source).map(BuildOutcome::Built)
    }

    /// Build and replace any published index.
    pub fn rebuild<I>(&self, source: I) -> Result<BuildStats>
    where
        I: IntoIterator<Item = std::result::Result<Embedding, IngestError>>,
    {
        self.run(source)
    }

    fn run<I>(&self, source: I) -> Result<BuildStats>
    where
        I: IntoIterator<Item = std::result::Result<Embedding, IngestError>>,
    {
        let staging = sibling(&self.index_path, config::STAGING_SUFFIX)?;
        if staging.exists() {
            tracing::warn!(
                staging = %staging.display(),
                "removing leftover staging directory"
            );
            fs::remove_dir_all(&staging)?;
        }

        let result = self
            .write_staged(&staging, source)
            .and_then(|stats| self.publish(&staging).map(|()| stats));
        if result.is_err() && staging.exists() {
            if let Err(e) = fs::remove_dir_all(&staging) {
                tracing::warn!(
                    staging = %staging.display(),
                    error = %e,
                    "failed to clean up staging directory"
                );
            }
        }
        result
    }

    fn write_staged<I>(&self, staging: &Path, source: I) -> Result<BuildStats>
    where
        I: IntoIterator<Item = std::result::Result<Embedding, IngestError>>,
    {
        let started = Instant::now();
        let directory: Arc<dyn Directory> = Arc::new(FsDirectory::new(staging)?);
        let tokens = TokenDirectory::create(staging.join(config::TOKENS_DIR))?;
        let mut store = VectorStore::new();

        // Vector append and token insert happen together per item. Every
        // token goes into one write transaction, committed once the source
        // is exhausted.
        let mut writer = tokens.writer()?;
        for item in source {
            let (token, vector) = item?;
            let id = store.append(&vector)?;
            writer.put(&token, id)?;
            if self.options.verbose && store.len() % config::PROGRESS_EVERY == 0 {
                tracing::info!(count = store.len(), "ingesting");
            }
        }
        if store.is_empty() {
            return Err(Error::EmptyIndex);
        }
        tracing::info!(
            count = store.len(),
            dimension = store.dimension(),
            "ingestion finished, building forest"
        );
        writer.commit()?;

        let forest = Forest::build(&store, &self.options.forest)?;

        let segments = SegmentWriter::new(directory);
        segments.write_vectors(config::VECTORS_FILE, &store)?;
        segments.write_forest(config::FOREST_FILE, &forest)?;

        let manifest = IndexManifest {
            version: FORMAT_VERSION,
            dimension: store.dimension() as u32,
            count: store.len() as u64,
            num_trees: forest.num_trees() as u32,
            leaf_capacity: forest.leaf_capacity() as u32,
            seed: forest.seed(),
            created_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        };
        // The manifest goes last: it is what marks the index complete.
        segments.write_manifest(config::MANIFEST_FILE, &manifest)?;

        Ok(BuildStats {
            count: store.len(),
            dimension: store.dimension(),
            num_trees: forest.num_trees(),
            leaf_capacity: forest.leaf_capacity(),
            forced_leaves: forest.stats().forced_leaves,
            elapsed: started.elapsed(),
        })
    }

    /// Move the staged index into place, retiring any existing one.
    fn publish(&self, staging: &Path) -> Result<()> {
        if !self.index_path.exists() {
            fs::rename(staging, &self.index_path)?;
        } else {
            let retired = sibling(&self.index_path, config::RETIRED_SUFFIX)?;
            if retired.exists() {
                fs::remove_dir_all(&retired)?;
            }
            fs::rename(&self.index_path, &retired)?;
            if let Err(e) = fs::rename(staging, &self.index_path) {
                // Put the previous index back before reporting.
                if let Err(restore) = fs::rename(&retired, &self.index_path) {
                    tracing::error!(
                        retired = %retired.display(),
                        error = %restore,
                        "failed to restore previous index"
                    );
                }
                return Err(e.into());
            }
            if let Err(e) = fs::remove_dir_all(&retired) {
                tracing::warn!(
                    retired = %retired.display(),
                    error = %e,
                    "failed to remove retired index"
                );
            }
        }
        tracing::info!(index = %self.index_path.display(), "index published");
        Ok(())
    }
}

/// `<dir>/<name>.<suffix>` next to `path`.
fn sibling(path: &Path, suffix: &str) -> Result<PathBuf> {
    let name = path.file_name().ok_or_else(|| {
        Error::InvalidParameter(format!("index path {} has no file name", path.display()))
    })?;
    let mut name = name.to_os_string();
    name.push(".");
    name.push(suffix);
    Ok(path.with_file_name(name))
}

/// Index directory used for an embeddings file: `<embeddings>.index`.
pub fn default_index_path(embeddings: &Path) -> PathBuf {
    sibling(embeddings, config::INDEX_SUFFIX).unwrap_or_else(|_| {
        let mut path = embeddings.as_os_str().to_os_string();
        path.push(".");
        path.push(config::INDEX_SUFFIX);
        PathBuf::from(path)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn items(pairs: &[(&str, &[f32])]) -> Vec<std::result::Result<Embedding, IngestError>> {
        pairs
            .iter()
            .map(|(t, v)| Ok((t.to_string(), v.to_vec())))
            .collect()
    }

    #[test]
    fn sibling_appends_suffix() {
        let p = sibling(Path::new("/data/glove.txt.index"), "staging").unwrap();
        assert_eq!(p, PathBuf::from("/data/glove.txt.index.staging"));
        assert!(sibling(Path::new("/"), "staging").is_err());
    }

    #[test]
    fn default_index_path_follows_embeddings() {
        assert_eq!(
            default_index_path(Path::new("glove.6B.50d.txt")),
            PathBuf::from("glove.6B.50d.txt.index")
        );
    }

    #[test]
    fn build_publishes_all_artifacts() {
        let tmp = TempDir::new().unwrap();
        let index = tmp.path().join("words.index");
        let pipeline = BuildPipeline::new(&index, BuildOptions::default());
        let outcome = pipeline
            .build(items(&[("cat", &[0.0, 1.0]), ("dog", &[0.0, 0.9])]))
            .unwrap();
        let BuildOutcome::Built(stats) = outcome else {
            panic!("expected a fresh build");
        };
        assert_eq!(stats.count, 2);
        assert_eq!(stats.dimension, 2);
        for file in [
            config::MANIFEST_FILE,
            config::VECTORS_FILE,
            config::FOREST_FILE,
            config::TOKENS_DIR,
        ] {
            assert!(index.join(file).exists(), "{file} missing");
        }
        assert!(!tmp.path().join("words.index.staging").exists());
    }

    #[test]
    fn empty_source_publishes_nothing() {
        let tmp = TempDir::new().unwrap();
        let index = tmp.path().join("words.index");
        let pipeline = BuildPipeline::new(&index, BuildOptions::default());
        assert!(matches!(
            pipeline.build(Vec::new()),
            Err(Error::EmptyIndex)
        ));
        assert!(!index.exists());
        assert!(!tmp.path().join("words.index.staging").exists());
    }

    #[test]
    fn corrupt_manifest_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let index = tmp.path().join("words.index");
        fs::create_dir_all(&index).unwrap();
        fs::write(index.join(config::MANIFEST_FILE), b"{not json").unwrap();
        let pipeline = BuildPipeline::new(&index, BuildOptions::default());
        assert!(pipeline.existing_manifest().is_err());
        assert!(pipeline.build(items(&[("cat", &[1.0])])).is_err());
    }

    #[test]
    fn leftover_staging_is_replaced() {
        let tmp = TempDir::new().unwrap();
        let index = tmp.path().join("words.index");
        let staging = tmp.path().join("words.index.staging");
        fs::create_dir_all(&staging).unwrap();
        fs::write(staging.join("junk"), b"x").unwrap();

        let pipeline = BuildPipeline::new(&index, BuildOptions::default());
        pipeline.build(items(&[("cat", &[1.0])])).unwrap();
        assert!(!staging.exists());
        assert!(!index.join("junk").exists());
    }
}
