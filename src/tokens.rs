//! Persisted bidirectional token ↔ id directory.
//!
//! One LMDB environment with two named databases:
//!
//! | database  | key               | value         |
//! |-----------|-------------------|---------------|
//! | `forward` | token UTF-8       | id, u32 LE    |
//! | `reverse` | id, u32 BE        | token UTF-8   |
//!
//! Reverse keys are big-endian so a cursor walks ids in order. Either
//! direction is a single point lookup inside a read transaction.
//!
//! A build inserts every token in one write transaction, so a directory is
//! either empty or complete to any reader.

use crate::config;
use crate::error::{Error, Result};
use crate::persistence::PersistenceError;
use heed3::byteorder::{BE, LE};
use heed3::types::{Str, U32};
use heed3::{Database, Env, EnvOpenOptions, RoTxn, RwTxn, WithTls};
use std::fs;
use std::path::{Path, PathBuf};

const FORWARD_DB: &str = "forward";
const REVERSE_DB: &str = "reverse";

type ForwardDb = Database<Str, U32<LE>>;
type ReverseDb = Database<U32<BE>, Str>;

/// Token directory stored in an LMDB environment.
pub struct TokenDirectory {
    path: PathBuf,
    env: Env,
    forward: ForwardDb,
    reverse: ReverseDb,
    read_only: bool,
}

impl TokenDirectory {
    /// Create (or reopen for writing) the environment at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        fs::create_dir_all(path)?;
        let env = open_env(path)?;

        let mut wtxn = env.write_txn().map_err(PersistenceError::from)?;
        let forward: ForwardDb = env
            .database_options()
            .types::<Str, U32<LE>>()
            .name(FORWARD_DB)
            .create(&mut wtxn)
            .map_err(PersistenceError::from)?;
        let reverse: ReverseDb = env
            .database_options()
            .types::<U32<BE>, Str>()
            .name(REVERSE_DB)
            .create(&mut wtxn)
            .map_err(PersistenceError::from)?;
        wtxn.commit().map_err(PersistenceError::from)?;

        Ok(Self {
            path: path.to_path_buf(),
            env,
            forward,
            reverse,
            read_only: false,
        })
    }

    /// Open an existing environment; [`writer`](Self::writer) is refused.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(PersistenceError::NotFound(path.display().to_string()).into());
        }
        let env = open_env(path)?;

        let rtxn = env.read_txn().map_err(PersistenceError::from)?;
        let forward: Option<ForwardDb> = env
            .open_database(&rtxn, Some(FORWARD_DB))
            .map_err(PersistenceError::from)?;
        let reverse: Option<ReverseDb> = env
            .open_database(&rtxn, Some(REVERSE_DB))
            .map_err(PersistenceError::from)?;
        // Handles opened in a read transaction only outlive it on commit.
        rtxn.commit().map_err(PersistenceError::from)?;

        let (Some(forward), Some(reverse)) = (forward, reverse) else {
            return Err(PersistenceError::Format(format!(
                "token directory at {} is missing its databases",
                path.display()
            ))
            .into());
        };
        tracing::debug!(path = %path.display(), "opened token directory");
        Ok(Self {
            path: path.to_path_buf(),
            env,
            forward,
            reverse,
            read_only: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Insert one mapping in its own write transaction.
    pub fn put(&self, token: &str, id: u32) -> Result<()> {
        let mut writer = self.writer()?;
        writer.put(token, id)?;
        writer.commit()
    }

    /// Start a batch; nothing is visible to readers until
    /// [`DirectoryWriter::commit`]. LMDB allows one writer at a time, so a
    /// second call blocks until the first batch ends.
    pub fn writer(&self) -> Result<DirectoryWriter<'_>> {
        if self.read_only {
            return Err(PersistenceError::InvalidState(format!(
                "token directory at {} is opened read-only",
                self.path.display()
            ))
            .into());
        }
        Ok(DirectoryWriter {
            forward: self.forward,
            reverse: self.reverse,
            txn: self.env.write_txn().map_err(PersistenceError::from)?,
            inserted: 0,
        })
    }

    /// Read transaction for several lookups against one snapshot.
    pub fn reader(&self) -> Result<DirectoryReader<'_>> {
        Ok(DirectoryReader {
            forward: self.forward,
            reverse: self.reverse,
            txn: self.env.read_txn().map_err(PersistenceError::from)?,
        })
    }

    pub fn resolve_token(&self, token: &str) -> Result<u32> {
        self.reader()?.resolve_token(token)
    }

    pub fn resolve_id(&self, id: u32) -> Result<String> {
        self.reader()?.resolve_id(id)
    }

    /// Number of tokens.
    pub fn len(&self) -> Result<usize> {
        self.reader()?.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

fn open_env(path: &Path) -> Result<Env> {
    // SAFETY: the files are only modified through this handle while it is
    // alive, and an environment is opened at most once per path per process.
    let env = unsafe {
        EnvOpenOptions::new()
            .map_size(config::TOKENS_MAP_SIZE)
            .max_dbs(2)
            .open(path)
            .map_err(PersistenceError::from)?
    };
    Ok(env)
}

/// Lookups against one directory snapshot; the transaction is released on
/// drop.
pub struct DirectoryReader<'a> {
    forward: ForwardDb,
    reverse: ReverseDb,
    txn: RoTxn<'a, WithTls>,
}

impl DirectoryReader<'_> {
    pub fn resolve_token(&self, token: &str) -> Result<u32> {
        self.forward
            .get(&self.txn, token)
            .map_err(PersistenceError::from)?
            .ok_or_else(|| Error::token_not_found(token))
    }

    pub fn resolve_id(&self, id: u32) -> Result<String> {
        self.reverse
            .get(&self.txn, &id)
            .map_err(PersistenceError::from)?
            .map(str::to_string)
            .ok_or_else(|| Error::id_not_found(id))
    }

    /// Number of tokens in the snapshot.
    pub fn len(&self) -> Result<usize> {
        let n = self.forward.len(&self.txn).map_err(PersistenceError::from)?;
        Ok(n as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// `(id, token)` pairs in ascending id order.
    pub fn entries(&self) -> Result<Vec<(u32, String)>> {
        let iter = self.reverse.iter(&self.txn).map_err(PersistenceError::from)?;
        iter.map(|entry| {
            let (id, token) = entry.map_err(PersistenceError::from)?;
            Ok((id, token.to_string()))
        })
        .collect()
    }
}

/// Batched inserts inside one write transaction. Dropping without
/// [`commit`](Self::commit) aborts the batch.
pub struct DirectoryWriter<'a> {
    forward: ForwardDb,
    reverse: ReverseDb,
    txn: RwTxn<'a>,
    inserted: usize,
}

impl DirectoryWriter<'_> {
    /// Insert `token ↔ id`. Duplicate checks see earlier puts in this batch.
    pub fn put(&mut self, token: &str, id: u32) -> Result<()> {
        if token.is_empty() {
            return Err(Error::InvalidParameter("empty token".to_string()));
        }
        if token.len() > config::MAX_TOKEN_BYTES {
            return Err(Error::InvalidParameter(format!(
                "token of {} bytes exceeds the {} byte limit",
                token.len(),
                config::MAX_TOKEN_BYTES
            )));
        }
        if self
            .forward
            .get(&self.txn, token)
            .map_err(PersistenceError::from)?
            .is_some()
        {
            return Err(Error::DuplicateToken(token.to_string()));
        }
        if self
            .reverse
            .get(&self.txn, &id)
            .map_err(PersistenceError::from)?
            .is_some()
        {
            return Err(Error::DuplicateId(id));
        }
        self.forward
            .put(&mut self.txn, token, &id)
            .map_err(PersistenceError::from)?;
        self.reverse
            .put(&mut self.txn, &id, token)
            .map_err(PersistenceError::from)?;
        self.inserted += 1;
        Ok(())
    }

    /// Tokens inserted in this batch so far.
    pub fn inserted(&self) -> usize {
        self.inserted
    }

    /// Publish the batch atomically.
    pub fn commit(self) -> Result<()> {
        self.txn.commit().map_err(PersistenceError::from)?;
        tracing::debug!(inserted = self.inserted, "token batch committed");
        Ok(())
    }
}
