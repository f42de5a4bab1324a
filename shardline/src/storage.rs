//! Storage engine for sharded reading files.
//!
//! The [`Storage`] ties the other components together. Given a root
//! directory and a batch of readings it:
//!
//! 1. groups the readings by shard path with its [`ShardRouter`],
//! 2. loads each shard's existing file through its [`Codec`],
//! 3. merges the stored readings with the new ones (new values win),
//! 4. encodes the result and compares it with the bytes on disk,
//! 5. replaces the file atomically only if those bytes differ.
//!
//! Re-ingesting data that is already stored therefore leaves the tree
//! untouched: no rename, no new modification time.
//!
//! # Existing files
//!
//! An existing shard that cannot be read or decoded is treated as empty and
//! is overwritten by the new readings. A warning is logged when that
//! happens, since whatever the unreadable file held is lost.
//!
//! # Concurrency
//!
//! The engine is synchronous and assumes one writer per shard path. Two
//! processes storing into the same shard at once can lose updates; callers
//! that need that must serialize externally.
//!
//! # Example
//!
//! ```rust,no_run
//! use shardline::{Reading, Storage, StorageConfig};
//! use chrono::Utc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = Storage::from_config(&StorageConfig::default())?;
//!
//! let readings = vec![Reading::new("NZ_APIM_50_LFZ", Utc::now(), -41221.0)];
//! let summary = storage.store("./data", readings)?;
//! println!("{} shards written", summary.written());
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use crate::atomic::write_atomic;
use crate::codec::{Codec, CsvCodec};
use crate::config::StorageConfig;
use crate::error::{Result, StorageIoError};
use crate::merge::merge;
use crate::reading::Reading;
use crate::template::ShardRouter;

/// Permission bits for directories created under the store root.
#[cfg(unix)]
pub const DIR_MODE: u32 = 0o755;

/// What happened to a shard file during a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardOutcome {
    /// No usable file existed; one was written.
    Created,
    /// The file existed and its contents changed.
    Updated,
    /// The merged contents matched the file; nothing was written.
    Unchanged,
}

/// Totals for one [`Storage::store`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreSummary {
    /// Shards written for the first time.
    pub created: usize,
    /// Shards rewritten with new contents.
    pub updated: usize,
    /// Shards left untouched.
    pub unchanged: usize,
    /// Readings handed to the store.
    pub readings: usize,
}

impl StoreSummary {
    fn record(&mut self, outcome: ShardOutcome, readings: usize) {
        match outcome {
            ShardOutcome::Created => self.created += 1,
            ShardOutcome::Updated => self.updated += 1,
            ShardOutcome::Unchanged => self.unchanged += 1,
        }
        self.readings += readings;
    }

    /// Number of shards visited.
    pub fn shards(&self) -> usize {
        self.created + self.updated + self.unchanged
    }

    /// Number of shards whose file was replaced.
    pub fn written(&self) -> usize {
        self.created + self.updated
    }
}

/// Sharded, merge-on-write reading store.
#[derive(Debug, Clone)]
pub struct Storage<C = CsvCodec> {
    router: ShardRouter,
    codec: C,
}

impl Storage<CsvCodec> {
    /// Creates a CSV store from a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`](crate::error::TemplateError) if the
    /// configured template does not compile.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        Ok(Self::new(config.router()?, config.codec()))
    }
}

impl<C: Codec> Storage<C> {
    /// Creates a store from a router and a codec.
    pub fn new(router: ShardRouter, codec: C) -> Self {
        Self { router, codec }
    }

    /// The shard router.
    pub fn router(&self) -> &ShardRouter {
        &self.router
    }

    /// The codec shard files are read and written with.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Routes `readings` to shards under `root` and stores each shard.
    ///
    /// # Errors
    ///
    /// See [`Storage::store_batches`].
    pub fn store<P, I>(&self, root: P, readings: I) -> Result<StoreSummary>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = Reading>,
    {
        self.store_batches(root, self.router.partition(readings))
    }

    /// Stores pre-grouped batches keyed by shard path relative to `root`.
    ///
    /// Shards are processed in path order. The first failing shard stops the
    /// call; shards before it stay stored, and the failing shard's file is
    /// left as it was.
    ///
    /// # Errors
    ///
    /// Returns [`StorageIoError`] if a directory cannot be created, or the
    /// codec's encode error or the atomic writer's error for a shard.
    pub fn store_batches<P: AsRef<Path>>(
        &self,
        root: P,
        batches: BTreeMap<String, Vec<Reading>>,
    ) -> Result<StoreSummary> {
        let root = root.as_ref();
        let mut summary = StoreSummary::default();

        for (relative, readings) in &batches {
            let outcome = self.store_shard(root, relative, readings)?;
            summary.record(outcome, readings.len());
        }

        tracing::debug!(
            root = %root.display(),
            created = summary.created,
            updated = summary.updated,
            unchanged = summary.unchanged,
            "store complete"
        );
        Ok(summary)
    }

    /// Runs one read-merge-write cycle for the shard at `root/relative`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageIoError::OutsideRoot`] if `relative` is absolute or
    /// climbs out of `root`, [`StorageIoError`] if the directory cannot be
    /// created or the file cannot be replaced, or the codec's encode error.
    pub fn store_shard<P: AsRef<Path>>(
        &self,
        root: P,
        relative: &str,
        readings: &[Reading],
    ) -> Result<ShardOutcome> {
        let path = resolve_under(root.as_ref(), relative)?;
        create_parent(&path)?;

        let current = read_existing(&path);
        let merged = match current
            .as_deref()
            .and_then(|bytes| self.decode_existing(&path, bytes))
        {
            Some(existing) => merge(&existing, readings),
            None => merge(&[], readings),
        };

        self.commit(&path, current.as_deref(), &merged)
    }

    /// Reads and decodes a shard file.
    ///
    /// # Errors
    ///
    /// Returns [`StorageIoError::Read`] if the file cannot be read, or the
    /// codec's decode error.
    pub fn read_file<P: AsRef<Path>>(&self, path: P) -> Result<Vec<Reading>> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| StorageIoError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        self.codec.decode(&bytes)
    }

    /// Writes `readings` to `path` in canonical order, replacing whatever is
    /// there, unless the file already holds exactly those bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StorageIoError`] if the directory cannot be created or the
    /// file cannot be replaced, or the codec's encode error.
    pub fn write_file<P: AsRef<Path>>(&self, path: P, readings: &[Reading]) -> Result<ShardOutcome> {
        let path = path.as_ref();
        create_parent(path)?;

        let current = read_existing(path);
        self.commit(path, current.as_deref(), &merge(&[], readings))
    }

    fn decode_existing(&self, path: &Path, bytes: &[u8]) -> Option<Vec<Reading>> {
        match self.codec.decode(bytes) {
            Ok(existing) => Some(existing),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "existing shard could not be decoded, replacing it"
                );
                None
            }
        }
    }

    fn commit(&self, path: &Path, current: Option<&[u8]>, readings: &[Reading]) -> Result<ShardOutcome> {
        let encoded = self.codec.encode(readings)?;

        if current == Some(encoded.as_slice()) {
            tracing::debug!(path = %path.display(), "shard unchanged");
            return Ok(ShardOutcome::Unchanged);
        }

        let existed = path.is_file();
        write_atomic(path, &encoded)?;

        let outcome = if existed {
            ShardOutcome::Updated
        } else {
            ShardOutcome::Created
        };
        tracing::debug!(
            path = %path.display(),
            readings = readings.len(),
            ?outcome,
            "shard written"
        );
        Ok(outcome)
    }
}

/// Returns the bytes of an existing shard, or `None` if there is nothing
/// usable on disk.
fn read_existing(path: &Path) -> Option<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "existing shard could not be read, replacing it"
            );
            None
        }
    }
}

/// Joins a routed shard path onto `root`, refusing anything that would land
/// outside it.
fn resolve_under(root: &Path, relative: &str) -> Result<PathBuf> {
    let relative = Path::new(relative);
    let mut has_name = false;
    for component in relative.components() {
        match component {
            Component::Normal(_) => has_name = true,
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) | Component::ParentDir => {
                return Err(StorageIoError::OutsideRoot {
                    path: relative.to_path_buf(),
                }
                .into());
            }
        }
    }
    if !has_name {
        return Err(StorageIoError::OutsideRoot {
            path: relative.to_path_buf(),
        }
        .into());
    }
    Ok(root.join(relative))
}

fn create_parent(path: &Path) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }

    builder
        .create(parent)
        .map_err(|e| StorageIoError::CreateDir {
            path: parent.to_path_buf(),
            source: e,
        })?;
    Ok(())
}
