//! # shardline
//!
//! Sharded flat-file storage for time-stamped sensor readings.
//!
//! shardline persists discrete scalar measurements into a directory tree of
//! small CSV files, one per source and calendar window. Each ingestion run
//! merges new readings into the files already on disk, so the same data can
//! be ingested any number of times, in any order, and the tree ends up the
//! same.
//!
//! ## Key Properties
//!
//! - Idempotent: re-storing persisted readings writes nothing
//! - Deterministic: every file is sorted by source, then time, one row per key
//! - Crash-safe: files are replaced by write-to-temp-then-rename
//! - Upsert: a newly ingested value replaces a stored value for the same key
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shardline::{Reading, Storage, StorageConfig};
//! use chrono::{TimeZone, Utc};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // One file per source per UTC hour, values at full precision
//! let storage = Storage::from_config(&StorageConfig::default())?;
//!
//! let epoch = Utc.with_ymd_and_hms(2016, 8, 2, 4, 0, 0).unwrap();
//! let readings = vec![
//!     Reading::new("NZ_APIM_50_LFZ", epoch, -41221.0),
//! ];
//!
//! // Writes ./data/2016/2016.215/2016.215.04.NZ_APIM_50_LFZ.csv
//! storage.store("./data", readings)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Reading`] — One measurement, with its key and canonical ordering
//! - [`Codec`] / [`CsvCodec`] — Encoding of reading collections
//! - [`merge()`] — Deduplicating, sorting upsert of two collections
//! - [`ShardRouter`] — Template-driven mapping of readings to file paths
//! - [`Storage`] — Per-shard read-merge-write cycles
//! - [`write_atomic`] — All-or-nothing file replacement
//!
//! ## Modules
//!
//! - [`reading`] — Reading type, key, timestamps
//! - [`codec`] — Codec trait, precision, CSV codec
//! - [`merge`](mod@merge) — Sorting and merging
//! - [`template`] — Function tables, templates, shard router
//! - [`storage`] — Storage engine
//! - [`atomic`] — Atomic file writer
//! - [`config`] — Storage configuration
//! - [`error`] — Error types

pub mod atomic;
pub mod codec;
pub mod config;
pub mod error;
pub mod merge;
pub mod reading;
pub mod storage;
pub mod template;

// Re-export primary API types at crate root for convenience.
pub use atomic::write_atomic;
pub use codec::{Codec, CsvCodec, Precision};
pub use config::{DEFAULT_TEMPLATE, StorageConfig};
pub use error::{Result, ShardError};
pub use merge::{merge, merge_map, sort};
pub use reading::Reading;
pub use storage::{ShardOutcome, Storage, StoreSummary};
pub use template::{FunctionTable, ShardRouter, Template};
