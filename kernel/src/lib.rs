//! # Delta log reader
//!
//! Reads the transaction log (`_delta_log`) of a Delta table and reconstructs, for any version,
//! the table's protocol, its metadata and the exact set of active data files.
//!
//! The entry point is [`Table`], which composes the components of this crate:
//!
//! - [`path`] classifies the files found in the log directory.
//! - [`checkpoint`] orders checkpoints and selects the latest complete one.
//! - [`log_segment`] assembles the minimal set of files needed to read one version.
//! - [`replay`] finds the newest protocol and metadata in a segment.
//! - [`table_features`] checks that the table only uses supported reader features.
//! - [`state`] reconciles add and remove actions into the set of active files.
//!
//! ## Engine interfaces
//!
//! Storage access and checkpoint decoding are delegated to the [`Engine`]. Connectors can bring
//! their own [`StorageHandler`] and [`CheckpointHandler`], or use the object_store and parquet
//! backed `DefaultEngine` shipped behind the `default-engine` feature. Implementors must take
//! care that all assumptions on the behavior of the functions - like sorted results - are
//! respected.

#![warn(
    unreachable_pub,
    trivial_numeric_casts,
    unused_extern_crates,
    rust_2018_idioms,
    rust_2021_compatibility
)]

use std::sync::Arc;

use bytes::Bytes;
use futures::stream::BoxStream;
use serde::de::DeserializeOwned;
use url::Url;

pub mod actions;
pub mod checkpoint;
pub mod commit;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod log_segment;
pub mod path;
pub mod replay;
pub mod snapshot;
pub mod state;
pub mod table;
pub mod table_features;
pub mod table_properties;

pub(crate) mod utils;

#[cfg(feature = "default-engine")]
pub mod engine;

pub use actions::Action;
pub use config::TableOptions;
pub use coordinator::{CommitCoordinatorClient, UnbackfilledCommit};
pub use error::{DeltaResult, Error};
pub use snapshot::{Snapshot, SnapshotHint};
pub use state::{DataFile, TableState};
pub use table::Table;

/// Delta table version is 8 byte unsigned int
pub type Version = u64;

/// The metadata that describes an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    /// The fully qualified path to the object
    pub location: Url,
    /// The last modified time as milliseconds since unix epoch
    pub last_modified: i64,
    /// The size in bytes of the object
    pub size: usize,
}

impl FileMeta {
    /// Create a new instance of `FileMeta`
    pub fn new(location: Url, last_modified: i64, size: usize) -> Self {
        Self {
            location,
            last_modified,
            size,
        }
    }
}

/// Provides storage related functionalities to the reader.
///
/// The reader uses this client whenever it needs to access the underlying storage where the
/// Delta table is present. Connector implementations of this interface can hide storage
/// specific details from the reader.
#[async_trait::async_trait]
pub trait StorageHandler: Send + Sync {
    /// List the paths in the same directory that are lexicographically greater or equal to
    /// (UTF-8 sorting) the given `path`. The result must be sorted by file name and must only
    /// contain direct children of the directory.
    async fn list_from(&self, path: &Url) -> DeltaResult<BoxStream<'_, DeltaResult<FileMeta>>>;

    /// Read the full content of a file. Returns [`Error::FileNotFound`] if it does not exist.
    async fn read_file(&self, path: &Url) -> DeltaResult<Bytes>;

    /// Open a file for streaming reads.
    async fn open_read(&self, path: &Url) -> DeltaResult<BoxStream<'static, DeltaResult<Bytes>>>;

    /// Check whether a file exists.
    async fn exists(&self, path: &Url) -> DeltaResult<bool>;

    /// Read a file and decode it as utf-8 text.
    async fn read_text(&self, path: &Url) -> DeltaResult<String> {
        let bytes = self.read_file(path).await?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }
}

/// Read a small file and parse it as JSON. A missing or blank file yields `Ok(None)`.
pub async fn read_json<T: DeserializeOwned>(
    storage: &dyn StorageHandler,
    path: &Url,
) -> DeltaResult<Option<T>> {
    let data = match storage.read_file(path).await {
        Ok(data) => data,
        Err(err) => {
            return match err.into_inner() {
                Error::FileNotFound(_) => Ok(None),
                err => Err(err),
            }
        }
    };
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(&data)?))
}

/// Decodes checkpoint files into rows of the action schema.
///
/// Each returned value is one row, shaped like a single line of a commit file: an object with
/// one populated top-level action column. Columns that are null for a row may be absent or
/// `null`.
pub trait CheckpointHandler: Send + Sync {
    fn read_checkpoint(
        &self,
        file: &FileMeta,
        data: Bytes,
    ) -> DeltaResult<Vec<serde_json::Value>>;
}

/// Interface encapsulating all clients needed by the reader in order to read a Delta table.
///
/// Connectors are expected to pass an implementation of this interface when opening a table.
pub trait Engine: Send + Sync {
    /// Get the connector provided [`StorageHandler`].
    fn get_storage_handler(&self) -> Arc<dyn StorageHandler>;

    /// Get the connector provided [`CheckpointHandler`].
    fn get_checkpoint_handler(&self) -> Arc<dyn CheckpointHandler>;

    /// Get the commit coordinator for tables whose latest commits may not be backfilled into
    /// `_delta_log` yet. Most tables have none.
    fn get_commit_coordinator(&self) -> Option<Arc<dyn CommitCoordinatorClient>> {
        None
    }
}
