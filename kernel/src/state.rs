//! The set of active data files of a table at one version.
//!
//! Add and remove actions are replayed oldest to newest. Each file is identified by its path
//! together with the unique id of its deletion vector, so the same data file with a new deletion
//! vector is a different logical file.

use std::collections::HashMap;

use tracing::debug;

use crate::actions::{Action, Add, Metadata, Protocol, Remove, SetTransaction};
use crate::commit::{read_log_segment, Commit};
use crate::snapshot::Snapshot;
use crate::{DeltaResult, Engine, Version};

/// A data file that is part of the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFile {
    /// Path of the file, relative to the table root or absolute
    pub path: String,
    /// Size in bytes
    pub size: i64,
    pub partition_values: HashMap<String, Option<String>>,
    /// Creation time of the file, in milliseconds since the epoch
    pub modification_time: i64,
    /// Unique id of the deletion vector attached to the file, if any
    pub deletion_vector_id: Option<String>,
    pub data_change: bool,
    /// Per-column statistics, as the raw JSON string written by the writer
    pub stats: Option<String>,
    pub tags: HashMap<String, Option<String>>,
}

impl DataFile {
    pub fn is_partitioned(&self) -> bool {
        !self.partition_values.is_empty()
    }

    fn key(&self) -> FileActionKey {
        FileActionKey::new(&self.path, self.deletion_vector_id.clone())
    }
}

impl From<Add> for DataFile {
    fn from(add: Add) -> Self {
        let deletion_vector_id = add.dv_unique_id();
        Self {
            path: add.path,
            size: add.size,
            partition_values: add.partition_values,
            modification_time: add.modification_time,
            deletion_vector_id,
            data_change: add.data_change,
            stats: add.stats,
            tags: add.tags.unwrap_or_default(),
        }
    }
}

/// The key under which add and remove actions for the same logical file are reconciled
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct FileActionKey {
    path: String,
    dv_unique_id: Option<String>,
}

impl FileActionKey {
    fn new(path: impl Into<String>, dv_unique_id: Option<String>) -> Self {
        let path = path.into();
        Self { path, dv_unique_id }
    }
}

impl From<&Remove> for FileActionKey {
    fn from(remove: &Remove) -> Self {
        Self::new(&remove.path, remove.dv_unique_id())
    }
}

/// The complete state of a table at one version. Immutable once built.
#[derive(Debug, Clone)]
pub struct TableState {
    version: Version,
    protocol: Protocol,
    metadata: Metadata,
    files: HashMap<FileActionKey, DataFile>,
    txns: HashMap<String, SetTransaction>,
}

impl TableState {
    /// Replay the log segment of `snapshot` into the table state at its version.
    pub async fn try_new(engine: &dyn Engine, snapshot: &Snapshot) -> DeltaResult<Self> {
        let commits = read_log_segment(engine, snapshot.log_segment()).await?;
        Ok(Self::materialize(
            snapshot.version(),
            snapshot.protocol().clone(),
            snapshot.metadata().clone(),
            &commits,
        ))
    }

    /// Reconcile the file actions of `commits`, given oldest first. A checkpoint may lead the
    /// sequence as the baseline. Within a commit later actions win over earlier ones.
    pub fn materialize<'a>(
        version: Version,
        protocol: Protocol,
        metadata: Metadata,
        commits: impl IntoIterator<Item = &'a Commit>,
    ) -> Self {
        let mut files = HashMap::new();
        let mut txns = HashMap::new();
        for commit in commits {
            for action in &commit.actions {
                match action {
                    Action::Add(add) => {
                        let file = DataFile::from(add.clone());
                        if let Some(previous) = files.insert(file.key(), file) {
                            debug!(
                                version = commit.version,
                                "replacing duplicate add ({}, {:?})",
                                previous.path,
                                previous.deletion_vector_id
                            );
                        }
                    }
                    Action::Remove(remove) => {
                        let key = FileActionKey::from(remove);
                        if files.remove(&key).is_none() {
                            debug!(
                                version = commit.version,
                                "ignoring remove of unknown file ({}, {:?})",
                                key.path,
                                key.dv_unique_id
                            );
                        }
                    }
                    Action::Txn(txn) => {
                        txns.insert(txn.app_id.clone(), txn.clone());
                    }
                    Action::Protocol(_) | Action::Metadata(_) | Action::CommitInfo(_) => {}
                }
            }
        }
        debug!(version, files = files.len(), "materialized table state");
        Self {
            version,
            protocol,
            metadata,
            files,
            txns,
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// The active data files, in no particular order
    pub fn active_files(&self) -> impl Iterator<Item = &DataFile> {
        self.files.values()
    }

    pub fn num_files(&self) -> usize {
        self.files.len()
    }

    /// Consume the state into its active files, sorted by path
    pub fn into_files(self) -> Vec<DataFile> {
        let mut files: Vec<DataFile> = self.files.into_values().collect();
        files.sort_by(|a, b| {
            a.path
                .cmp(&b.path)
                .then_with(|| a.deletion_vector_id.cmp(&b.deletion_vector_id))
        });
        files
    }

    /// The latest transaction version an application recorded, if any
    pub fn app_transaction_version(&self, app_id: &str) -> Option<i64> {
        self.txns.get(app_id).map(|txn| txn.version)
    }
}
