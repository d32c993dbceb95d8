//! Represents a segment of a delta log. [`LogSegment`] wraps a set of checkpoint and commit
//! files.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::TryStreamExt;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::checkpoint::{read_last_checkpoint, select_latest_complete, CheckpointInstance};
use crate::coordinator::CommitCoordinatorClient;
use crate::path::{self, ParsedLogPath};
use crate::utils::require;
use crate::{DeltaResult, Engine, Error, StorageHandler, TableOptions, Version};

#[cfg(all(test, feature = "default-engine"))]
mod tests;

/// A [`LogSegment`] is the minimal set of log files needed to reconstruct the table at one
/// version. It is built with [`LogSegmentBuilder`], and guarantees the following:
///     1. At most one checkpoint is included, and it is complete: all of its parts are present.
///     2. Commit file versions are contiguous, starting right after the checkpoint version (or at
///        0 without a checkpoint) and ending at `end_version`.
///     3. Every file lies under `log_root`.
#[derive(Debug, Clone)]
pub struct LogSegment {
    pub log_root: Url,
    pub end_version: Version,
    /// The checkpoint the segment starts from, if any
    pub checkpoint: Option<CheckpointInstance>,
    /// Files of the checkpoint, in part order
    pub checkpoint_parts: Vec<ParsedLogPath>,
    /// Commit files after the checkpoint, sorted by ascending version
    pub commit_files: Vec<ParsedLogPath>,
    /// Modification time of the newest file of the segment, in milliseconds since the epoch
    pub last_commit_timestamp: i64,
}

impl LogSegment {
    /// Build the segment for a snapshot at `end_version`, or at the latest version when `None`.
    ///
    /// Reads `_last_checkpoint` first (unless disabled in `options`) so that listing can start at
    /// the hinted checkpoint instead of version 0.
    pub async fn for_snapshot(
        engine: &dyn Engine,
        table_root: &Url,
        options: &TableOptions,
        end_version: Option<Version>,
    ) -> DeltaResult<Self> {
        let storage = engine.get_storage_handler();
        let log_root = path::log_root(table_root)?;
        let hint = match options.use_checkpoint_hint {
            true => read_last_checkpoint(storage.as_ref(), &log_root, options).await,
            false => None,
        };
        let mut builder = LogSegmentBuilder::new(storage.as_ref(), table_root)
            .with_commit_coordinator(engine.get_commit_coordinator());
        if let Some(hint) = hint {
            builder = builder.with_start_checkpoint(hint.version);
        }
        if let Some(version) = end_version {
            builder = builder.with_end_version(version);
        }
        builder.build().await
    }

    pub fn checkpoint_version(&self) -> Option<Version> {
        self.checkpoint.as_ref().map(|cp| cp.version)
    }

    /// The versions this segment describes: the checkpoint version, if any, followed by the
    /// version of every commit file.
    pub fn versions(&self) -> Vec<Version> {
        self.checkpoint_version()
            .into_iter()
            .chain(self.commit_files.iter().map(|f| f.version))
            .collect()
    }

    /// Commit files newer than `version`, in ascending order.
    pub fn commits_after(&self, version: Version) -> impl DoubleEndedIterator<Item = &ParsedLogPath> {
        self.commit_files.iter().filter(move |f| f.version > version)
    }

    fn files(&self) -> impl Iterator<Item = &ParsedLogPath> {
        self.checkpoint_parts.iter().chain(self.commit_files.iter())
    }

    fn assert_log_files_belong_to_table(&self) -> DeltaResult<()> {
        for file in self.files() {
            require!(
                file.location.location.as_str().starts_with(self.log_root.as_str()),
                Error::invalid_table(format!(
                    "File ({}) doesn't belong in the transaction log at {}",
                    file.location.location, self.log_root
                ))
            );
        }
        Ok(())
    }
}

/// The versioned files found by one listing of the log directory
#[derive(Debug, Default)]
struct ListedLogFiles {
    commits: Vec<ParsedLogPath>,
    checkpoint_parts: Vec<ParsedLogPath>,
    /// Highest version seen, including entries beyond the end version
    latest_version: Option<Version>,
}

impl ListedLogFiles {
    fn is_empty(&self) -> bool {
        self.commits.is_empty() && self.checkpoint_parts.is_empty()
    }

    fn latest_checkpoint(&self, end_version: Option<Version>) -> Option<CheckpointInstance> {
        let instances = self
            .checkpoint_parts
            .iter()
            .filter_map(CheckpointInstance::from_log_path);
        select_latest_complete(instances, end_version)
    }
}

/// Builder for [`LogSegment`] up to `end_version` inclusive
pub struct LogSegmentBuilder<'a> {
    storage: &'a dyn StorageHandler,
    table_root: &'a Url,
    start_checkpoint: Option<Version>,
    end_version: Option<Version>,
    coordinator: Option<Arc<dyn CommitCoordinatorClient>>,
}

impl<'a> LogSegmentBuilder<'a> {
    pub fn new(storage: &'a dyn StorageHandler, table_root: &'a Url) -> Self {
        LogSegmentBuilder {
            storage,
            table_root,
            start_checkpoint: None,
            end_version: None,
            coordinator: None,
        }
    }

    /// Start listing at a hinted checkpoint version (e.g. from `_last_checkpoint`) instead of 0.
    /// A hint beyond the end version is ignored.
    pub fn with_start_checkpoint(mut self, version: Version) -> Self {
        self.start_checkpoint = Some(version);
        self
    }

    /// Set the end version (inclusive) of the [`LogSegment`]. Building fails with
    /// [`Error::VersionNotFound`] if the log does not reach it.
    pub fn with_end_version(mut self, version: Version) -> Self {
        self.end_version = Some(version);
        self
    }

    /// Consult a commit coordinator for commits that are not backfilled yet.
    pub fn with_commit_coordinator(
        mut self,
        coordinator: Option<Arc<dyn CommitCoordinatorClient>>,
    ) -> Self {
        self.coordinator = coordinator;
        self
    }

    /// Build the [`LogSegment`]
    ///
    /// This lists the log directory using the storage handler, once from the hinted checkpoint
    /// and a second time from version 0 if the hint turns out to be unusable.
    #[instrument(
        name = "log.list",
        skip_all,
        fields(table_root = %self.table_root, end_version = ?self.end_version),
        err
    )]
    pub async fn build(self) -> DeltaResult<LogSegment> {
        let log_root = path::log_root(self.table_root)?;
        let end_version = self.end_version;
        let start_checkpoint = match (self.start_checkpoint, end_version) {
            (Some(cp), Some(end)) if cp > end => {
                debug!(hint = cp, end, "checkpoint hint is beyond the requested version");
                None
            }
            (cp, _) => cp,
        };

        // the coordinator goes first: a commit it backfills and forgets meanwhile is in the listing
        let unbackfilled = match &self.coordinator {
            Some(coordinator) => {
                coordinator
                    .list_unbackfilled_commits(
                        self.table_root,
                        start_checkpoint.unwrap_or(0),
                        end_version,
                    )
                    .await?
            }
            None => vec![],
        };

        let mut listed =
            list_log_files(self.storage, &log_root, start_checkpoint.unwrap_or(0), end_version)
                .await?;
        if let Some(hint_version) = start_checkpoint {
            if listed.is_empty() || listed.latest_checkpoint(end_version).is_none() {
                warn!(
                    "_last_checkpoint hint points at version {hint_version} but no complete checkpoint \
                     was found from there, listing from version 0"
                );
                listed = list_log_files(self.storage, &log_root, 0, end_version).await?;
            }
        }

        let checkpoint = listed.latest_checkpoint(end_version);
        if let (Some(hint_version), Some(cp)) = (start_checkpoint, &checkpoint) {
            if cp.version != hint_version {
                warn!(
                    "_last_checkpoint hint is out of date. _last_checkpoint version: {hint_version}. \
                     Using actual most recent: {}",
                    cp.version
                );
            }
        }
        let checkpoint_parts = match &checkpoint {
            Some(cp) => checkpoint_files(cp, &listed.checkpoint_parts)?,
            None => vec![],
        };

        let first_commit = checkpoint.as_ref().map_or(0, |cp| cp.version + 1);
        let mut commits: BTreeMap<Version, ParsedLogPath> = listed
            .commits
            .into_iter()
            .filter(|f| f.version >= first_commit)
            .map(|f| (f.version, f))
            .collect();
        for commit in unbackfilled {
            if commit.version < first_commit || end_version.is_some_and(|end| commit.version > end) {
                continue;
            }
            debug!(version = commit.version, "using unbackfilled commit from coordinator");
            commits.insert(commit.version, ParsedLogPath::new_commit(commit.file, commit.version));
        }
        let commit_files: Vec<ParsedLogPath> = commits.into_values().collect();

        for (expected, commit) in (first_commit..).zip(commit_files.iter()) {
            require!(
                commit.version == expected,
                Error::invalid_table(format!("missing log file for version {expected}"))
            );
        }

        let Some(segment_version) = commit_files
            .last()
            .map(|f| f.version)
            .or(checkpoint.as_ref().map(|cp| cp.version))
        else {
            return Err(match (end_version, listed.latest_version) {
                (Some(requested), Some(latest)) => Error::VersionNotFound { requested, latest },
                _ => Error::table_not_found(self.table_root),
            });
        };
        if let Some(requested) = end_version {
            require!(
                segment_version == requested,
                Error::VersionNotFound {
                    requested,
                    latest: segment_version,
                }
            );
        }

        let last_commit_timestamp = commit_files
            .last()
            .or(checkpoint_parts.first())
            .map_or(0, |f| f.location.last_modified);

        let segment = LogSegment {
            log_root,
            end_version: segment_version,
            checkpoint,
            checkpoint_parts,
            commit_files,
            last_commit_timestamp,
        };
        segment.assert_log_files_belong_to_table()?;
        debug!(
            version = segment.end_version,
            checkpoint = ?segment.checkpoint_version(),
            commits = segment.commit_files.len(),
            "built log segment"
        );
        Ok(segment)
    }
}

/// List the versioned files of the log from `start_version`, dropping zero-byte checkpoint files
/// and everything beyond `end_version`.
async fn list_log_files(
    storage: &dyn StorageHandler,
    log_root: &Url,
    start_version: Version,
    end_version: Option<Version>,
) -> DeltaResult<ListedLogFiles> {
    let start_from = log_root.join(&format!("{start_version:020}"))?;
    let mut listed = ListedLogFiles::default();
    let mut files = storage.list_from(&start_from).await?;
    while let Some(meta) = files.try_next().await? {
        let location = meta.location.clone();
        let Some(parsed_path) = ParsedLogPath::try_from(meta)? else {
            debug!("ignoring log entry {location}");
            continue;
        };
        listed.latest_version = listed.latest_version.max(Some(parsed_path.version));
        if end_version.is_some_and(|end| parsed_path.version > end) {
            debug!(
                version = parsed_path.version,
                "ignoring {} beyond the requested version", parsed_path.filename
            );
            continue;
        }
        if parsed_path.is_commit() {
            listed.commits.push(parsed_path);
        } else if parsed_path.location.size == 0 {
            debug!("ignoring empty checkpoint file {}", parsed_path.filename);
        } else {
            listed.checkpoint_parts.push(parsed_path);
        }
    }

    debug_assert!(
        listed
            .commits
            .windows(2)
            .all(|cfs| cfs[0].version <= cfs[1].version),
        "storage.list_from() didn't return a sorted listing! {:?}",
        listed.commits
    );
    Ok(listed)
}

/// The listed files that make up `checkpoint`, in part order. Fails if any is missing.
fn checkpoint_files(
    checkpoint: &CheckpointInstance,
    listed: &[ParsedLogPath],
) -> DeltaResult<Vec<ParsedLogPath>> {
    checkpoint
        .file_names()
        .into_iter()
        .map(|name| {
            listed
                .iter()
                .find(|f| f.filename == name)
                .cloned()
                .ok_or_else(|| {
                    Error::corrupt_checkpoint(format!(
                        "checkpoint at version {} is missing {name}",
                        checkpoint.version
                    ))
                })
        })
        .collect()
}
