//! Reading commit files and checkpoints into [`Commit`]s

use serde_json::Value;
use tracing::debug;

use crate::actions::{parse_json_actions, Action};
use crate::log_segment::LogSegment;
use crate::path::{LogPathFileType, ParsedLogPath};
use crate::{DeltaResult, Engine, Error, StorageHandler, Version};

/// Top-level checkpoint columns that carry bookkeeping rather than table state
const CHECKPOINT_BOOKKEEPING_COLUMNS: [&str; 2] = ["checkpointMetadata", "domainMetadata"];

const SIDECAR_COLUMN: &str = "sidecar";

/// The actions recorded at one version of the table.
///
/// A commit read from a checkpoint is the consolidated state of the table at the checkpoint
/// version, not the actions of the commit that produced that version.
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    pub version: Version,
    /// The files the actions were read from: one commit file, or every part of a checkpoint
    pub sources: Vec<ParsedLogPath>,
    /// Actions in file order. Later entries for the same file win.
    pub actions: Vec<Action>,
    /// `commitInfo.timestamp` when recorded, else the modification time of the source file
    pub timestamp: Option<i64>,
}

impl Commit {
    /// True if this commit is the consolidated content of a checkpoint
    pub fn is_checkpoint(&self) -> bool {
        self.sources.first().is_some_and(|f| f.is_checkpoint())
    }
}

/// Read and decode one commit file.
pub async fn read_commit(storage: &dyn StorageHandler, file: &ParsedLogPath) -> DeltaResult<Commit> {
    let data = storage.read_file(&file.location.location).await?;
    let actions = parse_json_actions(&data)?;
    let timestamp = actions
        .iter()
        .find_map(|action| match action {
            Action::CommitInfo(info) => info.timestamp(),
            _ => None,
        })
        .or(Some(file.location.last_modified));
    debug!(version = file.version, actions = actions.len(), "read commit");
    Ok(Commit {
        version: file.version,
        sources: vec![file.clone()],
        actions,
        timestamp,
    })
}

/// Read every part of a checkpoint into one consolidated [`Commit`].
///
/// Parquet parts are decoded by the engine's checkpoint handler. V2 checkpoints written as JSON
/// hold one row per line. Either way each row goes through the same checkpoint row decoding.
pub async fn read_checkpoint(engine: &dyn Engine, parts: &[ParsedLogPath]) -> DeltaResult<Commit> {
    let first = parts
        .first()
        .ok_or_else(|| Error::corrupt_checkpoint("checkpoint has no files"))?;
    let storage = engine.get_storage_handler();
    let handler = engine.get_checkpoint_handler();

    let mut actions = vec![];
    for part in parts {
        let data = storage.read_file(&part.location.location).await?;
        match &part.file_type {
            LogPathFileType::V2Checkpoint { .. } if part.filename.ends_with(".json") => {
                for row in json_checkpoint_rows(&data)? {
                    actions.extend(decode_checkpoint_row(row)?);
                }
            }
            _ => {
                for row in handler.read_checkpoint(&part.location, data)? {
                    actions.extend(decode_checkpoint_row(row)?);
                }
            }
        }
    }
    debug!(version = first.version, parts = parts.len(), actions = actions.len(), "read checkpoint");
    Ok(Commit {
        version: first.version,
        sources: parts.to_vec(),
        actions,
        timestamp: Some(first.location.last_modified),
    })
}

/// Read every file of `segment` in ascending version order: the consolidated checkpoint first,
/// if there is one, then each commit.
pub async fn read_log_segment(engine: &dyn Engine, segment: &LogSegment) -> DeltaResult<Vec<Commit>> {
    let storage = engine.get_storage_handler();
    let mut commits = Vec::with_capacity(segment.commit_files.len() + 1);
    if !segment.checkpoint_parts.is_empty() {
        commits.push(read_checkpoint(engine, &segment.checkpoint_parts).await?);
    }
    for file in &segment.commit_files {
        commits.push(read_commit(storage.as_ref(), file).await?);
    }
    Ok(commits)
}

/// Split a JSON checkpoint into its rows. Blank lines are skipped.
fn json_checkpoint_rows(data: &[u8]) -> DeltaResult<Vec<Value>> {
    let text = std::str::from_utf8(data)
        .map_err(|err| Error::parse(format!("checkpoint file is not utf-8: {err}")))?;
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str(line)
                .map_err(|err| Error::parse(format!("invalid json line: {err}")))
        })
        .collect()
}

/// Decode one checkpoint row. Bookkeeping rows that carry no table state yield `None`.
fn decode_checkpoint_row(row: Value) -> DeltaResult<Option<Action>> {
    let populated = |row: &Value, key: &str| row.get(key).is_some_and(|v| !v.is_null());
    if populated(&row, SIDECAR_COLUMN) {
        return Err(Error::generic(
            "checkpoints with sidecar files are not supported",
        ));
    }
    match Action::try_from_value(row.clone()) {
        Ok(action) => Ok(Some(action)),
        Err(_)
            if CHECKPOINT_BOOKKEEPING_COLUMNS
                .iter()
                .any(|key| populated(&row, key)) =>
        {
            Ok(None)
        }
        Err(err) => Err(err),
    }
}
