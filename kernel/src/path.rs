//! Classification of the files found in a table's `_delta_log` directory

use url::Url;

use crate::{DeltaResult, Error, FileMeta, Version};

/// Name of the directory holding the transaction log, relative to the table root
pub const DELTA_LOG_DIR: &str = "_delta_log";

/// Name of the checkpoint hint file in the log directory
pub const LAST_CHECKPOINT_FILE_NAME: &str = "_last_checkpoint";

/// The delimiter to separate object namespaces, creating a directory structure. Note this is in url
/// terms, so we use `/`
const DELIMITER: char = '/';

/// How many characters a version tag has
const VERSION_LEN: usize = 20;

/// How many characters a part specifier on a multipart checkpoint has
const MULTIPART_PART_LEN: usize = 10;

/// The kind of a file in the log directory, derived from its name alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogPathFileType {
    /// `{version}.json`
    Commit,
    /// `{version}.checkpoint.parquet`
    ClassicCheckpoint,
    /// `{version}.checkpoint.{part}.{num_parts}.parquet`
    MultiPartCheckpoint { part_num: u32, num_parts: u32 },
    /// `{version}.checkpoint.{id}.json` or `{version}.checkpoint.{id}.parquet`
    V2Checkpoint { id: String },
    /// `_last_checkpoint`
    LastCheckpoint,
    /// `*.crc`
    Ignored,
}

impl LogPathFileType {
    pub fn is_checkpoint(&self) -> bool {
        matches!(
            self,
            Self::ClassicCheckpoint | Self::MultiPartCheckpoint { .. } | Self::V2Checkpoint { .. }
        )
    }
}

/// Classify a log directory entry by its file name.
///
/// Names that match none of the known patterns fail with [`Error::UnrecognizedLogFile`]: an
/// unexpected file means the log was written by a newer protocol than this reader understands.
pub fn classify(file_name: &str) -> DeltaResult<LogPathFileType> {
    if file_name == LAST_CHECKPOINT_FILE_NAME {
        return Ok(LogPathFileType::LastCheckpoint);
    }
    if file_name.ends_with(".crc") {
        return Ok(LogPathFileType::Ignored);
    }
    let (_, file_type) = parse_versioned_name(file_name)?;
    Ok(file_type)
}

fn parse_versioned_name(file_name: &str) -> DeltaResult<(Version, LogPathFileType)> {
    let unrecognized = || Error::unrecognized_log_file(file_name);
    let split: Vec<&str> = file_name.split('.').collect();
    let version = split
        .first()
        .and_then(|v| parse_path_part::<Version>(v, VERSION_LEN))
        .ok_or_else(unrecognized)?;

    let file_type = match split.as_slice() {
        [_, "json"] => LogPathFileType::Commit,
        [_, "checkpoint", "parquet"] => LogPathFileType::ClassicCheckpoint,
        [_, "checkpoint", part_num, num_parts, "parquet"] => {
            let part_num = parse_path_part::<u32>(part_num, MULTIPART_PART_LEN);
            let num_parts = parse_path_part::<u32>(num_parts, MULTIPART_PART_LEN);
            match (part_num, num_parts) {
                (Some(part_num), Some(num_parts)) if 0 < part_num && part_num <= num_parts => {
                    LogPathFileType::MultiPartCheckpoint {
                        part_num,
                        num_parts,
                    }
                }
                _ => return Err(unrecognized()),
            }
        }
        [_, "checkpoint", id, "json" | "parquet"] if !id.is_empty() => {
            LogPathFileType::V2Checkpoint { id: id.to_string() }
        }
        _ => return Err(unrecognized()),
    };
    Ok((version, file_type))
}

fn parse_path_part<T: std::str::FromStr>(value: &str, digits: usize) -> Option<T> {
    match value.len() == digits && value.bytes().all(|b| b.is_ascii_digit()) {
        true => value.parse().ok(),
        false => None,
    }
}

fn get_filename(path: &str) -> Option<&str> {
    if path.is_empty() || path.ends_with(DELIMITER) {
        None
    } else {
        path.rsplit(DELIMITER).next()
    }
}

/// A versioned file of the log directory: a commit or a checkpoint file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLogPath {
    pub location: FileMeta,
    pub filename: String,
    pub version: Version,
    pub file_type: LogPathFileType,
}

impl ParsedLogPath {
    /// Classify a listed file. Returns `Ok(None)` for entries that take no part in log replay
    /// (`_last_checkpoint` and checksum files).
    pub fn try_from(location: FileMeta) -> DeltaResult<Option<ParsedLogPath>> {
        let filename = get_filename(location.location.path())
            .ok_or_else(|| Error::unrecognized_log_file(location.location.as_str()))?
            .to_string();
        match classify(&filename)? {
            LogPathFileType::LastCheckpoint | LogPathFileType::Ignored => Ok(None),
            _ => {
                let (version, file_type) = parse_versioned_name(&filename)?;
                Ok(Some(ParsedLogPath {
                    location,
                    filename,
                    version,
                    file_type,
                }))
            }
        }
    }

    /// Build an entry for a commit file whose name does not follow the log layout, e.g. a commit
    /// handed out by a commit coordinator.
    pub fn new_commit(location: FileMeta, version: Version) -> Self {
        let filename = get_filename(location.location.path())
            .unwrap_or_default()
            .to_string();
        ParsedLogPath {
            location,
            filename,
            version,
            file_type: LogPathFileType::Commit,
        }
    }

    pub fn is_commit(&self) -> bool {
        self.file_type == LogPathFileType::Commit
    }

    pub fn is_checkpoint(&self) -> bool {
        self.file_type.is_checkpoint()
    }
}

/// Url of the `_delta_log/` directory of the table rooted at `table_root`.
pub fn log_root(table_root: &Url) -> DeltaResult<Url> {
    Ok(ensure_directory(table_root.clone()).join(&format!("{DELTA_LOG_DIR}/"))?)
}

/// Make sure a url ends in `/` so that joining relative paths appends to it.
pub(crate) fn ensure_directory(mut url: Url) -> Url {
    if !url.path().ends_with(DELIMITER) {
        let path = format!("{}{DELIMITER}", url.path());
        url.set_path(&path);
    }
    url
}
