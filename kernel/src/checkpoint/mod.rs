//! Checkpoint identity, ordering, and selection of the latest complete checkpoint.
//!
//! A checkpoint is written either as a single classic parquet file, as `n` independent parts,
//! or as a single V2 file named by a unique id. Multiple checkpoints may exist for the same
//! version, and a multi-part checkpoint may be only partially visible while it is being written.

use itertools::Itertools;
use url::Url;

use crate::path::{LogPathFileType, ParsedLogPath};
use crate::{DeltaResult, Version};

mod last_checkpoint;
pub use last_checkpoint::{read_last_checkpoint, LastCheckpointHint};

/// The on-disk layout of a checkpoint. The declaration order is the preference order when two
/// checkpoints exist for the same version: newer formats supersede the ones written for
/// compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CheckpointFormat {
    Classic,
    MultiPart,
    V2,
}

/// One logical checkpoint. All parts of a multi-part checkpoint map to the same instance.
///
/// Instances are totally ordered by version, then format, then number of parts (multi-part) or
/// file name (V2). `num_parts` is only set for multi-part checkpoints and `file_name` only for V2
/// checkpoints, so equality is exactly "same checkpoint".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CheckpointInstance {
    pub version: Version,
    pub format: CheckpointFormat,
    pub num_parts: Option<u32>,
    pub file_name: Option<String>,
}

impl CheckpointInstance {
    /// The instance a checkpoint file belongs to, or `None` if the file is not a checkpoint.
    pub fn from_log_path(path: &ParsedLogPath) -> Option<Self> {
        let (format, num_parts, file_name) = match &path.file_type {
            LogPathFileType::ClassicCheckpoint => (CheckpointFormat::Classic, None, None),
            LogPathFileType::MultiPartCheckpoint { num_parts, .. } => {
                (CheckpointFormat::MultiPart, Some(*num_parts), None)
            }
            LogPathFileType::V2Checkpoint { .. } => {
                (CheckpointFormat::V2, None, Some(path.filename.clone()))
            }
            _ => return None,
        };
        Some(Self {
            version: path.version,
            format,
            num_parts,
            file_name,
        })
    }

    /// True if `count` files of this instance make up the whole checkpoint.
    pub fn is_complete(&self, count: usize) -> bool {
        match (self.format, self.num_parts) {
            (CheckpointFormat::MultiPart, Some(num_parts)) => count == num_parts as usize,
            _ => count == 1,
        }
    }

    /// Names of every file this checkpoint is made of, in part order.
    pub fn file_names(&self) -> Vec<String> {
        let version = self.version;
        match (self.format, self.num_parts, &self.file_name) {
            (CheckpointFormat::MultiPart, Some(num_parts), _) => (1..=num_parts)
                .map(|part| format!("{version:020}.checkpoint.{part:010}.{num_parts:010}.parquet"))
                .collect(),
            (CheckpointFormat::V2, _, Some(name)) => vec![name.clone()],
            _ => vec![format!("{version:020}.checkpoint.parquet")],
        }
    }

    /// Urls of every file this checkpoint is made of, in part order.
    pub fn file_urls(&self, log_root: &Url) -> DeltaResult<Vec<Url>> {
        self.file_names()
            .iter()
            .map(|name| Ok(log_root.join(name)?))
            .collect()
    }
}

/// Select the greatest complete checkpoint whose version is not later than `not_later_than`.
///
/// `instances` holds one entry per listed checkpoint file, so a multi-part checkpoint appears
/// once per visible part. A group of identical instances is complete when it has exactly one
/// member (classic and V2) or `num_parts` members (multi-part). Returns `None` when no group is
/// complete.
pub fn select_latest_complete(
    instances: impl IntoIterator<Item = CheckpointInstance>,
    not_later_than: Option<Version>,
) -> Option<CheckpointInstance> {
    instances
        .into_iter()
        .filter(|instance| not_later_than.map_or(true, |bound| instance.version <= bound))
        .counts()
        .into_iter()
        .filter(|(instance, count)| instance.is_complete(*count))
        .map(|(instance, _)| instance)
        .max()
}
