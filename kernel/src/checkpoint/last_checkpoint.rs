use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::path::LAST_CHECKPOINT_FILE_NAME;
use crate::{read_json, StorageHandler, TableOptions, Version};

/// The content of `_last_checkpoint`: where the most recent checkpoint was written.
///
/// Only a hint. It may be stale or point at a checkpoint that no longer exists, so the log is
/// always listed to confirm it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastCheckpointHint {
    /// The version of the table when the last checkpoint was made.
    pub version: Version,
    /// The number of actions that are stored in the checkpoint.
    pub size: i64,
    /// The number of fragments if the last checkpoint was written in multiple parts.
    pub parts: Option<u32>,
    /// The number of bytes of the checkpoint.
    pub size_in_bytes: Option<i64>,
    /// The number of AddFile actions in the checkpoint.
    pub num_of_add_files: Option<i64>,
    /// Checksum of the hint written by some writers.
    pub checksum: Option<String>,
}

/// Read `_last_checkpoint` from `log_root`.
///
/// A missing, empty or unparsable file is retried up to `options.last_checkpoint_attempts`
/// times, pausing `options.last_checkpoint_retry_delay` between reads. When every read fails the
/// hint is treated as absent and `None` is returned: the caller then lists the log from the start.
#[instrument(name = "log.last_checkpoint", skip_all, fields(log_root = %log_root))]
pub async fn read_last_checkpoint(
    storage: &dyn StorageHandler,
    log_root: &Url,
    options: &TableOptions,
) -> Option<LastCheckpointHint> {
    let path = match log_root.join(LAST_CHECKPOINT_FILE_NAME) {
        Ok(path) => path,
        Err(err) => {
            warn!("cannot locate {LAST_CHECKPOINT_FILE_NAME}: {err}");
            return None;
        }
    };
    let attempts = options.last_checkpoint_attempts.max(1);
    for attempt in 1..=attempts {
        match read_json::<LastCheckpointHint>(storage, &path).await {
            Ok(Some(hint)) => {
                debug!(version = hint.version, parts = ?hint.parts, "read checkpoint hint");
                return Some(hint);
            }
            Ok(None) => debug!(attempt, "{LAST_CHECKPOINT_FILE_NAME} missing or empty"),
            Err(err) => warn!(attempt, "failed to read {LAST_CHECKPOINT_FILE_NAME}: {err}"),
        }
        if attempt < attempts {
            tokio::time::sleep(options.last_checkpoint_retry_delay).await;
        }
    }
    warn!("no usable {LAST_CHECKPOINT_FILE_NAME} after {attempts} attempts, listing from version 0");
    None
}
